pub mod codec;
pub mod config;
pub mod route;
pub mod transport;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use codec::*;
pub use config::*;
pub use route::*;
pub use transport::*;

use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Общая ошибка моста: объединяет все категории.
///
/// Каждая операция публичного API возвращает `BridgeResult<T>`; вызывающий
/// код различает категории через `match` или [`ErrorExt::status_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BridgeError {
    /// Внутренняя ошибка без собственного варианта.
    fn inner(&self) -> &dyn ErrorExt {
        match self {
            Self::Config(e) => e,
            Self::Route(e) => e,
            Self::Encode(e) => e,
            Self::Decode(e) => e,
            Self::Transport(e) => e,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_route(&self) -> bool {
        matches!(self, Self::Route(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl ErrorExt for BridgeError {
    fn category(&self) -> &'static str {
        self.inner().category()
    }

    fn status_code(&self) -> StatusCode {
        self.inner().status_code()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        self.inner().client_message()
    }

    fn context(&self) -> Vec<(&'static str, String)> {
        self.inner().context()
    }
}
