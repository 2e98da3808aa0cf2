use std::{any::Any, io};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки транспорта: сеть, брокер, протокол.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Не удалось подключиться к брокеру
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Соединение закрыто удалённой стороной или оборвалось
    #[error("connection closed by broker")]
    ConnectionClosed,

    /// Мост или транспорт уже остановлен
    #[error("transport is shut down")]
    Closed,

    /// Операция не уложилась в таймаут
    #[error("{op} timed out")]
    Timeout { op: &'static str },

    /// Брокер ответил кадром ошибки
    #[error("broker rejected request: {code} {message}")]
    Broker { code: String, message: String },

    /// Нарушение протокола
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// Ошибка ввода-вывода
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        kind: io::ErrorKind,
        message: String,
    },
}

impl TransportError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Разбирает тело кадра ошибки NSQ вида `E_INVALID some text`.
    pub fn from_broker_frame(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut parts = text.splitn(2, ' ');
        let code = parts.next().unwrap_or_default().to_string();
        let message = parts.next().unwrap_or_default().to_string();
        Self::Broker { code, message }
    }

    /// Завершает ли ошибка соединение (после неё поток доставки не продолжится).
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Broker { code, .. } => !matches!(
                code.as_str(),
                "E_FIN_FAILED" | "E_REQ_FAILED" | "E_TOUCH_FAILED"
            ),
            _ => true,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::ConnectionClosed,
            kind => TransportError::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

/// Конвертация из tokio::time::error::Elapsed
#[cfg(feature = "tokio")]
impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout { op: "operation" }
    }
}

impl ErrorExt for TransportError {
    fn category(&self) -> &'static str {
        "transport"
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectionClosed => StatusCode::ConnectionClosed,
            Self::Closed => StatusCode::Shutdown,
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::Broker { .. } => StatusCode::BrokerRejected,
            Self::Protocol { .. } => StatusCode::ProtocolError,
            Self::Io { .. } => StatusCode::Io,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::ConnectionFailed { address, .. } => format!("Failed to connect to {address}"),
            Self::ConnectionClosed => "Connection closed by broker".to_string(),
            Self::Closed => "Bridge is shut down".to_string(),
            Self::Timeout { op } => format!("{op} timed out"),
            Self::Broker { code, .. } => format!("Broker rejected request ({code})"),
            Self::Protocol { .. } => "Protocol error".to_string(),
            Self::Io { .. } => "Network error occurred".to_string(),
        }
    }

    fn context(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ConnectionFailed { address, .. } => vec![("address", address.clone())],
            Self::Broker { code, .. } => vec![("broker_code", code.clone())],
            Self::Timeout { op } => vec![("op", op.to_string())],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет разбор кадра ошибки брокера на код и текст.
    #[test]
    fn test_from_broker_frame() {
        let err = TransportError::from_broker_frame(b"E_BAD_TOPIC PUB topic name is not valid");
        assert_eq!(
            err,
            TransportError::Broker {
                code: "E_BAD_TOPIC".to_string(),
                message: "PUB topic name is not valid".to_string(),
            }
        );
        assert!(err.is_fatal());
    }

    /// Тест проверяет, что ошибки FIN/REQ не считаются фатальными.
    #[test]
    fn test_non_fatal_broker_codes() {
        let err = TransportError::from_broker_frame(b"E_FIN_FAILED FIN 0a0b failed");
        assert!(!err.is_fatal());
        assert!(TransportError::ConnectionClosed.is_fatal());
    }

    /// Тест проверяет маппинг io::ErrorKind.
    #[test]
    fn test_io_mapping() {
        let err: TransportError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert_eq!(err, TransportError::ConnectionClosed);

        let err: TransportError = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
        assert_eq!(err.status_code(), StatusCode::Io);
    }
}
