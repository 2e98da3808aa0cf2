use std::{any::Any, io};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки кодирования значения в конверт.
///
/// Возникают до любого сетевого ввода-вывода.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Значение вне закрытого набора поддерживаемых типов
    #[error("unsupported payload: {kind}")]
    UnsupportedPayload { kind: String },

    /// Длина не помещается в u32
    #[error("{what} too large: {len} bytes")]
    TooLarge { what: &'static str, len: usize },

    /// Превышена глубина вложенности
    #[error("nesting depth exceeds {max}")]
    DepthLimit { max: usize },

    /// Ошибка записи в поток
    #[error("write failed: {0}")]
    Io(String),
}

/// Ошибки декодирования конверта, полученного от брокера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Неизвестный тег типа
    #[error("unsupported payload tag 0x{tag:02X}")]
    UnsupportedPayload { tag: u8 },

    /// Данные закончились раньше, чем значение
    #[error("unexpected end of envelope")]
    UnexpectedEof,

    /// Строка или ключ не в UTF-8
    #[error("invalid UTF-8 in envelope: {0}")]
    InvalidUtf8(String),

    /// Байт логического значения не 0 и не 1
    #[error("invalid boolean byte 0x{0:02X}")]
    InvalidBool(u8),

    /// Повторяющийся ключ в словаре
    #[error("duplicate map key '{0}'")]
    DuplicateKey(String),

    /// Превышена глубина вложенности
    #[error("nesting depth exceeds {max}")]
    DepthLimit { max: usize },

    /// После полного значения остались байты
    #[error("{count} trailing bytes after envelope")]
    TrailingBytes { count: usize },

    /// Ошибка чтения из потока
    #[error("read failed: {0}")]
    Io(String),
}

impl From<io::Error> for EncodeError {
    fn from(err: io::Error) -> Self {
        EncodeError::Io(err.to_string())
    }
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => DecodeError::UnexpectedEof,
            _ => DecodeError::Io(err.to_string()),
        }
    }
}

impl From<std::string::FromUtf8Error> for DecodeError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DecodeError::InvalidUtf8(err.to_string())
    }
}

impl ErrorExt for EncodeError {
    fn category(&self) -> &'static str {
        "encode"
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedPayload { .. } => StatusCode::Unsupported,
            Self::TooLarge { .. } => StatusCode::SizeLimit,
            Self::DepthLimit { .. } => StatusCode::DepthLimit,
            Self::Io(_) => StatusCode::EncodingError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for DecodeError {
    fn category(&self) -> &'static str {
        "decode"
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedPayload { .. } => StatusCode::Unsupported,
            Self::UnexpectedEof => StatusCode::UnexpectedEof,
            Self::InvalidUtf8(_) => StatusCode::InvalidUtf8,
            Self::DepthLimit { .. } => StatusCode::DepthLimit,
            Self::InvalidBool(_) | Self::DuplicateKey(_) | Self::TrailingBytes { .. } => {
                StatusCode::InvalidData
            }
            Self::Io(_) => StatusCode::DecodingError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        "Malformed message envelope".to_string()
    }
}
