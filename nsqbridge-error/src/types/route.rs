use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки преобразования имени канала приложения в топик брокера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Канал не соответствует шаблону
    #[error("channel '{channel}' does not match pattern '{pattern}'")]
    NoMatch { channel: String, pattern: String },

    /// Шаблон совпал, но группа захвата пуста
    #[error("channel '{channel}' resolves to an empty topic")]
    EmptyTopic { channel: String },

    /// Имя не удовлетворяет ограничениям брокера
    #[error("invalid broker name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

impl ErrorExt for RouteError {
    fn category(&self) -> &'static str {
        "route"
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NoMatch { .. } | Self::EmptyTopic { .. } => StatusCode::RouteMismatch,
            Self::InvalidName { .. } => StatusCode::InvalidName,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn context(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::NoMatch { channel, .. } | Self::EmptyTopic { channel } => {
                vec![("channel", channel.clone())]
            }
            Self::InvalidName { name, .. } => vec![("name", name.clone())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_display() {
        let err = RouteError::NoMatch {
            channel: "test".to_string(),
            pattern: "^@(.+)$".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "channel 'test' does not match pattern '^@(.+)$'"
        );
        assert_eq!(err.status_code(), StatusCode::RouteMismatch);
    }
}
