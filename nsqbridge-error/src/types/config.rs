use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки конфигурации: параметры конструирования моста, шаблон маршрутизации,
/// опции публикатора. Всегда фатальны для вызова, который их вернул.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Не задан обязательный ключ
    #[error("missing required option `{key}`")]
    MissingKey { key: String },

    /// Неизвестный ключ
    #[error("unknown option `{key}`")]
    UnknownKey { key: String },

    /// Ключ задан, но значение недопустимо
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    /// Регулярное выражение не компилируется или содержит не одну группу
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Ошибка источника конфигурации (файл, окружение)
    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    pub fn invalid(
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn category(&self) -> &'static str {
        "config"
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingKey { .. } => StatusCode::ConfigMissing,
            Self::UnknownKey { .. } => StatusCode::ConfigUnknownKey,
            Self::InvalidValue { .. } | Self::Load(_) => StatusCode::ConfigInvalid,
            Self::InvalidPattern { .. } => StatusCode::InvalidPattern,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn context(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::MissingKey { key } | Self::UnknownKey { key } | Self::InvalidValue { key, .. } => {
                vec![("key", key.clone())]
            }
            Self::InvalidPattern { pattern, .. } => vec![("pattern", pattern.clone())],
            Self::Load(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key() {
        let err = ConfigError::missing("server");
        assert_eq!(err.status_code(), StatusCode::ConfigMissing);
        assert_eq!(err.to_string(), "missing required option `server`");
    }

    #[test]
    fn test_invalid_pattern_tags() {
        let err = ConfigError::InvalidPattern {
            pattern: "^@(".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::InvalidPattern);
        assert!(err
            .metrics_tags()
            .iter()
            .any(|(k, v)| *k == "pattern" && v == "^@("));
    }
}
