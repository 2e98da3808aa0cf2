//! Логирование через `tracing`: фильтр уровней, консольный и файловый
//! приёмники.
//!
//! Библиотека сама только пишет события; подписчика устанавливает
//! приложение вызовом [`init_logging`].

pub mod config;
pub mod filters;
pub mod handle;
pub mod sinks;

use nsqbridge_error::ConfigError;
use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

pub use config::{FileSinkConfig, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;

use self::sinks::BoxedLayer;

/// Устанавливает глобальный подписчик по конфигурации.
///
/// Конфигурация берётся как есть; окружение применяет
/// [`LoggingConfig::with_env_and_flags`]. Повторный вызов в том же процессе
/// возвращает ошибку.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingHandle, ConfigError> {
    config.validate()?;

    let filter = filters::build_filter(&config)?;
    let mut layers: Vec<BoxedLayer<Registry>> = Vec::new();

    if config.console {
        layers.push(sinks::console::layer(&config));
    }

    let file_guard = match &config.file {
        Some(file) => {
            let (layer, guard) = sinks::file::layer(file, config.format)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ConfigError::Load(format!("logging already initialised: {e}")))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        file = ?config.file.as_ref().map(|f| &f.dir),
        "logging initialised"
    );

    Ok(LoggingHandle::new(file_guard))
}

static DEFAULT_INSTALLED: OnceCell<bool> = OnceCell::new();

/// Консольное логирование по умолчанию, не более одного раза на процесс.
///
/// Возвращает `false`, если подписчик уже был установлен кем-то другим.
pub fn init_default() -> bool {
    let config = LoggingConfig::default().with_env_and_flags(None, None);
    *DEFAULT_INSTALLED.get_or_init(|| match config.and_then(init_logging) {
        // консольный приёмник не держит guard
        Ok(handle) => {
            drop(handle);
            true
        }
        Err(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет идемпотентность установки по умолчанию.
    #[test]
    fn test_init_default_idempotent() {
        let first = init_default();
        assert_eq!(init_default(), first);
        // глобальный подписчик уже занят
        assert!(init_logging(LoggingConfig::default()).is_err());
    }
}
