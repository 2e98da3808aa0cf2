use nsqbridge_error::ConfigError;
use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Строит фильтр: `RUST_LOG`, если задан, иначе директива из конфигурации.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => filter_from_directive(&config.level),
    }
}

/// Фильтр из явной директивы. Некорректная директива даёт ошибку
/// конфигурации вместо молчаливого отката на `info`.
pub fn filter_from_directive(directive: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(directive)
        .map_err(|e| ConfigError::invalid("log_level", format!("'{directive}': {e}")))
}
