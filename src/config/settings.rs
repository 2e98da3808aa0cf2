use std::{path::Path, time::Duration};

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File, Source};
use nsqbridge_error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::router::PatternRouter;

/// Префикс переменных окружения: `NSQBRIDGE_SERVER`, `NSQBRIDGE_PATTERN`, ...
pub const ENV_PREFIX: &str = "NSQBRIDGE";

/// Все допустимые ключи. Любой другой ключ отклоняется.
pub const KNOWN_KEYS: &[&str] = &[
    "server",
    "pattern",
    "connect_timeout_ms",
    "publish_timeout_ms",
    "heartbeat_interval_ms",
    "max_in_flight",
    "max_frame_size",
    "close_timeout_ms",
    "client_id",
];

/// Параметры конструирования моста.
///
/// `server` и `pattern` обязательны; остальное имеет значения по умолчанию.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSettings {
    /// `host:port` TCP-порта nsqd
    #[serde(default)]
    pub server: String,
    /// Регулярное выражение с одной группой захвата
    #[serde(default)]
    pub pattern: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u32,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_publish_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_max_in_flight() -> u32 {
    1
}

fn default_max_frame_size() -> usize {
    4 * 1024 * 1024
}

fn default_close_timeout_ms() -> u64 {
    2_000
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BridgeSettings {
    /// Настройки с обязательными параметрами и значениями по умолчанию.
    pub fn new(
        server: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            pattern: pattern.into(),
            connect_timeout_ms: default_connect_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_in_flight: default_max_in_flight(),
            max_frame_size: default_max_frame_size(),
            close_timeout_ms: default_close_timeout_ms(),
            client_id: None,
        }
    }

    /// Загружает настройки из переменных окружения `NSQBRIDGE_*`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(env_source()))
    }

    /// Как [`BridgeSettings::load`], но `server` и `pattern` необязательны в
    /// окружении и берутся из аргументов, если не заданы.
    pub fn load_or(
        server: &str,
        pattern: &str,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("server", server)
            .and_then(|b| b.set_default("pattern", pattern))
            .map_err(load_error)?;
        Self::build(builder.add_source(env_source()))
    }

    /// Загружает настройки из файла (формат по расширению: toml, json,
    /// yaml), затем применяет переменные окружения поверх.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading bridge settings");
        Self::build(
            Config::builder()
                .add_source(File::from(path).required(true))
                .add_source(env_source()),
        )
    }

    /// Строит настройки из пар «ключ = значение» (строковые значения
    /// приводятся к нужным типам).
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            let key = key.as_ref();
            check_known(key)?;
            builder = builder.set_override(key, value.as_ref()).map_err(load_error)?;
        }
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let cfg = builder.build().map_err(load_error)?;
        for key in cfg.collect().map_err(load_error)?.keys() {
            check_known(key)?;
        }
        let settings: BridgeSettings = cfg.try_deserialize().map_err(load_error)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Проверяет обязательные ключи, форму адреса, ограничения и шаблон.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::missing("server"));
        }
        if self.pattern.is_empty() {
            return Err(ConfigError::missing("pattern"));
        }
        validate_address(&self.server)?;

        if self.max_in_flight == 0 {
            return Err(ConfigError::invalid("max_in_flight", "must be at least 1"));
        }
        if self.max_frame_size < 1024 {
            return Err(ConfigError::invalid(
                "max_frame_size",
                "must be at least 1024 bytes",
            ));
        }
        for (key, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("publish_timeout_ms", self.publish_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("close_timeout_ms", self.close_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be greater than zero"));
            }
        }
        if matches!(&self.client_id, Some(id) if id.trim().is_empty()) {
            return Err(ConfigError::invalid("client_id", "must not be empty"));
        }

        self.router().map(|_| ())
    }

    /// Компилирует шаблон маршрутизации.
    pub fn router(&self) -> Result<PatternRouter, ConfigError> {
        PatternRouter::new(&self.pattern)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние функции
////////////////////////////////////////////////////////////////////////////////

/// Переменные `NSQBRIDGE_*` с ключами настроек. Остальные переменные с
/// тем же префиксом (например, `NSQBRIDGE_LOG_LEVEL`) принадлежат логированию.
fn env_source() -> Environment {
    let prefix = format!("{ENV_PREFIX}_");
    let vars = std::env::vars()
        .filter(|(name, _)| {
            name.strip_prefix(&prefix)
                .is_some_and(|key| KNOWN_KEYS.contains(&key.to_ascii_lowercase().as_str()))
        })
        .collect::<config::Map<String, String>>();
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .source(Some(vars))
}

fn check_known(key: &str) -> Result<(), ConfigError> {
    if KNOWN_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(ConfigError::UnknownKey {
            key: key.to_string(),
        })
    }
}

fn load_error(err: config::ConfigError) -> ConfigError {
    ConfigError::Load(err.to_string())
}

fn validate_address(server: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::invalid("server", format!("'{server}': {reason}"));
    let (host, port) = server
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("host is empty"));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid("port must be in 1..=65535")),
        Ok(_) => Ok(()),
    }
}
