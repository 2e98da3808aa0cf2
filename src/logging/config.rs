use std::{env, fmt, path::PathBuf, str::FromStr};

use nsqbridge_error::ConfigError;
use serde::{Deserialize, Serialize};

/// Формат строк лога.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid(
                "log_format",
                format!("'{other}', expected pretty, compact or json"),
            )),
        }
    }
}

/// Файловый приёмник: ежедневная ротация в каталоге `dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSinkConfig {
    pub dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub prefix: String,
}

fn default_file_prefix() -> String {
    "nsqbridge.log".to_string()
}

impl FileSinkConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: default_file_prefix(),
        }
    }
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Директива `EnvFilter`: уровень (`info`) или полная запись
    /// (`nsqbridge=debug,warn`). `RUST_LOG` имеет приоритет.
    pub level: String,
    pub format: LogFormat,
    pub ansi: bool,
    /// Вывод в stderr; stdout остаётся за данными CLI
    pub console: bool,
    pub file: Option<FileSinkConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            ansi: true,
            console: true,
            file: None,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    pub fn with_level(
        mut self,
        level: impl Into<String>,
    ) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(
        mut self,
        format: LogFormat,
    ) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(
        mut self,
        file: FileSinkConfig,
    ) -> Self {
        self.file = Some(file);
        self
    }

    /// Окружение поверх текущих значений, затем явно заданные уровень и
    /// формат (флаги CLI) поверх окружения.
    pub fn with_env_and_flags(
        mut self,
        level: Option<String>,
        format: Option<LogFormat>,
    ) -> Result<Self, ConfigError> {
        self.apply_env_overrides()?;
        if let Some(level) = level {
            self.level = level;
        }
        if let Some(format) = format {
            self.format = format;
        }
        Ok(self)
    }

    /// Переопределения из окружения: `NSQBRIDGE_LOG_LEVEL`,
    /// `NSQBRIDGE_LOG_FORMAT`, `NSQBRIDGE_LOG_DIR`, `NO_COLOR`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(level) = env::var("NSQBRIDGE_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("NSQBRIDGE_LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Ok(dir) = env::var("NSQBRIDGE_LOG_DIR") {
            let prefix = self
                .file
                .take()
                .map(|f| f.prefix)
                .unwrap_or_else(default_file_prefix);
            self.file = Some(FileSinkConfig {
                dir: dir.into(),
                prefix,
            });
        }
        if env::var_os("NO_COLOR").is_some() {
            self.ansi = false;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::invalid("log_level", "must not be empty"));
        }
        if let Some(file) = &self.file {
            if file.prefix.is_empty() {
                return Err(ConfigError::invalid("log_file_prefix", "must not be empty"));
            }
        }
        if !self.console && self.file.is_none() {
            return Err(ConfigError::invalid("logging", "no sink enabled"));
        }
        Ok(())
    }
}
