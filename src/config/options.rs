use nsqbridge_error::ConfigError;
use serde::{Deserialize, Serialize};

/// Опции публикатора, передаваемые в `Bridge::advertise_with`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdvertiseOptions {
    /// Максимум одновременных публикаций через один публикатор;
    /// `0` снимает ограничение.
    #[serde(default)]
    pub queue_depth: usize,
}

impl AdvertiseOptions {
    pub const KNOWN_KEYS: &'static [&'static str] = &["queue_depth"];

    pub fn new(queue_depth: usize) -> Self {
        Self { queue_depth }
    }

    pub fn is_bounded(&self) -> bool {
        self.queue_depth > 0
    }

    /// Разбирает опции из JSON-объекта. Неизвестные ключи отклоняются
    /// с [`ConfigError::UnknownKey`].
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ConfigError::invalid("advertise options", e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::invalid("advertise options", "expected a JSON object"))?;

        if let Some(key) = object
            .keys()
            .find(|k| !Self::KNOWN_KEYS.contains(&k.as_str()))
        {
            return Err(ConfigError::UnknownKey { key: key.clone() });
        }

        serde_json::from_value(value)
            .map_err(|e| ConfigError::invalid("queue_depth", e.to_string()))
    }
}
