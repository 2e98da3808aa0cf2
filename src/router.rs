//! Маршрутизация имён каналов приложения в топики брокера.
//!
//! Шаблон компилируется один раз и должен содержать ровно одну группу
//! захвата. Совпадение всегда полное: шаблон `@(.+)` не примет `x@y`.

use std::fmt;

use nsqbridge_error::{ConfigError, RouteError};
use regex::Regex;
use tracing::trace;

use crate::transport::Topic;

/// Шаблон по умолчанию: `@topic` -> `topic`.
pub const DEFAULT_PATTERN: &str = "^@(.+)$";

#[derive(Clone)]
pub struct PatternRouter {
    /// Исходный текст шаблона (для сообщений об ошибках)
    source: String,
    /// Шаблон, обёрнутый в `^(?:...)$`
    anchored: Regex,
}

impl PatternRouter {
    /// Компилирует шаблон. Ошибка, если регулярное выражение некорректно или
    /// число групп захвата не равно одной.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let anchored =
            Regex::new(&format!("^(?:{pattern})$")).map_err(|e| invalid(e.to_string()))?;

        // captures_len учитывает неявную группу 0
        let groups = anchored.captures_len() - 1;
        if groups != 1 {
            return Err(invalid(format!(
                "expected exactly one capture group, found {groups}"
            )));
        }

        Ok(Self {
            source: pattern.to_string(),
            anchored,
        })
    }

    /// Исходный текст шаблона.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Преобразует имя канала в топик.
    pub fn resolve(
        &self,
        channel: &str,
    ) -> Result<Topic, RouteError> {
        let caps = self
            .anchored
            .captures(channel)
            .ok_or_else(|| RouteError::NoMatch {
                channel: channel.to_string(),
                pattern: self.source.clone(),
            })?;

        let topic = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if topic.is_empty() {
            return Err(RouteError::EmptyTopic {
                channel: channel.to_string(),
            });
        }

        let topic = Topic::new(topic)?;
        trace!(channel, topic = %topic, "resolved channel");
        Ok(topic)
    }

    /// Как [`resolve`](Self::resolve), но без ошибки.
    pub fn try_resolve(
        &self,
        channel: &str,
    ) -> Option<Topic> {
        self.resolve(channel).ok()
    }

    /// Сопоставляется ли канал с шаблоном (без проверки имени топика).
    pub fn matches(
        &self,
        channel: &str,
    ) -> bool {
        self.anchored.is_match(channel)
    }
}

impl fmt::Debug for PatternRouter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PatternRouter")
            .field("pattern", &self.source)
            .finish()
    }
}
