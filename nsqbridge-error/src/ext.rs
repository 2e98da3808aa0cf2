use std::{any::Any, error::Error};

use crate::{LogLevel, StatusCode};

/// Общий интерфейс ошибок моста (object-safe).
///
/// Каждая категория (`config`, `route`, `encode`, `decode`, `transport`)
/// сообщает свой статус-код и поля контекста, а [`crate::BridgeError`]
/// делегирует всё вложенной ошибке.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Имя категории для логов и тегов.
    fn category(&self) -> &'static str;

    fn status_code(&self) -> StatusCode;

    /// Возвращает ошибку как [`Any`](std::any::Any) для downcast.
    fn as_any(&self) -> &dyn Any;

    /// Сообщение без внутренних подробностей (адресов, байтов кадра).
    fn client_message(&self) -> String {
        self.to_string()
    }

    /// Поля, по которым ошибку можно найти в логах: канал, ключ, адрес.
    fn context(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Теги для метрик: категория, статус-код и поля контекста.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", self.category().to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        tags.extend(self.context());
        tags
    }

    fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }

    fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }
}
