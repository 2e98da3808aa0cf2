use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных (кодек, маршрутизация)
/// - 6xxx: Сеть / IO / брокер
/// - 8xxx: Протокольные ошибки
/// - 9xxx: Конфигурация
///
/// `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 1xxx: Общие ошибки ===
    Unsupported = 1001,

    // === 2xxx: Ошибки данных ===
    InvalidData = 2009,
    RouteMismatch = 2010,
    InvalidName = 2011,

    // === 6xxx: Сеть/IO ===
    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    ProtocolError = 6003,
    ConnectionFailed = 6004,
    UnexpectedEof = 6007,
    BrokerRejected = 6008,
    Shutdown = 6009,

    // === 8xxx: Протокол ===
    InvalidUtf8 = 8004,
    SizeLimit = 8007,
    DepthLimit = 8008,
    EncodingError = 8010,
    DecodingError = 8011,

    // === 9xxx: Конфигурация ===
    ConfigMissing = 9000,
    ConfigInvalid = 9001,
    ConfigUnknownKey = 9002,
    InvalidPattern = 9003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить.
    ///
    /// Сам мост ничего не повторяет: флаг предназначен для вызывающего кода,
    /// который строит свою политику повторов поверх.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed | Self::ConnectionClosed | Self::Io
        )
    }

    /// Ошибка в запросе или данных вызывающего (диапазон 2xxx и конфигурация).
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        (2000..=2999).contains(&c) || (9000..=9999).contains(&c)
    }

    /// Ошибка протокола или формата (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Нарушение договорённостей с брокером или собственного формата:
    /// повтор не поможет, нужен разбор.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::ProtocolError | Self::EncodingError)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            // ожидаемо во время остановки
            Self::Shutdown => LogLevel::Debug,
            Self::RouteMismatch | Self::InvalidName => LogLevel::Info,
            c if c.is_critical() => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
