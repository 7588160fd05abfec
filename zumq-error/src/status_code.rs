use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок брокера.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Очереди и адреса
/// - 6xxx: Сеть / IO / линки
/// - 8xxx: Протокольные ошибки
///
/// `num_enum::TryFromPrimitive` даёт `TryFrom<u32>` для передачи кода по
/// проводу; с feature = "strum" добавляются `AsRefStr`/`EnumIter`.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unexpected = 1001,
    Internal = 1002,
    InvalidArgs = 1003,

    // === 2xxx: Очереди и адреса ===
    QueueFull = 2000,
    QueueClosed = 2001,
    AddressNotFound = 2002,

    // === 6xxx: Сеть/IO ===
    Io = 6000,
    ConnectionClosed = 6001,
    LinkClosed = 6002,
    LinkDetached = 6003,
    ConnectionFailed = 6004,
    Timeout = 6005,

    // === 8xxx: Протокол ===
    InvalidFrame = 8000,
    InvalidCommand = 8001,
    InvalidInteger = 8002,
    UnknownHandle = 8003,
    DuplicateHandle = 8004,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
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

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить
    /// позже (например, очередь освободится).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull
                | Self::ConnectionClosed
                | Self::ConnectionFailed
                | Self::Timeout
                | Self::LinkClosed
                | Self::Io
        )
    }

    /// Является ли код ошибкой со стороны клиента (диапазон `2xxx` и
    /// `InvalidArgs`).
    pub fn is_client_error(&self) -> bool {
        (2000..=2999).contains(&self.code()) || matches!(self, Self::InvalidArgs)
    }

    /// Ошибка протокола или парсинга кадра (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::LinkClosed | Self::LinkDetached | Self::ConnectionClosed => LogLevel::Debug,
            Self::AddressNotFound | Self::InvalidArgs => LogLevel::Info,
            Self::QueueFull | Self::QueueClosed => LogLevel::Warn,
            Self::Internal | Self::Unexpected | Self::Io => LogLevel::Error,
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
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
