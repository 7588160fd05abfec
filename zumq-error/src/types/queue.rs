use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки операций над очередью адреса.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Очередь заполнена, сообщение не вставлено.
    #[error("queue '{address}' overflow (capacity {capacity})")]
    Overflow { address: String, capacity: usize },

    /// Очередь закрыта и больше не принимает сообщения.
    #[error("queue '{address}' is closed")]
    Closed { address: String },

    /// Для адреса не зарегистрирована очередь.
    #[error("no queue registered for address '{address}'")]
    NotFound { address: String },
}

impl QueueError {
    /// Адрес очереди, к которой относится ошибка.
    pub fn address(&self) -> &str {
        match self {
            Self::Overflow { address, .. }
            | Self::Closed { address }
            | Self::NotFound { address } => address,
        }
    }

    /// `true` для переполнения очереди.
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}

impl ErrorExt for QueueError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Overflow { .. } => StatusCode::QueueFull,
            Self::Closed { .. } => StatusCode::QueueClosed,
            Self::NotFound { .. } => StatusCode::AddressNotFound,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "queue".to_string()),
            ("status_code", self.status_code().to_string()),
            ("address", self.address().to_string()),
        ];
        if let Self::Overflow { capacity, .. } = self {
            tags.push(("capacity", capacity.to_string()));
        }
        tags
    }
}
