use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки линка (одностороннего канала внутри соединения).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Линк закрыт: соединение оборвалось или удалённая сторона ушла.
    #[error("link closed")]
    Closed,

    /// Удалённая сторона явно отсоединила линк.
    #[error("link detached: {reason}")]
    Detached { reason: String },

    /// Ошибка транспортного уровня.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ErrorExt for LinkError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed => StatusCode::LinkClosed,
            Self::Detached { .. } => StatusCode::LinkDetached,
            Self::Transport(_) => StatusCode::Io,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_status_codes() {
        assert_eq!(LinkError::Closed.status_code(), StatusCode::LinkClosed);
        assert_eq!(
            LinkError::Detached {
                reason: "bye".into()
            }
            .to_string(),
            "link detached: bye"
        );
        assert_eq!(
            LinkError::Transport("reset".into()).status_code(),
            StatusCode::Io
        );
    }
}
