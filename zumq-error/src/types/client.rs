use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, LinkError, ProtocolError, StatusCode};

/// Ошибки клиентской стороны проводного протокола.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Не удалось установить TCP-соединение.
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("connection timeout")]
    ConnectionTimeout,

    #[error("read timeout")]
    ReadTimeout,

    #[error("write timeout")]
    WriteTimeout,

    /// Брокер закрыл соединение.
    #[error("connection closed by broker")]
    ConnectionClosed,

    /// Брокер отсоединил линк клиента.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Брокер прислал `ERROR`.
    #[error("broker error: {0}")]
    Broker(String),

    /// Кадр, которого клиент не ожидал в текущем состоянии.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for ClientError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectionTimeout | Self::ReadTimeout | Self::WriteTimeout => StatusCode::Timeout,
            Self::ConnectionClosed => StatusCode::ConnectionClosed,
            Self::Link(e) => e.status_code(),
            Self::Broker(_) => StatusCode::Internal,
            Self::UnexpectedFrame(_) => StatusCode::InvalidFrame,
            Self::Protocol(e) => e.status_code(),
            Self::Io(_) => StatusCode::Io,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет коды статуса, включая делегирование вложенным ошибкам.
    #[test]
    fn test_client_error_status_codes() {
        assert_eq!(
            ClientError::ConnectionTimeout.status_code(),
            StatusCode::Timeout
        );
        assert_eq!(
            ClientError::from(LinkError::Detached {
                reason: "no queue".into()
            })
            .status_code(),
            StatusCode::LinkDetached
        );
        assert_eq!(
            ClientError::from(ProtocolError::UnknownHandle(3)).status_code(),
            StatusCode::UnknownHandle
        );
        assert!(ClientError::ConnectionClosed.status_code().is_retryable());
    }

    #[test]
    fn test_display() {
        let e = ClientError::ConnectionFailed {
            address: "127.0.0.1:35254".into(),
            reason: "refused".into(),
        };
        assert_eq!(
            e.to_string(),
            "failed to connect to 127.0.0.1:35254: refused"
        );
    }
}
