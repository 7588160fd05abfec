use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки разбора и обработки кадров проводного протокола.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Пустая строка или кадр без команды.
    #[error("empty frame")]
    EmptyFrame,

    /// Неизвестная команда.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// В кадре не хватает обязательного поля.
    #[error("{command}: missing field '{field}'")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    /// Поле не является корректным числом.
    #[error("{command}: invalid integer in '{field}': {value}")]
    InvalidInteger {
        command: &'static str,
        field: &'static str,
        value: String,
    },

    /// Поле содержит значение вне допустимого набора.
    #[error("{command}: invalid value in '{field}': {value}")]
    InvalidValue {
        command: &'static str,
        field: &'static str,
        value: String,
    },

    /// Кадр ссылается на неизвестный handle линка.
    #[error("unknown link handle {0}")]
    UnknownHandle(u32),

    /// Handle уже занят другим линком этого соединения.
    #[error("link handle {0} already attached")]
    DuplicateHandle(u32),

    /// Ошибка ввода-вывода сокета.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for ProtocolError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyFrame | Self::MissingField { .. } | Self::InvalidValue { .. } => {
                StatusCode::InvalidFrame
            }
            Self::UnknownCommand(_) => StatusCode::InvalidCommand,
            Self::InvalidInteger { .. } => StatusCode::InvalidInteger,
            Self::UnknownHandle(_) => StatusCode::UnknownHandle,
            Self::DuplicateHandle(_) => StatusCode::DuplicateHandle,
            Self::Io(_) => StatusCode::Io,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Io(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
