use std::{env, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Формат событий.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("invalid log format '{0}'")]
    InvalidFormat(String),

    #[error("file sink requires a non-empty filename")]
    EmptyFilename,

    #[error("failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Настройки логирования брокера.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    pub format: LogFormat,
    pub console_enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub file_enabled: bool,
    pub log_dir: PathBuf,
    pub filename: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            filename: "zumq.log".to_string(),
        }
    }
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LoggingConfig {
    /// Применяет переопределения из окружения:
    /// `ZUMQ_LOG_LEVEL`, `ZUMQ_LOG_FORMAT`, `ZUMQ_LOG_DIR`.
    ///
    /// `ZUMQ_LOG_DIR` заодно включает файловый sink. Некорректный формат
    /// игнорируется.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("ZUMQ_LOG_LEVEL") {
            self.level = level.to_lowercase();
        }
        if let Ok(format) = env::var("ZUMQ_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.format = format;
            }
        }
        if let Ok(dir) = env::var("ZUMQ_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
            self.file_enabled = true;
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        if self.file_enabled && self.filename.is_empty() {
            return Err(LoggingError::EmptyFilename);
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: сторонние крейты только с `warn`.
    pub fn build_filter_directive(&self) -> String {
        format!("warn,zumq={0},zumq_error={0}", self.level)
    }

    /// Повышает уровень на `steps` ступеней (флаг `-v`).
    pub fn raise_verbosity(
        &mut self,
        steps: u8,
    ) {
        let current = LEVELS
            .iter()
            .position(|l| *l == self.level)
            .unwrap_or(2);
        let raised = current.saturating_sub(steps as usize);
        self.level = LEVELS[raised].to_string();
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingError::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        };
        f.write_str(s)
    }
}
