use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LoggingConfig;

/// Адрес по умолчанию: все интерфейсы, порт 35254.
pub const DEFAULT_LISTEN_ADDRESS: &str = ":35254";
/// Окно кредита входящего линка по умолчанию.
pub const DEFAULT_CREDIT: u32 = 100;
/// Ёмкость лениво создаваемой очереди по умолчанию.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Как появляются очереди адресов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provisioning {
    /// Очередь создаётся при первом линке на адрес.
    #[default]
    Lazy,
    /// Существуют только очереди из `queues`; линк на неизвестный адрес
    /// отсоединяется.
    Explicit,
}

/// Что делать с входящей доставкой, когда очередь заполнена.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Подтвердить отправителю и выбросить сообщение.
    #[default]
    Accept,
    /// Отклонить доставку у отправителя.
    Reject,
}

impl Provisioning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provisioning::Lazy => "lazy",
            Provisioning::Explicit => "explicit",
        }
    }
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Accept => "accept",
            OverflowPolicy::Reject => "reject",
        }
    }
}

/// Очередь, регистрируемая при старте.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub address: String,
    /// Ёмкость; по умолчанию `queue_capacity`.
    #[serde(default)]
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_address: String,
    pub credit: u32,
    pub queue_capacity: usize,
    pub provisioning: Provisioning,
    pub overflow_policy: OverflowPolicy,
    pub queues: Vec<QueueSpec>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid setting '{field}': {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и окружения.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(None)
    }

    /// Загружает настройки, дополнительно читая файл `path` (формат по
    /// расширению).
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("listen_address", DEFAULT_LISTEN_ADDRESS)?
            .set_default("credit", i64::from(DEFAULT_CREDIT))?
            .set_default("queue_capacity", DEFAULT_QUEUE_CAPACITY as i64)?
            .set_default("provisioning", "lazy")?
            .set_default("overflow_policy", "accept")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // ZUMQ_CREDIT=10, ZUMQ_LOGGING__LEVEL=debug
        let cfg = builder
            .add_source(
                Environment::with_prefix("ZUMQ")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Проверяет согласованность настроек.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.credit == 0 {
            return Err(SettingsError::Invalid {
                field: "credit",
                reason: "must be greater than zero".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(SettingsError::Invalid {
                field: "queue_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        for spec in &self.queues {
            if spec.address.is_empty() {
                return Err(SettingsError::Invalid {
                    field: "queues",
                    reason: "queue address must not be empty".into(),
                });
            }
            if spec.capacity == Some(0) {
                return Err(SettingsError::Invalid {
                    field: "queues",
                    reason: format!("queue '{}' has zero capacity", spec.address),
                });
            }
        }
        if self.listen_address.rsplit_once(':').is_none() {
            return Err(SettingsError::Invalid {
                field: "listen_address",
                reason: format!("'{}' has no port", self.listen_address),
            });
        }
        Ok(())
    }

    /// Адрес для `TcpListener::bind`: `":35254"` → `"0.0.0.0:35254"`.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }

    /// Ёмкость очереди из спецификации с учётом значения по умолчанию.
    pub fn capacity_of(
        &self,
        spec: &QueueSpec,
    ) -> usize {
        spec.capacity.unwrap_or(self.queue_capacity)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            credit: DEFAULT_CREDIT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            provisioning: Provisioning::default(),
            overflow_policy: OverflowPolicy::default(),
            queues: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}
