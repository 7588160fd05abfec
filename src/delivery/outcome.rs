use std::{fmt, str::FromStr};

use super::DeliveryTag;

/// Результат одной попытки передачи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Удалённая сторона приняла сообщение.
    Accepted,
    /// Удалённая сторона отвергла сообщение.
    Rejected,
    /// Сообщение отпущено без обработки (линк закрыт, потребитель ушёл).
    Released,
}

/// Исход, сопоставленный с доставкой через токен корреляции.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub tag: DeliveryTag,
    pub outcome: Outcome,
}

impl Outcome {
    /// `true` только для `Accepted`; всё остальное приводит к повторной
    /// постановке в очередь.
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "released" => Ok(Self::Released),
            other => Err(other.to_string()),
        }
    }
}
