use std::{fmt, sync::Arc};

use crate::Message;

/// Ключ доставки: монотонный идентификатор плюс адрес исходной очереди.
///
/// Используется и как ключ рабочего набора трекера, и как токен корреляции,
/// который протокольный уровень возвращает вместе с исходом.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryTag {
    pub id: u64,
    pub address: Arc<str>,
}

/// Сообщение, переданное протокольному уровню и ещё не подтверждённое.
#[derive(Debug, Clone)]
pub struct InFlightDelivery {
    pub tag: DeliveryTag,
    pub message: Message,
}

impl DeliveryTag {
    pub fn new(
        id: u64,
        address: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

impl InFlightDelivery {
    pub fn new(
        tag: DeliveryTag,
        message: Message,
    ) -> Self {
        Self { tag, message }
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// Тест проверяет, что одинаковый id на разных адресах — разные ключи.
    #[test]
    fn test_tag_equality_includes_address() {
        let a = DeliveryTag::new(1, "orders");
        let b = DeliveryTag::new(1, "jobs");
        let c = DeliveryTag::new(1, "orders");
        assert_ne!(a, b);
        assert_eq!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(DeliveryTag::new(42, "jobs").to_string(), "jobs#42");
    }
}
