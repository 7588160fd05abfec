use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use super::Queue;

type AddressKey = Arc<str>;

/// Реестр очередей брокера: `адрес → очередь`.
///
/// Создаётся брокером и передаётся каждому обработчику линка явно.
/// На один адрес в любой момент приходится не более одной очереди;
/// читатели никогда не видят частично построенную очередь.
#[derive(Debug, Default)]
pub struct Exchange {
    queues: DashMap<AddressKey, Arc<Queue>>,
}

impl Exchange {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Поиск очереди по адресу. Отсутствие сигнализируется `None`.
    pub fn load(
        &self,
        address: &str,
    ) -> Option<Arc<Queue>> {
        self.queues.get(address).map(|entry| entry.value().clone())
    }

    /// Безусловная вставка (или замена) очереди для адреса.
    pub fn store(
        &self,
        address: &str,
        queue: Arc<Queue>,
    ) {
        self.queues.insert(Arc::from(address), queue);
    }

    /// Атомарный get-or-create.
    ///
    /// # Возвращает
    /// - `(queue, false)` — очереди не было, установлена переданная
    /// - `(existing, true)` — очередь уже была, переданная отброшена
    pub fn load_or_store(
        &self,
        address: &str,
        queue: Arc<Queue>,
    ) -> (Arc<Queue>, bool) {
        if let Some(existing) = self.load(address) {
            return (existing, true);
        }

        match self.queues.entry(Arc::from(address)) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => {
                entry.insert(queue.clone());
                (queue, false)
            }
        }
    }

    /// Возвращает очередь адреса, создавая её с `capacity` при первом
    /// обращении.
    pub fn get_or_create(
        &self,
        address: &str,
        capacity: usize,
    ) -> Arc<Queue> {
        if let Some(existing) = self.load(address) {
            return existing;
        }

        self.queues
            .entry(Arc::from(address))
            .or_insert_with(|| Arc::new(Queue::new(address, capacity)))
            .clone()
    }

    /// Количество зарегистрированных адресов.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Список зарегистрированных адресов.
    pub fn addresses(&self) -> Vec<Arc<str>> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }
}
