use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use zumq_error::QueueError;

use super::Message;

/// Ограниченная FIFO-очередь сообщений одного адреса.
///
/// - ёмкость фиксируется при создании и не меняется;
/// - [`Queue::try_enqueue`] никогда не блокирует: либо вставляет в хвост,
///   либо возвращает переполнение вместе с сообщением;
/// - [`Queue::dequeue`] ждёт, пока появится сообщение или очередь закроется.
///
/// Future из `dequeue` можно использовать внутри `tokio::select!`: извлечение
/// происходит синхронно под мьютексом уже после пробуждения, поэтому
/// проигравшая ветка `select!` не теряет сообщение.
#[derive(Debug)]
pub struct Queue {
    address: Arc<str>,
    capacity: usize,
    state: Mutex<QueueState>,
    available: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Message>,
    closed: bool,
}

/// Сообщение не поместилось в очередь.
///
/// Сообщение возвращается вызывающему: решение (выбросить, повторить,
/// отклонить у отправителя) остаётся за ним.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct EnqueueError {
    #[source]
    pub error: QueueError,
    pub message: Message,
}

enum Take {
    Item(Message),
    Empty,
    Closed,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Queue {
    /// Создаёт пустую очередь для `address` с ёмкостью `capacity`.
    ///
    /// Нулевая ёмкость поднимается до 1, иначе очередь не приняла бы ни одного
    /// сообщения.
    pub fn new(
        address: impl Into<Arc<str>>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            address: address.into(),
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    /// Адрес, за которым закреплена очередь.
    pub fn address(&self) -> &Arc<str> {
        &self.address
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Текущее количество сообщений.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().items.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Неблокирующая вставка в хвост.
    ///
    /// # Возвращает
    /// - `Ok(())`, если сообщение вставлено
    /// - `Err(EnqueueError)` с `QueueError::Overflow`, если очередь заполнена
    /// - `Err(EnqueueError)` с `QueueError::Closed`, если очередь закрыта
    ///
    /// При ошибке содержимое очереди не меняется.
    pub fn try_enqueue(
        &self,
        message: Message,
    ) -> Result<(), EnqueueError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(EnqueueError {
                    error: QueueError::Closed {
                        address: self.address.to_string(),
                    },
                    message,
                });
            }
            if state.items.len() >= self.capacity {
                return Err(EnqueueError {
                    error: QueueError::Overflow {
                        address: self.address.to_string(),
                        capacity: self.capacity,
                    },
                    message,
                });
            }
            state.items.push_back(message);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Неблокирующее извлечение из головы.
    pub fn try_dequeue(&self) -> Option<Message> {
        match self.take() {
            Take::Item(message) => Some(message),
            Take::Empty | Take::Closed => None,
        }
    }

    /// Извлекает сообщение из головы, ожидая его появления.
    ///
    /// Возвращает `None` только когда очередь закрыта и пуста.
    /// Cancel-safe: отмена future до его завершения не извлекает сообщение.
    pub async fn dequeue(&self) -> Option<Message> {
        loop {
            // Регистрируемся до проверки, иначе вставка между проверкой и
            // ожиданием потеряет пробуждение.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.take() {
                Take::Item(message) => return Some(message),
                Take::Closed => return None,
                Take::Empty => {}
            }

            notified.await;
        }
    }

    /// Закрывает очередь: новые вставки отклоняются, ожидающие потребители
    /// просыпаются и дочитывают оставшиеся сообщения.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_waiters();
    }

    fn take(&self) -> Take {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(message) => {
                let more = !state.items.is_empty();
                drop(state);
                if more {
                    // передаём эстафету следующему потребителю
                    self.available.notify_one();
                }
                Take::Item(message)
            }
            None if state.closed => Take::Closed,
            None => Take::Empty,
        }
    }
}

impl EnqueueError {
    /// Забирает отклонённое сообщение.
    pub fn into_message(self) -> Message {
        self.message
    }
}
