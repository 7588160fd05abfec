//! Граница между ядром брокера и протокольным уровнем.
//!
//! Ядро (обработчики линков, трекер) работает только через эти трейты,
//! поэтому его можно тестировать без сокетов. Конкретная TCP-реализация
//! лежит в [`crate::network::wire`].

use async_trait::async_trait;
use zumq_error::LinkError;

use crate::{DeliveryTag, Message, Outcome, OutcomeSender};

/// Входящая доставка на линке-приёмнике брокера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Идентификатор доставки, назначенный отправителем.
    pub id: u64,
    pub message: Message,
}

/// Запрос на новый линк внутри соединения.
///
/// `Sender` — удалённая сторона хочет получать сообщения, брокер
/// становится отправителем. `Receiver` — наоборот.
pub enum Incoming<S, R> {
    Sender(S),
    Receiver(R),
}

/// Запрос от потребителя: брокер будет отправлять сообщения из `source`.
pub trait IncomingSender: Send {
    type Link: SenderLink;

    /// Адрес, из очереди которого будут отправляться сообщения.
    fn source(&self) -> &str;

    fn accept(self) -> Self::Link;
}

/// Запрос от производителя: брокер будет принимать сообщения в `target`.
pub trait IncomingReceiver: Send {
    type Link: ReceiverLink;

    /// Адрес, в очередь которого будут складываться сообщения.
    fn target(&self) -> &str;

    /// Окно кредита (prefetch), применяется до `accept`.
    fn set_credit(
        &mut self,
        credit: u32,
    );

    fn accept(self) -> Self::Link;
}

/// Исходящий линк брокера.
#[async_trait]
pub trait SenderLink: Send + Sync + 'static {
    fn source(&self) -> &str;

    /// Асинхронная передача сообщения.
    ///
    /// Реализация обязана рано или поздно сообщить ровно один исход для
    /// `tag` через `outcomes`: `Released`, если сообщение не удалось
    /// передать или линк закрылся до подтверждения.
    fn send_async(
        &self,
        message: Message,
        outcomes: OutcomeSender,
        tag: DeliveryTag,
    );

    /// Завершается, когда линк закрыт или упал.
    async fn closed(&self);

    /// Ошибка линка, если он уже закрыт.
    fn error(&self) -> Option<LinkError>;
}

/// Входящий линк брокера.
#[async_trait]
pub trait ReceiverLink: Send + 'static {
    fn target(&self) -> &str;

    /// Ждёт следующую доставку. Ошибка означает, что линк закрыт.
    async fn receive(&mut self) -> Result<Delivery, LinkError>;

    /// Сообщает отправителю исход входящей доставки.
    async fn settle(
        &mut self,
        delivery_id: u64,
        outcome: Outcome,
    ) -> Result<(), LinkError>;
}

/// Соединение: ленивая последовательность запросов на линки.
#[async_trait]
pub trait Connection: Send + 'static {
    type Sender: IncomingSender + 'static;
    type Receiver: IncomingReceiver + 'static;

    fn id(&self) -> u64;

    /// Следующий запрос на линк; `None`, когда соединение закрыто.
    async fn next_incoming(&mut self) -> Option<Incoming<Self::Sender, Self::Receiver>>;
}
