//! Обработчики линков.
//!
//! - `receiver`: входящие доставки → очередь адреса (`target`).
//! - `sender`: очередь адреса (`source`) → протокольный уровень, с записью
//!   каждой доставки в трекер до передачи.

pub mod receiver;
pub mod sender;

use std::sync::Arc;

pub use receiver::*;
pub use sender::*;

use crate::{
    config::{OverflowPolicy, Provisioning},
    Exchange, Queue, TrackerHandle,
};

/// Всё, что нужно обработчику линка. Создаётся брокером и клонируется в
/// каждую задачу линка.
#[derive(Debug, Clone)]
pub struct LinkContext {
    pub exchange: Arc<Exchange>,
    pub tracker: TrackerHandle,
    pub provisioning: Provisioning,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub credit: u32,
}

impl LinkContext {
    /// Находит очередь адреса.
    ///
    /// При `Provisioning::Lazy` очередь создаётся при первом обращении,
    /// при `Provisioning::Explicit` возвращаются только заранее
    /// зарегистрированные.
    pub fn resolve(
        &self,
        address: &str,
    ) -> Option<Arc<Queue>> {
        match self.provisioning {
            Provisioning::Lazy => Some(self.exchange.get_or_create(address, self.queue_capacity)),
            Provisioning::Explicit => self.exchange.load(address),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Линки в памяти для тестов обработчиков.

    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::{mpsc, watch};
    use zumq_error::LinkError;

    use crate::{
        protocol::{
            Connection, Delivery, Incoming, IncomingReceiver, IncomingSender, ReceiverLink,
            SenderLink,
        },
        DeliveryTag, Message, Outcome, OutcomeSender,
    };

    /// Исходящий линк, запоминающий переданные сообщения.
    pub struct MockSender {
        pub source: String,
        pub sent: Arc<Mutex<Vec<(DeliveryTag, Message, OutcomeSender)>>>,
        pub closed: watch::Receiver<bool>,
    }

    #[async_trait]
    impl SenderLink for MockSender {
        fn source(&self) -> &str {
            &self.source
        }

        fn send_async(
            &self,
            message: Message,
            outcomes: OutcomeSender,
            tag: DeliveryTag,
        ) {
            self.sent.lock().push((tag, message, outcomes));
        }

        async fn closed(&self) {
            let mut rx = self.closed.clone();
            let _ = rx.wait_for(|closed| *closed).await;
        }

        fn error(&self) -> Option<LinkError> {
            self.closed.borrow().then_some(LinkError::Closed)
        }
    }

    /// Входящий линк, получающий доставки из канала.
    pub struct MockReceiver {
        pub target: String,
        pub deliveries: mpsc::UnboundedReceiver<Delivery>,
        pub settled: Arc<Mutex<Vec<(u64, Outcome)>>>,
    }

    #[async_trait]
    impl ReceiverLink for MockReceiver {
        fn target(&self) -> &str {
            &self.target
        }

        async fn receive(&mut self) -> Result<Delivery, LinkError> {
            self.deliveries.recv().await.ok_or(LinkError::Closed)
        }

        async fn settle(
            &mut self,
            delivery_id: u64,
            outcome: Outcome,
        ) -> Result<(), LinkError> {
            self.settled.lock().push((delivery_id, outcome));
            Ok(())
        }
    }

    pub struct MockIncomingSender(pub MockSender);

    impl IncomingSender for MockIncomingSender {
        type Link = MockSender;

        fn source(&self) -> &str {
            &self.0.source
        }

        fn accept(self) -> MockSender {
            self.0
        }
    }

    /// Запрос на входящий линк; запоминает выданный кредит.
    pub struct MockIncomingReceiver {
        pub link: MockReceiver,
        pub credit: Arc<Mutex<Option<u32>>>,
    }

    impl IncomingReceiver for MockIncomingReceiver {
        type Link = MockReceiver;

        fn target(&self) -> &str {
            &self.link.target
        }

        fn set_credit(
            &mut self,
            credit: u32,
        ) {
            *self.credit.lock() = Some(credit);
        }

        fn accept(self) -> MockReceiver {
            self.link
        }
    }

    pub type MockIncoming = Incoming<MockIncomingSender, MockIncomingReceiver>;

    /// Соединение, запросы которого подаются через канал.
    pub struct MockConnection {
        pub id: u64,
        pub incoming: mpsc::UnboundedReceiver<MockIncoming>,
    }

    #[async_trait]
    impl Connection for MockConnection {
        type Sender = MockIncomingSender;
        type Receiver = MockIncomingReceiver;

        fn id(&self) -> u64 {
            self.id
        }

        async fn next_incoming(&mut self) -> Option<MockIncoming> {
            self.incoming.recv().await
        }
    }
}
