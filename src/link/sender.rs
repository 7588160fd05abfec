use tracing::{debug, info, trace, warn};

use super::LinkContext;
use crate::{protocol::SenderLink, InFlightDelivery};

/// Итог работы исходящего линка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenderReport {
    /// Сообщений передано протокольному уровню
    pub sent: u64,
}

/// Обработчик исходящего линка: очередь `source` → протокольный уровень.
///
/// Ждёт одновременно сообщение в очереди и закрытие линка. Каждая доставка
/// регистрируется в трекере до передачи, иначе исход мог бы прийти раньше
/// записи. При закрытии линка оставшиеся сообщения не вычитываются и
/// достаются следующему потребителю адреса.
pub async fn run_sender<L: SenderLink>(
    link: L,
    ctx: LinkContext,
) -> SenderReport {
    let mut report = SenderReport::default();

    let Some(queue) = ctx.resolve(link.source()) else {
        info!(address = %link.source(), "No queue for sender link, detaching");
        return report;
    };
    let address = queue.address().clone();

    debug!(address = %address, "Sender link attached");

    loop {
        if let Some(e) = link.error() {
            debug!(address = %address, reason = %e, "Sender link closed");
            break;
        }

        tokio::select! {
            biased;

            _ = link.closed() => {
                debug!(address = %address, "Sender link closed");
                break;
            }

            next = queue.dequeue() => {
                let Some(message) = next else {
                    debug!(address = %address, "Queue closed, sender link exits");
                    break;
                };

                let tag = ctx.tracker.next_tag(address.clone());
                let record = InFlightDelivery::new(tag.clone(), message.clone());
                if let Err(e) = ctx.tracker.record(record) {
                    // трекера нет: вернуть сообщение в очередь и выйти
                    warn!(address = %address, error = %e, "Tracker stopped, sender link exits");
                    if queue.try_enqueue(e.0.message).is_err() {
                        warn!(address = %address, "Requeue failed, message dropped");
                    }
                    break;
                }

                trace!(address = %address, delivery_id = tag.id, "Transmitting");
                link.send_async(message, ctx.tracker.outcomes(), tag);
                report.sent += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use parking_lot::Mutex;
    use tokio::{
        sync::watch,
        time::{sleep, timeout},
    };

    use super::*;
    use crate::{
        config::{OverflowPolicy, Provisioning},
        link::testing::MockSender,
        AckTracker, Exchange, Message, Outcome, Queue,
    };

    fn spawn_context(
        exchange: Arc<Exchange>,
        provisioning: Provisioning,
    ) -> LinkContext {
        let (handle, _task) = AckTracker::spawn(exchange.clone());
        LinkContext {
            exchange,
            tracker: handle,
            provisioning,
            queue_capacity: 1,
            overflow_policy: OverflowPolicy::Accept,
            credit: 10,
        }
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        timeout(Duration::from_secs(1), async {
            while !cond() {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    /// Сценарий: очередь "jobs" ёмкостью 1, отправитель забирает M, трекер
    /// записывает доставку, приходит отрицательный исход — M снова в очереди.
    #[tokio::test]
    async fn test_negative_outcome_returns_message_to_queue() {
        let exchange = Arc::new(Exchange::new());
        let queue = Arc::new(Queue::new("jobs", 1));
        exchange.store("jobs", queue.clone());
        let ctx = spawn_context(exchange, Provisioning::Explicit);
        let stats = ctx.tracker.stats().clone();
        // ручка брокера живёт дольше линка
        let _tracker = ctx.tracker.clone();

        queue.try_enqueue(Message::from("M")).unwrap();

        let sent = Arc::new(Mutex::new(Vec::new()));
        let (close_tx, close_rx) = watch::channel(false);
        let link = MockSender {
            source: "jobs".into(),
            sent: sent.clone(),
            closed: close_rx,
        };
        let task = tokio::spawn(run_sender(link, ctx));

        wait_until(|| sent.lock().len() == 1).await;
        assert!(queue.is_empty());
        wait_until(|| stats.snapshot().in_flight == 1).await;

        let (tag, message, outcomes) = sent.lock().remove(0);
        assert_eq!(message, Message::from("M"));
        assert_eq!(&*tag.address, "jobs");

        // закрываем линк до исхода, чтобы отправитель не забрал M повторно
        close_tx.send(true).unwrap();
        let report = task.await.unwrap();
        assert_eq!(report.sent, 1);

        outcomes.send(tag, Outcome::Rejected);
        wait_until(|| stats.snapshot().requeued == 1).await;
        assert_eq!(queue.try_dequeue(), Some(Message::from("M")));
    }

    /// Тест проверяет, что положительный исход не возвращает сообщение.
    #[tokio::test]
    async fn test_positive_outcome_is_not_requeued() {
        let exchange = Arc::new(Exchange::new());
        let ctx = spawn_context(exchange.clone(), Provisioning::Lazy);
        let stats = ctx.tracker.stats().clone();
        let queue = ctx.resolve("orders").unwrap();
        queue.try_enqueue(Message::from("ok")).unwrap();

        let sent = Arc::new(Mutex::new(Vec::new()));
        let (close_tx, close_rx) = watch::channel(false);
        let link = MockSender {
            source: "orders".into(),
            sent: sent.clone(),
            closed: close_rx,
        };
        let task = tokio::spawn(run_sender(link, ctx));

        wait_until(|| sent.lock().len() == 1).await;
        let (tag, _, outcomes) = sent.lock().remove(0);
        outcomes.send(tag, Outcome::Accepted);
        wait_until(|| stats.snapshot().accepted == 1).await;

        assert_eq!(stats.snapshot().in_flight, 0);
        assert!(queue.is_empty());
        close_tx.send(true).unwrap();
        task.await.unwrap();
    }

    /// Тест проверяет, что закрытый линк не вычитывает очередь.
    #[tokio::test]
    async fn test_closed_link_does_not_drain_queue() {
        let exchange = Arc::new(Exchange::new());
        let ctx = spawn_context(exchange, Provisioning::Lazy);
        let queue = ctx.resolve("idle").unwrap();
        queue.try_enqueue(Message::from("stay")).unwrap();

        let (_close_tx, close_rx) = watch::channel(true);
        let link = MockSender {
            source: "idle".into(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: close_rx,
        };
        let report = run_sender(link, ctx).await;
        assert_eq!(report.sent, 0);
        assert_eq!(queue.len(), 1);
    }

    /// Тест проверяет выход при отсутствии очереди (явная регистрация).
    #[tokio::test]
    async fn test_lookup_miss_exits() {
        let exchange = Arc::new(Exchange::new());
        let ctx = spawn_context(exchange, Provisioning::Explicit);
        let (_close_tx, close_rx) = watch::channel(false);
        let link = MockSender {
            source: "missing".into(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: close_rx,
        };
        let report = timeout(Duration::from_millis(200), run_sender(link, ctx))
            .await
            .expect("sender should exit immediately");
        assert_eq!(report.sent, 0);
    }
}
