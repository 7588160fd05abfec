use tracing::{debug, info, warn};

use super::LinkContext;
use crate::{config::OverflowPolicy, protocol::ReceiverLink, Outcome};

/// Итог работы входящего линка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    /// Принято доставок от отправителя
    pub received: u64,
    /// Положено в очередь
    pub enqueued: u64,
    /// Принято у отправителя, но выброшено из-за переполнения
    pub dropped: u64,
    /// Отклонено у отправителя из-за переполнения
    pub rejected: u64,
}

/// Обработчик входящего линка: доставки → очередь `target`.
///
/// Завершается, когда `receive` возвращает ошибку (линк закрыт), или сразу,
/// если очередь для адреса не найдена.
pub async fn run_receiver<L: ReceiverLink>(
    mut link: L,
    ctx: LinkContext,
) -> ReceiverReport {
    let mut report = ReceiverReport::default();
    let address = link.target().to_owned();

    let Some(queue) = ctx.resolve(&address) else {
        info!(address = %address, "No queue for receiver link, detaching");
        return report;
    };

    debug!(address = %address, "Receiver link attached");

    loop {
        let delivery = match link.receive().await {
            Ok(delivery) => delivery,
            Err(e) => {
                debug!(address = %address, reason = %e, "Receiver link closed");
                break;
            }
        };
        report.received += 1;

        let outcome = match queue.try_enqueue(delivery.message) {
            Ok(()) => {
                report.enqueued += 1;
                Outcome::Accepted
            }
            Err(e) => match ctx.overflow_policy {
                OverflowPolicy::Accept => {
                    report.dropped += 1;
                    warn!(
                        address = %address,
                        delivery_id = delivery.id,
                        error = %e.error,
                        "Queue full, inbound message dropped"
                    );
                    Outcome::Accepted
                }
                OverflowPolicy::Reject => {
                    report.rejected += 1;
                    debug!(
                        address = %address,
                        delivery_id = delivery.id,
                        "Queue full, inbound delivery rejected"
                    );
                    Outcome::Rejected
                }
            },
        };

        if let Err(e) = link.settle(delivery.id, outcome).await {
            debug!(address = %address, reason = %e, "Settle failed, receiver link closed");
            break;
        }
    }

    report
}
