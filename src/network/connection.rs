use tracing::{debug, info, info_span, Instrument};

use crate::{
    link::{run_receiver, run_sender, LinkContext},
    protocol::{Connection, Incoming, IncomingReceiver, IncomingSender},
};

/// Обслуживает одно соединение: принимает каждый запрошенный линк и
/// запускает для него обработчик в отдельной задаче.
///
/// Входящим линкам выдаётся окно кредита `ctx.credit`. Завершается, когда
/// соединение перестаёт выдавать запросы; задачи линков доживают сами.
pub async fn serve_connection<C: Connection>(
    mut connection: C,
    ctx: LinkContext,
) {
    let connection_id = connection.id();
    info!(connection_id, "Connection accepted");

    while let Some(incoming) = connection.next_incoming().await {
        match incoming {
            Incoming::Sender(request) => {
                let span = info_span!("sender", connection_id, address = %request.source());
                let link = request.accept();
                tokio::spawn(run_sender(link, ctx.clone()).instrument(span));
            }
            Incoming::Receiver(mut request) => {
                let span = info_span!("receiver", connection_id, address = %request.target());
                request.set_credit(ctx.credit);
                let link = request.accept();
                tokio::spawn(run_receiver(link, ctx.clone()).instrument(span));
            }
        }
        debug!(connection_id, "Link accepted");
    }

    info!(connection_id, "Connection closed");
}
