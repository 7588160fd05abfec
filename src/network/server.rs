use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, Instrument};

use super::{connection::serve_connection, wire::WireConnection};
use crate::{
    config::Settings, delivery::TrackerSnapshot, link::LinkContext, AckTracker, Exchange, Queue,
    TrackerHandle,
};

/// Брокер: реестр очередей, трекер подтверждений и TCP-приём соединений.
pub struct Broker {
    settings: Settings,
    exchange: Arc<Exchange>,
    tracker: TrackerHandle,
    next_connection_id: AtomicU64,
    accept_errors: AtomicU64,
}

impl Broker {
    /// Регистрирует очереди из настроек и запускает трекер.
    ///
    /// Должен вызываться внутри tokio runtime.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate().context("invalid broker settings")?;

        let exchange = Arc::new(Exchange::new());
        for spec in &settings.queues {
            let capacity = settings.capacity_of(spec);
            exchange.store(
                &spec.address,
                Arc::new(Queue::new(spec.address.as_str(), capacity)),
            );
            info!(address = %spec.address, capacity, "Queue registered");
        }

        let (tracker, _task) = AckTracker::spawn(exchange.clone());

        Ok(Self {
            settings,
            exchange,
            tracker,
            next_connection_id: AtomicU64::new(1),
            accept_errors: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }

    /// Снимок счётчиков трекера подтверждений.
    pub fn tracker_stats(&self) -> TrackerSnapshot {
        self.tracker.stats().snapshot()
    }

    /// Контекст для обработчиков линков нового соединения.
    pub fn link_context(&self) -> LinkContext {
        LinkContext {
            exchange: self.exchange.clone(),
            tracker: self.tracker.clone(),
            provisioning: self.settings.provisioning,
            queue_capacity: self.settings.queue_capacity,
            overflow_policy: self.settings.overflow_policy,
            credit: self.settings.credit,
        }
    }

    /// Сколько раз `accept` завершился ошибкой.
    pub fn accept_errors(&self) -> u64 {
        self.accept_errors.load(Ordering::Relaxed)
    }

    /// Ошибка `accept` считается временной: она логируется, и цикл сразу
    /// продолжает приём.
    fn on_accept_error(
        &self,
        e: &std::io::Error,
    ) {
        let total = self.accept_errors.fetch_add(1, Ordering::Relaxed) + 1;
        error!(error = %e, total, "Failed to accept connection");
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.settings.bind_address();
        TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind {address}"))
    }

    /// Принимает соединения бесконечно.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<()> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Принимает соединения, пока не завершится `shutdown`.
    ///
    /// Ошибка `accept` логируется и не останавливает приём. Уже открытые
    /// соединения после `shutdown` продолжают работать в своих задачах.
    pub async fn serve_until(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let local = listener
            .local_addr()
            .context("listener has no local address")?;
        info!(address = %local, credit = self.settings.credit, "Broker accepting connections");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                            debug!(connection_id, peer = %peer, "TCP connection accepted");
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(connection_id, error = %e, "Failed to set TCP_NODELAY");
                            }
                            let connection = WireConnection::new(stream, connection_id);
                            let span = match connection.peer_addr() {
                                Some(addr) => info_span!("connection", peer = %addr),
                                None => info_span!("connection", peer = "unknown"),
                            };
                            tokio::spawn(serve_connection(connection, self.link_context()).instrument(span));
                        }
                        Err(e) => self.on_accept_error(&e),
                    }
                }
            }
        }
    }
}
