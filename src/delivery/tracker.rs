use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use super::{DeliveryOutcome, DeliveryTag, InFlightDelivery, Outcome};
use crate::{Exchange, Message};

/// Трекер подтверждений.
///
/// Единственная задача, владеющая рабочим набором `DeliveryTag → Message`.
/// Общается с остальными только через два канала: записи об отправке и
/// исходы доставки. Блокировки на рабочем наборе нет: его трогает только
/// `run`.
pub struct AckTracker {
    exchange: Arc<Exchange>,
    sent_rx: mpsc::UnboundedReceiver<InFlightDelivery>,
    outcome_rx: mpsc::UnboundedReceiver<DeliveryOutcome>,
    in_flight: HashMap<DeliveryTag, Message>,
    stats: Arc<TrackerStats>,
}

/// Клонируемая ручка трекера для обработчиков линков.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    sent_tx: mpsc::UnboundedSender<InFlightDelivery>,
    outcomes: OutcomeSender,
    next_id: Arc<AtomicU64>,
    stats: Arc<TrackerStats>,
}

/// Получатель исходов, который протокольный уровень вызывает по приходу
/// подтверждения.
#[derive(Debug, Clone)]
pub struct OutcomeSender {
    tx: mpsc::UnboundedSender<DeliveryOutcome>,
}

/// Трекер уже остановлен, запись не принята.
#[derive(Debug, Error)]
#[error("acknowledgement tracker is not running")]
pub struct TrackerClosed(pub InFlightDelivery);

/// Счётчики трекера.
#[derive(Debug, Default)]
pub struct TrackerStats {
    /// Записей об отправке принято
    pub recorded: AtomicU64,
    /// Положительных исходов
    pub accepted: AtomicU64,
    /// Сообщений, вернувшихся в очередь после отрицательного исхода
    pub requeued: AtomicU64,
    /// Сообщений, потерянных из-за переполнения при повторной постановке
    pub dropped: AtomicU64,
    /// Исходов для неизвестных доставок
    pub unknown: AtomicU64,
    /// Текущий размер рабочего набора
    pub in_flight: AtomicUsize,
}

/// Снимок счётчиков.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerSnapshot {
    pub recorded: u64,
    pub accepted: u64,
    pub requeued: u64,
    pub dropped: u64,
    pub unknown: u64,
    pub in_flight: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl AckTracker {
    /// Создаёт трекер и ручку к нему. Трекер нужно запустить через `run`.
    pub fn new(exchange: Arc<Exchange>) -> (Self, TrackerHandle) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(TrackerStats::default());

        let tracker = Self {
            exchange,
            sent_rx,
            outcome_rx,
            in_flight: HashMap::new(),
            stats: stats.clone(),
        };
        let handle = TrackerHandle {
            sent_tx,
            outcomes: OutcomeSender { tx: outcome_tx },
            next_id: Arc::new(AtomicU64::new(0)),
            stats,
        };
        (tracker, handle)
    }

    /// Создаёт трекер и запускает его в отдельной задаче.
    pub fn spawn(exchange: Arc<Exchange>) -> (TrackerHandle, JoinHandle<()>) {
        let (tracker, handle) = Self::new(exchange);
        let task = tokio::spawn(tracker.run());
        (handle, task)
    }

    /// Цикл сверки.
    ///
    /// Когда все `TrackerHandle` уничтожены, новых записей больше не будет,
    /// но исходы для уже переданных доставок ещё могут прийти. Трекер
    /// завершается, только когда рабочий набор пуст или не осталось ни
    /// одного `OutcomeSender`.
    pub async fn run(mut self) {
        debug!("Acknowledgement tracker started");

        loop {
            tokio::select! {
                // Записи опрашиваются первыми: запись о доставке отправляется
                // до передачи сообщения, значит к моменту прихода исхода она
                // уже лежит в канале.
                biased;

                record = self.sent_rx.recv() => match record {
                    Some(record) => self.record(record),
                    None => break,
                },

                Some(outcome) = self.outcome_rx.recv() => self.reconcile(outcome),
            }
        }

        if !self.in_flight.is_empty() {
            debug!(
                in_flight = self.in_flight.len(),
                "All tracker handles dropped, draining outstanding outcomes"
            );
        }
        while !self.in_flight.is_empty() {
            match self.outcome_rx.recv().await {
                Some(outcome) => self.reconcile(outcome),
                None => break,
            }
        }

        if self.in_flight.is_empty() {
            info!("Acknowledgement tracker stopped");
        } else {
            warn!(
                in_flight = self.in_flight.len(),
                "Acknowledgement tracker stopped with unsettled deliveries, messages lost"
            );
        }
    }

    fn record(
        &mut self,
        delivery: InFlightDelivery,
    ) {
        trace!(
            address = %delivery.tag.address,
            delivery_id = delivery.tag.id,
            "Delivery in flight"
        );
        self.in_flight.insert(delivery.tag, delivery.message);
        self.stats.recorded.fetch_add(1, Ordering::Relaxed);
        self.stats
            .in_flight
            .store(self.in_flight.len(), Ordering::Relaxed);
    }

    fn reconcile(
        &mut self,
        outcome: DeliveryOutcome,
    ) {
        let DeliveryOutcome { tag, outcome } = outcome;

        let Some(message) = self.in_flight.remove(&tag) else {
            self.stats.unknown.fetch_add(1, Ordering::Relaxed);
            warn!(
                address = %tag.address,
                delivery_id = tag.id,
                %outcome,
                "Outcome for unknown delivery ignored"
            );
            return;
        };
        self.stats
            .in_flight
            .store(self.in_flight.len(), Ordering::Relaxed);

        if outcome.is_positive() {
            self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            trace!(address = %tag.address, delivery_id = tag.id, "Delivery accepted");
            return;
        }

        self.requeue(tag, outcome, message);
    }

    fn requeue(
        &self,
        tag: DeliveryTag,
        outcome: Outcome,
        message: Message,
    ) {
        let Some(queue) = self.exchange.load(&tag.address) else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                address = %tag.address,
                delivery_id = tag.id,
                %outcome,
                "Queue vanished, message dropped"
            );
            return;
        };

        match queue.try_enqueue(message) {
            Ok(()) => {
                self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                debug!(
                    address = %tag.address,
                    delivery_id = tag.id,
                    %outcome,
                    "Delivery not accepted, message requeued"
                );
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    address = %tag.address,
                    delivery_id = tag.id,
                    %outcome,
                    error = %e,
                    payload_len = e.message.len(),
                    "Requeue failed, message dropped"
                );
            }
        }
    }
}

impl TrackerHandle {
    /// Выдаёт новый ключ доставки для адреса.
    pub fn next_tag(
        &self,
        address: Arc<str>,
    ) -> DeliveryTag {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        DeliveryTag { id, address }
    }

    /// Регистрирует доставку в рабочем наборе.
    ///
    /// Должен вызываться до передачи сообщения протокольному уровню.
    pub fn record(
        &self,
        delivery: InFlightDelivery,
    ) -> Result<(), TrackerClosed> {
        self.sent_tx.send(delivery).map_err(|e| TrackerClosed(e.0))
    }

    /// Получатель исходов для передачи протокольному уровню.
    pub fn outcomes(&self) -> OutcomeSender {
        self.outcomes.clone()
    }

    pub fn stats(&self) -> &Arc<TrackerStats> {
        &self.stats
    }
}

impl OutcomeSender {
    /// Сообщает трекеру исход доставки. `false`, если трекер остановлен.
    pub fn send(
        &self,
        tag: DeliveryTag,
        outcome: Outcome,
    ) -> bool {
        self.tx.send(DeliveryOutcome { tag, outcome }).is_ok()
    }
}

impl TrackerStats {
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            recorded: self.recorded.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
