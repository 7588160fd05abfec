use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, watch},
};
use tracing::{debug, trace, warn};
use zumq_error::{ErrorExt, LinkError, ProtocolError};

use super::frame::{Frame, LinkRole};
use crate::{
    protocol::{
        Connection, Delivery, Incoming, IncomingReceiver, IncomingSender, ReceiverLink, SenderLink,
    },
    DeliveryTag, Message, Outcome, OutcomeSender,
};

/// Максимальная длина строки кадра, включая окончание строки.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

const BROKER_DETACH_REASON: &str = "link closed by broker";
const CREDIT_DETACH_REASON: &str = "credit window exceeded";

type WireIncoming = Incoming<WireIncomingSender, WireIncomingReceiver>;

/// TCP-соединение брокера, реализующее [`Connection`].
///
/// Чтение и запись идут в отдельных задачах. Входящие кадры раскладываются
/// по линкам через общую таблицу handle → слот, исходящие собираются в
/// один канал писателя.
pub struct WireConnection {
    id: u64,
    peer: Option<SocketAddr>,
    incoming: mpsc::UnboundedReceiver<WireIncoming>,
}

/// Запрос клиента-получателя; после `accept` брокер отправляет в линк.
pub struct WireIncomingSender {
    handle: u32,
    link_id: u64,
    source: String,
    shared: Arc<Shared>,
}

/// Запрос клиента-отправителя; после `accept` брокер принимает из линка.
pub struct WireIncomingReceiver {
    handle: u32,
    link_id: u64,
    target: String,
    credit: u32,
    shared: Arc<Shared>,
}

/// Исходящий линк брокера поверх TCP.
pub struct WireSenderLink {
    handle: u32,
    link_id: u64,
    source: String,
    state: Arc<OutboundState>,
    shared: Arc<Shared>,
}

/// Входящий линк брокера поверх TCP.
pub struct WireReceiverLink {
    handle: u32,
    link_id: u64,
    target: String,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    shared: Arc<Shared>,
}

/// Состояние соединения, общее для читателя и линков.
struct Shared {
    connection_id: u64,
    frames: mpsc::UnboundedSender<Frame>,
    links: Mutex<HashMap<u32, Slot>>,
    next_link_id: AtomicU64,
}

struct Slot {
    link_id: u64,
    kind: SlotKind,
}

enum SlotKind {
    /// Запрос передан наружу, но ещё не принят.
    Pending,
    Inbound(InboundSlot),
    Outbound(Arc<OutboundState>),
}

/// Входящий линк в таблице: канал доставок и остаток кредита клиента.
struct InboundSlot {
    deliveries: mpsc::UnboundedSender<Delivery>,
    credit: u32,
}

/// Результат учёта одного `TRANSFER`.
enum Admission {
    Accepted(mpsc::UnboundedSender<Delivery>),
    CreditExceeded,
}

/// Неподтверждённые доставки исходящего линка.
///
/// Закрытие и передача сериализованы одним мьютексом, поэтому каждая
/// доставка получает ровно один исход: от клиента либо `Released` при
/// закрытии.
struct OutboundState {
    closed: watch::Sender<bool>,
    inner: Mutex<OutboundInner>,
    next_delivery_id: AtomicU64,
}

#[derive(Default)]
struct OutboundInner {
    error: Option<LinkError>,
    unsettled: BTreeMap<u64, (DeliveryTag, OutcomeSender)>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl WireConnection {
    /// Запускает задачи чтения и записи для `stream`.
    pub fn new(
        stream: TcpStream,
        id: u64,
    ) -> Self {
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            connection_id: id,
            frames: frames_tx,
            links: Mutex::new(HashMap::new()),
            next_link_id: AtomicU64::new(1),
        });

        tokio::spawn(write_loop(write_half, frames_rx, Arc::downgrade(&shared), id));
        tokio::spawn(read_loop(read_half, shared, incoming_tx));

        Self {
            id,
            peer,
            incoming: incoming_rx,
        }
    }

    /// Адрес клиента, если сокет успел его сообщить.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Shared {
    fn send(
        &self,
        frame: Frame,
    ) -> bool {
        self.frames.send(frame).is_ok()
    }

    fn attach_pending(
        &self,
        handle: u32,
    ) -> Result<u64, ProtocolError> {
        let mut links = self.links.lock();
        if links.contains_key(&handle) {
            return Err(ProtocolError::DuplicateHandle(handle));
        }
        let link_id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
        links.insert(
            handle,
            Slot {
                link_id,
                kind: SlotKind::Pending,
            },
        );
        Ok(link_id)
    }

    /// Переводит ожидающий слот в рабочее состояние. `false`, если слот
    /// уже исчез (клиент отсоединился или соединение закрыто).
    fn activate(
        &self,
        handle: u32,
        link_id: u64,
        kind: SlotKind,
    ) -> bool {
        let mut links = self.links.lock();
        match links.get_mut(&handle) {
            Some(slot) if slot.link_id == link_id => {
                slot.kind = kind;
                true
            }
            _ => false,
        }
    }

    /// Удаляет слот, если он всё ещё принадлежит линку `link_id`.
    fn remove(
        &self,
        handle: u32,
        link_id: u64,
    ) -> Option<SlotKind> {
        let mut links = self.links.lock();
        match links.get(&handle) {
            Some(slot) if slot.link_id == link_id => links.remove(&handle).map(|s| s.kind),
            _ => None,
        }
    }

    /// Списывает единицу кредита входящего линка под `TRANSFER`.
    ///
    /// При исчерпанном кредите слот удаляется: линк отсоединяется.
    fn admit(
        &self,
        handle: u32,
    ) -> Result<Admission, ProtocolError> {
        let mut links = self.links.lock();
        let slot = match links.get_mut(&handle) {
            Some(Slot {
                kind: SlotKind::Inbound(slot),
                ..
            }) => slot,
            _ => return Err(ProtocolError::UnknownHandle(handle)),
        };

        if slot.credit == 0 {
            links.remove(&handle);
            return Ok(Admission::CreditExceeded);
        }
        slot.credit -= 1;
        Ok(Admission::Accepted(slot.deliveries.clone()))
    }

    /// Возвращает кредит входящему линку. `false`, если слот уже не его.
    fn grant(
        &self,
        handle: u32,
        link_id: u64,
        credit: u32,
    ) -> bool {
        match self.links.lock().get_mut(&handle) {
            Some(Slot {
                link_id: id,
                kind: SlotKind::Inbound(slot),
            }) if *id == link_id => {
                slot.credit = slot.credit.saturating_add(credit);
                true
            }
            _ => false,
        }
    }

    fn outbound(
        &self,
        handle: u32,
    ) -> Result<Arc<OutboundState>, ProtocolError> {
        match self.links.lock().get(&handle) {
            Some(Slot {
                kind: SlotKind::Outbound(state),
                ..
            }) => Ok(state.clone()),
            _ => Err(ProtocolError::UnknownHandle(handle)),
        }
    }

    /// Закрывает все линки соединения. Неподтверждённые исходящие доставки
    /// отпускаются.
    fn close_all(&self) {
        let slots: Vec<Slot> = self.links.lock().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.kind.close(LinkError::Closed);
        }
    }

    /// Обрабатывает один кадр от клиента.
    fn dispatch(
        self: &Arc<Self>,
        frame: Frame,
        incoming: &mpsc::UnboundedSender<WireIncoming>,
    ) -> Result<(), ProtocolError> {
        let connection_id = self.connection_id;

        match frame {
            Frame::Attach {
                handle,
                role,
                address,
            } => {
                let link_id = self.attach_pending(handle)?;
                debug!(connection_id, handle, address = %address, role = %role, "Attach requested");
                let request = match role {
                    LinkRole::Sender => Incoming::Receiver(WireIncomingReceiver {
                        handle,
                        link_id,
                        target: address,
                        credit: 0,
                        shared: self.clone(),
                    }),
                    LinkRole::Receiver => Incoming::Sender(WireIncomingSender {
                        handle,
                        link_id,
                        source: address,
                        shared: self.clone(),
                    }),
                };
                if incoming.send(request).is_err() {
                    self.remove(handle, link_id);
                }
            }
            Frame::Transfer {
                handle,
                delivery_id,
                payload,
            } => match self.admit(handle)? {
                Admission::Accepted(tx) => {
                    trace!(connection_id, handle, delivery_id, "Inbound transfer");
                    let _ = tx.send(Delivery {
                        id: delivery_id,
                        message: Message::new(payload),
                    });
                }
                Admission::CreditExceeded => {
                    warn!(
                        connection_id,
                        handle, delivery_id, "Transfer without credit, detaching link"
                    );
                    self.send(Frame::Detach {
                        handle,
                        reason: Some(CREDIT_DETACH_REASON.to_string()),
                    });
                }
            },
            Frame::Disposition {
                handle,
                delivery_id,
                outcome,
            } => {
                let state = self.outbound(handle)?;
                if !state.settle(delivery_id, outcome) {
                    debug!(connection_id, handle, delivery_id, "Disposition for unknown delivery ignored");
                }
            }
            Frame::Detach { handle, reason } => {
                let slot = self
                    .links
                    .lock()
                    .remove(&handle)
                    .ok_or(ProtocolError::UnknownHandle(handle))?;
                let reason = reason.unwrap_or_else(|| "detached by peer".to_string());
                debug!(connection_id, handle, reason = %reason, "Link detached by client");
                slot.kind.close(LinkError::Detached { reason });
            }
            Frame::Flow { handle, .. } | Frame::Attached { handle } => {
                trace!(connection_id, handle, "Ignoring broker-only frame from client");
            }
            Frame::Error { text } => {
                warn!(connection_id, text = %text, "Client reported an error");
            }
        }

        Ok(())
    }
}

impl SlotKind {
    fn close(
        self,
        error: LinkError,
    ) {
        match self {
            // отбрасывание отправителя завершает receive() линка
            SlotKind::Pending | SlotKind::Inbound(_) => {}
            SlotKind::Outbound(state) => {
                state.close(error);
            }
        }
    }
}

impl OutboundState {
    fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed,
            inner: Mutex::new(OutboundInner::default()),
            next_delivery_id: AtomicU64::new(0),
        }
    }

    /// Закрывает линк и отпускает все неподтверждённые доставки. `false`,
    /// если линк уже был закрыт.
    fn close(
        &self,
        error: LinkError,
    ) -> bool {
        let unsettled = {
            let mut inner = self.inner.lock();
            if inner.error.is_some() {
                return false;
            }
            inner.error = Some(error);
            std::mem::take(&mut inner.unsettled)
        };

        self.closed.send_replace(true);
        for (delivery_id, (tag, outcomes)) in unsettled {
            report_outcome(&outcomes, tag, Outcome::Released, delivery_id);
        }
        true
    }

    fn settle(
        &self,
        delivery_id: u64,
        outcome: Outcome,
    ) -> bool {
        let entry = self.inner.lock().unsettled.remove(&delivery_id);
        match entry {
            Some((tag, outcomes)) => {
                report_outcome(&outcomes, tag, outcome, delivery_id);
                true
            }
            None => false,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализации протокольных трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Connection for WireConnection {
    type Sender = WireIncomingSender;
    type Receiver = WireIncomingReceiver;

    fn id(&self) -> u64 {
        self.id
    }

    async fn next_incoming(&mut self) -> Option<WireIncoming> {
        self.incoming.recv().await
    }
}

impl IncomingSender for WireIncomingSender {
    type Link = WireSenderLink;

    fn source(&self) -> &str {
        &self.source
    }

    fn accept(self) -> WireSenderLink {
        let state = Arc::new(OutboundState::new());
        let active = self.shared.activate(
            self.handle,
            self.link_id,
            SlotKind::Outbound(state.clone()),
        );
        if active {
            self.shared.send(Frame::Attached {
                handle: self.handle,
            });
        } else {
            state.close(LinkError::Closed);
        }

        WireSenderLink {
            handle: self.handle,
            link_id: self.link_id,
            source: self.source,
            state,
            shared: self.shared,
        }
    }
}

impl IncomingReceiver for WireIncomingReceiver {
    type Link = WireReceiverLink;

    fn target(&self) -> &str {
        &self.target
    }

    fn set_credit(
        &mut self,
        credit: u32,
    ) {
        self.credit = credit;
    }

    fn accept(self) -> WireReceiverLink {
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = InboundSlot {
            deliveries: tx,
            credit: self.credit,
        };
        if self
            .shared
            .activate(self.handle, self.link_id, SlotKind::Inbound(slot))
        {
            self.shared.send(Frame::Attached {
                handle: self.handle,
            });
            self.shared.send(Frame::Flow {
                handle: self.handle,
                credit: self.credit,
            });
        }

        WireReceiverLink {
            handle: self.handle,
            link_id: self.link_id,
            target: self.target,
            deliveries: rx,
            shared: self.shared,
        }
    }
}

#[async_trait]
impl SenderLink for WireSenderLink {
    fn source(&self) -> &str {
        &self.source
    }

    fn send_async(
        &self,
        message: Message,
        outcomes: OutcomeSender,
        tag: DeliveryTag,
    ) {
        let delivery_id = self.state.next_delivery_id.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.state.inner.lock();
        let sent = inner.error.is_none()
            && self.shared.send(Frame::Transfer {
                handle: self.handle,
                delivery_id,
                payload: message.payload,
            });
        if !sent {
            drop(inner);
            trace!(handle = self.handle, delivery_id, "Link closed, releasing delivery");
            report_outcome(&outcomes, tag, Outcome::Released, delivery_id);
            return;
        }
        // под тем же локом: DISPOSITION не обгонит запись
        inner.unsettled.insert(delivery_id, (tag, outcomes));
    }

    async fn closed(&self) {
        let mut rx = self.state.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn error(&self) -> Option<LinkError> {
        self.state.inner.lock().error.clone()
    }
}

#[async_trait]
impl ReceiverLink for WireReceiverLink {
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
        let handle = self.handle;
        // кредит учитывается до того, как клиент узнает о нём из FLOW
        let sent = self.shared.send(Frame::Disposition {
            handle,
            delivery_id,
            outcome,
        }) && self.shared.grant(handle, self.link_id, 1)
            && self.shared.send(Frame::Flow { handle, credit: 1 });

        if sent {
            Ok(())
        } else {
            Err(LinkError::Closed)
        }
    }
}

impl Drop for WireSenderLink {
    fn drop(&mut self) {
        let owned = self.shared.remove(self.handle, self.link_id).is_some();
        let was_open = self.state.close(LinkError::Detached {
            reason: BROKER_DETACH_REASON.to_string(),
        });
        if owned && was_open {
            self.shared.send(Frame::Detach {
                handle: self.handle,
                reason: Some(BROKER_DETACH_REASON.to_string()),
            });
        }
    }
}

impl Drop for WireReceiverLink {
    fn drop(&mut self) {
        if self.shared.remove(self.handle, self.link_id).is_some() {
            self.shared.send(Frame::Detach {
                handle: self.handle,
                reason: Some(BROKER_DETACH_REASON.to_string()),
            });
        }
    }
}

/// Передаёт исход трекеру; если трекер уже остановлен, исход потерян, и
/// это видно в логе.
fn report_outcome(
    outcomes: &OutcomeSender,
    tag: DeliveryTag,
    outcome: Outcome,
    delivery_id: u64,
) {
    let address = tag.address.clone();
    let tracker_id = tag.id;
    if !outcomes.send(tag, outcome) {
        warn!(
            address = %address,
            delivery_id,
            tracker_id,
            %outcome,
            "Tracker stopped, delivery outcome lost"
        );
    }
}

////////////////////////////////////////////////////////////////////////////////
// Задачи чтения и записи
////////////////////////////////////////////////////////////////////////////////

async fn read_loop(
    read_half: OwnedReadHalf,
    shared: Arc<Shared>,
    incoming: mpsc::UnboundedSender<WireIncoming>,
) {
    let connection_id = shared.connection_id;
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_FRAME_LEN as u64)
            .read_until(b'\n', &mut line)
            .await;

        match read {
            Ok(0) => break,
            Ok(_) if !line.ends_with(b"\n") => {
                if line.len() >= MAX_FRAME_LEN {
                    warn!(connection_id, "Frame too long, closing connection");
                    shared.send(Frame::Error {
                        text: format!("frame exceeds {MAX_FRAME_LEN} bytes"),
                    });
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id, error = %e, "Read failed");
                break;
            }
        }

        let result = Frame::parse(&line).and_then(|frame| shared.dispatch(frame, &incoming));
        match result {
            Ok(()) | Err(ProtocolError::EmptyFrame) => {}
            Err(e) => {
                debug!(connection_id, error = %e.log_message(), "Rejected client frame");
                shared.send(Frame::Error {
                    text: e.client_message(),
                });
            }
        }
    }

    debug!(connection_id, "Reader finished, closing links");
    shared.close_all();
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    shared: Weak<Shared>,
    connection_id: u64,
) {
    let mut buf = BytesMut::with_capacity(4096);

    while let Some(frame) = frames.recv().await {
        buf.clear();
        frame.encode(&mut buf);
        while let Ok(frame) = frames.try_recv() {
            frame.encode(&mut buf);
        }

        if let Err(e) = writer.write_all(&buf).await {
            debug!(connection_id, error = %e, "Write failed");
            if let Some(shared) = shared.upgrade() {
                shared.close_all();
            }
            return;
        }
    }

    let _ = writer.shutdown().await;
}
