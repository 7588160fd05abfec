use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};
use zumq_error::{ClientError, LinkError, ProtocolError};

use crate::{
    client::ClientConnection,
    network::wire::{Frame, LinkRole},
    Outcome,
};

/// Handle единственного линка клиентского соединения.
const LINK_HANDLE: u32 = 0;

/// Конфигурация клиента.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// `None` — ждать кадров брокера без ограничения
    pub read_timeout: Option<Duration>,
    pub write_timeout: Duration,
}

/// Производитель: публикует сообщения в адрес и ждёт исход каждой
/// доставки.
pub struct Producer {
    connection: ClientConnection,
    address: String,
    credit: u32,
    next_delivery_id: u64,
}

/// Потребитель: получает сообщения из адреса и подтверждает их.
pub struct Consumer {
    connection: ClientConnection,
    address: String,
}

/// Сообщение, полученное потребителем.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub delivery_id: u64,
    pub payload: Bytes,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Producer {
    pub async fn connect(
        addr: &str,
        address: &str,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let connection = attach(addr, address, LinkRole::Sender, config).await?;
        info!(address, "Producer attached");
        Ok(Self {
            connection,
            address: address.to_string(),
            credit: 0,
            next_delivery_id: 0,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Оставшийся кредит, выданный брокером.
    pub fn credit(&self) -> u32 {
        self.credit
    }

    /// Публикует сообщение и возвращает исход, выбранный брокером.
    ///
    /// Ждёт кредита, если он исчерпан. Нагрузка не может содержать перевод
    /// строки.
    pub async fn send(
        &mut self,
        payload: impl Into<Bytes>,
    ) -> Result<Outcome, ClientError> {
        let payload = payload.into();
        if payload.iter().any(|b| *b == b'\n' || *b == b'\r') {
            return Err(ProtocolError::InvalidValue {
                command: "TRANSFER",
                field: "payload",
                value: "line break".to_string(),
            }
            .into());
        }

        while self.credit == 0 {
            let frame = self.connection.read_frame().await?;
            self.handle_control(frame)?;
        }

        let delivery_id = self.next_delivery_id;
        self.next_delivery_id += 1;
        self.credit -= 1;

        self.connection
            .send_frame(&Frame::Transfer {
                handle: LINK_HANDLE,
                delivery_id,
                payload,
            })
            .await?;

        loop {
            match self.connection.read_frame().await? {
                Frame::Disposition {
                    handle: LINK_HANDLE,
                    delivery_id: settled,
                    outcome,
                } if settled == delivery_id => {
                    debug!(address = %self.address, delivery_id, outcome = %outcome, "Delivery settled");
                    return Ok(outcome);
                }
                frame => self.handle_control(frame)?,
            }
        }
    }

    /// Отсоединяет линк и закрывает соединение.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.connection
            .send_frame(&Frame::Detach {
                handle: LINK_HANDLE,
                reason: None,
            })
            .await?;
        self.connection.close().await
    }

    fn handle_control(
        &mut self,
        frame: Frame,
    ) -> Result<(), ClientError> {
        match frame {
            Frame::Flow {
                handle: LINK_HANDLE,
                credit,
            } => {
                self.credit = self.credit.saturating_add(credit);
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }
}

impl Consumer {
    pub async fn connect(
        addr: &str,
        address: &str,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let connection = attach(addr, address, LinkRole::Receiver, config).await?;
        info!(address, "Consumer attached");
        Ok(Self {
            connection,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Ждёт следующее сообщение.
    pub async fn receive(&mut self) -> Result<Received, ClientError> {
        loop {
            match self.connection.read_frame().await? {
                Frame::Transfer {
                    handle: LINK_HANDLE,
                    delivery_id,
                    payload,
                } => {
                    return Ok(Received {
                        delivery_id,
                        payload,
                    })
                }
                Frame::Flow { .. } => continue,
                other => return Err(unexpected(other)),
            }
        }
    }

    /// Сообщает брокеру исход доставки.
    pub async fn settle(
        &mut self,
        delivery_id: u64,
        outcome: Outcome,
    ) -> Result<(), ClientError> {
        self.connection
            .send_frame(&Frame::Disposition {
                handle: LINK_HANDLE,
                delivery_id,
                outcome,
            })
            .await
    }

    pub async fn accept(
        &mut self,
        delivery_id: u64,
    ) -> Result<(), ClientError> {
        self.settle(delivery_id, Outcome::Accepted).await
    }

    pub async fn reject(
        &mut self,
        delivery_id: u64,
    ) -> Result<(), ClientError> {
        self.settle(delivery_id, Outcome::Rejected).await
    }

    /// Отсоединяет линк и закрывает соединение. Неподтверждённые доставки
    /// брокер вернёт в очередь.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.connection
            .send_frame(&Frame::Detach {
                handle: LINK_HANDLE,
                reason: None,
            })
            .await?;
        self.connection.close().await
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Duration::from_secs(10),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние функции
////////////////////////////////////////////////////////////////////////////////

/// Открывает соединение и присоединяет линк `role` к `address`.
async fn attach(
    addr: &str,
    address: &str,
    role: LinkRole,
    config: &ClientConfig,
) -> Result<ClientConnection, ClientError> {
    let mut connection = ClientConnection::connect(
        addr,
        config.connect_timeout,
        config.read_timeout,
        config.write_timeout,
    )
    .await?;

    connection
        .send_frame(&Frame::Attach {
            handle: LINK_HANDLE,
            role,
            address: address.to_string(),
        })
        .await?;

    match connection.read_frame().await? {
        Frame::Attached {
            handle: LINK_HANDLE,
        } => Ok(connection),
        other => Err(unexpected(other)),
    }
}

/// Ошибка для кадра, неожиданного в текущем состоянии; `DETACH` от брокера
/// становится ошибкой линка.
fn unexpected(frame: Frame) -> ClientError {
    match frame {
        Frame::Detach { reason, .. } => LinkError::Detached {
            reason: reason.unwrap_or_else(|| "detached by broker".to_string()),
        }
        .into(),
        other => ClientError::UnexpectedFrame(other.name().to_string()),
    }
}
