use std::time::Duration;

use bytes::BytesMut;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tracing::{debug, trace};
use zumq_error::{ClientError, ProtocolError};

use crate::network::wire::{Frame, MAX_FRAME_LEN};

/// Клиентское соединение с брокером.
///
/// Обменивается кадрами построчного протокола; не знает о линках.
pub struct ClientConnection {
    /// Адрес брокера
    addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    line: Vec<u8>,
    /// Таймаут чтения; `None` — ждать без ограничения
    read_timeout: Option<Duration>,
    write_timeout: Duration,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ClientConnection {
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
        write_timeout: Duration,
    ) -> Result<Self, ClientError> {
        debug!("Connecting to {addr}");

        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectionTimeout)?
            .map_err(|e| ClientError::ConnectionFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            addr: addr.to_string(),
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            line: Vec::with_capacity(256),
            read_timeout,
            write_timeout,
        })
    }

    /// Отправляет кадр и сбрасывает буфер.
    pub async fn send_frame(
        &mut self,
        frame: &Frame,
    ) -> Result<(), ClientError> {
        trace!("Sending {}", frame.name());

        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        let write = async {
            self.writer.write_all(&buf).await?;
            self.writer.flush().await?;
            Ok::<_, std::io::Error>(())
        };
        timeout(self.write_timeout, write)
            .await
            .map_err(|_| ClientError::WriteTimeout)??;
        Ok(())
    }

    /// Читает следующий кадр. Кадр `ERROR` превращается в
    /// [`ClientError::Broker`], пустые строки пропускаются.
    pub async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        loop {
            self.line.clear();
            let mut limited = (&mut self.reader).take(MAX_FRAME_LEN as u64);
            let read = limited.read_until(b'\n', &mut self.line);
            let n = match self.read_timeout {
                Some(limit) => timeout(limit, read)
                    .await
                    .map_err(|_| ClientError::ReadTimeout)??,
                None => read.await?,
            };

            if n == 0 || !self.line.ends_with(b"\n") {
                return Err(ClientError::ConnectionClosed);
            }

            match Frame::parse(&self.line) {
                Ok(Frame::Error { text }) => return Err(ClientError::Broker(text)),
                Ok(frame) => {
                    trace!("Received {}", frame.name());
                    return Ok(frame);
                }
                Err(ProtocolError::EmptyFrame) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn server_addr(&self) -> &str {
        &self.addr
    }

    /// Закрывает пишущую половину соединения.
    pub async fn close(mut self) -> Result<(), ClientError> {
        debug!("Closing connection to {}", self.addr);
        self.writer.shutdown().await?;
        Ok(())
    }
}
