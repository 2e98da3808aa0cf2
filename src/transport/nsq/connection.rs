use std::time::Duration;

use bytes::BytesMut;
use nsqbridge_error::TransportError;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufWriter},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tracing::{debug, trace};

use super::{
    protocol::{decode_frame, Command, Frame, Identify, MAGIC_V2, RESPONSE_OK},
    NsqOptions,
};

/// Читающая половина соединения с nsqd.
///
/// Непрочитанные байты живут в `buf`, поэтому `read_frame` можно отменять
/// (например, в `tokio::select!`) без потери данных.
pub struct FrameReader {
    inner: OwnedReadHalf,
    buf: BytesMut,
    max_frame_size: usize,
}

impl FrameReader {
    pub async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.max_frame_size)? {
                trace!(?frame, "frame received");
                return Ok(frame);
            }
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
        }
    }
}

/// Пишущая половина соединения с nsqd.
pub struct FrameWriter {
    inner: BufWriter<OwnedWriteHalf>,
    scratch: BytesMut,
}

impl FrameWriter {
    pub async fn send(
        &mut self,
        cmd: &Command<'_>,
    ) -> Result<(), TransportError> {
        self.scratch.clear();
        cmd.encode(&mut self.scratch);
        self.inner.write_all(&self.scratch).await?;
        self.inner.flush().await?;
        trace!(command = cmd.name(), bytes = self.scratch.len(), "command sent");
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

/// Открывает TCP-соединение, отправляет приветствие V2 и IDENTIFY.
pub async fn connect(opts: &NsqOptions) -> Result<(FrameReader, FrameWriter), TransportError> {
    debug!(address = %opts.address, "connecting to nsqd");

    let stream = timeout(opts.connect_timeout, TcpStream::connect(&opts.address))
        .await
        .map_err(|_| TransportError::Timeout { op: "connect" })?
        .map_err(|e| TransportError::ConnectionFailed {
            address: opts.address.clone(),
            reason: e.to_string(),
        })?;
    let _ = stream.set_nodelay(true);

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader {
        inner: read_half,
        buf: BytesMut::with_capacity(8 * 1024),
        max_frame_size: opts.max_frame_size,
    };
    let mut writer = FrameWriter {
        inner: BufWriter::new(write_half),
        scratch: BytesMut::with_capacity(1024),
    };

    let handshake = async {
        writer.inner.write_all(MAGIC_V2).await?;
        let identify = Command::identify(&Identify {
            client_id: opts.client_id.clone(),
            hostname: opts.hostname.clone(),
            user_agent: opts.user_agent.clone(),
            heartbeat_interval: opts.heartbeat_interval.as_millis() as u64,
            feature_negotiation: false,
        })?;
        writer.send(&identify).await?;
        expect_ok(&mut reader, &mut writer, "IDENTIFY").await
    };
    timeout(opts.connect_timeout, handshake)
        .await
        .map_err(|_| TransportError::Timeout { op: "handshake" })??;

    debug!(address = %opts.address, client_id = %opts.client_id, "nsqd handshake complete");
    Ok((reader, writer))
}

/// Ждёт ответа `OK` на синхронную команду, отвечая на heartbeat.
pub async fn expect_ok(
    reader: &mut FrameReader,
    writer: &mut FrameWriter,
    command: &str,
) -> Result<(), TransportError> {
    loop {
        match reader.read_frame().await? {
            frame if frame.is_heartbeat() => writer.send(&Command::Nop).await?,
            Frame::Response(data) if data.as_ref() == RESPONSE_OK => return Ok(()),
            Frame::Response(data) => {
                return Err(TransportError::protocol(format!(
                    "unexpected response to {command}: {}",
                    String::from_utf8_lossy(&data)
                )))
            }
            Frame::Error(data) => return Err(TransportError::from_broker_frame(&data)),
            Frame::Message(_) => {
                return Err(TransportError::protocol(format!(
                    "message frame before {command} was acknowledged"
                )))
            }
        }
    }
}

/// Ожидание с таймаутом для операций, у которых таймаут свой.
pub async fn with_timeout<T>(
    limit: Duration,
    op: &'static str,
    fut: impl std::future::Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    timeout(limit, fut)
        .await
        .map_err(|_| TransportError::Timeout { op })?
}
