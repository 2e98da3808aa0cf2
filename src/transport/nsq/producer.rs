use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use nsqbridge_error::TransportError;
use parking_lot::Mutex;
use tokio::{
    sync::{oneshot, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use super::{
    connection::{connect, with_timeout, FrameReader, FrameWriter},
    protocol::{Command, Frame, RESPONSE_OK},
    NsqOptions,
};
use crate::transport::Topic;

type Waiter = oneshot::Sender<Result<(), TransportError>>;

/// Общее соединение для публикаций.
///
/// Публикации конвейеризуются: каждый `PUB` ставит ожидающего в очередь под
/// тем же замком, под которым пишется команда, а фоновая задача чтения
/// раздаёт ответы в порядке FIFO.
pub struct Producer {
    writer: Arc<AsyncMutex<FrameWriter>>,
    pending: Arc<Mutex<VecDeque<Waiter>>>,
    dead: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    opts: NsqOptions,
}

impl Producer {
    pub async fn connect(opts: &NsqOptions) -> Result<Self, TransportError> {
        let (reader, writer) = connect(opts).await?;
        let writer = Arc::new(AsyncMutex::new(writer));
        let pending = Arc::new(Mutex::new(VecDeque::new()));
        let dead = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            reader,
            writer.clone(),
            pending.clone(),
            dead.clone(),
        ));

        Ok(Self {
            writer,
            pending,
            dead,
            reader_task,
            opts: opts.clone(),
        })
    }

    /// Соединение оборвалось; нужна повторная установка.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub async fn publish(
        &self,
        topic: &Topic,
        body: Bytes,
    ) -> Result<(), TransportError> {
        if body.len() > self.opts.max_frame_size {
            return Err(TransportError::protocol(format!(
                "message of {} bytes exceeds max frame size {}",
                body.len(),
                self.opts.max_frame_size
            )));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut writer = self.writer.lock().await;
            register_waiter(&self.dead, &self.pending, tx)?;
            let cmd = Command::Pub {
                topic,
                body: &body,
            };
            if let Err(e) = writer.send(&cmd).await {
                warn!(topic = %topic, error = %e, "PUB write failed");
                self.mark_dead(e.clone());
                return Err(e);
            }
        }
        trace!(topic = %topic, bytes = body.len(), "PUB sent");

        with_timeout(self.opts.publish_timeout, "publish", async {
            rx.await.unwrap_or(Err(TransportError::ConnectionClosed))
        })
        .await
    }

    fn mark_dead(
        &self,
        err: TransportError,
    ) {
        fail_pending(&self.dead, &self.pending, err);
    }

    /// Закрывает соединение, все ожидающие публикации получают ошибку.
    pub async fn close(&self) {
        self.reader_task.abort();
        self.mark_dead(TransportError::Closed);
        self.writer.lock().await.shutdown().await;
        debug!(address = %self.opts.address, "producer closed");
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Ставит ожидающего в очередь, если соединение ещё живо.
///
/// Флаг `dead` читается и пишется только под замком очереди, иначе ожидающий
/// мог бы попасть в очередь уже после её опустошения.
fn register_waiter(
    dead: &AtomicBool,
    pending: &Mutex<VecDeque<Waiter>>,
    waiter: Waiter,
) -> Result<(), TransportError> {
    let mut queue = pending.lock();
    if dead.load(Ordering::Acquire) {
        return Err(TransportError::ConnectionClosed);
    }
    queue.push_back(waiter);
    Ok(())
}

fn fail_pending(
    dead: &AtomicBool,
    pending: &Mutex<VecDeque<Waiter>>,
    err: TransportError,
) {
    let waiters: Vec<Waiter> = {
        let mut queue = pending.lock();
        dead.store(true, Ordering::Release);
        queue.drain(..).collect()
    };
    for waiter in waiters {
        let _ = waiter.send(Err(err.clone()));
    }
}

async fn read_loop(
    mut reader: FrameReader,
    writer: Arc<AsyncMutex<FrameWriter>>,
    pending: Arc<Mutex<VecDeque<Waiter>>>,
    dead: Arc<AtomicBool>,
) {
    let err = loop {
        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(e) => break e,
        };
        match frame {
            frame if frame.is_heartbeat() => {
                trace!("producer heartbeat");
                if let Err(e) = writer.lock().await.send(&Command::Nop).await {
                    break e;
                }
            }
            Frame::Response(data) => {
                let result = if data.as_ref() == RESPONSE_OK {
                    Ok(())
                } else {
                    Err(TransportError::protocol(format!(
                        "unexpected PUB response: {}",
                        String::from_utf8_lossy(&data)
                    )))
                };
                complete_next(&pending, result);
            }
            Frame::Error(data) => {
                let err = TransportError::from_broker_frame(&data);
                warn!(error = %err, "nsqd rejected publish");
                complete_next(&pending, Err(err));
            }
            Frame::Message(_) => {
                break TransportError::protocol("producer connection received a message");
            }
        }
    };

    debug!(error = %err, "producer connection lost");
    fail_pending(&dead, &pending, err);
}

fn complete_next(
    pending: &Mutex<VecDeque<Waiter>>,
    result: Result<(), TransportError>,
) {
    match pending.lock().pop_front() {
        // получатель мог уйти по таймауту; ответ всё равно занимает своё место
        Some(waiter) => {
            let _ = waiter.send(result);
        }
        None => warn!("response without pending publish"),
    }
}
