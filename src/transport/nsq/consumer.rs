use nsqbridge_error::TransportError;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::timeout,
};
use tracing::{debug, info, trace, warn};

use super::{
    connection::{connect, expect_ok, with_timeout, FrameReader, FrameWriter},
    protocol::{Command, Frame, RESPONSE_CLOSE_WAIT},
    NsqOptions,
};
use crate::transport::{signalled, Ack, ConsumerGroup, Delivery, Feed, FeedItem, Topic};

/// Открывает отдельное соединение-потребитель: `SUB`, затем `RDY`.
///
/// Возвращается после подтверждения подписки брокером.
pub async fn subscribe(
    opts: &NsqOptions,
    topic: &Topic,
    group: &ConsumerGroup,
    shutdown: watch::Receiver<bool>,
) -> Result<Feed, TransportError> {
    let (mut reader, mut writer) = connect(opts).await?;

    with_timeout(opts.connect_timeout, "subscribe", async {
        writer.send(&Command::Sub { topic, group }).await?;
        expect_ok(&mut reader, &mut writer, "SUB").await
    })
    .await?;
    writer.send(&Command::Rdy(opts.max_in_flight)).await?;

    info!(topic = %topic, group = %group, rdy = opts.max_in_flight, "nsq consumer subscribed");

    let (item_tx, item_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    let session = Session {
        reader,
        writer,
        items: item_tx,
        topic: topic.clone(),
        group: group.clone(),
        opts: opts.clone(),
    };
    let task = tokio::spawn(session.run(stop_rx, shutdown));
    Ok(Feed::with_task(item_rx, stop_tx, task))
}

struct Session {
    reader: FrameReader,
    writer: FrameWriter,
    items: mpsc::UnboundedSender<FeedItem>,
    topic: Topic,
    group: ConsumerGroup,
    opts: NsqOptions,
}

impl Session {
    async fn run(
        mut self,
        mut stop: oneshot::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Ack>();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = &mut stop => break Ok(()),
                _ = signalled(&mut shutdown) => break Ok(()),
                Some(ack) = ack_rx.recv() => {
                    if let Err(e) = self.send_ack(ack).await {
                        break Err(e);
                    }
                }
                frame = self.reader.read_frame() => {
                    match self.handle_frame(frame, &ack_tx).await {
                        Ok(true) => {}
                        // лента закрыта получателем
                        Ok(false) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                // сначала подтверждаем всё, что уже обработано
                while let Ok(ack) = ack_rx.try_recv() {
                    if self.send_ack(ack).await.is_err() {
                        break;
                    }
                }
                self.close_gracefully().await;
            }
            Err(err) => {
                warn!(topic = %self.topic, group = %self.group, error = %err, "nsq consumer failed");
                let _ = self.items.send(Err(err));
                self.writer.shutdown().await;
            }
        }
    }

    /// Обрабатывает кадр. `Ok(false)` означает, что лента больше не нужна.
    async fn handle_frame(
        &mut self,
        frame: Result<Frame, TransportError>,
        ack_tx: &mpsc::UnboundedSender<Ack>,
    ) -> Result<bool, TransportError> {
        match frame? {
            frame if frame.is_heartbeat() => {
                trace!(topic = %self.topic, "consumer heartbeat");
                self.writer.send(&Command::Nop).await?;
                Ok(true)
            }
            Frame::Response(data) => {
                trace!(response = %String::from_utf8_lossy(&data), "ignored response");
                Ok(true)
            }
            Frame::Error(data) => {
                let err = TransportError::from_broker_frame(&data);
                if err.is_fatal() {
                    return Err(err);
                }
                warn!(topic = %self.topic, error = %err, "non-fatal nsqd error");
                Ok(true)
            }
            Frame::Message(msg) => {
                trace!(
                    topic = %self.topic,
                    attempts = msg.attempts,
                    bytes = msg.body.len(),
                    "message received"
                );
                let delivery = Delivery::new(msg.id, msg.attempts, msg.timestamp, msg.body)
                    .with_acker(ack_tx.clone());
                Ok(self.items.send(Ok(delivery)).is_ok())
            }
        }
    }

    async fn send_ack(
        &mut self,
        ack: Ack,
    ) -> Result<(), TransportError> {
        match ack {
            Ack::Finish(id) => self.writer.send(&Command::Fin(id)).await,
            Ack::Requeue(id, delay) => self.writer.send(&Command::Req(id, delay)).await,
        }
    }

    /// `CLS`, затем ожидание `CLOSE_WAIT`. Сообщения, пришедшие в этот
    /// промежуток, не подтверждаются и вернутся в очередь брокера.
    async fn close_gracefully(&mut self) {
        if self.writer.send(&Command::Cls).await.is_err() {
            return;
        }
        let wait = async {
            loop {
                match self.reader.read_frame().await? {
                    Frame::Response(data) if data.as_ref() == RESPONSE_CLOSE_WAIT => {
                        return Ok::<(), TransportError>(())
                    }
                    frame if frame.is_heartbeat() => self.writer.send(&Command::Nop).await?,
                    _ => {}
                }
            }
        };
        match timeout(self.opts.close_timeout, wait).await {
            Ok(Ok(())) => debug!(topic = %self.topic, group = %self.group, "consumer closed"),
            Ok(Err(e)) => debug!(topic = %self.topic, error = %e, "consumer close interrupted"),
            Err(_) => warn!(topic = %self.topic, "timed out waiting for CLOSE_WAIT"),
        }
        self.writer.shutdown().await;
    }
}
