use std::{fmt, sync::Arc};

use nsqbridge_error::{BridgeError, BridgeResult};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, trace, warn};

use super::{
    connection::{Connection, HandleId, HandleKind},
    Handler,
};
use crate::{
    envelope,
    transport::{signalled, ConsumerGroup, Feed, Topic},
};

/// Состояние подписчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberState {
    /// Цикл доставки работает
    Running,
    /// Остановлен вызовом `cancel` или освобождением handle
    Cancelled,
    /// Лента закрыта: остановка соединения или закрытие транспорта
    Closed,
    /// Ошибка транспорта; обработчик получил её последней
    Failed,
}

impl SubscriberState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SubscriberState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Подписчик: канал, группа и обработчик, которому отдельная задача
/// доставляет сообщения.
///
/// Освобождение handle отменяет подписку без ожидания; дождаться
/// остановки позволяет [`Subscriber::cancel`].
pub struct Subscriber {
    id: HandleId,
    channel: String,
    topic: Topic,
    group: ConsumerGroup,
    cancel: watch::Sender<bool>,
    state: watch::Receiver<SubscriberState>,
    task: Option<JoinHandle<()>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Subscriber {
    /// Открывает потребителя и запускает цикл доставки. Возвращается после
    /// того, как брокер подтвердил подписку.
    pub(crate) async fn open<H: Handler>(
        conn: &Arc<Connection>,
        channel: &str,
        group: ConsumerGroup,
        handler: H,
    ) -> BridgeResult<Self> {
        let topic = conn.router().resolve(channel)?;
        let feed = conn.consume(&topic, &group).await?;

        let (cancel, cancel_rx) = watch::channel(false);
        let (state_tx, state) = watch::channel(SubscriberState::Running);
        let id = conn.register(
            HandleKind::Subscriber,
            channel,
            topic.clone(),
            Some(group.clone()),
            Some(state.clone()),
        );

        let delivery = DeliveryLoop {
            id,
            topic: topic.clone(),
            feed,
            handler: Box::new(handler),
            cancel: cancel_rx,
            shutdown: conn.stop_signal(),
            registration: Registration {
                id,
                conn: conn.clone(),
                state: state_tx,
            },
        };
        let task = tokio::spawn(delivery.run());

        debug!(id = %id, channel, topic = %topic, group = %group, "subscriber started");
        Ok(Self {
            id,
            channel: channel.to_string(),
            topic,
            group,
            cancel,
            state,
            task: Some(task),
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn group(&self) -> &ConsumerGroup {
        &self.group
    }

    pub fn state(&self) -> SubscriberState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SubscriberState::Running
    }

    /// Останавливает доставку и ждёт завершения цикла. После возврата
    /// обработчик больше не вызывается.
    pub async fn cancel(mut self) -> SubscriberState {
        let _ = self.cancel.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(id = %self.id, error = %e, "delivery task aborted");
            }
        }
        self.state()
    }

    /// Ждёт, пока цикл доставки завершится сам (закрытие соединения или
    /// ошибка транспорта).
    pub async fn closed(&mut self) -> SubscriberState {
        let result = match self.state.wait_for(|s| s.is_terminal()).await {
            Ok(state) => Some(*state),
            Err(_) => None,
        };
        result.unwrap_or_else(|| self.state())
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        // цикл увидит сигнал и завершится сам
        let _ = self.cancel.send(true);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("topic", &self.topic)
            .field("group", &self.group)
            .field("state", &self.state())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Цикл доставки
////////////////////////////////////////////////////////////////////////////////

struct DeliveryLoop {
    id: HandleId,
    topic: Topic,
    feed: Feed,
    handler: Box<dyn Handler>,
    cancel: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
    registration: Registration,
}

/// Запись подписчика в реестре соединения.
///
/// Снимается при освобождении, даже если обработчик запаниковал и цикл не
/// дошёл до конца; состояние в этом случае становится `Failed`.
struct Registration {
    id: HandleId,
    conn: Arc<Connection>,
    state: watch::Sender<SubscriberState>,
}

impl Registration {
    /// Снимает запись и публикует итоговое состояние. Повторный вызов
    /// ничего не меняет.
    fn settle(
        &self,
        outcome: SubscriberState,
    ) {
        self.conn.unregister(self.id);
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = outcome;
            true
        });
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.settle(SubscriberState::Failed);
    }
}

impl DeliveryLoop {
    async fn run(mut self) {
        let outcome = loop {
            tokio::select! {
                biased;

                _ = signalled(&mut self.cancel) => break SubscriberState::Cancelled,
                _ = signalled(&mut self.shutdown) => break SubscriberState::Closed,
                item = self.feed.recv() => match item {
                    Some(Ok(delivery)) => {
                        trace!(id = %self.id, attempts = delivery.attempts, "delivery");
                        match envelope::decode(&delivery.body) {
                            Ok(value) => self.handler.on_message(value),
                            Err(e) => {
                                debug!(id = %self.id, topic = %self.topic, error = %e, "undecodable message");
                                self.handler.on_error(&BridgeError::Decode(e));
                            }
                        }
                        // сообщение подтверждается и после ошибки декодирования
                        if let Err(e) = delivery.finish() {
                            debug!(id = %self.id, error = %e, "finish not sent");
                        }
                    }
                    Some(Err(e)) => {
                        warn!(id = %self.id, topic = %self.topic, error = %e, "subscriber transport failure");
                        self.handler.on_error(&BridgeError::Transport(e));
                        break SubscriberState::Failed;
                    }
                    None => break SubscriberState::Closed,
                },
            }
        };

        self.feed.close().await;
        self.handler.on_closed(outcome);
        self.registration.settle(outcome);
        debug!(id = %self.id, topic = %self.topic, state = %outcome, "subscriber stopped");
    }
}
