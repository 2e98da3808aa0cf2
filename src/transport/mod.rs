//! Транспорт: брокер как непрозрачная труба «опубликовать байты в топик» и
//! «получать байты из топика/группы».
//!
//! Две реализации: [`MemoryBroker`] (в процессе, для тестов и демо) и
//! [`NsqTransport`] (TCP-протокол nsqd V2).

pub mod memory;
pub mod name;
pub mod nsq;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use nsqbridge_error::TransportError;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

pub use memory::{BrokerStats, MemoryBroker};
pub use name::{validate_name, ConsumerGroup, Topic, DEFAULT_GROUP, MAX_NAME_LEN};
pub use nsq::NsqTransport;

/// Идентификатор сообщения брокера (16 байт в NSQ).
pub type MessageId = [u8; 16];

/// Транспорт брокера.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Короткое имя реализации для логов
    fn name(&self) -> &'static str;

    /// Публикует одно сообщение. Возвращается после подтверждения брокером.
    async fn publish(
        &self,
        topic: &Topic,
        body: Bytes,
    ) -> Result<(), TransportError>;

    /// Открывает потребителя `(topic, group)`. Возвращается после того, как
    /// брокер подтвердил подписку.
    async fn consume(
        &self,
        topic: &Topic,
        group: &ConsumerGroup,
    ) -> Result<Feed, TransportError>;

    /// Закрывает транспорт. Дальнейшие вызовы возвращают
    /// [`TransportError::Closed`]; открытые ленты завершаются.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Подтверждение обработки сообщения, уходящее обратно в соединение
/// потребителя.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Finish(MessageId),
    Requeue(MessageId, Duration),
}

/// Одно доставленное сообщение.
pub struct Delivery {
    pub id: MessageId,
    /// Число попыток доставки (с единицы)
    pub attempts: u16,
    /// Время публикации, наносекунды с эпохи
    pub timestamp: i64,
    pub body: Bytes,
    acker: Option<mpsc::UnboundedSender<Ack>>,
}

impl Delivery {
    pub fn new(
        id: MessageId,
        attempts: u16,
        timestamp: i64,
        body: Bytes,
    ) -> Self {
        Self {
            id,
            attempts,
            timestamp,
            body,
            acker: None,
        }
    }

    pub(crate) fn with_acker(
        mut self,
        acker: mpsc::UnboundedSender<Ack>,
    ) -> Self {
        self.acker = Some(acker);
        self
    }

    /// Подтверждает успешную обработку.
    pub fn finish(self) -> Result<(), TransportError> {
        let id = self.id;
        self.send(Ack::Finish(id))
    }

    /// Возвращает сообщение брокеру для повторной доставки через `delay`.
    pub fn requeue(
        self,
        delay: Duration,
    ) -> Result<(), TransportError> {
        let id = self.id;
        self.send(Ack::Requeue(id, delay))
    }

    fn send(
        self,
        ack: Ack,
    ) -> Result<(), TransportError> {
        match self.acker {
            Some(tx) => tx.send(ack).map_err(|_| TransportError::ConnectionClosed),
            // транспорт без подтверждений
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &String::from_utf8_lossy(&self.id))
            .field("attempts", &self.attempts)
            .field("body_len", &self.body.len())
            .finish()
    }
}

pub type FeedItem = Result<Delivery, TransportError>;

/// Ждёт, пока флаг станет `true` или отправитель исчезнет.
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|set| *set).await;
}

/// Лента доставок одного потребителя.
///
/// Ошибка в ленте терминальна: после неё транспорт больше ничего не
/// присылает, и `recv` вернёт `None`.
pub struct Feed {
    rx: mpsc::UnboundedReceiver<FeedItem>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Feed {
    /// Лента без фоновой задачи (например, в памяти).
    pub fn new(rx: mpsc::UnboundedReceiver<FeedItem>) -> Self {
        Self {
            rx,
            stop: None,
            task: None,
        }
    }

    /// Лента, которую питает фоновая задача; `stop` просит её завершиться.
    pub fn with_task(
        rx: mpsc::UnboundedReceiver<FeedItem>,
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            stop: Some(stop),
            task: Some(task),
        }
    }

    pub async fn recv(&mut self) -> Option<FeedItem> {
        self.rx.recv().await
    }

    /// Кооперативная остановка: сигнал задаче и ожидание её завершения.
    pub async fn close(mut self) {
        self.rx.close();
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        // задача увидит сигнал и закроется сама
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl fmt::Debug for Feed {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Feed")
            .field("has_task", &self.task.is_some())
            .finish()
    }
}
