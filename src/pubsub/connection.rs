use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use dashmap::DashMap;
use nsqbridge_error::{BridgeResult, TransportError};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use super::SubscriberState;
use crate::{
    envelope::{self, Value},
    router::PatternRouter,
    transport::{ConsumerGroup, Feed, Topic, Transport},
};

/// Идентификатор handle в пределах одного соединения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Publisher,
    Subscriber,
}

impl HandleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Описание активного handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    pub id: HandleId,
    pub kind: HandleKind,
    /// Имя канала в том виде, в каком его передал вызывающий
    pub channel: String,
    pub topic: Topic,
    /// Группа потребителя; только у подписчиков
    pub group: Option<ConsumerGroup>,
}

struct Entry {
    info: HandleInfo,
    /// Состояние цикла доставки; только у подписчиков
    state: Option<watch::Receiver<SubscriberState>>,
}

/// Общая сессия с брокером для всех handle одного `Messenger`/`Bridge`.
///
/// Держит транспорт, маршрутизатор и реестр активных handle.
pub struct Connection {
    transport: Arc<dyn Transport>,
    router: PatternRouter,
    handles: DashMap<HandleId, Entry>,
    next_id: AtomicU64,
    closed: AtomicBool,
    /// `true` после начала остановки; циклы доставки следят за ним
    stop: watch::Sender<bool>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Connection {
    pub fn new(
        router: PatternRouter,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let (stop, _) = watch::channel(false);
        debug!(transport = transport.name(), pattern = router.pattern(), "connection opened");
        Arc::new(Self {
            transport,
            router,
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            stop,
        })
    }

    pub fn router(&self) -> &PatternRouter {
        &self.router
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn check_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Кодирует значение и публикует его одним сообщением брокера.
    pub(crate) async fn publish_value(
        &self,
        topic: &Topic,
        value: &Value,
    ) -> BridgeResult<()> {
        self.check_open()?;
        let body = envelope::encode(value)?;
        self.publish_bytes(topic, body).await
    }

    pub(crate) async fn publish_bytes(
        &self,
        topic: &Topic,
        body: Bytes,
    ) -> BridgeResult<()> {
        self.check_open()?;
        let len = body.len();
        self.transport.publish(topic, body).await?;
        trace!(topic = %topic, bytes = len, "published");
        Ok(())
    }

    /// Открывает потребителя `(topic, group)` на транспорте.
    pub(crate) async fn consume(
        &self,
        topic: &Topic,
        group: &ConsumerGroup,
    ) -> Result<Feed, TransportError> {
        self.check_open()?;
        self.transport.consume(topic, group).await
    }

    pub(crate) fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    pub(crate) fn register(
        &self,
        kind: HandleKind,
        channel: &str,
        topic: Topic,
        group: Option<ConsumerGroup>,
        state: Option<watch::Receiver<SubscriberState>>,
    ) -> HandleId {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = HandleInfo {
            id,
            kind,
            channel: channel.to_string(),
            topic,
            group,
        };
        debug!(id = %id, kind = %kind, channel, topic = %info.topic, "handle registered");
        self.handles.insert(id, Entry { info, state });
        id
    }

    pub(crate) fn unregister(
        &self,
        id: HandleId,
    ) {
        if let Some((_, entry)) = self.handles.remove(&id) {
            debug!(id = %id, kind = %entry.info.kind, "handle released");
        }
    }

    /// Снимок активных handle в порядке создания.
    pub fn active_handles(&self) -> Vec<HandleInfo> {
        let mut out: Vec<HandleInfo> = self.handles.iter().map(|e| e.info.clone()).collect();
        out.sort_by_key(|info| info.id);
        out
    }

    /// Останавливает всех подписчиков, дожидается их циклов доставки и
    /// закрывает транспорт. Повторный вызов ничего не делает.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.stop.send(true);

        let waiting: Vec<watch::Receiver<SubscriberState>> = self
            .handles
            .iter()
            .filter_map(|e| e.state.clone())
            .collect();
        let count = waiting.len();
        for mut state in waiting {
            // Err: цикл уже завершился и отпустил отправителя
            let _ = state.wait_for(|s| s.is_terminal()).await;
        }

        self.transport.close().await;
        self.handles.clear();
        info!(transport = self.transport.name(), subscribers = count, "connection shut down");
    }
}

impl fmt::Debug for Connection {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport.name())
            .field("pattern", &self.router.pattern())
            .field("handles", &self.handles.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
