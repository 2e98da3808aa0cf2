//! Прямой обмен сообщениями по имени канала.

use std::sync::Arc;

use nsqbridge_error::BridgeResult;
use serde::Serialize;
use tracing::info;

use crate::{
    config::BridgeSettings,
    envelope::Value,
    pubsub::{Connection, Handler, HandleInfo, Subscriber},
    router::PatternRouter,
    transport::{
        nsq::{NsqOptions, NsqTransport},
        ConsumerGroup, Transport,
    },
};

/// Владеет одним соединением с брокером. Каждый вызов заново разрешает
/// канал и кодирует значение.
///
/// Клоны разделяют одно соединение.
#[derive(Debug, Clone)]
pub struct Messenger {
    conn: Arc<Connection>,
}

impl Messenger {
    /// Проверяет настройки, компилирует шаблон и подключается к nsqd.
    pub async fn connect(settings: BridgeSettings) -> BridgeResult<Self> {
        settings.validate()?;
        let router = settings.router()?;
        let transport = NsqTransport::connect(NsqOptions::from_settings(&settings)).await?;
        info!(server = %settings.server, pattern = %settings.pattern, "messenger connected");
        Ok(Self::with_transport(router, Arc::new(transport)))
    }

    /// Мессенджер поверх готового транспорта.
    pub fn with_transport(
        router: PatternRouter,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            conn: Connection::new(router, transport),
        }
    }

    pub fn router(&self) -> &PatternRouter {
        self.conn.router()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.conn.transport()
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Публикует значение в топик канала. Возвращается после
    /// подтверждения брокером.
    pub async fn publish(
        &self,
        channel: &str,
        value: impl Into<Value>,
    ) -> BridgeResult<()> {
        let topic = self.conn.router().resolve(channel)?;
        self.conn.publish_value(&topic, &value.into()).await
    }

    /// Преобразует `T` через serde и публикует результат.
    pub async fn publish_serialize<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        value: &T,
    ) -> BridgeResult<()> {
        let value = Value::from_serialize(value)?;
        self.publish(channel, value).await
    }

    /// Подписывает обработчик на канал в группе по умолчанию.
    pub async fn subscribe<H: Handler>(
        &self,
        channel: &str,
        handler: H,
    ) -> BridgeResult<Subscriber> {
        self.subscribe_group(channel, ConsumerGroup::default_group(), handler)
            .await
    }

    pub(crate) async fn subscribe_group<H: Handler>(
        &self,
        channel: &str,
        group: ConsumerGroup,
        handler: H,
    ) -> BridgeResult<Subscriber> {
        Subscriber::open(&self.conn, channel, group, handler).await
    }

    pub fn active_handles(&self) -> Vec<HandleInfo> {
        self.conn.active_handles()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// Останавливает подписчиков и закрывает транспорт. После этого любая
    /// публикация возвращает `TransportError::Closed`.
    pub async fn shutdown(&self) {
        self.conn.shutdown().await
    }
}
