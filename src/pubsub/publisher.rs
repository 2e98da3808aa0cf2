use std::{fmt, sync::Arc};

use nsqbridge_error::{BridgeResult, TransportError};
use serde::Serialize;
use tokio::sync::Semaphore;

use super::connection::{Connection, HandleId, HandleKind};
use crate::{envelope::Value, transport::Topic};

/// Публикатор, привязанный к разрешённому топику.
///
/// Маршрут разрешается один раз при создании; каждая публикация идёт через
/// общее соединение. Освобождение handle снимает его с учёта.
pub struct Publisher {
    id: HandleId,
    channel: String,
    topic: Topic,
    conn: Arc<Connection>,
    /// Ограничение одновременных публикаций; `None` без ограничения
    limiter: Option<Semaphore>,
    queue_depth: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Publisher {
    pub(crate) fn open(
        conn: &Arc<Connection>,
        channel: &str,
        queue_depth: usize,
    ) -> BridgeResult<Self> {
        conn.check_open()?;
        let topic = conn.router().resolve(channel)?;
        let id = conn.register(HandleKind::Publisher, channel, topic.clone(), None, None);
        Ok(Self {
            id,
            channel: channel.to_string(),
            topic,
            conn: conn.clone(),
            limiter: (queue_depth > 0).then(|| Semaphore::new(queue_depth)),
            queue_depth,
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

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Публикует значение. Возвращается после подтверждения брокером.
    ///
    /// Если в полёте уже `queue_depth` публикаций, вызов ждёт свободного
    /// места.
    pub async fn publish(
        &self,
        value: impl Into<Value>,
    ) -> BridgeResult<()> {
        let value = value.into();
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .acquire()
                    .await
                    .map_err(|_| TransportError::Closed)?,
            ),
            None => None,
        };
        self.conn.publish_value(&self.topic, &value).await
    }

    /// Преобразует `T` через serde и публикует результат.
    pub async fn publish_serialize<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> BridgeResult<()> {
        let value = Value::from_serialize(value)?;
        self.publish(value).await
    }

    /// Освобождает публикатор.
    pub fn close(self) {
        drop(self)
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.conn.unregister(self.id);
    }
}

impl fmt::Debug for Publisher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("topic", &self.topic)
            .field("queue_depth", &self.queue_depth)
            .finish()
    }
}
