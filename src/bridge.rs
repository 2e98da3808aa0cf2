//! Обобщённая поверхность advertise/subscribe с долгоживущими handle.

use std::fmt;

use nsqbridge_error::{BridgeResult, RouteError};
use tracing::debug;

use crate::{
    config::{AdvertiseOptions, BridgeSettings},
    messenger::Messenger,
    pubsub::{HandleInfo, Handler, Publisher, Subscriber},
    transport::ConsumerGroup,
};

/// Идентификатор группы потребителей: строка или целое.
///
/// `0` и пустая строка означают группу по умолчанию
/// ([`DEFAULT_GROUP`](crate::transport::DEFAULT_GROUP)).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum GroupId {
    #[default]
    Default,
    Named(String),
    Numeric(u64),
}

impl GroupId {
    /// Имя группы на стороне брокера.
    pub fn resolve(&self) -> Result<ConsumerGroup, RouteError> {
        match self {
            Self::Default => Ok(ConsumerGroup::default_group()),
            Self::Named(name) if name.is_empty() => Ok(ConsumerGroup::default_group()),
            Self::Named(name) => ConsumerGroup::new(name),
            Self::Numeric(0) => Ok(ConsumerGroup::default_group()),
            Self::Numeric(n) => ConsumerGroup::new(n.to_string()),
        }
    }

    pub fn is_default(&self) -> bool {
        match self {
            Self::Default | Self::Numeric(0) => true,
            Self::Named(name) => name.is_empty(),
            Self::Numeric(_) => false,
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Default => f.write_str("<default>"),
            Self::Named(name) => f.write_str(name),
            Self::Numeric(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for GroupId {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for GroupId {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<&String> for GroupId {
    fn from(name: &String) -> Self {
        Self::Named(name.clone())
    }
}

impl From<ConsumerGroup> for GroupId {
    fn from(group: ConsumerGroup) -> Self {
        Self::Named(group.as_str().to_string())
    }
}

macro_rules! group_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for GroupId {
            fn from(n: $t) -> Self {
                Self::Numeric(n as u64)
            }
        })*
    };
}

group_from_unsigned!(u8, u16, u32, u64, usize);

macro_rules! group_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for GroupId {
            // отрицательное число становится именем вида "-1"
            fn from(n: $t) -> Self {
                match u64::try_from(n) {
                    Ok(n) => Self::Numeric(n),
                    Err(_) => Self::Named(n.to_string()),
                }
            }
        })*
    };
}

group_from_signed!(i8, i16, i32, i64, isize);

/// Мост: публикаторы и подписчики, привязанные к разрешённым топикам, на
/// одном общем соединении.
///
/// Клоны разделяют соединение и реестр handle.
#[derive(Debug, Clone)]
pub struct Bridge {
    messenger: Messenger,
}

impl Bridge {
    /// Проверяет настройки и подключается к nsqd.
    pub async fn connect(settings: BridgeSettings) -> BridgeResult<Self> {
        Messenger::connect(settings).await.map(Self::new)
    }

    pub fn new(messenger: Messenger) -> Self {
        Self { messenger }
    }

    /// Прямая поверхность на том же соединении.
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Создаёт публикатор для канала. `queue_depth` ограничивает число
    /// одновременных публикаций через него (`0` без ограничения).
    pub fn advertise(
        &self,
        channel: &str,
        queue_depth: usize,
    ) -> BridgeResult<Publisher> {
        self.advertise_with(channel, AdvertiseOptions::new(queue_depth))
    }

    pub fn advertise_with(
        &self,
        channel: &str,
        options: AdvertiseOptions,
    ) -> BridgeResult<Publisher> {
        let publisher = Publisher::open(self.messenger.connection(), channel, options.queue_depth)?;
        debug!(
            id = %publisher.id(),
            channel,
            topic = %publisher.topic(),
            queue_depth = options.queue_depth,
            "publisher advertised"
        );
        Ok(publisher)
    }

    /// Подписывает обработчик на канал в группе `group`.
    ///
    /// Подписчики одной пары `(topic, group)` делят сообщения между собой;
    /// разные группы получают каждая свою копию.
    pub async fn subscribe<H: Handler>(
        &self,
        channel: &str,
        group: impl Into<GroupId>,
        handler: H,
    ) -> BridgeResult<Subscriber> {
        let group = group.into().resolve()?;
        self.messenger
            .subscribe_group(channel, group, handler)
            .await
    }

    pub fn active_handles(&self) -> Vec<HandleInfo> {
        self.messenger.active_handles()
    }

    pub fn is_closed(&self) -> bool {
        self.messenger.is_closed()
    }

    /// Отменяет всех подписчиков и закрывает транспорт.
    pub async fn shutdown(&self) {
        self.messenger.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::{
        envelope::Value,
        pubsub::HandleKind,
        router::{PatternRouter, DEFAULT_PATTERN},
        transport::MemoryBroker,
    };

    fn bridge() -> Bridge {
        Bridge::new(Messenger::with_transport(
            PatternRouter::new(DEFAULT_PATTERN).unwrap(),
            Arc::new(MemoryBroker::new()),
        ))
    }

    #[rstest]
    #[case(GroupId::from(0), "messenger")]
    #[case(GroupId::from(0u64), "messenger")]
    #[case(GroupId::from(""), "messenger")]
    #[case(GroupId::default(), "messenger")]
    #[case(GroupId::from(7), "7")]
    #[case(GroupId::from("workers"), "workers")]
    #[case(GroupId::from(String::from("audit#ephemeral")), "audit#ephemeral")]
    fn test_group_resolve(
        #[case] group: GroupId,
        #[case] expected: &str,
    ) {
        assert_eq!(group.resolve().unwrap().as_str(), expected);
    }

    #[test]
    fn test_group_edge_cases() {
        assert_eq!(GroupId::from(-1).resolve().unwrap().as_str(), "-1");
        assert!(GroupId::from("bad group").resolve().is_err());
        assert!(GroupId::from(0).is_default());
        assert!(!GroupId::from(3).is_default());
    }

    /// Тест проверяет реестр handle: публикатор и подписчик появляются и
    /// исчезают при освобождении.
    #[tokio::test]
    async fn test_active_handles() {
        let bridge = bridge();
        let publisher = bridge.advertise("@test", 0).unwrap();
        let sub = bridge
            .subscribe("@test", "workers", |_v: Value| {})
            .await
            .unwrap();

        let handles = bridge.active_handles();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].kind, HandleKind::Publisher);
        assert_eq!(handles[0].topic.as_str(), "test");
        assert_eq!(handles[1].kind, HandleKind::Subscriber);
        assert_eq!(handles[1].group.as_deref(), Some("workers"));

        publisher.close();
        sub.cancel().await;
        assert!(bridge.active_handles().is_empty());
    }

    #[tokio::test]
    async fn test_advertise_route_error() {
        let bridge = bridge();
        assert!(bridge.advertise("no-prefix", 1).is_err());
        assert!(bridge.active_handles().is_empty());
    }

    /// Тест проверяет, что после остановки создание публикатора отклоняется.
    #[tokio::test]
    async fn test_advertise_after_shutdown() {
        let bridge = bridge();
        bridge.shutdown().await;
        assert!(bridge.is_closed());
        assert!(bridge.advertise("@test", 1).is_err());
    }
}
