use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{mapref::one::RefMut, DashMap};
use nsqbridge_error::TransportError;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{ConsumerGroup, Delivery, Feed, FeedItem, MessageId, Topic, Transport};

/// Брокер в памяти процесса с семантикой NSQ.
///
/// - топик копит сообщения, пока у него нет ни одной группы;
/// - группа копит сообщения, пока у неё нет ни одного участника;
/// - каждое сообщение получает каждая группа и ровно один участник группы
///   (по кругу, пропуская закрытых);
/// - порядок внутри участника FIFO.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: DashMap<Topic, TopicState>,
    closed: AtomicBool,
    /// Счётчик опубликованных сообщений (он же источник идентификаторов)
    published: AtomicU64,
    next_member: AtomicU64,
}

#[derive(Debug, Default)]
struct TopicState {
    backlog: VecDeque<Pending>,
    groups: HashMap<ConsumerGroup, GroupState>,
}

#[derive(Debug, Default)]
struct GroupState {
    members: Vec<Member>,
    /// Индекс следующего участника для round-robin
    next: usize,
    backlog: VecDeque<Pending>,
}

#[derive(Debug)]
struct Member {
    id: u64,
    tx: mpsc::UnboundedSender<FeedItem>,
}

#[derive(Debug, Clone)]
struct Pending {
    id: MessageId,
    timestamp: i64,
    body: Bytes,
}

/// Снимок состояния брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    pub published: u64,
    pub topics: usize,
    pub groups: usize,
    pub members: usize,
    /// Сообщения, ждущие группу или участника
    pub backlog: usize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BrokerStats {
        let mut stats = BrokerStats {
            published: self.published.load(Ordering::Relaxed),
            ..BrokerStats::default()
        };
        for entry in self.topics.iter() {
            let topic = entry.value();
            stats.topics += 1;
            stats.backlog += topic.backlog.len();
            for group in topic.groups.values() {
                stats.groups += 1;
                stats.members += group.members.iter().filter(|m| !m.tx.is_closed()).count();
                stats.backlog += group.backlog.len();
            }
        }
        stats
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Захватывает запись топика, повторно проверяя закрытие под её замком.
    ///
    /// `close` очищает карту после установки флага, поэтому запись, созданная
    /// после проверки, иначе пережила бы закрытие.
    fn open_topic(
        &self,
        topic: &Topic,
    ) -> Result<RefMut<'_, Topic, TopicState>, TransportError> {
        let entry = self.topics.entry(topic.clone());
        self.check_open()?;
        Ok(entry.or_default())
    }

    fn next_message(
        &self,
        body: Bytes,
    ) -> Pending {
        let seq = self.published.fetch_add(1, Ordering::Relaxed);
        let mut id = [0u8; 16];
        // 16 hex-символов, как у nsqd
        id.copy_from_slice(format!("{seq:016x}").as_bytes());
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default();
        Pending {
            id,
            timestamp,
            body,
        }
    }
}

impl GroupState {
    /// Отдаёт сообщение одному живому участнику или кладёт в очередь группы.
    fn dispatch(
        &mut self,
        msg: Pending,
    ) {
        loop {
            self.members.retain(|m| !m.tx.is_closed());
            if self.members.is_empty() {
                self.backlog.push_back(msg);
                return;
            }
            let idx = self.next % self.members.len();
            self.next = self.next.wrapping_add(1);

            let delivery = Delivery::new(msg.id, 1, msg.timestamp, msg.body.clone());
            trace!(member = self.members[idx].id, "dispatching message");
            match self.members[idx].tx.send(Ok(delivery)) {
                Ok(()) => return,
                // участник закрылся между проверкой и отправкой
                Err(_) => continue,
            }
        }
    }

    fn flush_backlog(&mut self) {
        while let Some(msg) = self.backlog.pop_front() {
            self.dispatch(msg);
            if self.members.is_empty() {
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(
        &self,
        topic: &Topic,
        body: Bytes,
    ) -> Result<(), TransportError> {
        self.check_open()?;
        let mut state = self.open_topic(topic)?;
        let msg = self.next_message(body);

        if state.groups.is_empty() {
            trace!(topic = %topic, "no groups yet, buffering on topic");
            state.backlog.push_back(msg);
            return Ok(());
        }
        for group in state.groups.values_mut() {
            group.dispatch(msg.clone());
        }
        Ok(())
    }

    async fn consume(
        &self,
        topic: &Topic,
        group: &ConsumerGroup,
    ) -> Result<Feed, TransportError> {
        self.check_open()?;
        let mut state = self.open_topic(topic)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let member_id = self.next_member.fetch_add(1, Ordering::Relaxed);

        let first_group = state.groups.is_empty();
        let topic_backlog: Vec<Pending> = if first_group {
            state.backlog.drain(..).collect()
        } else {
            Vec::new()
        };

        let group_state = state.groups.entry(group.clone()).or_default();
        group_state.backlog.extend(topic_backlog);
        group_state.members.push(Member { id: member_id, tx });
        group_state.flush_backlog();

        debug!(
            topic = %topic,
            group = %group,
            member = member_id,
            members = group_state.members.len(),
            "memory consumer attached"
        );
        Ok(Feed::new(rx))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // отправители удаляются вместе с топиками, ленты получают None
        self.topics.clear();
        debug!("memory broker closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
