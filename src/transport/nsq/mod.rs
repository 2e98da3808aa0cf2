//! Клиент TCP-протокола nsqd V2.
//!
//! Одно общее соединение для публикаций и по одному соединению на каждого
//! потребителя `(topic, group)`.

pub mod connection;
pub mod consumer;
pub mod producer;
pub mod protocol;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use nsqbridge_error::TransportError;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use self::producer::Producer;
use super::{ConsumerGroup, Feed, Topic, Transport};
use crate::config::BridgeSettings;

/// Параметры соединений с nsqd.
#[derive(Debug, Clone)]
pub struct NsqOptions {
    /// `host:port` TCP-порта nsqd
    pub address: String,
    pub client_id: String,
    pub hostname: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub close_timeout: Duration,
    /// Значение `RDY` для каждого потребителя
    pub max_in_flight: u32,
    pub max_frame_size: usize,
}

impl NsqOptions {
    pub fn new(address: impl Into<String>) -> Self {
        let hostname = local_hostname();
        Self {
            address: address.into(),
            client_id: short_hostname(&hostname),
            hostname,
            user_agent: default_user_agent(),
            connect_timeout: Duration::from_millis(5_000),
            publish_timeout: Duration::from_millis(10_000),
            heartbeat_interval: Duration::from_millis(30_000),
            close_timeout: Duration::from_millis(2_000),
            max_in_flight: 1,
            max_frame_size: 4 * 1024 * 1024,
        }
    }

    pub fn from_settings(settings: &BridgeSettings) -> Self {
        let mut opts = Self::new(settings.server.clone());
        if let Some(id) = &settings.client_id {
            opts.client_id = id.clone();
        }
        opts.connect_timeout = settings.connect_timeout();
        opts.publish_timeout = settings.publish_timeout();
        opts.heartbeat_interval = settings.heartbeat_interval();
        opts.close_timeout = settings.close_timeout();
        opts.max_in_flight = settings.max_in_flight;
        opts.max_frame_size = settings.max_frame_size;
        opts
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn short_hostname(hostname: &str) -> String {
    hostname.split('.').next().unwrap_or(hostname).to_string()
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Транспорт поверх nsqd.
pub struct NsqTransport {
    opts: NsqOptions,
    /// Соединение публикаций; пересоздаётся следующей публикацией после сбоя
    producer: AsyncMutex<Option<Arc<Producer>>>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl NsqTransport {
    /// Подключается к nsqd сразу, чтобы ошибка адреса проявилась при
    /// конструировании, а не при первой публикации.
    pub async fn connect(opts: NsqOptions) -> Result<Self, TransportError> {
        let producer = Producer::connect(&opts).await?;
        info!(address = %opts.address, "connected to nsqd");
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            opts,
            producer: AsyncMutex::new(Some(Arc::new(producer))),
            shutdown,
            closed: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &NsqOptions {
        &self.opts
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn producer(&self) -> Result<Arc<Producer>, TransportError> {
        let mut slot = self.producer.lock().await;
        if let Some(p) = slot.as_ref() {
            if !p.is_dead() {
                return Ok(p.clone());
            }
            warn!(address = %self.opts.address, "producer connection lost, redialling");
        }
        let fresh = Arc::new(Producer::connect(&self.opts).await?);
        *slot = Some(fresh.clone());
        Ok(fresh)
    }
}

#[async_trait]
impl Transport for NsqTransport {
    fn name(&self) -> &'static str {
        "nsq"
    }

    async fn publish(
        &self,
        topic: &Topic,
        body: Bytes,
    ) -> Result<(), TransportError> {
        self.check_open()?;
        let producer = self.producer().await?;
        producer.publish(topic, body).await
    }

    async fn consume(
        &self,
        topic: &Topic,
        group: &ConsumerGroup,
    ) -> Result<Feed, TransportError> {
        self.check_open()?;
        consumer::subscribe(&self.opts, topic, group, self.shutdown.subscribe()).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // потребители получают сигнал и закрываются через CLS
        let _ = self.shutdown.send(true);
        if let Some(p) = self.producer.lock().await.take() {
            p.close().await;
        }
        debug!(address = %self.opts.address, "nsq transport closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
