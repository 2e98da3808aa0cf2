//! Интеграционные тесты моста поверх брокера в памяти
//!
//! Порядок доставки, fan-out и разделение нагрузки между группами,
//! отмена подписчиков, ограничение публикаций и остановка соединения.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use nsqbridge::{
    encode, handler_fn,
    transport::{Delivery, Feed, FeedItem},
    Bridge, BridgeError, BridgeSettings, ConfigError, ConsumerGroup, DecodeError, Handler,
    MemoryBroker, Messenger, PatternRouter, SubscriberState, Topic, Transport, TransportError,
    Value, ValueMap, DEFAULT_PATTERN,
};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

fn bridge() -> Bridge {
    Bridge::new(Messenger::with_transport(
        PatternRouter::new(DEFAULT_PATTERN).unwrap(),
        Arc::new(MemoryBroker::new()),
    ))
}

/// Обработчик, пересылающий значения в канал теста.
fn forward(tx: mpsc::UnboundedSender<Value>) -> impl Handler {
    move |v: Value| {
        let _ = tx.send(v);
    }
}

async fn collect(
    rx: &mut mpsc::UnboundedReceiver<Value>,
    n: usize,
) -> Vec<Value> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match tokio::time::timeout(WAIT, rx.recv()).await {
            Ok(Some(v)) => out.push(v),
            _ => break,
        }
    }
    out
}

/// Транспорт с ручным управлением лентами и задержкой публикации.
#[derive(Default)]
struct ScriptedTransport {
    feeds: Mutex<Vec<mpsc::UnboundedSender<FeedItem>>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    published: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedTransport {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn push(
        &self,
        item: FeedItem,
    ) {
        for feed in self.feeds.lock().unwrap().iter() {
            let _ = feed.send(match &item {
                Ok(d) => Ok(Delivery::new(d.id, d.attempts, d.timestamp, d.body.clone())),
                Err(e) => Err(e.clone()),
            });
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn publish(
        &self,
        _topic: &Topic,
        _body: Bytes,
    ) -> Result<(), TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(
        &self,
        _topic: &Topic,
        _group: &ConsumerGroup,
    ) -> Result<Feed, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        Ok(Feed::new(rx))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.feeds.lock().unwrap().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn delivery(value: &Value) -> Delivery {
    Delivery::new([b'0'; 16], 1, 0, encode(value).unwrap())
}

/// Тест проверяет FIFO и доставку ровно один раз для одного подписчика.
#[tokio::test]
async fn test_fifo_exactly_once() {
    let bridge = bridge();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = bridge.subscribe("@orders", "g1", forward(tx)).await.unwrap();
    let publisher = bridge.advertise("@orders", 4).unwrap();

    for i in 0..200 {
        publisher.publish(i).await.unwrap();
    }

    let got = collect(&mut rx, 200).await;
    let expected: Vec<Value> = (0..200).map(Value::from).collect();
    assert_eq!(got, expected);

    // ничего лишнего
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

/// Тест проверяет, что разные группы получают каждая полную копию.
#[tokio::test]
async fn test_fan_out_across_groups() {
    let bridge = bridge();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let _a = bridge.subscribe("@events", "audit", forward(tx_a)).await.unwrap();
    let _b = bridge.subscribe("@events", "metrics", forward(tx_b)).await.unwrap();

    let publisher = bridge.advertise("@events", 0).unwrap();
    for i in 0..50 {
        publisher.publish(i).await.unwrap();
    }

    let expected: Vec<Value> = (0..50).map(Value::from).collect();
    assert_eq!(collect(&mut rx_a, 50).await, expected);
    assert_eq!(collect(&mut rx_b, 50).await, expected);
}

/// Тест проверяет разделение нагрузки внутри группы без потерь и дублей.
#[tokio::test]
async fn test_load_sharing_within_group() {
    let bridge = bridge();
    let (tx, mut rx) = mpsc::unbounded_channel::<(u8, Value)>();
    let tx_2 = tx.clone();
    let _first = bridge
        .subscribe("@jobs", "workers", move |v: Value| {
            let _ = tx.send((1, v));
        })
        .await
        .unwrap();
    let _second = bridge
        .subscribe("@jobs", "workers", move |v: Value| {
            let _ = tx_2.send((2, v));
        })
        .await
        .unwrap();

    let publisher = bridge.advertise("@jobs", 0).unwrap();
    for i in 0..100 {
        publisher.publish(i).await.unwrap();
    }

    let mut seen = BTreeSet::new();
    let mut per_member = [0usize; 2];
    for _ in 0..100 {
        let (member, value) = tokio::time::timeout(WAIT, rx.recv())
            .await
            .unwrap()
            .unwrap();
        per_member[usize::from(member - 1)] += 1;
        assert!(seen.insert(value.as_i64().unwrap()), "duplicate {value}");
    }
    assert_eq!(seen, (0..100).collect::<BTreeSet<i64>>());
    assert!(per_member[0] > 0 && per_member[1] > 0);
}

/// Тест проверяет сценарий из пяти значений на канале `@test`.
#[tokio::test]
async fn test_five_value_scenario() {
    let bridge = bridge();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = bridge.subscribe("@test", 0, forward(tx)).await.unwrap();
    assert_eq!(sub.topic().as_str(), "test");

    let mut person = ValueMap::new();
    person.insert("name", "zhaoyong");
    person.insert("age", 28);
    let values = vec![
        Value::Null,
        Value::Bool(true),
        Value::Float(1.2),
        Value::Map(person),
        Value::from(&b"hello, world!"[..]),
    ];
    assert_eq!(values[4].as_bytes().map(|b| b.len()), Some(13));

    let publisher = bridge.advertise("@test", 1).unwrap();
    for v in &values {
        publisher.publish(v.clone()).await.unwrap();
    }
    assert_eq!(collect(&mut rx, 5).await, values);
}

/// Тест проверяет, что после `cancel` обработчик больше не вызывается, а
/// соседний подписчик продолжает работать.
#[tokio::test]
async fn test_cancel_stops_invocations() {
    let bridge = bridge();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cancelled = bridge
        .subscribe("@ticks", "a", move |_v: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _other = bridge.subscribe("@ticks", "b", forward(tx)).await.unwrap();

    let publisher = bridge.advertise("@ticks", 0).unwrap();
    for i in 0..10 {
        publisher.publish(i).await.unwrap();
    }
    assert_eq!(collect(&mut rx, 10).await.len(), 10);

    let state = cancelled.cancel().await;
    assert_eq!(state, SubscriberState::Cancelled);
    let after_cancel = calls.load(Ordering::SeqCst);

    for i in 10..30 {
        publisher.publish(i).await.unwrap();
    }
    assert_eq!(collect(&mut rx, 20).await.len(), 20);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_cancel);
    assert_eq!(bridge.active_handles().len(), 2);
}

/// Тест проверяет, что некорректный шаблон отвергается при конструировании.
#[tokio::test]
async fn test_malformed_pattern() {
    for pattern in ["(", "^@.+$", "^(a)(b)$"] {
        assert!(matches!(
            PatternRouter::new(pattern),
            Err(ConfigError::InvalidPattern { .. })
        ));
        let settings = BridgeSettings::new("127.0.0.1:4150", pattern);
        assert!(matches!(
            Bridge::connect(settings).await,
            Err(BridgeError::Config(ConfigError::InvalidPattern { .. }))
        ));
    }
}

/// Тест проверяет, что ошибка декодирования уходит в обработчик, а цикл
/// доставки продолжается.
#[tokio::test]
async fn test_decode_error_continues() {
    let bridge = bridge();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let _sub = bridge
        .subscribe(
            "@raw",
            "",
            handler_fn(
                move |v: Value| {
                    let _ = tx.send(v);
                },
                move |e: &BridgeError| sink.lock().unwrap().push(e.clone()),
            ),
        )
        .await
        .unwrap();

    let topic = Topic::new("raw").unwrap();
    let transport = bridge.messenger().transport();
    transport
        .publish(&topic, Bytes::from_static(&[0xFF]))
        .await
        .unwrap();
    bridge.messenger().publish("@raw", "after").await.unwrap();

    assert_eq!(collect(&mut rx, 1).await, vec![Value::from("after")]);
    assert_eq!(
        *errors.lock().unwrap(),
        vec![BridgeError::Decode(DecodeError::UnsupportedPayload { tag: 0xFF })]
    );
}

/// Тест проверяет терминальное уведомление при сбое транспорта.
#[tokio::test]
async fn test_transport_failure_is_terminal() {
    let transport = Arc::new(ScriptedTransport::default());
    let messenger = Messenger::with_transport(
        PatternRouter::new(DEFAULT_PATTERN).unwrap(),
        transport.clone(),
    );

    #[derive(Default)]
    struct Recorder {
        values: Vec<Value>,
        errors: Vec<BridgeError>,
        closed: Option<SubscriberState>,
    }
    struct Recording(Arc<Mutex<Recorder>>);
    impl Handler for Recording {
        fn on_message(
            &mut self,
            value: Value,
        ) {
            self.0.lock().unwrap().values.push(value);
        }

        fn on_error(
            &mut self,
            err: &BridgeError,
        ) {
            self.0.lock().unwrap().errors.push(err.clone());
        }

        fn on_closed(
            &mut self,
            state: SubscriberState,
        ) {
            self.0.lock().unwrap().closed = Some(state);
        }
    }

    let record = Arc::new(Mutex::new(Recorder::default()));
    let mut sub = messenger
        .subscribe("@feed", Recording(record.clone()))
        .await
        .unwrap();

    transport.push(Ok(delivery(&Value::Int(1))));
    transport.push(Err(TransportError::ConnectionClosed));
    transport.push(Ok(delivery(&Value::Int(2))));

    let state = tokio::time::timeout(WAIT, sub.closed()).await.unwrap();
    assert_eq!(state, SubscriberState::Failed);

    let record = record.lock().unwrap();
    assert_eq!(record.values, vec![Value::Int(1)]);
    assert_eq!(
        record.errors,
        vec![BridgeError::Transport(TransportError::ConnectionClosed)]
    );
    assert_eq!(record.closed, Some(SubscriberState::Failed));
    assert!(messenger.active_handles().is_empty());
}

/// Тест проверяет, что паника обработчика снимает подписчика с учёта.
#[tokio::test]
async fn test_panicking_handler_releases_registration() {
    let messenger = Messenger::with_transport(
        PatternRouter::new(DEFAULT_PATTERN).unwrap(),
        Arc::new(MemoryBroker::new()),
    );
    let mut sub = messenger
        .subscribe("@boom", |_v: Value| panic!("handler failure"))
        .await
        .unwrap();
    assert_eq!(messenger.active_handles().len(), 1);

    messenger.publish("@boom", 1).await.unwrap();
    let state = tokio::time::timeout(WAIT, sub.closed()).await.unwrap();
    assert_eq!(state, SubscriberState::Failed);
    assert!(messenger.active_handles().is_empty());

    // остановка не ждёт завершённого цикла
    tokio::time::timeout(WAIT, messenger.shutdown()).await.unwrap();
}

/// Тест проверяет, что `queue_depth` ограничивает одновременные публикации.
#[tokio::test]
async fn test_queue_depth_bounds_in_flight() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(20)));
    let bridge = Bridge::new(Messenger::with_transport(
        PatternRouter::new(DEFAULT_PATTERN).unwrap(),
        transport.clone(),
    ));
    let publisher = Arc::new(bridge.advertise("@bounded", 2).unwrap());
    assert_eq!(publisher.queue_depth(), 2);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let publisher = publisher.clone();
            tokio::spawn(async move { publisher.publish(i).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(transport.published.load(Ordering::SeqCst), 8);
    assert!(transport.peak.load(Ordering::SeqCst) <= 2);
}

/// Тест проверяет остановку: подписчики закрыты, публикации отклоняются,
/// реестр пуст.
#[tokio::test]
async fn test_shutdown_closes_everything() {
    let bridge = bridge();
    let mut sub = bridge
        .subscribe("@test", "g", |_v: Value| {})
        .await
        .unwrap();
    let publisher = bridge.advertise("@test", 0).unwrap();
    assert_eq!(bridge.active_handles().len(), 2);

    bridge.shutdown().await;

    assert_eq!(sub.closed().await, SubscriberState::Closed);
    assert_eq!(
        publisher.publish(Value::Null).await,
        Err(BridgeError::Transport(TransportError::Closed))
    );
    assert_eq!(
        bridge.messenger().publish("@test", 1).await,
        Err(BridgeError::Transport(TransportError::Closed))
    );
    assert!(bridge.messenger().transport().is_closed());
    assert!(bridge.subscribe("@test", "g", |_v: Value| {}).await.is_err());
}
