//! CLI nsqbridge
//!
//! Публикация значений в канал, подписка с выводом полученных значений и
//! демонстрационный прогон всех видов значений через брокер.

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use nsqbridge::{
    handler_fn, init_logging, Bridge, BridgeError, BridgeSettings, LogFormat, LoggingConfig,
    Value, ValueMap, DEFAULT_PATTERN,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

const DEFAULT_SERVER: &str = "127.0.0.1:4150";

/// Аргументы командной строки.
#[derive(Parser)]
#[command(name = "nsqbridge")]
#[command(version = VERSION)]
#[command(about = "Publish and subscribe typed values over NSQ topics", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TCP-адрес nsqd
    #[arg(short, long, global = true, env = "NSQBRIDGE_SERVER")]
    server: Option<String>,
    /// Шаблон канала с одной группой захвата
    #[arg(short, long, global = true, env = "NSQBRIDGE_PATTERN")]
    pattern: Option<String>,
    /// Файл настроек (toml, json, yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Директива уровня логирования (по умолчанию info)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Формат логов: pretty, compact или json (по умолчанию compact)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Опубликовать значения в канал
    Pub {
        channel: String,
        /// Значения в JSON; всё, что не разбирается, уходит строкой
        values: Vec<String>,
        /// Сколько раз повторить весь набор
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Пауза между публикациями
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        /// Опубликовать содержимое файла как blob
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Подписаться на канал и печатать полученные значения
    Sub {
        channel: String,
        /// Группа потребителей (по умолчанию общая группа моста)
        #[arg(short, long)]
        group: Option<String>,
        /// Завершиться после N сообщений
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
    /// Прогнать все виды значений через брокер
    Demo {
        #[arg(long, default_value = "@test")]
        channel: String,
        /// Пауза между публикациями, секунды
        #[arg(long, default_value_t = 1.0)]
        sleep: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // флаги CLI важнее переменных NSQBRIDGE_LOG_*
    let logging = init_logging(
        LoggingConfig::default().with_env_and_flags(cli.log_level.clone(), cli.log_format)?,
    )?;

    let settings = load_settings(&cli)?;
    let bridge = Bridge::connect(settings)
        .await
        .context("failed to connect to nsqd")?;

    let outcome = match cli.command {
        Commands::Pub {
            channel,
            values,
            repeat,
            interval_ms,
            file,
        } => {
            run_pub(
                &bridge,
                &channel,
                &values,
                repeat,
                Duration::from_millis(interval_ms),
                file,
            )
            .await
        }
        Commands::Sub {
            channel,
            group,
            count,
        } => run_sub(&bridge, &channel, group, count).await,
        Commands::Demo { channel, sleep } => run_demo(&bridge, &channel, sleep).await,
    };

    bridge.shutdown().await;
    logging.shutdown();
    outcome
}

fn load_settings(cli: &Cli) -> Result<BridgeSettings> {
    let mut settings = match &cli.config {
        Some(path) => BridgeSettings::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => BridgeSettings::load_or(DEFAULT_SERVER, DEFAULT_PATTERN)?,
    };
    if let Some(server) = &cli.server {
        settings.server = server.clone();
    }
    if let Some(pattern) = &cli.pattern {
        settings.pattern = pattern.clone();
    }
    settings.validate()?;
    Ok(settings)
}

/// JSON, если разбирается; иначе строка как есть.
fn parse_value(text: &str) -> Result<Value> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => Ok(Value::from_serialize(&json)?),
        Err(_) => Ok(Value::from(text)),
    }
}

async fn run_pub(
    bridge: &Bridge,
    channel: &str,
    values: &[String],
    repeat: u32,
    interval: Duration,
    file: Option<PathBuf>,
) -> Result<()> {
    let mut batch = values
        .iter()
        .map(|v| parse_value(v))
        .collect::<Result<Vec<_>>>()?;
    if let Some(path) = file {
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        batch.push(Value::Blob(Bytes::from(data)));
    }
    if batch.is_empty() {
        bail!("nothing to publish: pass values or --file");
    }

    let publisher = bridge.advertise(channel, 1)?;
    let mut sent = 0u64;
    for _ in 0..repeat {
        for value in &batch {
            publisher.publish(value.clone()).await?;
            sent += 1;
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
    }
    info!(channel, topic = %publisher.topic(), sent, "published");
    Ok(())
}

async fn run_sub(
    bridge: &Bridge,
    channel: &str,
    group: Option<String>,
    count: Option<u64>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let errors = tx.clone();
    let handler = handler_fn(
        move |value: Value| {
            let _ = tx.send(Ok(value));
        },
        move |err: &BridgeError| {
            let _ = errors.send(Err(err.clone()));
        },
    );
    let subscriber = bridge
        .subscribe(channel, group.unwrap_or_default(), handler)
        .await?;
    info!(channel, topic = %subscriber.topic(), group = %subscriber.group(), "subscribed");

    let mut received = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            item = rx.recv() => match item {
                Some(Ok(value)) => {
                    println!("{value}");
                    received += 1;
                    if count.is_some_and(|n| received >= n) {
                        break;
                    }
                }
                Some(Err(BridgeError::Transport(e))) => {
                    subscriber.cancel().await;
                    return Err(e).context("subscription failed");
                }
                Some(Err(e)) => warn!(error = %e, "skipped message"),
                None => break,
            },
        }
    }

    subscriber.cancel().await;
    Ok(())
}

/// Значения демонстрационного прогона в порядке публикации.
#[allow(clippy::approx_constant)]
fn demo_values() -> Vec<Value> {
    let mut person = ValueMap::new();
    person.insert("name", "zhaoyong");
    person.insert("age", 28);
    vec![
        Value::Null,
        Value::Bool(true),
        Value::Int(1),
        Value::Float(3.14),
        Value::from("hello world"),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::from("hello")]),
        Value::Map(person),
        Value::Blob(Bytes::from(vec![0xAB; 1024])),
    ]
}

async fn run_demo(
    bridge: &Bridge,
    channel: &str,
    sleep: f64,
) -> Result<()> {
    let values = demo_values();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscriber = bridge
        .subscribe(channel, 0, move |value: Value| {
            let _ = tx.send(value);
        })
        .await?;
    let publisher = bridge.advertise(channel, 1)?;
    let pause = Duration::try_from_secs_f64(sleep).context("invalid --sleep")?;

    for value in &values {
        info!(kind = %value.kind(), "publishing {value}");
        publisher.publish(value.clone()).await?;
        tokio::time::sleep(pause).await;
    }

    let mut received = Vec::with_capacity(values.len());
    while received.len() < values.len() {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(value)) => {
                println!("{value}");
                received.push(value);
            }
            Ok(None) | Err(_) => break,
        }
    }

    subscriber.cancel().await;
    if received != values {
        bail!(
            "demo received {} of {} values or out of order",
            received.len(),
            values.len()
        );
    }
    info!(count = received.len(), "demo round trip complete");
    Ok(())
}
