use std::fs;

use nsqbridge_error::ConfigError;
use tracing::Subscriber;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{fmt, registry::LookupSpan, Layer};

use super::BoxedLayer;
use crate::logging::config::{FileSinkConfig, LogFormat};

/// Файловый слой с ежедневной ротацией. Запись неблокирующая; guard должен
/// жить до конца процесса, иначе хвост лога теряется.
pub fn layer<S>(
    file: &FileSinkConfig,
    format: LogFormat,
) -> Result<(BoxedLayer<S>, WorkerGuard), ConfigError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(&file.dir).map_err(|e| {
        ConfigError::invalid("log_dir", format!("{}: {e}", file.dir.display()))
    })?;

    let appender = daily(&file.dir, &file.prefix);
    let (writer, guard) = non_blocking(appender);

    let base = fmt::layer().with_ansi(false).with_writer(writer);
    let layer = match format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty | LogFormat::Compact => base.boxed(),
    };
    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет создание каталога и запись строки в файл.
    #[test]
    fn test_file_layer_writes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        let cfg = FileSinkConfig::new(&dir);

        let (layer, guard) = layer::<Registry>(&cfg, LogFormat::Compact).unwrap();
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("written to file");
        });
        drop(guard);

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        let text = fs::read_to_string(entries[0].path()).unwrap();
        assert!(text.contains("written to file"));
    }
}
