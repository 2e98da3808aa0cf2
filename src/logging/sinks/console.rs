use tracing::Subscriber;
use tracing_subscriber::{fmt, registry::LookupSpan, Layer};

use super::BoxedLayer;
use crate::logging::config::{LogFormat, LoggingConfig};

/// Консольный слой. Пишет в stderr, чтобы stdout оставался за данными.
pub fn layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(true);

    match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().with_current_span(false).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что слой собирается для каждого формата и что
    /// вызов логирования не паникует.
    #[test]
    fn test_layer_for_each_format() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            let cfg = LoggingConfig {
                ansi: false,
                ..Default::default()
            }
            .with_format(format);
            let subscriber = Registry::default().with(layer::<Registry>(&cfg));
            tracing::subscriber::with_default(subscriber, || {
                info!(format = %format, "console layer smoke test");
            });
        }
    }
}
