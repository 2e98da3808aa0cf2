pub mod console;
pub mod file;

/// Слой, собранный из конфигурации; тип формата стирается.
pub type BoxedLayer<S> = Box<dyn tracing_subscriber::Layer<S> + Send + Sync + 'static>;
