//! Конфигурация: параметры конструирования моста и опции публикаторов.

pub mod options;
pub mod settings;

pub use options::AdvertiseOptions;
pub use settings::{BridgeSettings, ENV_PREFIX, KNOWN_KEYS};
