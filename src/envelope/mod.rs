//! Самоописывающий бинарный конверт для значений приложения.
//!
//! Одно сообщение брокера несёт ровно один конверт. Закон обратимости:
//! `decode(&encode(&v)?)? == v` для любого представимого `v`.

pub mod decode;
pub mod encode;
pub mod map;
pub mod ser;
pub mod tags;
pub mod value;

pub use decode::{decode, read_value};
pub use encode::{encode, write_value};
pub use map::ValueMap;
pub use tags::MAX_DEPTH;
pub use value::{Value, ValueKind};
