//! Handle публикаций и подписок поверх общего соединения с брокером.
//!
//! - `connection`: общая сессия и реестр активных handle.
//! - `handler`: обработчик доставленных сообщений.
//! - `publisher`: публикатор, привязанный к топику.
//! - `subscriber`: подписчик и его цикл доставки.

pub mod connection;
pub mod handler;
pub mod publisher;
pub mod subscriber;

pub use connection::{Connection, HandleId, HandleInfo, HandleKind};
pub use handler::{handler_fn, FnHandler, Handler};
pub use publisher::Publisher;
pub use subscriber::{Subscriber, SubscriberState};
