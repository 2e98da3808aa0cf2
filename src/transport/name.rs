use std::{fmt, ops::Deref, sync::Arc};

use nsqbridge_error::RouteError;

/// Группа потребителей по умолчанию (используется `Messenger::subscribe`).
pub const DEFAULT_GROUP: &str = "messenger";

/// Максимальная длина имени топика или группы, включая суффикс `#ephemeral`.
pub const MAX_NAME_LEN: usize = 64;

const EPHEMERAL_SUFFIX: &str = "#ephemeral";

/// Проверяет имя по правилам брокера: 1..=64 символа из `[.a-zA-Z0-9_-]`,
/// необязательный суффикс `#ephemeral`.
pub fn validate_name(name: &str) -> Result<(), RouteError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.len() > MAX_NAME_LEN {
        "name is longer than 64 characters"
    } else if !is_valid_body(name.strip_suffix(EPHEMERAL_SUFFIX).unwrap_or(name)) {
        "name may only contain [.a-zA-Z0-9_-] with an optional #ephemeral suffix"
    } else {
        return Ok(());
    };
    Err(RouteError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

fn is_valid_body(body: &str) -> bool {
    !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

macro_rules! broker_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(name: impl AsRef<str>) -> Result<Self, RouteError> {
                let name = name.as_ref();
                validate_name(name)?;
                Ok(Self(Arc::from(name)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_ephemeral(&self) -> bool {
                self.0.ends_with(EPHEMERAL_SUFFIX)
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(
                &self,
                f: &mut fmt::Formatter<'_>,
            ) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = RouteError;

            fn try_from(v: &str) -> Result<Self, Self::Error> {
                Self::new(v)
            }
        }
    };
}

broker_name!(
    /// Имя топика брокера, прошедшее проверку.
    Topic
);

broker_name!(
    /// Имя группы потребителей (в терминах NSQ это channel).
    ConsumerGroup
);

impl ConsumerGroup {
    pub fn default_group() -> Self {
        Self(Arc::from(DEFAULT_GROUP))
    }
}

impl Default for ConsumerGroup {
    fn default() -> Self {
        Self::default_group()
    }
}
