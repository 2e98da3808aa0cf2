use nsqbridge_error::{BridgeError, ErrorExt, LogLevel};
use tracing::{debug, error, info, warn};

use super::SubscriberState;
use crate::envelope::Value;

/// Обработчик доставленных сообщений.
///
/// Вызывается из цикла доставки своего подписчика строго последовательно.
/// Долгий обработчик тормозит только свой подписчик.
pub trait Handler: Send + 'static {
    /// Очередное декодированное значение.
    fn on_message(
        &mut self,
        value: Value,
    );

    /// Ошибка на пути доставки. Ошибка декодирования не прерывает цикл;
    /// ошибка транспорта последняя, за ней следует [`Handler::on_closed`].
    ///
    /// По умолчанию пишет ошибку в лог с уровнем её статус-кода.
    fn on_error(
        &mut self,
        err: &BridgeError,
    ) {
        log_error(err);
    }

    /// Цикл доставки завершён.
    fn on_closed(
        &mut self,
        _state: SubscriberState,
    ) {
    }
}

impl<F> Handler for F
where
    F: FnMut(Value) + Send + 'static,
{
    fn on_message(
        &mut self,
        value: Value,
    ) {
        self(value)
    }
}

/// Обработчик из пары замыканий: для сообщений и для ошибок.
pub struct FnHandler<M, E> {
    on_message: M,
    on_error: E,
}

/// Собирает обработчик, который сам разбирает ошибки доставки.
pub fn handler_fn<M, E>(
    on_message: M,
    on_error: E,
) -> FnHandler<M, E>
where
    M: FnMut(Value) + Send + 'static,
    E: FnMut(&BridgeError) + Send + 'static,
{
    FnHandler {
        on_message,
        on_error,
    }
}

impl<M, E> Handler for FnHandler<M, E>
where
    M: FnMut(Value) + Send + 'static,
    E: FnMut(&BridgeError) + Send + 'static,
{
    fn on_message(
        &mut self,
        value: Value,
    ) {
        (self.on_message)(value)
    }

    fn on_error(
        &mut self,
        err: &BridgeError,
    ) {
        (self.on_error)(err)
    }
}

pub(crate) fn log_error(err: &BridgeError) {
    let code = err.status_code();
    let kind = err.category();
    match err.log_level() {
        LogLevel::Debug => debug!(kind, code = %code, error = %err, "delivery error"),
        LogLevel::Info => info!(kind, code = %code, error = %err, "delivery error"),
        LogLevel::Warn => warn!(kind, code = %code, error = %err, "delivery error"),
        LogLevel::Error => error!(kind, code = %code, error = %err, "delivery error"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use nsqbridge_error::DecodeError;

    use super::*;

    #[test]
    fn test_closure_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handler = move |v: Value| sink.lock().unwrap().push(v);

        handler.on_message(Value::Int(1));
        handler.on_message(Value::from("two"));
        // обработка ошибки по умолчанию только пишет в лог
        handler.on_error(&DecodeError::UnexpectedEof.into());

        assert_eq!(*seen.lock().unwrap(), vec![Value::Int(1), Value::from("two")]);
    }

    /// Тест проверяет, что пара замыканий получает и значения, и ошибки.
    #[test]
    fn test_handler_fn() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let mut handler = handler_fn(
            |_v| {},
            move |e: &BridgeError| sink.lock().unwrap().push(e.clone()),
        );

        handler.on_message(Value::Null);
        handler.on_error(&DecodeError::InvalidBool(7).into());
        handler.on_closed(SubscriberState::Cancelled);

        assert_eq!(
            *errors.lock().unwrap(),
            vec![BridgeError::Decode(DecodeError::InvalidBool(7))]
        );
    }
}
