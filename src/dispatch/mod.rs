//! Диспетчер сообщений.
//!
//! - `dispatcher`: демультиплексирование входящих сообщений, очереди с
//!   порядком по транзакции, ограничение ширины пулом, свипер дедлайнов.
//! - `registry`: реестр провайдерских обработчиков операций.
//! - `context`: контекст поэтапных ответов провайдера.

pub mod context;
pub mod dispatcher;
pub mod registry;

pub use context::ProviderContext;
pub use dispatcher::Dispatcher;
pub use registry::{OperationHandler, OperationRegistry};

use crate::{broker::Notification, error::StandardError, message::MessageHeader};

/// Сторона-потребитель Pub/Sub: колбэки для NOTIFY и PUBLISH_ERROR.
///
/// Регистрируется на конечной точке по адресу операции. Методы по
/// умолчанию пустые: подписчику не нужен `on_publish_error`, издателю —
/// `on_notify`.
pub trait PubSubListener: Send + Sync {
    fn on_notify(&self, _header: &MessageHeader, _notification: Notification) {}

    fn on_publish_error(&self, _header: &MessageHeader, _error: StandardError) {}
}
