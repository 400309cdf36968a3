use thiserror::Error;

use crate::interaction::Stage;
use crate::message::Uri;

/// Ошибки брокера Pub/Sub.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Привязка брокера уже закрыта.
    #[error("broker binding closed")]
    Closed,

    /// Ключ публикации не покрыт декларацией издателя.
    #[error("publish key not covered by declaration of {publisher}")]
    UndeclaredKey { publisher: Uri },

    /// Тело управляющего сообщения не удалось разобрать.
    #[error("malformed {stage} body: {detail}")]
    MalformedBody { stage: Stage, detail: String },
}
