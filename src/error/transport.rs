use thiserror::Error;

use crate::message::Uri;

/// Ошибки транспортного коллаборатора.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Транспорт не знает маршрута к URI.
    #[error("no route to {0}")]
    NoRoute(Uri),

    /// Отправка не удалась на уровне транспорта.
    #[error("send to {uri} failed: {detail}")]
    SendFailed { uri: Uri, detail: String },

    /// Транспорт закрыт.
    #[error("transport closed")]
    Closed,
}

/// Ошибки контроля доступа.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("authorisation failed: {0}")]
    Authorisation(String),
}
