use thiserror::Error;

use super::{
    AccessError, BrokerError, CodecError, ErrorKind, StageError, StandardError, TransactionError,
    TransportError,
};
use crate::message::Uri;

pub type EngineResult<T> = Result<T, EngineError>;

/// Единый тип ошибок ядра.
///
/// Все ошибки, возникающие при маршрутизации, валидации и доставке,
/// собираются сюда и на границе диспетчера превращаются в ERROR-сообщение
/// со стандартным видом ошибки (`ErrorKind`). Дальше диспетчера они не
/// распространяются.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Сообщение адресовано URI, который здесь не обслуживается.
    #[error("destination {0} is not served here")]
    DestinationUnknown(Uri),

    /// Область не зарегистрирована ни одним обработчиком.
    #[error("area {area} is not supported")]
    UnsupportedArea { area: u16 },

    /// Область есть, но другой версии.
    #[error("version {version} of area {area} is not supported")]
    UnsupportedVersion { area: u16, version: u8 },

    /// Область есть, операции нет.
    #[error("operation {operation} of service {service} is not supported")]
    UnsupportedOperation { service: u16, operation: u16 },

    /// Обработчик операции вернул ошибку.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Локальная конечная точка закрыта.
    #[error("endpoint closed")]
    Closed,

    /// Дедлайн взаимодействия истёк без ответа.
    #[error("interaction timed out")]
    TimedOut,

    /// Ответ удалённой стороны со стандартной ошибкой.
    #[error("remote error: {0}")]
    Remote(StandardError),
}

impl EngineError {
    /// Вид стандартной ошибки для ERROR-ответа.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Stage(_) => ErrorKind::Internal,
            EngineError::Transaction(TransactionError::Duplicate { .. }) => ErrorKind::Internal,
            EngineError::Transaction(TransactionError::Unknown { .. }) => ErrorKind::Internal,
            EngineError::Codec(_) => ErrorKind::BadEncoding,
            EngineError::Transport(TransportError::NoRoute(_)) => ErrorKind::DestinationUnknown,
            EngineError::Transport(_) => ErrorKind::DeliveryFailed,
            EngineError::Access(AccessError::Authentication(_)) => ErrorKind::AuthenticationFailed,
            EngineError::Access(AccessError::Authorisation(_)) => ErrorKind::AuthorisationFail,
            EngineError::Broker(BrokerError::Closed) => ErrorKind::DestinationLost,
            EngineError::Broker(BrokerError::UndeclaredKey { .. }) => ErrorKind::AuthorisationFail,
            EngineError::Broker(BrokerError::MalformedBody { .. }) => ErrorKind::BadEncoding,
            EngineError::DestinationUnknown(_) => ErrorKind::DestinationUnknown,
            EngineError::UnsupportedArea { .. } => ErrorKind::UnsupportedArea,
            EngineError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            EngineError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            EngineError::Handler(_) => ErrorKind::Internal,
            EngineError::Closed => ErrorKind::DestinationLost,
            EngineError::TimedOut => ErrorKind::DeliveryTimedOut,
            EngineError::Remote(err) => err.kind,
        }
    }

    /// Стандартное тело ERROR-сообщения для этой ошибки.
    pub fn to_standard(&self) -> StandardError {
        match self {
            EngineError::Remote(err) => err.clone(),
            other => StandardError::new(other.kind(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет маппинг характерных ошибок на стандартные виды.
    #[test]
    fn test_kind_mapping() {
        let err = EngineError::UnsupportedArea { area: 7 };
        assert_eq!(err.kind(), ErrorKind::UnsupportedArea);

        let err = EngineError::Transport(TransportError::Closed);
        assert_eq!(err.kind(), ErrorKind::DeliveryFailed);

        let err = EngineError::Access(AccessError::Authorisation("denied".into()));
        assert_eq!(err.kind(), ErrorKind::AuthorisationFail);
    }

    /// Тест проверяет, что `Remote` сохраняет исходный вид и текст ошибки.
    #[test]
    fn test_remote_passthrough() {
        let std_err = StandardError::new(ErrorKind::TooMany, "subscription limit");
        let err = EngineError::Remote(std_err.clone());
        assert_eq!(err.kind(), ErrorKind::TooMany);
        assert_eq!(err.to_standard(), std_err);
    }
}
