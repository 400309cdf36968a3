use std::fmt;

use serde::{Deserialize, Serialize};

/// Стандартная таксономия ошибок обмена сообщениями.
///
/// Каждый вид имеет стабильный числовой код, который передаётся по сети
/// в теле ERROR-сообщения. Коды начинаются с `65536`, чтобы не пересекаться
/// с кодами ошибок прикладных служб.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Сообщение не удалось доставить.
    DeliveryFailed,
    /// Истёк срок ожидания доставки или ответа.
    DeliveryTimedOut,
    /// Доставка задержана, но ещё возможна.
    DeliveryDelayed,
    /// Адресат неизвестен.
    DestinationUnknown,
    /// Адресат временно недоступен.
    DestinationTransient,
    /// Адресат потерян (например, локальная сторона закрывается).
    DestinationLost,
    /// Аутентификация отправителя не прошла.
    AuthenticationFailed,
    /// Отправителю не разрешена операция.
    AuthorisationFail,
    /// Ошибка шифрования/расшифровки.
    EncryptionFail,
    /// Область (area) не поддерживается.
    UnsupportedArea,
    /// Операция не поддерживается.
    UnsupportedOperation,
    /// Версия области не поддерживается.
    UnsupportedVersion,
    /// Сообщение не удалось раскодировать.
    BadEncoding,
    /// Внутренняя ошибка обработки.
    Internal,
    /// Превышен лимит (слишком много транзакций/подписок).
    TooMany,
}

impl ErrorKind {
    /// Числовой код вида ошибки для передачи по сети.
    pub const fn code(self) -> u32 {
        match self {
            ErrorKind::DeliveryFailed => 65536,
            ErrorKind::DeliveryTimedOut => 65537,
            ErrorKind::DeliveryDelayed => 65538,
            ErrorKind::DestinationUnknown => 65539,
            ErrorKind::DestinationTransient => 65540,
            ErrorKind::DestinationLost => 65541,
            ErrorKind::AuthenticationFailed => 65542,
            ErrorKind::AuthorisationFail => 65543,
            ErrorKind::EncryptionFail => 65544,
            ErrorKind::UnsupportedArea => 65545,
            ErrorKind::UnsupportedOperation => 65546,
            ErrorKind::UnsupportedVersion => 65547,
            ErrorKind::BadEncoding => 65548,
            ErrorKind::Internal => 65549,
            ErrorKind::TooMany => 65552,
        }
    }

    /// Обратное преобразование кода в вид ошибки.
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            65536 => ErrorKind::DeliveryFailed,
            65537 => ErrorKind::DeliveryTimedOut,
            65538 => ErrorKind::DeliveryDelayed,
            65539 => ErrorKind::DestinationUnknown,
            65540 => ErrorKind::DestinationTransient,
            65541 => ErrorKind::DestinationLost,
            65542 => ErrorKind::AuthenticationFailed,
            65543 => ErrorKind::AuthorisationFail,
            65544 => ErrorKind::EncryptionFail,
            65545 => ErrorKind::UnsupportedArea,
            65546 => ErrorKind::UnsupportedOperation,
            65547 => ErrorKind::UnsupportedVersion,
            65548 => ErrorKind::BadEncoding,
            65549 => ErrorKind::Internal,
            65552 => ErrorKind::TooMany,
            _ => return None,
        })
    }

    const fn label(self) -> &'static str {
        match self {
            ErrorKind::DeliveryFailed => "DELIVERY_FAILED",
            ErrorKind::DeliveryTimedOut => "DELIVERY_TIMEDOUT",
            ErrorKind::DeliveryDelayed => "DELIVERY_DELAYED",
            ErrorKind::DestinationUnknown => "DESTINATION_UNKNOWN",
            ErrorKind::DestinationTransient => "DESTINATION_TRANSIENT",
            ErrorKind::DestinationLost => "DESTINATION_LOST",
            ErrorKind::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorKind::AuthorisationFail => "AUTHORISATION_FAIL",
            ErrorKind::EncryptionFail => "ENCRYPTION_FAIL",
            ErrorKind::UnsupportedArea => "UNSUPPORTED_AREA",
            ErrorKind::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::BadEncoding => "BAD_ENCODING",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::TooMany => "TOO_MANY",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Стандартное тело ERROR-сообщения: вид ошибки плюс необязательная
/// диагностическая строка.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl StandardError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// Ошибка без диагностики, только вид.
    pub fn bare(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl fmt::Display for StandardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.kind, msg),
            None => write!(f, "{}", self.kind),
        }
    }
}
