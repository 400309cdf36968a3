use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StandardError;

/// Тело сообщения.
///
/// Ядро не заглядывает внутрь элементов: это непрозрачные байты,
/// произведённые кодеком прикладного уровня. Единственное исключение —
/// стандартное тело ошибки, когда в заголовке поднят `is_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Последовательность закодированных элементов.
    Elements(Vec<Bytes>),
    /// Стандартная ошибка вместо полезной нагрузки.
    Error(StandardError),
}

impl MessageBody {
    /// Пустое тело (ни одного элемента).
    pub fn empty() -> Self {
        MessageBody::Elements(Vec::new())
    }

    /// Тело из одного элемента.
    pub fn single(element: Bytes) -> Self {
        MessageBody::Elements(vec![element])
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MessageBody::Error(_))
    }

    /// Элементы тела, если это не ошибка.
    pub fn elements(&self) -> Option<&[Bytes]> {
        match self {
            MessageBody::Elements(els) => Some(els),
            MessageBody::Error(_) => None,
        }
    }

    /// Стандартная ошибка, если тело ошибочное.
    pub fn as_error(&self) -> Option<&StandardError> {
        match self {
            MessageBody::Error(err) => Some(err),
            MessageBody::Elements(_) => None,
        }
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::empty()
    }
}
