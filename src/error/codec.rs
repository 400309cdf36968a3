use thiserror::Error;

use crate::message::MessageHeader;

/// Ошибки кодека сообщений.
///
/// Заголовок и тело кодируются раздельно: если заголовок удалось
/// раскодировать, а тело — нет, ошибка несёт заголовок, чтобы диспетчер
/// мог ответить отправителю `BAD_ENCODING`.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame truncated")]
    Truncated,

    #[error("header decode failed: {0}")]
    Header(String),

    #[error("body decode failed for tx {}: {detail}", .header.transaction_id)]
    Body {
        header: Box<MessageHeader>,
        detail: String,
    },

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("element decode failed: {0}")]
    Element(String),
}
