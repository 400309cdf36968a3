use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::CodecError,
    message::{MessageBody, MessageHeader},
};

/// Кодек кадра: (заголовок, тело) <-> байты.
///
/// Байтовая раскладка кадра — не предмет соответствия: ядро трактует её
/// как деталь коллаборатора. Заголовок и тело кодируются раздельно, чтобы
/// при битом теле диспетчер всё ещё знал, кому ответить `BAD_ENCODING`.
pub trait MessageCodec: Send + Sync {
    fn encode(&self, header: &MessageHeader, body: &MessageBody) -> Result<Bytes, CodecError>;

    fn decode(&self, frame: Bytes) -> Result<(MessageHeader, MessageBody), CodecError>;
}

/// Кодек по умолчанию на bincode: `[len_header u32 BE][header][body]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl MessageCodec for BincodeCodec {
    fn encode(&self, header: &MessageHeader, body: &MessageBody) -> Result<Bytes, CodecError> {
        let header_bytes =
            bincode::serialize(header).map_err(|e| CodecError::Encode(e.to_string()))?;
        let body_bytes = bincode::serialize(body).map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut frame = BytesMut::with_capacity(4 + header_bytes.len() + body_bytes.len());
        frame.put_u32(header_bytes.len() as u32);
        frame.put_slice(&header_bytes);
        frame.put_slice(&body_bytes);
        Ok(frame.freeze())
    }

    fn decode(&self, frame: Bytes) -> Result<(MessageHeader, MessageBody), CodecError> {
        if frame.len() < 4 {
            return Err(CodecError::Truncated);
        }
        let header_len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        if frame.len() < 4 + header_len {
            return Err(CodecError::Truncated);
        }

        let header: MessageHeader = bincode::deserialize(&frame[4..4 + header_len])
            .map_err(|e| CodecError::Header(e.to_string()))?;

        let body: MessageBody =
            bincode::deserialize(&frame[4 + header_len..]).map_err(|e| CodecError::Body {
                header: Box::new(header.clone()),
                detail: e.to_string(),
            })?;

        Ok((header, body))
    }
}

/// Кодирует одно типизированное значение в непрозрачный элемент тела.
pub fn encode_element<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Раскодирует непрозрачный элемент тела обратно в значение.
pub fn decode_element<T: DeserializeOwned>(element: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(element).map_err(|e| CodecError::Element(e.to_string()))
}
