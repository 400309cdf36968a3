//! Модель сообщения.
//!
//! - `uri`: interned адреса и идентификаторы.
//! - `header`: неизменяемый заголовок с адресацией, типом/стадией
//!   взаимодействия, QoS и корреляционным id.
//! - `body`: непрозрачное тело (элементы или стандартная ошибка).

pub mod body;
pub mod header;
pub mod uri;

pub use body::MessageBody;
pub use header::{InteractionType, MessageHeader, OperationKey, QosLevel, SessionType};
pub use uri::{domain, Domain, Identifier, Uri};
