use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::message::InteractionType;

/// Стадия взаимодействия.
///
/// Один плоский enum на все типы взаимодействий; числовые коды стадий
/// локальны для своего типа (см. [`wire_code`](Self::wire_code)), как их
/// и несёт заголовок.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    // ==== SEND ====
    Send,

    // ==== SUBMIT ====
    Submit,
    SubmitAck,

    // ==== REQUEST ====
    Request,
    RequestResponse,

    // ==== INVOKE ====
    Invoke,
    InvokeAck,
    InvokeResponse,

    // ==== PROGRESS ====
    Progress,
    ProgressAck,
    ProgressUpdate,
    ProgressResponse,

    // ==== PUBSUB ====
    Register,
    RegisterAck,
    PublishRegister,
    PublishRegisterAck,
    Publish,
    Notify,
    Deregister,
    DeregisterAck,
    PublishDeregister,
    PublishDeregisterAck,
    PublishError,
}

impl Stage {
    /// Тип взаимодействия, которому принадлежит стадия.
    pub const fn interaction_type(self) -> InteractionType {
        match self {
            Stage::Send => InteractionType::Send,
            Stage::Submit | Stage::SubmitAck => InteractionType::Submit,
            Stage::Request | Stage::RequestResponse => InteractionType::Request,
            Stage::Invoke | Stage::InvokeAck | Stage::InvokeResponse => InteractionType::Invoke,
            Stage::Progress
            | Stage::ProgressAck
            | Stage::ProgressUpdate
            | Stage::ProgressResponse => InteractionType::Progress,
            Stage::Register
            | Stage::RegisterAck
            | Stage::PublishRegister
            | Stage::PublishRegisterAck
            | Stage::Publish
            | Stage::Notify
            | Stage::Deregister
            | Stage::DeregisterAck
            | Stage::PublishDeregister
            | Stage::PublishDeregisterAck
            | Stage::PublishError => InteractionType::PubSub,
        }
    }

    /// Числовой код стадии в рамках своего типа взаимодействия.
    pub const fn wire_code(self) -> u8 {
        match self {
            Stage::Send => 1,

            Stage::Submit => 1,
            Stage::SubmitAck => 2,

            Stage::Request => 1,
            Stage::RequestResponse => 2,

            Stage::Invoke => 1,
            Stage::InvokeAck => 2,
            Stage::InvokeResponse => 3,

            Stage::Progress => 1,
            Stage::ProgressAck => 2,
            Stage::ProgressUpdate => 3,
            Stage::ProgressResponse => 4,

            Stage::Register => 1,
            Stage::RegisterAck => 2,
            Stage::PublishRegister => 3,
            Stage::PublishRegisterAck => 4,
            Stage::Publish => 5,
            Stage::Notify => 6,
            Stage::Deregister => 7,
            Stage::DeregisterAck => 8,
            Stage::PublishDeregister => 9,
            Stage::PublishDeregisterAck => 10,
            Stage::PublishError => 11,
        }
    }

    /// Восстанавливает стадию из пары (тип, код).
    pub fn from_wire(kind: InteractionType, code: u8) -> Result<Stage, StageError> {
        let stage = match (kind, code) {
            (InteractionType::Send, 1) => Stage::Send,

            (InteractionType::Submit, 1) => Stage::Submit,
            (InteractionType::Submit, 2) => Stage::SubmitAck,

            (InteractionType::Request, 1) => Stage::Request,
            (InteractionType::Request, 2) => Stage::RequestResponse,

            (InteractionType::Invoke, 1) => Stage::Invoke,
            (InteractionType::Invoke, 2) => Stage::InvokeAck,
            (InteractionType::Invoke, 3) => Stage::InvokeResponse,

            (InteractionType::Progress, 1) => Stage::Progress,
            (InteractionType::Progress, 2) => Stage::ProgressAck,
            (InteractionType::Progress, 3) => Stage::ProgressUpdate,
            (InteractionType::Progress, 4) => Stage::ProgressResponse,

            (InteractionType::PubSub, 1) => Stage::Register,
            (InteractionType::PubSub, 2) => Stage::RegisterAck,
            (InteractionType::PubSub, 3) => Stage::PublishRegister,
            (InteractionType::PubSub, 4) => Stage::PublishRegisterAck,
            (InteractionType::PubSub, 5) => Stage::Publish,
            (InteractionType::PubSub, 6) => Stage::Notify,
            (InteractionType::PubSub, 7) => Stage::Deregister,
            (InteractionType::PubSub, 8) => Stage::DeregisterAck,
            (InteractionType::PubSub, 9) => Stage::PublishDeregister,
            (InteractionType::PubSub, 10) => Stage::PublishDeregisterAck,
            (InteractionType::PubSub, 11) => Stage::PublishError,

            _ => return Err(StageError::UnknownStage { kind, code }),
        };
        Ok(stage)
    }

    /// Стадия открывает новое взаимодействие (или управляющий подпоток
    /// PUBSUB) и адресована провайдеру/брокеру.
    pub const fn is_initiating(self) -> bool {
        matches!(
            self,
            Stage::Send
                | Stage::Submit
                | Stage::Request
                | Stage::Invoke
                | Stage::Progress
                | Stage::Register
                | Stage::PublishRegister
                | Stage::Publish
                | Stage::Deregister
                | Stage::PublishDeregister
        )
    }

    /// Стадии, которые доставляются без ожидающей транзакции:
    /// NOTIFY подписчику и PUBLISH_ERROR издателю.
    pub const fn is_unsolicited(self) -> bool {
        matches!(self, Stage::Notify | Stage::PublishError)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Send => "SEND",
            Stage::Submit => "SUBMIT",
            Stage::SubmitAck => "SUBMIT_ACK",
            Stage::Request => "REQUEST",
            Stage::RequestResponse => "REQUEST_RESPONSE",
            Stage::Invoke => "INVOKE",
            Stage::InvokeAck => "INVOKE_ACK",
            Stage::InvokeResponse => "INVOKE_RESPONSE",
            Stage::Progress => "PROGRESS",
            Stage::ProgressAck => "PROGRESS_ACK",
            Stage::ProgressUpdate => "PROGRESS_UPDATE",
            Stage::ProgressResponse => "PROGRESS_RESPONSE",
            Stage::Register => "REGISTER",
            Stage::RegisterAck => "REGISTER_ACK",
            Stage::PublishRegister => "PUBLISH_REGISTER",
            Stage::PublishRegisterAck => "PUBLISH_REGISTER_ACK",
            Stage::Publish => "PUBLISH",
            Stage::Notify => "NOTIFY",
            Stage::Deregister => "DEREGISTER",
            Stage::DeregisterAck => "DEREGISTER_ACK",
            Stage::PublishDeregister => "PUBLISH_DEREGISTER",
            Stage::PublishDeregisterAck => "PUBLISH_DEREGISTER_ACK",
            Stage::PublishError => "PUBLISH_ERROR",
        };
        write!(f, "{s}")
    }
}
