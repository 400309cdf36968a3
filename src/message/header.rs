use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{Domain, Identifier, Uri};
use crate::interaction::Stage;

/// Тип взаимодействия: фиксированный шаблон обмена сообщениями.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionType {
    /// Односторонняя посылка без ответа.
    Send,
    /// Посылка с подтверждением.
    Submit,
    /// Запрос с одним ответом.
    Request,
    /// Запрос с подтверждением и ответом.
    Invoke,
    /// Запрос с подтверждением, потоком промежуточных обновлений и ответом.
    Progress,
    /// Публикация/подписка через брокера.
    PubSub,
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InteractionType::Send => "SEND",
            InteractionType::Submit => "SUBMIT",
            InteractionType::Request => "REQUEST",
            InteractionType::Invoke => "INVOKE",
            InteractionType::Progress => "PROGRESS",
            InteractionType::PubSub => "PUBSUB",
        };
        write!(f, "{s}")
    }
}

/// Класс гарантий доставки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosLevel {
    /// Потеря допустима, ошибки доставки не всплывают.
    BestEffort,
    /// Доставка подтверждается, ошибки всплывают.
    Assured,
    /// Как Assured, плюс очередь на стороне транспорта.
    Queued,
    /// Как Assured, плюс контроль сроков.
    Timely,
}

/// Тип сессии, в рамках которой идёт обмен.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    /// Работа с живым аппаратом.
    Live,
    /// Тренажёр/симуляция.
    Simulation,
    /// Воспроизведение записанных данных.
    Replay,
}

/// Адрес операции: область, её версия, служба, операция.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub area: u16,
    pub area_version: u8,
    pub service: u16,
    pub operation: u16,
}

impl OperationKey {
    pub fn new(area: u16, area_version: u8, service: u16, operation: u16) -> Self {
        Self {
            area,
            area_version,
            service,
            operation,
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}v{}/{}/{}",
            self.area, self.area_version, self.service, self.operation
        )
    }
}

/// Заголовок сообщения.
///
/// Неизменяемое значение: описывает адресацию, тип и стадию взаимодействия,
/// QoS и корреляционный идентификатор одного сообщения. Вся логика обмена
/// живёт в других модулях, заголовок только данные.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub uri_from: Uri,
    pub uri_to: Uri,
    /// Уникален в паре (uri_to, uri_from), пока транзакция жива.
    pub transaction_id: u64,
    pub interaction_type: InteractionType,
    pub stage: Stage,
    pub qos: QosLevel,
    pub session: SessionType,
    pub session_name: Identifier,
    pub priority: u32,
    pub domain: Domain,
    pub area: u16,
    pub area_version: u8,
    pub service: u16,
    pub operation: u16,
    pub is_error: bool,
    /// Непрозрачный блоб аутентификации, проверяется коллаборатором.
    pub auth_id: Bytes,
}

impl MessageHeader {
    /// Адрес операции из полей заголовка.
    pub fn operation_key(&self) -> OperationKey {
        OperationKey::new(self.area, self.area_version, self.service, self.operation)
    }

    /// Заголовок ответа на это сообщение: адреса переставлены, стадия
    /// заменена, корреляционные поля сохранены.
    pub fn reply(&self, stage: Stage) -> MessageHeader {
        MessageHeader {
            uri_from: self.uri_to.clone(),
            uri_to: self.uri_from.clone(),
            transaction_id: self.transaction_id,
            interaction_type: self.interaction_type,
            stage,
            qos: self.qos,
            session: self.session,
            session_name: self.session_name.clone(),
            priority: self.priority,
            domain: self.domain.clone(),
            area: self.area,
            area_version: self.area_version,
            service: self.service,
            operation: self.operation,
            is_error: false,
            auth_id: Bytes::new(),
        }
    }

    /// То же, что [`reply`](Self::reply), но с поднятым флагом ошибки.
    pub fn error_reply(&self, stage: Stage) -> MessageHeader {
        let mut header = self.reply(stage);
        header.is_error = true;
        header
    }
}
