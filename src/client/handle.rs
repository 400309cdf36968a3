use tokio::sync::mpsc;

use crate::{
    error::{EngineError, EngineResult},
    message::MessageBody,
    transaction::InteractionEvent,
};

/// Ручка инициированного взаимодействия на стороне потребителя.
///
/// События приходят в порядке стадий: подтверждения, обновления, затем
/// терминальное (ответ, ошибка или таймаут). После терминального события
/// канал закрывается — транзакции в таблице больше нет.
#[derive(Debug)]
pub struct InteractionHandle {
    tx_id: u64,
    events: mpsc::UnboundedReceiver<InteractionEvent>,
}

impl InteractionHandle {
    pub(crate) fn new(tx_id: u64, events: mpsc::UnboundedReceiver<InteractionEvent>) -> Self {
        Self { tx_id, events }
    }

    /// Идентификатор транзакции этого взаимодействия.
    pub fn tx_id(&self) -> u64 {
        self.tx_id
    }

    /// Следующее событие; `None` после терминального.
    pub async fn next_event(&mut self) -> Option<InteractionEvent> {
        self.events.recv().await
    }

    /// Ждёт подтверждение.
    ///
    /// # Возвращает
    /// - `Ok(body)` на Ack
    /// - `Err(Remote)` на пришедшую ERROR-стадию
    /// - `Err(TimedOut)` по дедлайну
    pub async fn await_ack(&mut self) -> EngineResult<MessageBody> {
        match self.next_event().await {
            Some(InteractionEvent::Ack(body)) => Ok(body),
            Some(InteractionEvent::Error(err)) => Err(EngineError::Remote(err)),
            Some(InteractionEvent::TimedOut) => Err(EngineError::TimedOut),
            Some(other) => Err(EngineError::Handler(format!(
                "unexpected event while waiting for ack: {other:?}"
            ))),
            None => Err(EngineError::Closed),
        }
    }

    /// Ждёт завершающий ответ, пропуская подтверждения и обновления.
    pub async fn await_response(&mut self) -> EngineResult<MessageBody> {
        loop {
            match self.next_event().await {
                Some(InteractionEvent::Ack(_)) | Some(InteractionEvent::Update(_)) => continue,
                Some(InteractionEvent::Response(body)) => return Ok(body),
                Some(InteractionEvent::Error(err)) => return Err(EngineError::Remote(err)),
                Some(InteractionEvent::TimedOut) => return Err(EngineError::TimedOut),
                None => return Err(EngineError::Closed),
            }
        }
    }
}
