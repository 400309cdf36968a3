use std::sync::Arc;

use crate::{
    error::{EngineResult, StageError, StandardError},
    interaction::{self, Stage},
    message::{InteractionType, MessageBody, MessageHeader},
    transaction::{Transaction, TransactionTable},
    transport::MessageSender,
};

/// Контекст провайдерской стороны одного взаимодействия.
///
/// Передаётся обработчику операции вместе с телом инициирующего сообщения
/// и даёт ему поэтапные ответы. Исходящие стадии проходят ту же машину
/// состояний, что и входящие: обработчик физически не может ответить
/// мимо легальной последовательности.
#[derive(Clone)]
pub struct ProviderContext {
    header: MessageHeader,
    tx: Arc<Transaction>,
    table: Arc<TransactionTable>,
    sender: Arc<MessageSender>,
}

impl ProviderContext {
    pub(crate) fn new(
        header: MessageHeader,
        tx: Arc<Transaction>,
        table: Arc<TransactionTable>,
        sender: Arc<MessageSender>,
    ) -> Self {
        Self {
            header,
            tx,
            table,
            sender,
        }
    }

    /// Заголовок инициирующего сообщения.
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn kind(&self) -> InteractionType {
        self.tx.kind
    }

    /// Подтверждение (SUBMIT_ACK / INVOKE_ACK / PROGRESS_ACK).
    pub async fn ack(&self, body: MessageBody) -> EngineResult<()> {
        let stage = match self.kind() {
            InteractionType::Submit => Stage::SubmitAck,
            InteractionType::Invoke => Stage::InvokeAck,
            InteractionType::Progress => Stage::ProgressAck,
            kind => {
                return Err(StageError::MissingStage { kind, role: "ack" }.into());
            }
        };
        self.reply(stage, body).await
    }

    /// Промежуточное обновление (только PROGRESS).
    pub async fn update(&self, body: MessageBody) -> EngineResult<()> {
        match self.kind() {
            InteractionType::Progress => self.reply(Stage::ProgressUpdate, body).await,
            kind => Err(StageError::MissingStage {
                kind,
                role: "update",
            }
            .into()),
        }
    }

    /// Завершающий ответ (REQUEST/INVOKE/PROGRESS_RESPONSE).
    pub async fn respond(&self, body: MessageBody) -> EngineResult<()> {
        let stage = match self.kind() {
            InteractionType::Request => Stage::RequestResponse,
            InteractionType::Invoke => Stage::InvokeResponse,
            InteractionType::Progress => Stage::ProgressResponse,
            kind => {
                return Err(StageError::MissingStage {
                    kind,
                    role: "response",
                }
                .into());
            }
        };
        self.reply(stage, body).await
    }

    /// ERROR-ответ в ближайшей легальной точке потока. Терминален.
    pub async fn error(&self, error: StandardError) -> EngineResult<()> {
        let stage = interaction::error_stage(self.kind(), self.tx.stage()).ok_or(
            StageError::MissingStage {
                kind: self.kind(),
                role: "error",
            },
        )?;

        let progression = self.tx.advance(stage, true)?;
        let header = self.header.error_reply(stage);
        let result = self.sender.post(&header, &MessageBody::Error(error)).await;
        if progression.is_terminal() {
            self.table.complete(&self.tx.key);
        }
        result
    }

    async fn reply(&self, stage: Stage, body: MessageBody) -> EngineResult<()> {
        let progression = self.tx.advance(stage, false)?;
        let header = self.header.reply(stage);
        let result = self.sender.post(&header, &body).await;
        if progression.is_terminal() {
            self.table.complete(&self.tx.key);
        }
        result
    }
}
