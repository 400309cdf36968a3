use super::Stage;
use crate::error::StageError;
use crate::message::InteractionType;

/// Результат валидации перехода стадии.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progression {
    /// Взаимодействие продолжается, текущая стадия обновлена.
    Continue(Stage),
    /// Взаимодействие достигло терминальной стадии.
    Terminal(Stage),
}

impl Progression {
    pub const fn stage(self) -> Stage {
        match self {
            Progression::Continue(s) | Progression::Terminal(s) => s,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Progression::Terminal(_))
    }
}

/// Инициирующая стадия для типа взаимодействия.
pub const fn initial_stage(kind: InteractionType) -> Stage {
    match kind {
        InteractionType::Send => Stage::Send,
        InteractionType::Submit => Stage::Submit,
        InteractionType::Request => Stage::Request,
        InteractionType::Invoke => Stage::Invoke,
        InteractionType::Progress => Stage::Progress,
        // У PUBSUB несколько независимых подпотоков; REGISTER - условный
        // представитель, конкретную стадию несёт заголовок.
        InteractionType::PubSub => Stage::Register,
    }
}

/// Терминальна ли стадия для данного типа с учётом флага ошибки.
pub const fn is_terminal(kind: InteractionType, stage: Stage, is_error: bool) -> bool {
    match kind {
        InteractionType::Send => true,
        InteractionType::Submit => matches!(stage, Stage::SubmitAck),
        InteractionType::Request => matches!(stage, Stage::RequestResponse),
        InteractionType::Invoke => match stage {
            Stage::InvokeAck => is_error,
            Stage::InvokeResponse => true,
            _ => false,
        },
        InteractionType::Progress => match stage {
            Stage::ProgressAck | Stage::ProgressUpdate => is_error,
            Stage::ProgressResponse => true,
            _ => false,
        },
        InteractionType::PubSub => matches!(
            stage,
            Stage::RegisterAck
                | Stage::PublishRegisterAck
                | Stage::Publish
                | Stage::Notify
                | Stage::DeregisterAck
                | Stage::PublishDeregisterAck
                | Stage::PublishError
        ),
    }
}

/// Проверяет, что `stage` законно открывает взаимодействие типа `kind`.
pub fn open(kind: InteractionType, stage: Stage) -> Result<(), StageError> {
    if stage.interaction_type() != kind {
        return Err(StageError::ForeignStage { kind, stage });
    }
    if !stage.is_initiating() {
        return Err(StageError::NotInitiating { kind, stage });
    }
    Ok(())
}

/// Валидирует переход от текущей стадии к входящей.
///
/// Таблица переходов фиксирована по типу взаимодействия; любое ребро вне
/// таблицы — `IllegalTransition`. Входящая ошибка (`is_error`) не добавляет
/// рёбер: она терминальна в той точке, где была бы законная стадия ответа.
pub fn advance(
    kind: InteractionType,
    current: Stage,
    incoming: Stage,
    is_error: bool,
) -> Result<Progression, StageError> {
    if incoming.interaction_type() != kind {
        return Err(StageError::ForeignStage {
            kind,
            stage: incoming,
        });
    }

    let legal = match kind {
        // SEND терминален сразу, продолжений нет.
        InteractionType::Send => false,

        InteractionType::Submit => matches!((current, incoming), (Stage::Submit, Stage::SubmitAck)),

        InteractionType::Request => {
            matches!((current, incoming), (Stage::Request, Stage::RequestResponse))
        }

        InteractionType::Invoke => matches!(
            (current, incoming),
            (Stage::Invoke, Stage::InvokeAck) | (Stage::InvokeAck, Stage::InvokeResponse)
        ),

        InteractionType::Progress => matches!(
            (current, incoming),
            (Stage::Progress, Stage::ProgressAck)
                | (Stage::ProgressAck, Stage::ProgressUpdate)
                | (Stage::ProgressAck, Stage::ProgressResponse)
                | (Stage::ProgressUpdate, Stage::ProgressUpdate)
                | (Stage::ProgressUpdate, Stage::ProgressResponse)
        ),

        // Управляющие подпотоки PUBSUB: каждый запрос ждёт только свой ack.
        InteractionType::PubSub => matches!(
            (current, incoming),
            (Stage::Register, Stage::RegisterAck)
                | (Stage::PublishRegister, Stage::PublishRegisterAck)
                | (Stage::Deregister, Stage::DeregisterAck)
                | (Stage::PublishDeregister, Stage::PublishDeregisterAck)
        ),
    };

    if !legal {
        return Err(StageError::IllegalTransition {
            kind,
            from: current,
            to: incoming,
        });
    }

    if is_terminal(kind, incoming, is_error) {
        Ok(Progression::Terminal(incoming))
    } else {
        Ok(Progression::Continue(incoming))
    }
}

/// Стадия для ERROR-ответа из точки `current`.
///
/// `None` для стадий, у которых нет законного ответа (SEND, NOTIFY).
pub const fn error_stage(kind: InteractionType, current: Stage) -> Option<Stage> {
    match kind {
        InteractionType::Send => None,
        InteractionType::Submit => Some(Stage::SubmitAck),
        InteractionType::Request => Some(Stage::RequestResponse),
        InteractionType::Invoke => match current {
            Stage::Invoke => Some(Stage::InvokeAck),
            _ => Some(Stage::InvokeResponse),
        },
        InteractionType::Progress => match current {
            Stage::Progress => Some(Stage::ProgressAck),
            _ => Some(Stage::ProgressResponse),
        },
        InteractionType::PubSub => match current {
            Stage::Register => Some(Stage::RegisterAck),
            Stage::PublishRegister => Some(Stage::PublishRegisterAck),
            Stage::Publish => Some(Stage::PublishError),
            Stage::Deregister => Some(Stage::DeregisterAck),
            Stage::PublishDeregister => Some(Stage::PublishDeregisterAck),
            _ => None,
        },
    }
}
