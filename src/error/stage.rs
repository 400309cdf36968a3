use thiserror::Error;

use crate::interaction::{InteractionType, Stage};

/// Ошибки машины состояний взаимодействий.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("unknown stage code {code} for interaction type {kind}")]
    UnknownStage { kind: InteractionType, code: u8 },

    #[error("stage {stage} does not belong to interaction type {kind}")]
    ForeignStage { kind: InteractionType, stage: Stage },

    #[error("stage {stage} does not initiate a {kind} interaction")]
    NotInitiating { kind: InteractionType, stage: Stage },

    #[error("illegal stage transition for {kind}: {from} -> {to}")]
    IllegalTransition {
        kind: InteractionType,
        from: Stage,
        to: Stage,
    },

    #[error("interaction type {kind} has no {role} stage")]
    MissingStage {
        kind: InteractionType,
        role: &'static str,
    },
}
