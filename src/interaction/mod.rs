//! Машина состояний взаимодействий.
//!
//! - `stage`: стадии всех шести типов взаимодействий и их сетевые коды.
//! - `machine`: таблица законных переходов и валидация.

pub mod machine;
pub mod stage;

pub use machine::{advance, error_stage, initial_stage, is_terminal, open, Progression};
pub use stage::Stage;

pub use crate::message::InteractionType;
