use thiserror::Error;

use crate::message::Uri;

/// Ошибки таблицы транзакций.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Для пары (id, peer) уже есть живая транзакция.
    #[error("duplicate transaction {tx_id} with peer {peer}")]
    Duplicate { tx_id: u64, peer: Uri },

    /// Транзакция не найдена (не начиналась или уже завершена).
    #[error("unknown transaction {tx_id} with peer {peer}")]
    Unknown { tx_id: u64, peer: Uri },
}
