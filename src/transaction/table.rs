use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;

use super::{EventSink, Side, Transaction, TxKey};
use crate::{
    error::TransactionError,
    interaction::Stage,
    message::InteractionType,
};

/// Таблица незавершённых транзакций.
///
/// Общая изменяемая структура обеих сторон: потребитель ищет здесь контекст
/// для продолжения, провайдер — для дедупликации инициирующих сообщений.
/// Все операции безопасны при конкурентных вызовах из воркеров диспетчера.
pub struct TransactionTable {
    entries: DashMap<TxKey, Arc<Transaction>>,
    /// Всего начатых транзакций.
    pub begun_count: AtomicU64,
    /// Всего завершённых (включая принудительные).
    pub completed_count: AtomicU64,
    /// Всего снятых по дедлайну.
    pub expired_count: AtomicU64,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            begun_count: AtomicU64::new(0),
            completed_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Регистрирует новую транзакцию.
    ///
    /// # Возвращает
    /// - `Ok(Arc<Transaction>)` при успехе
    /// - `Err(TransactionError::Duplicate)`, если по ключу уже есть живая
    ///   запись
    pub fn begin(
        &self,
        key: TxKey,
        kind: InteractionType,
        side: Side,
        initial: Stage,
        sink: Arc<dyn EventSink>,
        deadline: Option<Instant>,
    ) -> Result<Arc<Transaction>, TransactionError> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => Err(TransactionError::Duplicate {
                tx_id: key.tx_id,
                peer: key.peer,
            }),
            Entry::Vacant(v) => {
                let tx = Arc::new(Transaction::new(key, kind, side, initial, sink, deadline));
                v.insert(tx.clone());
                self.begun_count.fetch_add(1, Ordering::Relaxed);
                Ok(tx)
            }
        }
    }

    /// Находит живую транзакцию по ключу.
    pub fn lookup(&self, key: &TxKey) -> Result<Arc<Transaction>, TransactionError> {
        self.entries
            .get(key)
            .map(|e| e.value().clone())
            .ok_or_else(|| TransactionError::Unknown {
                tx_id: key.tx_id,
                peer: key.peer.clone(),
            })
    }

    /// Удаляет запись по ключу. Идемпотентна: повторный вызов — no-op.
    ///
    /// Снятая транзакция помечается завершённой, но терминальное событие
    /// доставляет тот, кто выиграл `mark_completed` до или после вызова.
    pub fn complete(&self, key: &TxKey) -> Option<Arc<Transaction>> {
        let (_, tx) = self.entries.remove(key)?;
        tx.mark_completed();
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        Some(tx)
    }

    /// Снимает и возвращает все транзакции с истёкшим дедлайном.
    ///
    /// Возвращаются только те, для которых вызывающий выиграл завершение:
    /// именно он обязан синтезировать `DeliveryTimedOut` в приёмник.
    pub fn sweep_expired(&self, now: Instant) -> Vec<Arc<Transaction>> {
        let expired: Vec<TxKey> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        let mut swept = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some((_, tx)) = self.entries.remove(&key) {
                self.completed_count.fetch_add(1, Ordering::Relaxed);
                if tx.mark_completed() {
                    self.expired_count.fetch_add(1, Ordering::Relaxed);
                    swept.push(tx);
                }
            }
        }
        swept
    }

    /// Снимает все записи; возвращает транзакции, за которыми остался
    /// долг терминального события (для локального флеша при закрытии).
    pub fn drain(&self) -> Vec<Arc<Transaction>> {
        let keys: Vec<TxKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut drained = Vec::new();
        for key in keys {
            if let Some((_, tx)) = self.entries.remove(&key) {
                self.completed_count.fetch_add(1, Ordering::Relaxed);
                if tx.mark_completed() {
                    drained.push(tx);
                }
            }
        }
        drained
    }

    pub fn contains(&self, key: &TxKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}
