//! Транзакции: живое состояние незавершённых взаимодействий.
//!
//! - `table`: конкурентная таблица транзакций с begin/lookup/complete и
//!   периодической выборкой просроченных.
//!
//! Транзакция принадлежит той стороне, которая её создала (потребитель при
//! отправке инициирующего сообщения, провайдер при его получении), и никогда
//! не разделяется между сторонами.

pub mod table;

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::{sync::mpsc, time::Instant};

use crate::{
    error::{StageError, StandardError},
    interaction::{self, Progression, Stage},
    message::{InteractionType, MessageBody, Uri},
};

pub use table::TransactionTable;

/// Сторона взаимодействия, владеющая транзакцией.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Consumer,
    Provider,
}

/// Ключ транзакции: id плюс URI противоположной стороны.
///
/// Инвариант таблицы: не больше одной живой транзакции на ключ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxKey {
    pub tx_id: u64,
    pub peer: Uri,
}

impl TxKey {
    pub fn new(tx_id: u64, peer: Uri) -> Self {
        Self { tx_id, peer }
    }
}

impl fmt::Display for TxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tx_id, self.peer)
    }
}

/// Событие, доставляемое ожидающей стороне взаимодействия.
#[derive(Debug, Clone)]
pub enum InteractionEvent {
    /// Подтверждение (SUBMIT_ACK, INVOKE_ACK, PROGRESS_ACK, *_ACK PUBSUB).
    Ack(MessageBody),
    /// Промежуточное обновление (PROGRESS_UPDATE).
    Update(MessageBody),
    /// Завершающий ответ (REQUEST/INVOKE/PROGRESS_RESPONSE).
    Response(MessageBody),
    /// Терминальная ошибка, локальная или пришедшая ERROR-сообщением.
    Error(StandardError),
    /// Дедлайн истёк, ответа не было.
    TimedOut,
}

/// Приёмник событий транзакции.
///
/// Непрозрачный обработчик завершения: диспетчер кладёт события, ожидающая
/// сторона забирает их из своего канала.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: InteractionEvent);
}

impl EventSink for mpsc::UnboundedSender<InteractionEvent> {
    fn deliver(&self, event: InteractionEvent) {
        // Получатель мог уйти; событие в этом случае просто теряется.
        let _ = self.send(event);
    }
}

/// Приёмник-заглушка для транзакций, которым события не нужны
/// (провайдерская сторона).
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn deliver(&self, _event: InteractionEvent) {}
}

/// Живая транзакция одного взаимодействия.
pub struct Transaction {
    pub key: TxKey,
    pub kind: InteractionType,
    pub side: Side,
    stage: Mutex<Stage>,
    sink: Arc<dyn EventSink>,
    pub created_at: Instant,
    pub deadline: Option<Instant>,
    completed: AtomicBool,
}

impl Transaction {
    pub fn new(
        key: TxKey,
        kind: InteractionType,
        side: Side,
        initial: Stage,
        sink: Arc<dyn EventSink>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            key,
            kind,
            side,
            stage: Mutex::new(initial),
            sink,
            created_at: Instant::now(),
            deadline,
            completed: AtomicBool::new(false),
        }
    }

    /// Текущая стадия.
    pub fn stage(&self) -> Stage {
        *self.stage.lock()
    }

    /// Валидирует переход к `incoming` и, если он законен, фиксирует его.
    ///
    /// Работает для обоих направлений: входящее сообщение у потребителя и
    /// исходящий ответ у провайдера идут по одной таблице переходов.
    pub fn advance(&self, incoming: Stage, is_error: bool) -> Result<Progression, StageError> {
        let mut stage = self.stage.lock();
        let progression = interaction::advance(self.kind, *stage, incoming, is_error)?;
        *stage = progression.stage();
        Ok(progression)
    }

    /// Помечает транзакцию завершённой.
    ///
    /// Возвращает `true` только первому вызвавшему: победитель и только он
    /// доставляет терминальное событие. Гонка "ответ против дедлайна"
    /// разрешается этим CAS.
    pub fn mark_completed(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Просрочена ли транзакция к моменту `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if d <= now)
    }

    /// Доставляет событие в приёмник стороны-владельца.
    pub fn deliver(&self, event: InteractionEvent) {
        self.sink.deliver(event);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("side", &self.side)
            .field("stage", &self.stage())
            .field("completed", &self.is_completed())
            .finish()
    }
}
