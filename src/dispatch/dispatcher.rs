use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::{
    sync::{mpsc, Notify, Semaphore},
    time::{timeout, Instant},
};
use tracing::{debug, trace, warn};

use super::{OperationRegistry, ProviderContext, PubSubListener};
use crate::{
    broker::{BrokerBinding, Notification},
    config::DispatcherSettings,
    error::{CodecError, EngineError, EngineResult, ErrorKind, StandardError, TransactionError},
    interaction::{self, Stage},
    message::{InteractionType, MessageBody, MessageHeader, OperationKey},
    transaction::{InteractionEvent, NullSink, Side, TransactionTable, TxKey},
    transport::{decode_element, AccessControl, MessageCodec, MessageSender},
};

/// Одно раскодированное входящее сообщение.
struct Inbound {
    header: MessageHeader,
    body: MessageBody,
}

/// Очередь одной транзакции.
struct Lane {
    queue: mpsc::UnboundedSender<Inbound>,
}

/// Диспетчер входящих сообщений.
///
/// Демультиплексирует раскодированное сообщение в один из четырёх путей:
/// новый вызов провайдерского обработчика, управляющая стадия брокера,
/// продолжение ожидающей транзакции, либо несолиситед-доставка
/// (NOTIFY / PUBLISH_ERROR) слушателю.
///
/// Дисциплина конкурентности: у каждой живой пары (transaction id, peer)
/// своя FIFO-очередь с единственным воркером — сообщения одной транзакции
/// обрабатываются строго в порядке прихода. Разные транзакции идут
/// параллельно, но суммарную ширину ограничивает семафор `max_workers`
/// (воркер берёт разрешение на каждое сообщение). Простаивающая очередь
/// сворачивается по `lane_idle_timeout`, добрав остаток перед выходом.
pub struct Dispatcher {
    table: Arc<TransactionTable>,
    registry: Arc<OperationRegistry>,
    brokers: Arc<DashMap<OperationKey, Arc<BrokerBinding>>>,
    listeners: Arc<DashMap<OperationKey, Arc<dyn PubSubListener>>>,
    sender: Arc<MessageSender>,
    codec: Arc<dyn MessageCodec>,
    access: Arc<dyn AccessControl>,
    lanes: DashMap<TxKey, Lane>,
    limiter: Arc<Semaphore>,
    shutdown: Notify,
    closed: AtomicBool,
    settings: DispatcherSettings,
    provider_deadline: std::time::Duration,
    /// Всего обработанных сообщений.
    pub dispatched_count: AtomicU64,
    /// Всего отправленных ERROR-ответов.
    pub error_reply_count: AtomicU64,
    /// Поздние/чужие ответы, отброшенные без ожидающей транзакции.
    pub dropped_count: AtomicU64,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        table: Arc<TransactionTable>,
        registry: Arc<OperationRegistry>,
        brokers: Arc<DashMap<OperationKey, Arc<BrokerBinding>>>,
        listeners: Arc<DashMap<OperationKey, Arc<dyn PubSubListener>>>,
        sender: Arc<MessageSender>,
        codec: Arc<dyn MessageCodec>,
        access: Arc<dyn AccessControl>,
        settings: DispatcherSettings,
        provider_deadline: std::time::Duration,
    ) -> Arc<Self> {
        let limiter = Arc::new(Semaphore::new(settings.max_workers));
        Arc::new(Self {
            table,
            registry,
            brokers,
            listeners,
            sender,
            codec,
            access,
            lanes: DashMap::new(),
            limiter,
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
            settings,
            provider_deadline,
            dispatched_count: AtomicU64::new(0),
            error_reply_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Запускает периодическую выборку просроченных транзакций.
    ///
    /// Снятая по дедлайну транзакция получает ровно одно событие
    /// `TimedOut`; опоздавший настоящий ответ позже отбрасывается, потому
    /// что записи в таблице уже нет.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(dispatcher.settings.sweep_interval());
            loop {
                tokio::select! {
                    _ = dispatcher.shutdown.notified() => break,
                    _ = ticker.tick() => {
                        for tx in dispatcher.table.sweep_expired(Instant::now()) {
                            debug!(key = %tx.key, kind = %tx.kind, "transaction deadline expired");
                            tx.deliver(InteractionEvent::TimedOut);
                        }
                    }
                }
            }
            trace!("sweeper stopped");
        });
    }

    /// Входная точка транспорта: один закодированный кадр.
    ///
    /// Вызывается с потока ввода-вывода транспорта и не блокирует его:
    /// кадр раскодируется и встаёт в очередь своей транзакции.
    pub fn ingest(self: &Arc<Self>, frame: Bytes) {
        if self.is_closed() {
            trace!("frame ignored: dispatcher closed");
            return;
        }

        match self.codec.decode(frame) {
            Ok((header, body)) => self.enqueue(Inbound { header, body }),
            // Тело битое, заголовок цел: отправителю уходит BAD_ENCODING.
            Err(CodecError::Body { header, detail }) => {
                warn!(from = %header.uri_from, %detail, "body decode failed");
                if !header.is_error {
                    let dispatcher = self.clone();
                    tokio::spawn(async move {
                        dispatcher
                            .post_error_reply(
                                &header,
                                StandardError::new(ErrorKind::BadEncoding, detail),
                            )
                            .await;
                    });
                }
            }
            // Заголовок не раскодировался: отвечать некому.
            Err(err) => {
                warn!(%err, "undecodable frame dropped");
            }
        }
    }

    /// Ставит сообщение в очередь его транзакции, поднимая воркер при
    /// необходимости.
    fn enqueue(self: &Arc<Self>, mut inbound: Inbound) {
        loop {
            let key = TxKey::new(
                inbound.header.transaction_id,
                inbound.header.uri_from.clone(),
            );
            match self.lanes.entry(key.clone()) {
                Entry::Occupied(entry) => match entry.get().queue.send(inbound) {
                    Ok(()) => return,
                    // Воркер уже вышел; убираем мёртвую очередь и пробуем
                    // заново.
                    Err(mpsc::error::SendError(returned)) => {
                        entry.remove();
                        inbound = returned;
                    }
                },
                Entry::Vacant(vacant) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    // Отправка до вставки не может провалиться: приёмник жив.
                    let _ = tx.send(inbound);
                    vacant.insert(Lane { queue: tx });
                    let dispatcher = self.clone();
                    tokio::spawn(async move {
                        dispatcher.lane_worker(key, rx).await;
                    });
                    return;
                }
            }
        }
    }

    /// Воркер очереди: строгий порядок внутри транзакции, ширина — по
    /// семафору.
    async fn lane_worker(self: Arc<Self>, key: TxKey, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        loop {
            match timeout(self.settings.lane_idle_timeout(), rx.recv()).await {
                Ok(Some(inbound)) => {
                    let permit = match self.limiter.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break, // семафор закрыт при shutdown
                    };
                    self.process(inbound).await;
                    drop(permit);
                }
                Ok(None) => break,
                Err(_) => {
                    // Очередь простаивает. Снимаем её из карты только если
                    // она пуста в момент проверки: enqueue шлёт под тем же
                    // локом записи, так что либо сообщение уже видно здесь,
                    // либо оно придёт в новую очередь после снятия. Два
                    // воркера одной транзакции невозможны.
                    if self.lanes.remove_if(&key, |_, _| rx.is_empty()).is_some() {
                        return;
                    }
                }
            }
        }
        self.lanes.remove(&key);
    }

    async fn process(&self, inbound: Inbound) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        let header = inbound.header;
        if let Err(err) = self.route(&header, inbound.body).await {
            warn!(
                from = %header.uri_from,
                tx_id = header.transaction_id,
                stage = %header.stage,
                %err,
                "dispatch failed"
            );
            self.fail(&header, err).await;
        }
    }

    /// Маршрутизация одного сообщения.
    async fn route(&self, header: &MessageHeader, body: MessageBody) -> EngineResult<()> {
        self.access.check(header)?;

        if header.stage.is_unsolicited() {
            return self.deliver_unsolicited(header, body);
        }
        if header.stage.is_initiating() && !header.is_error {
            self.route_initial(header, body).await
        } else {
            self.route_continuation(header, body).await
        }
    }

    /// Новый вызов: провайдерский обработчик или управляющая стадия
    /// брокера.
    async fn route_initial(&self, header: &MessageHeader, body: MessageBody) -> EngineResult<()> {
        let kind = header.interaction_type;
        interaction::open(kind, header.stage)?;

        let key = TxKey::new(header.transaction_id, header.uri_from.clone());
        let op = header.operation_key();

        if kind == InteractionType::PubSub {
            let broker = self
                .brokers
                .get(&op)
                .map(|b| b.value().clone())
                .ok_or_else(|| EngineError::DestinationUnknown(header.uri_to.clone()))?;

            // Провайдерская транзакция дедуплицирует повторную доставку
            // того же инициирующего сообщения.
            self.table.begin(
                key.clone(),
                kind,
                Side::Provider,
                header.stage,
                Arc::new(NullSink),
                None,
            )?;
            let result = broker.handle(header, &body).await;
            self.table.complete(&key);
            return result;
        }

        let handler = self.registry.lookup(op)?;
        let deadline = Instant::now() + self.provider_deadline;
        let tx = self.table.begin(
            key.clone(),
            kind,
            Side::Provider,
            header.stage,
            Arc::new(NullSink),
            Some(deadline),
        )?;

        let ctx = ProviderContext::new(
            header.clone(),
            tx,
            self.table.clone(),
            self.sender.clone(),
        );
        let result = handler.handle(ctx, body).await;

        // SEND терминален сразу; упавший обработчик завершает транзакцию
        // принудительно.
        if kind == InteractionType::Send || result.is_err() {
            self.table.complete(&key);
        }
        result
    }

    /// Продолжение ожидающей транзакции.
    async fn route_continuation(
        &self,
        header: &MessageHeader,
        body: MessageBody,
    ) -> EngineResult<()> {
        let key = TxKey::new(header.transaction_id, header.uri_from.clone());
        let tx = match self.table.lookup(&key) {
            Ok(tx) => tx,
            Err(_) => {
                // Транзакции нет: либо ответ опоздал к уже завершённой
                // (таймаут), либо корреляция чужая. Ответ на ответ породил
                // бы некоррелируемый обмен, поэтому фиксируем и выходим.
                self.dropped_count.fetch_add(1, Ordering::Relaxed);
                debug!(
                    from = %header.uri_from,
                    tx_id = header.transaction_id,
                    stage = %header.stage,
                    "late or unknown reply dropped"
                );
                return Ok(());
            }
        };

        let is_error = header.is_error || body.is_error();
        let progression = match tx.advance(header.stage, is_error) {
            Ok(p) => p,
            Err(stage_err) => {
                // Нелегальная стадия: локальная сторона получает
                // терминальную ошибку, транзакция завершается
                // принудительно, отправителю уходит ERROR-ответ.
                if tx.mark_completed() {
                    tx.deliver(InteractionEvent::Error(StandardError::new(
                        ErrorKind::Internal,
                        stage_err.to_string(),
                    )));
                }
                self.table.complete(&key);
                return Err(stage_err.into());
            }
        };

        let event = Self::event_for(header.stage, body, is_error);
        if progression.is_terminal() {
            // Сначала снимаем запись, потом доставляем: к моменту, когда
            // ожидающая сторона видит терминальное событие, таблица уже
            // чистая.
            let won = tx.mark_completed();
            self.table.complete(&key);
            if won {
                tx.deliver(event);
            } else {
                self.dropped_count.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "terminal event raced completed transaction, dropped");
            }
        } else {
            tx.deliver(event);
        }
        Ok(())
    }

    /// NOTIFY и PUBLISH_ERROR: доставка слушателю без таблицы транзакций.
    fn deliver_unsolicited(&self, header: &MessageHeader, body: MessageBody) -> EngineResult<()> {
        let op = header.operation_key();
        let listener = match self.listeners.get(&op) {
            Some(listener) => listener.value().clone(),
            None => {
                self.dropped_count.fetch_add(1, Ordering::Relaxed);
                warn!(operation = %op, stage = %header.stage, "no listener bound, message dropped");
                return Ok(());
            }
        };

        match header.stage {
            Stage::Notify => {
                let elements = body.elements().ok_or_else(|| CodecError::Element(
                    "error body in NOTIFY".into(),
                ))?;
                let first = elements
                    .first()
                    .ok_or_else(|| CodecError::Element("empty NOTIFY body".into()))?;
                let notification: Notification = decode_element(first)?;
                listener.on_notify(header, notification);
            }
            Stage::PublishError => {
                let error = body
                    .as_error()
                    .cloned()
                    .unwrap_or_else(|| StandardError::bare(ErrorKind::Internal));
                listener.on_publish_error(header, error);
            }
            _ => unreachable!("is_unsolicited covers exactly NOTIFY and PUBLISH_ERROR"),
        }
        Ok(())
    }

    /// Терминальная обработка ошибки маршрутизации: ERROR-ответ
    /// отправителю. Затронутая транзакция уже завершена тем путём,
    /// который ею владел.
    async fn fail(&self, header: &MessageHeader, err: EngineError) {
        // Дубликат инициирующего сообщения: живой транзакцией владеет
        // первая доставка, ERROR-ответ только сбил бы её с толку.
        if matches!(
            &err,
            EngineError::Transaction(TransactionError::Duplicate { .. })
        ) {
            return;
        }
        // На ERROR-сообщение не отвечаем ошибкой: это путь к петле.
        if header.is_error {
            return;
        }
        self.post_error_reply(header, err.to_standard()).await;
    }

    async fn post_error_reply(&self, header: &MessageHeader, error: StandardError) {
        let Some(stage) = interaction::error_stage(header.interaction_type, header.stage) else {
            // SEND и NOTIFY легального ответа не имеют.
            debug!(stage = %header.stage, "no error stage, reply suppressed");
            return;
        };

        let reply = header.error_reply(stage);
        match self.sender.post(&reply, &MessageBody::Error(error)).await {
            Ok(()) => {
                self.error_reply_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(to = %reply.uri_to, %err, "error reply undeliverable");
            }
        }
    }

    fn event_for(stage: Stage, body: MessageBody, is_error: bool) -> InteractionEvent {
        if is_error {
            let error = body
                .as_error()
                .cloned()
                .unwrap_or_else(|| StandardError::bare(ErrorKind::Internal));
            return InteractionEvent::Error(error);
        }
        match stage {
            Stage::ProgressUpdate => InteractionEvent::Update(body),
            Stage::SubmitAck
            | Stage::InvokeAck
            | Stage::ProgressAck
            | Stage::RegisterAck
            | Stage::PublishRegisterAck
            | Stage::DeregisterAck
            | Stage::PublishDeregisterAck => InteractionEvent::Ack(body),
            _ => InteractionEvent::Response(body),
        }
    }

    /// Останавливает диспетчер: новые кадры игнорируются, свипер и
    /// воркеры сворачиваются, незавершённые транзакции получают локальную
    /// терминальную ошибку.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_waiters();
        self.limiter.close();

        for tx in self.table.drain() {
            tx.deliver(InteractionEvent::Error(StandardError::new(
                ErrorKind::DestinationLost,
                "endpoint closed",
            )));
        }
        debug!("dispatcher closed");
    }

    /// Текущее число живых очередей (для тестов и метрик).
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}
