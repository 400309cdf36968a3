use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info};

use super::InteractionHandle;
use crate::{
    broker::{BrokerBinding, PublisherDeclaration, Subscription, Update},
    config::Settings,
    dispatch::{Dispatcher, OperationHandler, OperationRegistry, PubSubListener},
    error::{EngineError, EngineResult},
    interaction::{initial_stage, Stage},
    message::{
        Domain, Identifier, InteractionType, MessageBody, MessageHeader, OperationKey, QosLevel,
        SessionType, Uri,
    },
    transaction::{Side, TransactionTable, TxKey},
    transport::{encode_element, AccessControl, LocalTransport, MessageCodec, MessageSender, Transport},
};

/// Параметры вызова операции: адрес операции плюс поля заголовка, общие
/// для всех сообщений этого вызова.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub key: OperationKey,
    pub domain: Domain,
    pub qos: QosLevel,
    pub session: SessionType,
    pub session_name: Identifier,
    pub priority: u32,
}

impl OperationSpec {
    pub fn new(key: OperationKey) -> Self {
        Self {
            key,
            domain: Domain::new(),
            qos: QosLevel::Assured,
            session: SessionType::Live,
            session_name: Identifier::new("live"),
            priority: 0,
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_qos(mut self, qos: QosLevel) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_session(mut self, session: SessionType, name: impl AsRef<str>) -> Self {
        self.session = session;
        self.session_name = Identifier::new(name);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Конечная точка обмена сообщениями.
///
/// Связывает в одном месте таблицу транзакций, диспетчер, реестр
/// обработчиков и привязки брокера; создаётся явно и передаётся по
/// ссылке — никаких глобальных реестров. Одна и та же точка может быть
/// одновременно потребителем, провайдером и брокером.
pub struct Endpoint {
    uri: Uri,
    settings: Settings,
    sender: Arc<MessageSender>,
    table: Arc<TransactionTable>,
    registry: Arc<OperationRegistry>,
    brokers: Arc<DashMap<OperationKey, Arc<BrokerBinding>>>,
    listeners: Arc<DashMap<OperationKey, Arc<dyn PubSubListener>>>,
    dispatcher: Arc<Dispatcher>,
    next_tx: AtomicU64,
    closed: AtomicBool,
}

impl Endpoint {
    pub fn new(
        uri: Uri,
        codec: Arc<dyn MessageCodec>,
        transport: Arc<dyn Transport>,
        access: Arc<dyn AccessControl>,
        settings: Settings,
    ) -> Arc<Self> {
        let sender = Arc::new(MessageSender::new(
            codec.clone(),
            transport,
            access.clone(),
        ));
        let table = Arc::new(TransactionTable::new());
        let registry = Arc::new(OperationRegistry::new());
        let brokers: Arc<DashMap<OperationKey, Arc<BrokerBinding>>> = Arc::new(DashMap::new());
        let listeners: Arc<DashMap<OperationKey, Arc<dyn PubSubListener>>> = Arc::new(DashMap::new());

        let dispatcher = Dispatcher::new(
            table.clone(),
            registry.clone(),
            brokers.clone(),
            listeners.clone(),
            sender.clone(),
            codec,
            access,
            settings.dispatcher.clone(),
            settings.endpoint.default_deadline(),
        );
        dispatcher.spawn_sweeper();

        info!(uri = %uri, "endpoint created");
        Arc::new(Self {
            uri,
            settings,
            sender,
            table,
            registry,
            brokers,
            listeners,
            dispatcher,
            next_tx: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn table(&self) -> &TransactionTable {
        &self.table
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Входной колбэк транспорта: один закодированный кадр.
    pub fn on_frame(&self, frame: Bytes) {
        self.dispatcher.ingest(frame);
    }

    /// Регистрирует конечную точку во внутрипроцессном транспорте и
    /// качает его кадры в диспетчер.
    pub fn bind_local(self: &Arc<Self>, transport: &LocalTransport) {
        let mut rx = transport.attach(self.uri.clone());
        let endpoint = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                endpoint.on_frame(frame);
            }
        });
    }

    // ==== Провайдерская сторона ====

    /// Привязывает обработчик операции.
    pub fn register_handler(&self, key: OperationKey, handler: Arc<dyn OperationHandler>) {
        self.registry.register(key, handler);
    }

    /// Поднимает привязку брокера для операции (идемпотентно).
    pub fn host_broker(&self, key: OperationKey) -> Arc<BrokerBinding> {
        self.brokers
            .entry(key)
            .or_insert_with(|| {
                debug!(scope = %key, "hosting broker binding");
                Arc::new(BrokerBinding::new(
                    key,
                    self.sender.clone(),
                    &self.settings.broker,
                ))
            })
            .value()
            .clone()
    }

    /// Регистрирует слушателя NOTIFY / PUBLISH_ERROR для операции.
    pub fn register_listener(&self, key: OperationKey, listener: Arc<dyn PubSubListener>) {
        self.listeners.insert(key, listener);
    }

    // ==== Потребительская сторона ====

    fn next_transaction_id(&self) -> u64 {
        self.next_tx.fetch_add(1, Ordering::Relaxed)
    }

    fn header(
        &self,
        to: &Uri,
        spec: &OperationSpec,
        kind: InteractionType,
        stage: Stage,
        tx_id: u64,
    ) -> MessageHeader {
        MessageHeader {
            uri_from: self.uri.clone(),
            uri_to: to.clone(),
            transaction_id: tx_id,
            interaction_type: kind,
            stage,
            qos: spec.qos,
            session: spec.session,
            session_name: spec.session_name.clone(),
            priority: spec.priority,
            domain: spec.domain.clone(),
            area: spec.key.area,
            area_version: spec.key.area_version,
            service: spec.key.service,
            operation: spec.key.operation,
            is_error: false,
            auth_id: Bytes::new(),
        }
    }

    /// Открывает транзакцию и отправляет инициирующее сообщение.
    async fn initiate(
        &self,
        kind: InteractionType,
        stage: Stage,
        to: &Uri,
        spec: &OperationSpec,
        body: MessageBody,
        deadline: Option<Duration>,
    ) -> EngineResult<InteractionHandle> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }

        let tx_id = self.next_transaction_id();
        let key = TxKey::new(tx_id, to.clone());
        let (sink, events) = mpsc::unbounded_channel();
        // Без явного дедлайна действует дедлайн из конфигурации:
        // инициатор никогда не ждёт бесконечно.
        let deadline =
            Instant::now() + deadline.unwrap_or_else(|| self.settings.endpoint.default_deadline());

        self.table.begin(
            key.clone(),
            kind,
            Side::Consumer,
            stage,
            Arc::new(sink),
            Some(deadline),
        )?;

        let header = self.header(to, spec, kind, stage, tx_id);
        if let Err(err) = self.sender.post(&header, &body).await {
            self.table.complete(&key);
            return Err(err);
        }
        Ok(InteractionHandle::new(tx_id, events))
    }

    /// SEND: одностороннее сообщение, без транзакции и без ответа.
    pub async fn send(&self, to: &Uri, spec: &OperationSpec, body: MessageBody) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        let header = self.header(
            to,
            spec,
            InteractionType::Send,
            Stage::Send,
            self.next_transaction_id(),
        );
        self.sender.post(&header, &body).await
    }

    /// SUBMIT: ждёт SUBMIT_ACK либо ошибку.
    pub async fn submit(
        &self,
        to: &Uri,
        spec: &OperationSpec,
        body: MessageBody,
        deadline: Option<Duration>,
    ) -> EngineResult<InteractionHandle> {
        let kind = InteractionType::Submit;
        self.initiate(kind, initial_stage(kind), to, spec, body, deadline)
            .await
    }

    /// REQUEST: ждёт один ответ.
    pub async fn request(
        &self,
        to: &Uri,
        spec: &OperationSpec,
        body: MessageBody,
        deadline: Option<Duration>,
    ) -> EngineResult<InteractionHandle> {
        let kind = InteractionType::Request;
        self.initiate(kind, initial_stage(kind), to, spec, body, deadline)
            .await
    }

    /// INVOKE: подтверждение, затем ответ.
    pub async fn invoke(
        &self,
        to: &Uri,
        spec: &OperationSpec,
        body: MessageBody,
        deadline: Option<Duration>,
    ) -> EngineResult<InteractionHandle> {
        let kind = InteractionType::Invoke;
        self.initiate(kind, initial_stage(kind), to, spec, body, deadline)
            .await
    }

    /// PROGRESS: подтверждение, поток обновлений, ответ.
    pub async fn progress(
        &self,
        to: &Uri,
        spec: &OperationSpec,
        body: MessageBody,
        deadline: Option<Duration>,
    ) -> EngineResult<InteractionHandle> {
        let kind = InteractionType::Progress;
        self.initiate(kind, initial_stage(kind), to, spec, body, deadline)
            .await
    }

    // ==== Pub/Sub клиент ====

    /// REGISTER: сохранить подписку у брокера.
    pub async fn register(
        &self,
        broker: &Uri,
        spec: &OperationSpec,
        subscription: Subscription,
    ) -> EngineResult<InteractionHandle> {
        let body = MessageBody::single(encode_element(&subscription)?);
        self.initiate(InteractionType::PubSub, Stage::Register, broker, spec, body, None)
            .await
    }

    /// PUBLISH_REGISTER: декларировать ключи публикации.
    pub async fn publish_register(
        &self,
        broker: &Uri,
        spec: &OperationSpec,
        declaration: PublisherDeclaration,
    ) -> EngineResult<InteractionHandle> {
        let body = MessageBody::single(encode_element(&declaration)?);
        self.initiate(
            InteractionType::PubSub,
            Stage::PublishRegister,
            broker,
            spec,
            body,
            None,
        )
        .await
    }

    /// PUBLISH: отправить пакет обновлений. Без прямого ack; нарушение
    /// декларации вернётся издателю как PUBLISH_ERROR через слушателя.
    pub async fn publish(
        &self,
        broker: &Uri,
        spec: &OperationSpec,
        updates: Vec<Update>,
    ) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        let body = MessageBody::single(encode_element(&updates)?);
        let header = self.header(
            broker,
            spec,
            InteractionType::PubSub,
            Stage::Publish,
            self.next_transaction_id(),
        );
        self.sender.post(&header, &body).await
    }

    /// DEREGISTER: снять названные подписки.
    pub async fn deregister(
        &self,
        broker: &Uri,
        spec: &OperationSpec,
        ids: Vec<Identifier>,
    ) -> EngineResult<InteractionHandle> {
        let body = MessageBody::single(encode_element(&ids)?);
        self.initiate(
            InteractionType::PubSub,
            Stage::Deregister,
            broker,
            spec,
            body,
            None,
        )
        .await
    }

    /// PUBLISH_DEREGISTER: снять декларацию издателя.
    pub async fn publish_deregister(
        &self,
        broker: &Uri,
        spec: &OperationSpec,
    ) -> EngineResult<InteractionHandle> {
        self.initiate(
            InteractionType::PubSub,
            Stage::PublishDeregister,
            broker,
            spec,
            MessageBody::empty(),
            None,
        )
        .await
    }

    /// Локально отменяет ожидающее взаимодействие.
    ///
    /// Запись снимается из таблицы, канал событий ручки закрывается без
    /// терминального события; опоздавший ответ будет отброшен. Возвращает
    /// `false`, если транзакции уже нет.
    pub fn cancel(&self, peer: &Uri, tx_id: u64) -> bool {
        let key = TxKey::new(tx_id, peer.clone());
        match self.table.complete(&key) {
            Some(tx) => {
                debug!(key = %tx.key, "interaction cancelled locally");
                true
            }
            None => false,
        }
    }

    /// Закрывает конечную точку.
    ///
    /// Незавершённые транзакции получают локальную терминальную ошибку,
    /// привязки брокера закрываются, реестры освобождаются. Идемпотентно.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(uri = %self.uri, "endpoint closing");
        self.dispatcher.close();
        for entry in self.brokers.iter() {
            entry.value().close();
        }
        self.brokers.clear();
        self.listeners.clear();
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}
