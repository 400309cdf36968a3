use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    matcher::{declaration_covers, subscription_matches, PublisherDeclaration, Subscription, Update},
    registry::SubscriptionRegistry,
};
use crate::{
    config::BrokerSettings,
    error::{BrokerError, EngineResult, ErrorKind, StandardError},
    interaction::Stage,
    message::{Identifier, MessageBody, MessageHeader, OperationKey, Uri},
    transport::{decode_element, encode_element, MessageSender},
};

/// Пакет NOTIFY одному подписчику: какие подписки сработали и какие
/// обновления пришли, в исходном порядке публикации.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subscription_ids: Vec<Identifier>,
    pub updates: Vec<Update>,
}

/// Одна адресуемая привязка брокера.
///
/// Обслуживает управляющие стадии PUBSUB в рамках своей операции
/// (area/service/operation): ведёт реестр подписок и деклараций, а на
/// PUBLISH раздаёт NOTIFY по совпавшим подписчикам. Сбой доставки одному
/// подписчику не трогает остальных.
pub struct BrokerBinding {
    scope: OperationKey,
    registry: SubscriptionRegistry,
    sender: Arc<MessageSender>,
    validate_publishers: bool,
    closed: AtomicBool,
    /// Всего обработанных PUBLISH.
    pub publish_count: AtomicU64,
    /// Всего отправленных NOTIFY.
    pub notify_count: AtomicU64,
    /// Количество неудачных доставок NOTIFY.
    pub notify_error_count: AtomicU64,
}

impl BrokerBinding {
    pub fn new(scope: OperationKey, sender: Arc<MessageSender>, settings: &BrokerSettings) -> Self {
        Self {
            scope,
            registry: SubscriptionRegistry::new(),
            sender,
            validate_publishers: settings.validate_publishers,
            closed: AtomicBool::new(false),
            publish_count: AtomicU64::new(0),
            notify_count: AtomicU64::new(0),
            notify_error_count: AtomicU64::new(0),
        }
    }

    pub fn scope(&self) -> OperationKey {
        self.scope
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Точка входа диспетчера: одна управляющая стадия PUBSUB.
    pub async fn handle(&self, header: &MessageHeader, body: &MessageBody) -> EngineResult<()> {
        if self.is_closed() {
            return Err(BrokerError::Closed.into());
        }

        match header.stage {
            Stage::Register => self.register(header, body).await,
            Stage::PublishRegister => self.publish_register(header, body).await,
            Stage::Publish => self.publish(header, body).await,
            Stage::Deregister => self.deregister(header, body).await,
            Stage::PublishDeregister => self.publish_deregister(header).await,
            stage => Err(BrokerError::MalformedBody {
                stage,
                detail: "not a broker control stage".into(),
            }
            .into()),
        }
    }

    /// REGISTER: сохранить/заместить подписку, ответить REGISTER_ACK.
    async fn register(&self, header: &MessageHeader, body: &MessageBody) -> EngineResult<()> {
        let subscription: Subscription = body_element(Stage::Register, body)?;

        if subscription.id.as_str().is_empty() {
            return Err(BrokerError::MalformedBody {
                stage: Stage::Register,
                detail: "empty subscription id".into(),
            }
            .into());
        }
        if subscription.patterns.is_empty() {
            return Err(BrokerError::MalformedBody {
                stage: Stage::Register,
                detail: "subscription without patterns".into(),
            }
            .into());
        }

        debug!(
            consumer = %header.uri_from,
            subscription = %subscription.id,
            patterns = subscription.patterns.len(),
            "register subscription"
        );
        self.registry
            .register(header.uri_from.clone(), header.transaction_id, subscription);

        self.sender
            .post(&header.reply(Stage::RegisterAck), &MessageBody::empty())
            .await
    }

    /// PUBLISH_REGISTER: запомнить декларацию издателя.
    async fn publish_register(
        &self,
        header: &MessageHeader,
        body: &MessageBody,
    ) -> EngineResult<()> {
        let declaration: PublisherDeclaration = body_element(Stage::PublishRegister, body)?;

        debug!(
            publisher = %header.uri_from,
            patterns = declaration.patterns.len(),
            "register publisher"
        );
        self.registry
            .register_publisher(header.uri_from.clone(), declaration);

        self.sender
            .post(
                &header.reply(Stage::PublishRegisterAck),
                &MessageBody::empty(),
            )
            .await
    }

    /// PUBLISH: сопоставить обновления с подписками и разослать NOTIFY.
    ///
    /// Прямого ack нет. Нарушение декларации издателя отвечает
    /// PUBLISH_ERROR только издателю; покрытые обновления при этом всё
    /// равно уходят подписчикам.
    async fn publish(&self, header: &MessageHeader, body: &MessageBody) -> EngineResult<()> {
        let updates: Vec<Update> = body_element(Stage::Publish, body)?;
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        // 1) проверка декларации издателя
        let snapshot = self.registry.snapshot();
        let mut deliverable = Vec::with_capacity(updates.len());
        let mut uncovered = 0usize;
        let declaration = self
            .validate_publishers
            .then(|| snapshot.publishers.get(&header.uri_from))
            .flatten();

        for update in updates {
            match declaration {
                Some(decl) if !declaration_covers(decl, &update.key) => uncovered += 1,
                _ => deliverable.push(update),
            }
        }

        if uncovered > 0 {
            warn!(
                publisher = %header.uri_from,
                uncovered,
                "publish outside declared key set"
            );
            let err = BrokerError::UndeclaredKey {
                publisher: header.uri_from.clone(),
            };
            self.sender
                .post(
                    &header.error_reply(Stage::PublishError),
                    &MessageBody::Error(StandardError::new(
                        ErrorKind::AuthorisationFail,
                        err.to_string(),
                    )),
                )
                .await?;
        }

        // 2) группировка совпавших обновлений по подписчикам
        let batches = self.collect_batches(&snapshot.subscriptions, &deliverable);

        // 3) рассылка; сбой одного получателя не мешает остальным
        for (consumer, register_tx, notification) in batches {
            let notify_header = self.notify_header(header, &consumer, register_tx);
            let body = MessageBody::single(encode_element(&notification)?);
            match self.sender.post(&notify_header, &body).await {
                Ok(()) => {
                    self.notify_count.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.notify_error_count.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        consumer = %consumer,
                        %err,
                        "notify delivery failed, skipping subscriber"
                    );
                }
            }
        }

        Ok(())
    }

    /// Группирует обновления в один упорядоченный пакет на подписчика.
    fn collect_batches(
        &self,
        subscriptions: &[super::registry::StoredSubscription],
        updates: &[Update],
    ) -> Vec<(Uri, u64, Notification)> {
        // Порядок подписчиков — порядок их появления в реестре; порядок
        // обновлений внутри пакета — порядок публикации.
        let mut order: Vec<Uri> = Vec::new();
        let mut pending: HashMap<Uri, (u64, Vec<Identifier>, Vec<usize>)> = HashMap::new();

        for stored in subscriptions {
            for (idx, update) in updates.iter().enumerate() {
                if !subscription_matches(&stored.subscription, &self.scope, &update.key) {
                    continue;
                }
                let entry = pending.entry(stored.consumer.clone()).or_insert_with(|| {
                    order.push(stored.consumer.clone());
                    (stored.register_tx, Vec::new(), Vec::new())
                });
                if !entry.1.contains(&stored.subscription.id) {
                    entry.1.push(stored.subscription.id.clone());
                }
                if !entry.2.contains(&idx) {
                    entry.2.push(idx);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|consumer| {
                let (register_tx, subscription_ids, mut idxs) = pending.remove(&consumer)?;
                idxs.sort_unstable();
                let notification = Notification {
                    subscription_ids,
                    updates: idxs.into_iter().map(|i| updates[i].clone()).collect(),
                };
                Some((consumer, register_tx, notification))
            })
            .collect()
    }

    fn notify_header(
        &self,
        publish_header: &MessageHeader,
        consumer: &Uri,
        register_tx: u64,
    ) -> MessageHeader {
        MessageHeader {
            uri_from: publish_header.uri_to.clone(),
            uri_to: consumer.clone(),
            transaction_id: register_tx,
            stage: Stage::Notify,
            is_error: false,
            auth_id: bytes::Bytes::new(),
            ..publish_header.clone()
        }
    }

    /// DEREGISTER: удалить названные подписки; неизвестные id — no-op.
    async fn deregister(&self, header: &MessageHeader, body: &MessageBody) -> EngineResult<()> {
        let ids: Vec<Identifier> = body_element(Stage::Deregister, body)?;
        let removed = self.registry.deregister(&header.uri_from, &ids);
        debug!(consumer = %header.uri_from, requested = ids.len(), removed, "deregister");

        self.sender
            .post(&header.reply(Stage::DeregisterAck), &MessageBody::empty())
            .await
    }

    /// PUBLISH_DEREGISTER: снять декларацию издателя.
    async fn publish_deregister(&self, header: &MessageHeader) -> EngineResult<()> {
        self.registry.deregister_publisher(&header.uri_from);

        self.sender
            .post(
                &header.reply(Stage::PublishDeregisterAck),
                &MessageBody::empty(),
            )
            .await
    }

    /// Закрывает привязку и освобождает реестр.
    ///
    /// Идемпотентно: повторное закрытие — no-op, без паник.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.registry.clear();
            debug!(scope = %self.scope, "broker binding closed");
        }
    }
}

/// Первый элемент тела как типизированное значение.
fn body_element<T: DeserializeOwned>(stage: Stage, body: &MessageBody) -> EngineResult<T> {
    let elements = body.elements().ok_or_else(|| BrokerError::MalformedBody {
        stage,
        detail: "error body in control message".into(),
    })?;
    let first = elements.first().ok_or_else(|| BrokerError::MalformedBody {
        stage,
        detail: "empty body".into(),
    })?;
    decode_element(first).map_err(|e| {
        BrokerError::MalformedBody {
            stage,
            detail: e.to_string(),
        }
        .into()
    })
}
