use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use super::matcher::{PublisherDeclaration, Subscription};
use crate::message::{Identifier, Uri};

/// Подписка, как она хранится в реестре: вместе с владельцем и id
/// транзакции REGISTER (он используется как корреляция NOTIFY).
#[derive(Debug, Clone)]
pub struct StoredSubscription {
    pub consumer: Uri,
    pub register_tx: u64,
    pub subscription: Subscription,
}

/// Неизменяемый снимок реестра.
///
/// Сопоставление на PUBLISH — горячий путь: он работает по снимку без
/// блокировок, пока писатели собирают новый.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub subscriptions: Vec<StoredSubscription>,
    pub publishers: HashMap<Uri, PublisherDeclaration>,
}

/// Реестр подписок и деклараций издателей одной привязки брокера.
///
/// Copy-on-write: читатели клонируют `Arc` снимка, писатели пересобирают
/// снимок под коротким write-локом. REGISTER/DEREGISTER редки по
/// сравнению с PUBLISH, так что цена пересборки не на горячем пути.
pub struct SubscriptionRegistry {
    inner: RwLock<Arc<Snapshot>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Текущий снимок для чтения.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.read().clone()
    }

    /// Сохраняет подписку; та же пара (consumer, id) замещается целиком.
    pub fn register(&self, consumer: Uri, register_tx: u64, subscription: Subscription) {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        next.subscriptions.retain(|s| {
            !(s.consumer == consumer && s.subscription.id == subscription.id)
        });
        next.subscriptions.push(StoredSubscription {
            consumer,
            register_tx,
            subscription,
        });
        *guard = Arc::new(next);
    }

    /// Удаляет названные подписки потребителя.
    ///
    /// Неизвестные id молча пропускаются. Возвращает число удалённых.
    pub fn deregister(&self, consumer: &Uri, ids: &[Identifier]) -> usize {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        let before = next.subscriptions.len();
        next.subscriptions
            .retain(|s| !(s.consumer == *consumer && ids.contains(&s.subscription.id)));
        let removed = before - next.subscriptions.len();
        if removed > 0 {
            *guard = Arc::new(next);
        }
        removed
    }

    /// Сохраняет (или замещает) декларацию издателя.
    pub fn register_publisher(&self, publisher: Uri, declaration: PublisherDeclaration) {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        next.publishers.insert(publisher, declaration);
        *guard = Arc::new(next);
    }

    /// Удаляет декларацию издателя; отсутствие записи — no-op.
    pub fn deregister_publisher(&self, publisher: &Uri) {
        let mut guard = self.inner.write();
        if !guard.publishers.contains_key(publisher) {
            return;
        }
        let mut next = (**guard).clone();
        next.publishers.remove(publisher);
        *guard = Arc::new(next);
    }

    /// Сбрасывает весь реестр (закрытие привязки).
    pub fn clear(&self) {
        *self.inner.write() = Arc::new(Snapshot::default());
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.read().subscriptions.len()
    }

    pub fn publisher_count(&self) -> usize {
        self.inner.read().publishers.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{broker::matcher::EntityKeyPattern, message::domain};

    fn sub(id: &str) -> Subscription {
        Subscription {
            id: Identifier::new(id),
            domain: domain(["a"]),
            patterns: vec![EntityKeyPattern::any()],
        }
    }

    /// Тест проверяет, что повторный REGISTER с тем же id замещает
    /// подписку, а не дублирует её.
    #[test]
    fn test_reregister_replaces() {
        let registry = SubscriptionRegistry::new();
        let consumer = Uri::new("orb://consumer");

        registry.register(consumer.clone(), 1, sub("s1"));
        registry.register(consumer.clone(), 2, sub("s1"));

        assert_eq!(registry.subscription_count(), 1);
        let snap = registry.snapshot();
        assert_eq!(snap.subscriptions[0].register_tx, 2);
    }

    /// Тест проверяет, что одинаковый id у разных потребителей — две
    /// независимые подписки.
    #[test]
    fn test_same_id_different_consumers() {
        let registry = SubscriptionRegistry::new();
        registry.register(Uri::new("orb://c1"), 1, sub("s1"));
        registry.register(Uri::new("orb://c2"), 1, sub("s1"));
        assert_eq!(registry.subscription_count(), 2);
    }

    /// Тест проверяет идемпотентность DEREGISTER с неизвестным id.
    #[test]
    fn test_deregister_unknown_noop() {
        let registry = SubscriptionRegistry::new();
        let consumer = Uri::new("orb://consumer");
        registry.register(consumer.clone(), 1, sub("s1"));

        let removed = registry.deregister(&consumer, &[Identifier::new("ghost")]);
        assert_eq!(removed, 0);
        assert_eq!(registry.subscription_count(), 1);
    }

    /// Тест проверяет, что снимок не видит последующих изменений.
    #[test]
    fn test_snapshot_isolated_from_writes() {
        let registry = SubscriptionRegistry::new();
        let consumer = Uri::new("orb://consumer");
        registry.register(consumer.clone(), 1, sub("s1"));

        let snap = registry.snapshot();
        registry.deregister(&consumer, &[Identifier::new("s1")]);

        assert_eq!(snap.subscriptions.len(), 1);
        assert_eq!(registry.subscription_count(), 0);
    }

    /// Тест проверяет учёт деклараций издателей.
    #[test]
    fn test_publisher_round_trip() {
        let registry = SubscriptionRegistry::new();
        let publisher = Uri::new("orb://pub");
        registry.register_publisher(
            publisher.clone(),
            PublisherDeclaration {
                domain: domain(["a"]),
                patterns: vec![EntityKeyPattern::any()],
            },
        );
        assert_eq!(registry.publisher_count(), 1);

        registry.deregister_publisher(&publisher);
        registry.deregister_publisher(&publisher);
        assert_eq!(registry.publisher_count(), 0);
    }
}
