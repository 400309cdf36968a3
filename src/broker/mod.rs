//! Подсистема Publish–Subscribe.
//!
//! - `matcher`: чистое сопоставление конкретного ключа обновления с
//!   шаблоном подписки (префикс домена + четыре компонента ключа).
//! - `registry`: реестр подписок и деклараций издателей со снимками
//!   copy-on-write.
//! - `broker`: привязка брокера — оркестровка REGISTER / PUBLISH_REGISTER /
//!   PUBLISH / DEREGISTER / PUBLISH_DEREGISTER и рассылка NOTIFY.

pub mod broker;
pub mod matcher;
pub mod registry;

pub use broker::{BrokerBinding, Notification};
pub use matcher::{
    declaration_covers, domain_matches, key_matches, subscription_matches, EntityKey,
    EntityKeyPattern, PatternComponent, PublisherDeclaration, Subscription, Update, UpdateKey,
    KEY_PARTS,
};
pub use registry::{Snapshot, StoredSubscription, SubscriptionRegistry};
