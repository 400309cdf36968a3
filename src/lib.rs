/// Pub/Sub broker: subscription registry, key matching, NOTIFY fan-out.
pub mod broker;
/// Endpoint API: initiating interactions, pub/sub client operations.
pub mod client;
/// Runtime settings with environment overrides.
pub mod config;
/// Message dispatcher: routing, ordered per-transaction lanes, worker pool.
pub mod dispatch;
/// Common error types: stage machine, transactions, codec, transport.
pub mod error;
/// Interaction state machine: stages and legal transitions.
pub mod interaction;
/// Flexible logging (tracing subscriber setup).
pub mod logging;
/// Message model: header, body, interned URIs and identifiers.
pub mod message;
/// Transaction table: in-flight interaction state.
pub mod transaction;
/// Transport seam: codec, access control, in-process transport.
pub mod transport;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Broker side: binding, subscriptions, update keys, matching.
pub use broker::{
    BrokerBinding, EntityKey, EntityKeyPattern, Notification, PatternComponent,
    PublisherDeclaration, Subscription, SubscriptionRegistry, Update, UpdateKey,
};
/// Consumer side: endpoint and interaction handles.
pub use client::{Endpoint, InteractionHandle, OperationSpec};
/// config
pub use config::Settings;
/// Provider side: handler registration and staged replies.
pub use dispatch::{
    Dispatcher, OperationHandler, OperationRegistry, ProviderContext, PubSubListener,
};
/// Operation errors and result types.
pub use error::{
    EngineError, EngineResult, ErrorKind, StageError, StandardError, TransactionError,
};
/// Interaction patterns and stages.
pub use interaction::{Progression, Stage};
/// Message model.
pub use message::{
    domain, Domain, Identifier, InteractionType, MessageBody, MessageHeader, OperationKey,
    QosLevel, SessionType, Uri,
};
/// Transactions and their events.
pub use transaction::{InteractionEvent, Side, Transaction, TransactionTable, TxKey};
/// Transport collaborators.
pub use transport::{
    AccessControl, AllowAll, BincodeCodec, LocalTransport, MessageCodec, MessageSender, Transport,
};
