pub mod broker;
pub mod codec;
pub mod engine;
pub mod kind;
pub mod stage;
pub mod transaction;
pub mod transport;

pub use broker::BrokerError;
pub use codec::CodecError;
pub use engine::{EngineError, EngineResult};
pub use kind::{ErrorKind, StandardError};
pub use stage::StageError;
pub use transaction::TransactionError;
pub use transport::{AccessError, TransportError};
