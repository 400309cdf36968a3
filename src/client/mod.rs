//! Клиентский API конечной точки.
//!
//! - `endpoint`: конечная точка — вход транспорта, инициирование всех
//!   шести типов взаимодействий, управляющие операции Pub/Sub, хостинг
//!   брокера и обработчиков.
//! - `handle`: ручка инициированного взаимодействия с потоком событий.

pub mod endpoint;
pub mod handle;

pub use endpoint::{Endpoint, OperationSpec};
pub use handle::InteractionHandle;
