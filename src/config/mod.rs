//! Конфигурация ядра: значения по умолчанию и overrides из окружения.

pub mod settings;

pub use settings::{BrokerSettings, DispatcherSettings, EndpointSettings, Settings};
