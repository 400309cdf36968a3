use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Настройки конечной точки.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// Дедлайн по умолчанию для инициируемых взаимодействий, мс.
    /// Инициатор никогда не ждёт бесконечно: нет явного дедлайна —
    /// действует этот.
    pub default_deadline_ms: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            default_deadline_ms: 10_000,
        }
    }
}

impl EndpointSettings {
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }
}

/// Настройки диспетчера.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Максимум одновременно работающих обработчиков.
    pub max_workers: usize,
    /// Сколько очередь транзакции живёт без сообщений, мс.
    pub lane_idle_timeout_ms: u64,
    /// Период выборки просроченных транзакций, мс.
    pub sweep_interval_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(2),
            lane_idle_timeout_ms: 30_000,
            sweep_interval_ms: 250,
        }
    }
}

impl DispatcherSettings {
    pub fn lane_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.lane_idle_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Настройки брокера.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Сверять ли ключи PUBLISH с декларацией PUBLISH_REGISTER.
    pub validate_publishers: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            validate_publishers: true,
        }
    }
}

/// Конфигурация ядра.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint: EndpointSettings,
    pub dispatcher: DispatcherSettings,
    pub broker: BrokerSettings,
}

impl Settings {
    /// Загружает настройки: значения по умолчанию плюс переменные
    /// окружения с префиксом `ORBITA_` (вложенность через `__`,
    /// например `ORBITA_DISPATCHER__MAX_WORKERS=8`).
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let cfg = Config::builder()
            .set_default(
                "endpoint.default_deadline_ms",
                defaults.endpoint.default_deadline_ms,
            )?
            .set_default("dispatcher.max_workers", defaults.dispatcher.max_workers as u64)?
            .set_default(
                "dispatcher.lane_idle_timeout_ms",
                defaults.dispatcher.lane_idle_timeout_ms,
            )?
            .set_default(
                "dispatcher.sweep_interval_ms",
                defaults.dispatcher.sweep_interval_ms,
            )?
            .set_default("broker.validate_publishers", defaults.broker.validate_publishers)?
            .add_source(Environment::with_prefix("ORBITA").separator("__"))
            .build()?;

        cfg.try_deserialize()
    }
}
