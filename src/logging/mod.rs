//! Инициализация логирования.
//!
//! Тонкая обёртка над `tracing-subscriber`: фильтр уровня из конфигурации
//! или переменной `RUST_LOG`, консольный вывод.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Конфигурация логирования.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Уровень/директивы фильтра, напр. "info" или "orbita=debug,info".
    pub level: String,
    /// ANSI-раскраска консольного вывода.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// Инициализация логирования с конфигурацией.
///
/// Повторный вызов вернёт ошибку от `try_init` — глобальный подписчик
/// ставится один раз на процесс.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()?;

    tracing::debug!(level = %config.level, "logging initialized");
    Ok(())
}
