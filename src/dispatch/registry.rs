use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::ProviderContext;
use crate::{
    error::{EngineError, EngineResult},
    message::{MessageBody, OperationKey},
};

/// Обработчик операции на провайдерской стороне.
///
/// Получает контекст для поэтапных ответов и тело инициирующего
/// сообщения. Возврат `Err` превращается диспетчером в ERROR-ответ
/// потребителю и принудительное завершение транзакции.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, ctx: ProviderContext, body: MessageBody) -> EngineResult<()>;
}

impl fmt::Debug for dyn OperationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OperationHandler")
    }
}

/// Реестр обработчиков операций.
///
/// Привязывает (область, версия, служба, операция) к обработчику;
/// через него провайдерский код публикует свои операции.
pub struct OperationRegistry {
    handlers: DashMap<OperationKey, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Регистрирует обработчик операции `key`. Повторная регистрация
    /// замещает предыдущий обработчик.
    pub fn register(&self, key: OperationKey, handler: Arc<dyn OperationHandler>) {
        self.handlers.insert(key, handler);
    }

    pub fn deregister(&self, key: &OperationKey) {
        self.handlers.remove(key);
    }

    /// Находит обработчик, различая причины отказа: неизвестная область,
    /// не та версия, неизвестная операция.
    pub fn lookup(&self, key: OperationKey) -> EngineResult<Arc<dyn OperationHandler>> {
        if let Some(handler) = self.handlers.get(&key) {
            return Ok(handler.value().clone());
        }

        let mut area_seen = false;
        let mut version_seen = false;
        for entry in self.handlers.iter() {
            let other = entry.key();
            if other.area != key.area {
                continue;
            }
            area_seen = true;
            if other.area_version == key.area_version {
                version_seen = true;
            }
        }

        Err(if !area_seen {
            EngineError::UnsupportedArea { area: key.area }
        } else if !version_seen {
            EngineError::UnsupportedVersion {
                area: key.area,
                version: key.area_version,
            }
        } else {
            EngineError::UnsupportedOperation {
                service: key.service,
                operation: key.operation,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
