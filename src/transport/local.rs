use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::Transport;
use crate::{error::TransportError, message::Uri};

/// Внутрипроцессный транспорт.
///
/// Реестр маршрутов URI -> канал входящих кадров. Используется тестами и
/// связкой нескольких конечных точек в одном процессе; настоящие сокеты —
/// дело внешних реализаций [`Transport`].
pub struct LocalTransport {
    routes: DashMap<Uri, mpsc::UnboundedSender<Bytes>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }

    /// Регистрирует URI и возвращает приёмник его входящих кадров.
    ///
    /// Повторная регистрация того же URI заменяет маршрут: старый приёмник
    /// закрывается.
    pub fn attach(&self, uri: Uri) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(uri, tx);
        rx
    }

    /// Снимает маршрут. Дальнейшие send в этот URI дают NoRoute.
    pub fn detach(&self, uri: &Uri) {
        self.routes.remove(uri);
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, to: &Uri, frame: Bytes) -> Result<(), TransportError> {
        let route = self
            .routes
            .get(to)
            .ok_or_else(|| TransportError::NoRoute(to.clone()))?;

        route
            .value()
            .send(frame)
            .map_err(|_| TransportError::SendFailed {
                uri: to.clone(),
                detail: "receiver dropped".into(),
            })
    }
}
