//! Транспортный шов ядра.
//!
//! - `codec`: кодек кадра (заголовок + тело) и помощники для элементов.
//! - `local`: внутрипроцессный транспорт для тестов и связки конечных
//!   точек в одном процессе.
//!
//! Само ядро не владеет сокетами: транспорт — внешний коллаборатор,
//! который доставляет закодированные байты по URI и отдаёт входящие кадры
//! в `Endpoint::on_frame` со своего потока ввода-вывода.

pub mod codec;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::{
    error::{AccessError, EngineResult, TransportError},
    message::{MessageBody, MessageHeader, QosLevel, Uri},
};

pub use codec::{decode_element, encode_element, BincodeCodec, MessageCodec};
pub use local::LocalTransport;

/// Доставка закодированных кадров по URI.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Отправляет кадр адресату. Один вызов — одна попытка: повторы и
    /// контроль перегрузки — забота реализации транспорта, не ядра.
    async fn send(&self, to: &Uri, frame: Bytes) -> Result<(), TransportError>;
}

/// Контроль доступа к сообщениям.
///
/// Вызывается до диспетчеризации входящего и перед отправкой исходящего.
pub trait AccessControl: Send + Sync {
    fn check(&self, header: &MessageHeader) -> Result<(), AccessError>;
}

/// Пропускает всё. Реальная политика - внешний коллаборатор.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn check(&self, _header: &MessageHeader) -> Result<(), AccessError> {
        Ok(())
    }
}

/// Исходящий тракт: контроль доступа, кодирование, отправка.
///
/// Общий для диспетчера, брокера и клиентского API; политика QoS при
/// ошибке отправки применяется здесь, в одном месте.
pub struct MessageSender {
    codec: Arc<dyn MessageCodec>,
    transport: Arc<dyn Transport>,
    access: Arc<dyn AccessControl>,
}

impl MessageSender {
    pub fn new(
        codec: Arc<dyn MessageCodec>,
        transport: Arc<dyn Transport>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            codec,
            transport,
            access,
        }
    }

    /// Отправляет одно сообщение.
    ///
    /// При ошибке транспорта: BESTEFFORT глотает ошибку (сообщение просто
    /// теряется), остальные классы QoS поднимают `DeliveryFailed` наверх.
    pub async fn post(&self, header: &MessageHeader, body: &MessageBody) -> EngineResult<()> {
        self.access.check(header)?;
        let frame = self.codec.encode(header, body)?;

        match self.transport.send(&header.uri_to, frame).await {
            Ok(()) => Ok(()),
            Err(err) => match header.qos {
                QosLevel::BestEffort => {
                    trace!(
                        to = %header.uri_to,
                        tx_id = header.transaction_id,
                        %err,
                        "best-effort send failed, message dropped"
                    );
                    Ok(())
                }
                _ => Err(err.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::{
        interaction::Stage,
        message::{domain, Identifier, InteractionType, MessageBody, SessionType},
    };

    /// Транспорт, который всегда падает, считая попытки.
    struct FailingTransport {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, to: &Uri, _frame: Bytes) -> Result<(), TransportError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(TransportError::SendFailed {
                uri: to.clone(),
                detail: "link down".into(),
            })
        }
    }

    fn header(qos: QosLevel) -> MessageHeader {
        MessageHeader {
            uri_from: Uri::new("orb://a"),
            uri_to: Uri::new("orb://b"),
            transaction_id: 1,
            interaction_type: InteractionType::Send,
            stage: Stage::Send,
            qos,
            session: SessionType::Live,
            session_name: Identifier::new("ops"),
            priority: 0,
            domain: domain(["sat1"]),
            area: 1,
            area_version: 1,
            service: 1,
            operation: 1,
            is_error: false,
            auth_id: Bytes::new(),
        }
    }

    fn sender(transport: Arc<FailingTransport>) -> MessageSender {
        MessageSender::new(Arc::new(BincodeCodec), transport, Arc::new(AllowAll))
    }

    /// Тест проверяет, что BESTEFFORT молча глотает ошибку отправки.
    #[tokio::test]
    async fn test_besteffort_swallows_send_failure() {
        let transport = Arc::new(FailingTransport {
            attempts: AtomicUsize::new(0),
        });
        let sender = sender(transport.clone());

        sender
            .post(&header(QosLevel::BestEffort), &MessageBody::empty())
            .await
            .unwrap();
        assert_eq!(transport.attempts.load(Ordering::Relaxed), 1);
    }

    /// Тест проверяет, что ASSURED поднимает DeliveryFailed.
    #[tokio::test]
    async fn test_assured_surfaces_send_failure() {
        let transport = Arc::new(FailingTransport {
            attempts: AtomicUsize::new(0),
        });
        let sender = sender(transport);

        let err = sender
            .post(&header(QosLevel::Assured), &MessageBody::empty())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DeliveryFailed);
    }
}
