//! Сквозные сценарии: потребитель и провайдер на двух конечных точках
//! поверх внутрипроцессного транспорта, все шесть типов взаимодействий,
//! таймауты и поздние ответы.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use orbita::{
    AllowAll, BincodeCodec, Endpoint, EngineError, EngineResult, ErrorKind, InteractionEvent,
    LocalTransport, MessageBody, OperationHandler, OperationKey, OperationSpec, ProviderContext,
    Settings, StandardError, TxKey, Uri,
};
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.endpoint.default_deadline_ms = 2_000;
    settings.dispatcher.sweep_interval_ms = 25;
    settings.dispatcher.lane_idle_timeout_ms = 200;
    settings
}

fn make_endpoint(transport: &Arc<LocalTransport>, uri: &str) -> Arc<Endpoint> {
    let endpoint = Endpoint::new(
        Uri::new(uri),
        Arc::new(BincodeCodec),
        transport.clone(),
        Arc::new(AllowAll),
        fast_settings(),
    );
    endpoint.bind_local(transport);
    endpoint
}

const ECHO_OP: OperationKey = OperationKey {
    area: 200,
    area_version: 1,
    service: 1,
    operation: 1,
};

/// REQUEST: возвращает тело запроса обратно.
struct EchoHandler;

#[async_trait]
impl OperationHandler for EchoHandler {
    async fn handle(&self, ctx: ProviderContext, body: MessageBody) -> EngineResult<()> {
        ctx.respond(body).await
    }
}

/// SUBMIT: только подтверждение.
struct AckHandler;

#[async_trait]
impl OperationHandler for AckHandler {
    async fn handle(&self, ctx: ProviderContext, _body: MessageBody) -> EngineResult<()> {
        ctx.ack(MessageBody::empty()).await
    }
}

/// INVOKE: подтверждение, затем ответ.
struct InvokeHandler;

#[async_trait]
impl OperationHandler for InvokeHandler {
    async fn handle(&self, ctx: ProviderContext, body: MessageBody) -> EngineResult<()> {
        ctx.ack(MessageBody::empty()).await?;
        ctx.respond(body).await
    }
}

/// PROGRESS: подтверждение, нумерованные обновления, ответ.
struct ProgressHandler {
    updates: u32,
}

#[async_trait]
impl OperationHandler for ProgressHandler {
    async fn handle(&self, ctx: ProviderContext, _body: MessageBody) -> EngineResult<()> {
        ctx.ack(MessageBody::empty()).await?;
        for i in 0..self.updates {
            let payload = Bytes::copy_from_slice(&i.to_be_bytes());
            ctx.update(MessageBody::single(payload)).await?;
        }
        ctx.respond(MessageBody::empty()).await
    }
}

/// Всегда падает: диспетчер обязан превратить это в ERROR-ответ.
struct FailingHandler;

#[async_trait]
impl OperationHandler for FailingHandler {
    async fn handle(&self, _ctx: ProviderContext, _body: MessageBody) -> EngineResult<()> {
        Err(EngineError::Handler("synthetic failure".into()))
    }
}

/// REQUEST с задержкой ответа — для проверки таймаута и позднего ответа.
struct SlowHandler {
    delay: Duration,
}

#[async_trait]
impl OperationHandler for SlowHandler {
    async fn handle(&self, ctx: ProviderContext, body: MessageBody) -> EngineResult<()> {
        sleep(self.delay).await;
        ctx.respond(body).await
    }
}

/// SEND: складывает полученные тела в канал.
struct CaptureHandler {
    bodies: mpsc::UnboundedSender<MessageBody>,
}

#[async_trait]
impl OperationHandler for CaptureHandler {
    async fn handle(&self, _ctx: ProviderContext, body: MessageBody) -> EngineResult<()> {
        let _ = self.bodies.send(body);
        Ok(())
    }
}

/// Тест проверяет базовый сквозной сценарий: REQUEST уходит провайдеру,
/// ответ приходит ровно один раз, таблица транзакций после этого пуста.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_round_trip() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(EchoHandler));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let spec = OperationSpec::new(ECHO_OP);
    let mut handle = consumer
        .request(
            provider.uri(),
            &spec,
            MessageBody::single(Bytes::from_static(b"ping")),
            None,
        )
        .await
        .unwrap();
    let tx_id = handle.tx_id();

    let body = handle.await_response().await.unwrap();
    assert_eq!(body.elements().unwrap()[0], Bytes::from_static(b"ping"));

    // Ответ ровно один: после терминального события канал закрыт.
    assert!(handle.next_event().await.is_none());

    // Таблицы обеих сторон больше не держат транзакцию.
    assert!(!consumer
        .table()
        .contains(&TxKey::new(tx_id, provider.uri().clone())));
    sleep(Duration::from_millis(50)).await;
    assert!(provider.table().is_empty());
}

/// Тест проверяет SUBMIT: подтверждение и завершение транзакции.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_ack() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(AckHandler));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .submit(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            None,
        )
        .await
        .unwrap();

    handle.await_ack().await.unwrap();
    assert!(handle.next_event().await.is_none());
    assert!(consumer.table().is_empty());
}

/// Тест проверяет INVOKE: сначала Ack, затем Response.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invoke_ack_then_response() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(InvokeHandler));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .invoke(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::single(Bytes::from_static(b"job")),
            None,
        )
        .await
        .unwrap();

    let first = handle.next_event().await.unwrap();
    assert!(matches!(first, InteractionEvent::Ack(_)), "got {first:?}");

    let second = handle.next_event().await.unwrap();
    match second {
        InteractionEvent::Response(body) => {
            assert_eq!(body.elements().unwrap()[0], Bytes::from_static(b"job"));
        }
        other => panic!("expected response, got {other:?}"),
    }
    assert!(handle.next_event().await.is_none());
}

/// Тест проверяет PROGRESS: обновления приходят строго в порядке
/// отправки (порядок внутри одной транзакции), затем ответ.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_updates_in_order() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(ProgressHandler { updates: 50 }));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .progress(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    let first = handle.next_event().await.unwrap();
    assert!(matches!(first, InteractionEvent::Ack(_)));

    let mut expected: u32 = 0;
    loop {
        match handle.next_event().await.unwrap() {
            InteractionEvent::Update(body) => {
                let bytes = &body.elements().unwrap()[0];
                let got = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                assert_eq!(got, expected, "update out of order");
                expected += 1;
            }
            InteractionEvent::Response(_) => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(expected, 50);
}

/// Тест проверяет SEND: тело доходит до обработчика, транзакций не
/// остаётся ни у одной из сторон.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_one_way() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    let (bodies_tx, mut bodies_rx) = mpsc::unbounded_channel();
    provider.register_handler(ECHO_OP, Arc::new(CaptureHandler { bodies: bodies_tx }));
    let consumer = make_endpoint(&transport, "orb://consumer");

    consumer
        .send(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::single(Bytes::from_static(b"telemetry")),
        )
        .await
        .unwrap();

    let body = timeout(Duration::from_millis(500), bodies_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body.elements().unwrap()[0], Bytes::from_static(b"telemetry"));

    sleep(Duration::from_millis(50)).await;
    assert!(consumer.table().is_empty());
    assert!(provider.table().is_empty());
}

/// Тест проверяет, что ошибка обработчика превращается в ERROR-ответ с
/// видом INTERNAL и транзакция завершается принудительно.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handler_failure_becomes_error_reply() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(FailingHandler));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .request(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            None,
        )
        .await
        .unwrap();

    match handle.next_event().await.unwrap() {
        InteractionEvent::Error(err) => assert_eq!(err.kind, ErrorKind::Internal),
        other => panic!("expected error event, got {other:?}"),
    }
    sleep(Duration::from_millis(50)).await;
    assert!(provider.table().is_empty());
}

/// Тест проверяет дискриминацию отказов маршрутизации: неизвестная
/// операция и неизвестная область дают разные стандартные ошибки.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unsupported_operation_and_area() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(EchoHandler));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let wrong_op = OperationKey { operation: 99, ..ECHO_OP };
    let mut handle = consumer
        .request(
            provider.uri(),
            &OperationSpec::new(wrong_op),
            MessageBody::empty(),
            None,
        )
        .await
        .unwrap();
    match handle.next_event().await.unwrap() {
        InteractionEvent::Error(err) => {
            assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
        }
        other => panic!("expected error event, got {other:?}"),
    }

    let wrong_area = OperationKey { area: 300, ..ECHO_OP };
    let mut handle = consumer
        .request(
            provider.uri(),
            &OperationSpec::new(wrong_area),
            MessageBody::empty(),
            None,
        )
        .await
        .unwrap();
    match handle.next_event().await.unwrap() {
        InteractionEvent::Error(err) => assert_eq!(err.kind, ErrorKind::UnsupportedArea),
        other => panic!("expected error event, got {other:?}"),
    }
}

/// Тест проверяет поведение по дедлайну: приходит ровно один
/// DeliveryTimedOut, а опоздавший настоящий ответ отбрасывается.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deadline_then_late_reply_dropped() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(
        ECHO_OP,
        Arc::new(SlowHandler {
            delay: Duration::from_millis(400),
        }),
    );
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .request(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    let tx_id = handle.tx_id();

    // Ровно одно терминальное событие - таймаут.
    match handle.next_event().await.unwrap() {
        InteractionEvent::TimedOut => {}
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(handle.next_event().await.is_none());
    assert!(!consumer
        .table()
        .contains(&TxKey::new(tx_id, provider.uri().clone())));

    // Поздний ответ провайдера приходит в пустоту и фиксируется как
    // отброшенный.
    sleep(Duration::from_millis(500)).await;
    assert!(
        consumer
            .dispatcher()
            .dropped_count
            .load(std::sync::atomic::Ordering::Relaxed)
            >= 1
    );
}

/// Тест проверяет параллельные независимые транзакции: десять
/// конкурентных REQUEST завершаются корректно.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(EchoHandler));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut joins = Vec::new();
    for i in 0u32..10 {
        let consumer = consumer.clone();
        let to = provider.uri().clone();
        joins.push(tokio::spawn(async move {
            let payload = Bytes::copy_from_slice(&i.to_be_bytes());
            let mut handle = consumer
                .request(
                    &to,
                    &OperationSpec::new(ECHO_OP),
                    MessageBody::single(payload.clone()),
                    None,
                )
                .await
                .unwrap();
            let body = handle.await_response().await.unwrap();
            assert_eq!(body.elements().unwrap()[0], payload);
        }));
    }
    for join in joins {
        join.await.unwrap();
    }

    sleep(Duration::from_millis(100)).await;
    assert!(consumer.table().is_empty());
    assert!(provider.table().is_empty());
}

/// Тест проверяет отправку в неизвестный адрес: транспорт не знает
/// маршрута, инициатор получает ошибку сразу, транзакция не повисает.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_route_fails_fast() {
    let transport = Arc::new(LocalTransport::new());
    let consumer = make_endpoint(&transport, "orb://consumer");

    let err = consumer
        .request(
            &Uri::new("orb://nowhere"),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DestinationUnknown);
    assert!(consumer.table().is_empty());
}

/// Тест проверяет закрытие конечной точки: ожидающее взаимодействие
/// получает локальную терминальную ошибку, а не повисает.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_flushes_pending() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(
        ECHO_OP,
        Arc::new(SlowHandler {
            delay: Duration::from_secs(10),
        }),
    );
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .request(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            Some(Duration::from_secs(30)),
        )
        .await
        .unwrap();

    sleep(Duration::from_millis(50)).await;
    consumer.close();

    match handle.next_event().await.unwrap() {
        InteractionEvent::Error(err) => {
            assert_eq!(err.kind, ErrorKind::DestinationLost);
        }
        other => panic!("expected local terminal error, got {other:?}"),
    }
    assert!(consumer.table().is_empty());
}

/// Тест проверяет локальную отмену: запись снимается, ручка закрывается
/// без события, поздний ответ отбрасывается.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_cancel() {
    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(
        ECHO_OP,
        Arc::new(SlowHandler {
            delay: Duration::from_millis(300),
        }),
    );
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .request(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            None,
        )
        .await
        .unwrap();

    assert!(consumer.cancel(provider.uri(), handle.tx_id()));
    assert!(!consumer.cancel(provider.uri(), handle.tx_id()));
    assert!(consumer.table().is_empty());

    // Канал закрыт без терминального события.
    assert!(handle.next_event().await.is_none());
}

/// Тест проверяет, что ошибка от StandardError передаётся потребителю
/// как есть, когда провайдер отвечает через ctx.error().
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_provider_explicit_error() {
    struct RefusingHandler;

    #[async_trait]
    impl OperationHandler for RefusingHandler {
        async fn handle(&self, ctx: ProviderContext, _body: MessageBody) -> EngineResult<()> {
            ctx.error(StandardError::new(ErrorKind::TooMany, "queue full"))
                .await
        }
    }

    let transport = Arc::new(LocalTransport::new());
    let provider = make_endpoint(&transport, "orb://provider");
    provider.register_handler(ECHO_OP, Arc::new(RefusingHandler));
    let consumer = make_endpoint(&transport, "orb://consumer");

    let mut handle = consumer
        .request(
            provider.uri(),
            &OperationSpec::new(ECHO_OP),
            MessageBody::empty(),
            None,
        )
        .await
        .unwrap();

    match handle.next_event().await.unwrap() {
        InteractionEvent::Error(err) => {
            assert_eq!(err.kind, ErrorKind::TooMany);
            assert_eq!(err.message.as_deref(), Some("queue full"));
        }
        other => panic!("expected error event, got {other:?}"),
    }
}
