//! End-to-end lifecycle tests over real sockets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use axum::routing::get;
use webserver::http::{Handler, REQUEST_TIMEOUT_MESSAGE};
use webserver::lifecycle::TerminationSignal;
use webserver::net::ListenerError;
use webserver::{LifecycleState, ServerBuilder, ServerError};

mod common;

fn sleeper(path: &str, delay: Duration) -> Handler {
    Handler::new(
        path,
        get(move || async move {
            tokio::time::sleep(delay).await;
            "done"
        }),
    )
}

#[tokio::test]
async fn test_request_not_below_read_is_rejected() {
    let err = common::builder("budget")
        .timeouts(common::timeouts(1000, 1000, 1000, 1000, 1000))
        .build()
        .unwrap_err();

    assert!(err.to_string().contains("timeouts.request"));
}

#[tokio::test]
async fn test_bind_failure_returns_listener_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let server = ServerBuilder::new("bind-test", taken.local_addr().unwrap().to_string())
        .signals(webserver::SignalMode::Manual)
        .build()
        .unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Listener(ListenerError::Bind(_))));
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn test_slow_handler_gets_timeout_response_at_request_budget() {
    let late_write = Arc::new(AtomicBool::new(false));
    let flag = late_write.clone();

    let mut server = common::spawn(
        common::builder("deadline")
            .timeouts(common::timeouts(3000, 1000, 3000, 100, 3000))
            .handler(Handler::new(
                "/slow",
                get(move || async move {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    flag.store(true, Ordering::SeqCst);
                    "late"
                }),
            )),
    )
    .await;

    let started = Instant::now();
    let res = common::client().get(server.url("/slow")).send().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(res.text().await.unwrap(), REQUEST_TIMEOUT_MESSAGE);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(2500), "timed out after {:?}", elapsed);

    // The handler future was dropped at the deadline.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!late_write.load(Ordering::SeqCst));

    server.stop.stop();
    server.wait_for(LifecycleState::Stopped).await;
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_signal_without_in_flight_requests_waits_task_budget() {
    let mut server = common::spawn(
        common::builder("graceful").timeouts(common::timeouts(3000, 1000, 3000, 500, 3000)),
    )
    .await;

    let res = common::client().get(server.url("/liveness")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let signalled = Instant::now();
    assert!(server.stop.send(TerminationSignal::Terminate));
    server.wait_for(LifecycleState::ShuttingDownGraceful).await;

    server.task.await.unwrap().unwrap();
    assert!(signalled.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_in_flight_request_completes_during_drain() {
    let mut server = common::spawn(
        common::builder("drain")
            .timeouts(common::timeouts(3000, 2000, 3000, 100, 3000))
            .handler(sleeper("/work", Duration::from_millis(500))),
    )
    .await;

    let url = server.url("/work");
    let request = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.stop.stop();
    server.wait_for(LifecycleState::ShuttingDownGraceful).await;

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "done");

    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stuck_request_forces_close_and_reports_timeout() {
    let mut server = common::spawn(
        common::builder("stuck")
            .timeouts(common::timeouts(10_000, 5_000, 300, 100, 10_000))
            .handler(sleeper("/stuck", Duration::from_secs(4))),
    )
    .await;

    let url = server.url("/stuck");
    let request = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let signalled = Instant::now();
    server.stop.stop();
    server.wait_for(LifecycleState::ShuttingDownHard).await;

    let err = server.task.await.unwrap().unwrap_err();
    assert!(err.is_timeout());
    assert!(err.close_error().is_none());
    assert_eq!(
        err.shutdown_timeout().unwrap().budget,
        Duration::from_millis(300)
    );
    assert!(signalled.elapsed() < Duration::from_secs(2));

    // The aborted connection never sees the handler's response.
    assert!(request.await.unwrap().is_err());
}

#[tokio::test]
async fn test_stop_endpoint_uses_signal_path() {
    let mut server = common::spawn(
        common::builder("remote-stop").timeouts(common::timeouts(3000, 1000, 3000, 100, 3000)),
    )
    .await;

    let res = common::client().get(server.url("/stop")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.wait_for(LifecycleState::ShuttingDownGraceful).await;
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_new_connections_refused_while_shutting_down() {
    let mut server = common::spawn(
        common::builder("refuse").timeouts(common::timeouts(3000, 1000, 3000, 1000, 3000)),
    )
    .await;
    let addr = server.addr;

    server.stop.stop();
    server.wait_for(LifecycleState::ShuttingDownGraceful).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_streamed_response_is_cut_at_write_budget() {
    let mut server = common::spawn(
        common::builder("write-budget")
            .timeouts(common::timeouts(3000, 1000, 3000, 100, 2000))
            .handler(Handler::new(
                "/stream",
                get(|| async {
                    let chunks = futures_util::stream::unfold(0u8, |sent| async move {
                        if sent == 5 {
                            return None;
                        }
                        tokio::time::sleep(Duration::from_millis(900)).await;
                        Some((Ok::<_, std::io::Error>(Bytes::from_static(b"chunk\n")), sent + 1))
                    });
                    Body::from_stream(chunks)
                }),
            )),
    )
    .await;

    let started = Instant::now();
    let res = common::client().get(server.url("/stream")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.bytes().await;
    let elapsed = started.elapsed();

    assert!(body.is_err(), "stream outlived the write budget: {:?}", body);
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3), "body ended after {:?}", elapsed);

    server.stop.stop();
    server.wait_for(LifecycleState::Stopped).await;
    server.task.await.unwrap().unwrap();
}
