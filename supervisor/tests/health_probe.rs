use std::time::{Duration, Instant};

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use vidgo_supervisor::health::{HealthProbe, HttpHealthProbe};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral listener");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

#[tokio::test]
async fn ok_status_is_healthy() {
    let base = serve(Router::new().route("/api/health/", get(|| async { "ok" }))).await;
    let probe = HttpHealthProbe::new(Duration::from_millis(500));
    assert!(probe.check(&base).await);
}

#[tokio::test]
async fn non_ok_statuses_are_unhealthy() {
    let base = serve(
        Router::new()
            .route(
                "/api/health/",
                get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
            )
            .route("/api/empty/api/health/", get(|| async { StatusCode::NO_CONTENT })),
    )
    .await;
    let probe = HttpHealthProbe::new(Duration::from_millis(500));

    assert!(!probe.check(&base).await);
    assert!(!probe.check(&format!("{base}/api/empty")).await);
    assert!(!probe.check(&format!("{base}/missing")).await);
}

#[tokio::test]
async fn connection_refused_is_unhealthy() {
    let probe = HttpHealthProbe::new(Duration::from_millis(500));
    assert!(!probe.check(&format!("http://127.0.0.1:{}", free_port())).await);
}

#[tokio::test]
async fn slow_backend_is_unhealthy_after_timeout() {
    let base = serve(Router::new().route(
        "/api/health/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }),
    ))
    .await;
    let probe = HttpHealthProbe::new(Duration::from_millis(200));

    let started = Instant::now();
    assert!(!probe.check(&base).await);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "probe should give up at its timeout, took {:?}",
        started.elapsed()
    );
}
