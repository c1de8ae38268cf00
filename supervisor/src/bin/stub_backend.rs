//! Minimal stand-in for the real backend: serves `/api/health/` so the
//! desktop shell can be exercised without the Python toolchain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};
use tracing::info;

struct StubOptions {
    host: String,
    port: u16,
    ready_after: Duration,
    exit_after: Option<Duration>,
    ignore_term: bool,
}

struct StubState {
    started_at: Instant,
    ready_after: Duration,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stub_backend=info".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_cli(&args) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            std::process::exit(1);
        }
    };

    if options.ignore_term {
        ignore_terminate_signal();
    }
    if let Some(exit_after) = options.exit_after {
        tokio::spawn(async move {
            tokio::time::sleep(exit_after).await;
            info!("exiting after {}ms as requested", exit_after.as_millis());
            std::process::exit(3);
        });
    }

    let state = Arc::new(StubState {
        started_at: Instant::now(),
        ready_after: options.ready_after,
    });
    let app = Router::new()
        .route("/api/health/", get(health_handler))
        .with_state(state);

    let bind_addr = format!("{}:{}", options.host, options.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind");

    info!("stub backend listening on {bind_addr}");
    axum::serve(listener, app).await.expect("Server error");
}

async fn health_handler(State(state): State<Arc<StubState>>) -> (StatusCode, Json<Value>) {
    if state.started_at.elapsed() < state.ready_after {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        );
    }
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[cfg(unix)]
fn ignore_terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    tokio::spawn(async move {
        while terminate.recv().await.is_some() {
            info!("ignoring SIGTERM");
        }
    });
}

#[cfg(not(unix))]
fn ignore_terminate_signal() {
    info!("--ignore-term has no effect on this platform");
}

fn parse_cli(args: &[String]) -> Result<StubOptions, String> {
    let mut options = StubOptions {
        host: "127.0.0.1".to_string(),
        port: 18000,
        ready_after: Duration::ZERO,
        exit_after: None,
        ignore_term: false,
    };

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--host" => {
                options.host = args.get(i + 1).ok_or("--host requires a value")?.clone();
                i += 2;
            }
            "--port" => {
                let value = args.get(i + 1).ok_or("--port requires a value")?;
                options.port = value
                    .parse()
                    .map_err(|_| format!("invalid --port value: {value}"))?;
                i += 2;
            }
            "--ready-after-ms" => {
                options.ready_after = Duration::from_millis(parse_millis(args, i)?);
                i += 2;
            }
            "--exit-after-ms" => {
                options.exit_after = Some(Duration::from_millis(parse_millis(args, i)?));
                i += 2;
            }
            "--ignore-term" => {
                options.ignore_term = true;
                i += 1;
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(options)
}

fn parse_millis(args: &[String], i: usize) -> Result<u64, String> {
    let flag = &args[i];
    let value = args
        .get(i + 1)
        .ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .parse()
        .map_err(|_| format!("invalid {flag} value: {value}"))
}

fn print_usage() {
    eprintln!(
        "usage: stub-backend [--host HOST] [--port PORT] [--ready-after-ms MS] [--exit-after-ms MS] [--ignore-term]"
    );
}
