use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

pub const HEALTH_PATH: &str = "/api/health/";

/// Liveness probe against a running backend.
pub trait HealthProbe: Send + Sync + 'static {
    /// Resolves `true` only when the backend answered healthy. Never fails.
    fn check(&self, base_url: &str) -> impl Future<Output = bool> + Send;
}

pub fn health_url(base_url: &str) -> String {
    format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/'))
}

/// Single `GET {base}/api/health/` per check; healthy means exactly 200 OK.
#[derive(Clone, Debug)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        // The backend is always local; a system proxy must not intercept it.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn check(&self, base_url: &str) -> bool {
        let url = health_url(base_url);
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => {
                let healthy = response.status() == StatusCode::OK;
                if !healthy {
                    debug!(%url, status = %response.status(), "health probe returned non-OK status");
                }
                healthy
            }
            Err(err) => {
                debug!(%url, error = %err, "health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::health_url;

    #[test]
    fn health_url_appends_path_once() {
        assert_eq!(
            health_url("http://127.0.0.1:18000"),
            "http://127.0.0.1:18000/api/health/"
        );
        assert_eq!(
            health_url("http://127.0.0.1:18000/"),
            "http://127.0.0.1:18000/api/health/"
        );
    }
}
