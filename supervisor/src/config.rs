use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::launch_plan::{BuildMode, LaunchSettings};

pub const DEFAULT_BACKEND_HOST: &str = "127.0.0.1";
pub const DEFAULT_BACKEND_PORT: u16 = 18000;

/// Supervisor configuration. Read once at startup; the backend URL derived
/// from it stays fixed for the lifetime of the application.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub host: String,
    pub port: u16,
    pub launch: LaunchSettings,
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub health_check_interval_ms: u64,
    pub stop_grace_ms: u64,
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        let mode = BuildMode::detect(
            env::var("VIDGO_BUILD_MODE").ok().as_deref(),
            cfg!(debug_assertions),
        );

        Self {
            host: parse_string(env::var("VIDGO_BACKEND_HOST").ok(), DEFAULT_BACKEND_HOST),
            port: parse_env("VIDGO_BACKEND_PORT", DEFAULT_BACKEND_PORT),
            launch: LaunchSettings {
                mode,
                backend_dir: env::var("VIDGO_BACKEND_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("backend")),
                python: non_empty(env::var("VIDGO_PYTHON").ok()),
                custom_command: non_empty(env::var("VIDGO_BACKEND_CMD").ok()),
            },
            readiness_attempts: parse_value_min(env::var("VIDGO_READY_ATTEMPTS").ok(), 30, 1),
            readiness_interval_ms: parse_env("VIDGO_READY_INTERVAL_MS", 1_000),
            probe_timeout_ms: parse_env("VIDGO_HEALTH_TIMEOUT_MS", 2_000),
            health_check_interval_ms: parse_env("VIDGO_HEALTH_INTERVAL_MS", 30_000),
            stop_grace_ms: parse_env("VIDGO_STOP_GRACE_MS", 5_000),
        }
    }

    pub fn backend_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Replace host and/or port, keeping everything else.
    pub fn apply_bind_override(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_value(env::var(key).ok(), default)
}

fn parse_value<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_value_min(raw: Option<String>, default: u32, min: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v >= min)
        .unwrap_or(default)
}

fn parse_string(raw: Option<String>, default: &str) -> String {
    non_empty(raw).unwrap_or_else(|| default.to_string())
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_falls_back_on_garbage() {
        assert_eq!(parse_value::<u16>(Some("18001".into()), 18000), 18001);
        assert_eq!(parse_value::<u16>(Some(" 4173 ".into()), 18000), 4173);
        assert_eq!(parse_value::<u16>(Some("not-a-port".into()), 18000), 18000);
        assert_eq!(parse_value::<u16>(None, 18000), 18000);
    }

    #[test]
    fn readiness_attempts_must_be_positive() {
        assert_eq!(parse_value_min(Some("0".into()), 30, 1), 30);
        assert_eq!(parse_value_min(Some("5".into()), 30, 1), 5);
    }

    #[test]
    fn blank_strings_use_default() {
        assert_eq!(parse_string(Some("   ".into()), "127.0.0.1"), "127.0.0.1");
        assert_eq!(parse_string(Some("0.0.0.0".into()), "127.0.0.1"), "0.0.0.0");
    }

    #[test]
    fn backend_url_and_bind_addr_share_host_and_port() {
        let config = SupervisorConfig::from_env().apply_bind_override(
            Some("127.0.0.1".to_string()),
            Some(18000),
        );
        assert_eq!(config.backend_url(), "http://127.0.0.1:18000");
        assert_eq!(config.bind_addr(), "127.0.0.1:18000");
    }
}
