//! UI-side backend client.
//!
//! Works in two contexts: hosted inside the desktop shell, where calls go
//! through a [`HostBridge`], and standalone (plain browser tab, tooling),
//! where it talks HTTP to a URL derived from the page location. No method
//! returns an error; unavailable capabilities degrade to `false` / `None`
//! with a warning.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DEFAULT_BACKEND_PORT;
use crate::health::health_url;

const STANDALONE_STATUS_TIMEOUT: Duration = Duration::from_secs(5);

pub type BridgeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BridgeError>> + Send + 'a>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeError {
    Unavailable,
    Failed(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "desktop bridge unavailable"),
            Self::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

/// Capabilities the desktop shell exposes to the interface.
pub trait HostBridge: Send + Sync {
    fn backend_url(&self) -> BridgeFuture<'_, String>;
    fn backend_status(&self) -> BridgeFuture<'_, bool>;
    fn restart_backend(&self) -> BridgeFuture<'_, bool>;
    fn app_version(&self) -> BridgeFuture<'_, String>;
    fn select_directory(&self) -> BridgeFuture<'_, Option<String>>;
    fn select_file<'a>(&'a self, filters: &'a [FileFilter]) -> BridgeFuture<'a, Option<String>>;
    fn platform(&self) -> String;
    fn minimize_window(&self);
    fn maximize_window(&self);
    fn close_window(&self);
}

/// The `protocol` and `hostname` parts of the page the interface runs in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLocation {
    pub protocol: String,
    pub hostname: String,
}

impl PageLocation {
    pub fn new(protocol: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            hostname: hostname.into(),
        }
    }
}

/// `https:` pages keep https; everything else talks plain http to port 18000.
pub fn derive_backend_url(location: Option<&PageLocation>) -> String {
    let (protocol, host) = match location {
        Some(location) => {
            let protocol = if location.protocol == "https:" {
                "https:"
            } else {
                "http:"
            };
            let host = if location.hostname.is_empty() {
                "127.0.0.1"
            } else {
                location.hostname.as_str()
            };
            (protocol, host)
        }
        None => ("http:", "127.0.0.1"),
    };
    format!("{protocol}//{host}:{DEFAULT_BACKEND_PORT}")
}

#[derive(Clone)]
pub struct BackendClient {
    bridge: Option<Arc<dyn HostBridge>>,
    location: Option<PageLocation>,
    api_url: Option<String>,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn hosted(bridge: Arc<dyn HostBridge>) -> Self {
        Self {
            bridge: Some(bridge),
            location: None,
            api_url: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn standalone(location: Option<PageLocation>, api_url: Option<String>) -> Self {
        Self {
            bridge: None,
            location,
            api_url: api_url.filter(|url| !url.trim().is_empty()),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_location(mut self, location: PageLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_hosted(&self) -> bool {
        self.bridge.is_some()
    }

    pub async fn backend_url(&self) -> String {
        if let Some(bridge) = &self.bridge {
            return match bridge.backend_url().await {
                Ok(url) => url,
                Err(err) => {
                    warn!(error = %err, "bridge backend_url failed; deriving from page location");
                    derive_backend_url(self.location.as_ref())
                }
            };
        }

        match &self.api_url {
            Some(url) => url.clone(),
            None => derive_backend_url(self.location.as_ref()),
        }
    }

    pub async fn backend_status(&self) -> bool {
        if let Some(bridge) = &self.bridge {
            return bridge.backend_status().await.unwrap_or_else(|err| {
                warn!(error = %err, "bridge backend_status failed");
                false
            });
        }

        let url = health_url(&self.backend_url().await);
        match self
            .http
            .get(&url)
            .timeout(STANDALONE_STATUS_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn restart_backend(&self) -> bool {
        let Some(bridge) = &self.bridge else {
            warn!("restart_backend is only available in the desktop app");
            return false;
        };
        bridge.restart_backend().await.unwrap_or_else(|err| {
            warn!(error = %err, "bridge restart_backend failed");
            false
        })
    }

    pub fn platform(&self) -> String {
        match &self.bridge {
            Some(bridge) => bridge.platform(),
            None => "web".to_string(),
        }
    }

    pub async fn app_version(&self) -> Option<String> {
        let Some(bridge) = &self.bridge else {
            warn!("app_version is only available in the desktop app");
            return None;
        };
        bridge
            .app_version()
            .await
            .map_err(|err| warn!(error = %err, "bridge app_version failed"))
            .ok()
    }

    pub async fn select_directory(&self) -> Option<String> {
        let Some(bridge) = &self.bridge else {
            warn!("select_directory is only available in the desktop app");
            return None;
        };
        bridge.select_directory().await.unwrap_or_else(|err| {
            warn!(error = %err, "bridge select_directory failed");
            None
        })
    }

    pub async fn select_file(&self, filters: &[FileFilter]) -> Option<String> {
        let Some(bridge) = &self.bridge else {
            warn!("select_file is only available in the desktop app");
            return None;
        };
        bridge.select_file(filters).await.unwrap_or_else(|err| {
            warn!(error = %err, "bridge select_file failed");
            None
        })
    }

    pub fn minimize_window(&self) {
        if let Some(bridge) = &self.bridge {
            bridge.minimize_window();
        }
    }

    pub fn maximize_window(&self) {
        if let Some(bridge) = &self.bridge {
            bridge.maximize_window();
        }
    }

    pub fn close_window(&self) {
        if let Some(bridge) = &self.bridge {
            bridge.close_window();
        }
    }
}
