use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tauri::ipc::Channel;
use tauri::{AppHandle, Emitter};
use tokio::sync::watch;

pub const BACKEND_STATUS_EVENT: &str = "backend-status-change";

/// Receiver of backend running-state changes registered from the UI.
pub trait StatusListener: Send + Sync {
    fn deliver(&self, running: bool) -> Result<(), String>;
}

impl StatusListener for Channel<bool> {
    fn deliver(&self, running: bool) -> Result<(), String> {
        self.send(running).map_err(|err| err.to_string())
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Box<dyn StatusListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Box<dyn StatusListener>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Drops every listener for `channel`, returning how many were removed.
    pub fn remove_all(&self, channel: &str) -> usize {
        if channel != BACKEND_STATUS_EVENT {
            log::debug!("no listeners registered for channel {channel}");
            return 0;
        }
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = listeners.len();
        listeners.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers to every listener; ones that fail are unregistered.
    pub fn broadcast(&self, running: bool) -> usize {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|(id, listener)| match listener.deliver(running) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("dropping backend status listener {id}: {err}");
                false
            }
        });
        listeners.len()
    }
}

/// Relays running-flag changes until the supervisor goes away.
pub async fn forward_status_changes<F>(
    mut status_rx: watch::Receiver<bool>,
    listeners: Arc<ListenerRegistry>,
    emit: F,
) where
    F: Fn(bool),
{
    while status_rx.changed().await.is_ok() {
        let running = *status_rx.borrow_and_update();
        log::info!("backend status changed: running={running}");
        emit(running);
        listeners.broadcast(running);
    }
}

pub fn spawn_status_forwarder(
    app: AppHandle,
    status_rx: watch::Receiver<bool>,
    listeners: Arc<ListenerRegistry>,
) {
    tauri::async_runtime::spawn(async move {
        forward_status_changes(status_rx, listeners, |running| {
            if let Err(err) = app.emit(BACKEND_STATUS_EVENT, running) {
                log::warn!("failed to emit {BACKEND_STATUS_EVENT}: {err}");
            }
        })
        .await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Arc<Mutex<Vec<bool>>>,
        fail: bool,
    }

    impl StatusListener for Recorder {
        fn deliver(&self, running: bool) -> Result<(), String> {
            if self.fail {
                return Err("webview gone".to_string());
            }
            self.seen.lock().expect("seen lock").push(running);
            Ok(())
        }
    }

    #[test]
    fn broadcast_drops_failing_listeners() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry.register(Box::new(Recorder {
            seen: seen.clone(),
            fail: false,
        }));
        registry.register(Box::new(Recorder {
            seen: seen.clone(),
            fail: true,
        }));

        assert_eq!(registry.broadcast(true), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(*seen.lock().expect("seen lock"), vec![true]);
    }

    #[test]
    fn remove_all_ignores_unknown_channels() {
        let registry = ListenerRegistry::new();
        let first = registry.register(Box::new(Recorder {
            seen: Arc::default(),
            fail: false,
        }));
        let second = registry.register(Box::new(Recorder {
            seen: Arc::default(),
            fail: false,
        }));
        assert_ne!(first, second);

        assert_eq!(registry.remove_all("window-resized"), 0);
        assert_eq!(registry.remove_all(BACKEND_STATUS_EVENT), 2);
        assert!(registry.is_empty());
    }
}
