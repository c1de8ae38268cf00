use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vidgo_supervisor::launch_plan::BuildMode;
use vidgo_supervisor::{Supervisor, SupervisorConfig};

use crate::ipc::events::ListenerRegistry;
use crate::window_host::WindowTracker;

/// Everything the shell keeps for its lifetime: one backend supervisor, one
/// main window, and the UI's status listeners. Managed as Tauri state.
pub struct AppContext {
    supervisor: Supervisor,
    listeners: Arc<ListenerRegistry>,
    window: WindowTracker,
    build_mode: BuildMode,
    exit_request_allowance: AtomicBool,
}

impl AppContext {
    pub fn new(config: SupervisorConfig) -> Self {
        let build_mode = config.launch.mode;
        Self {
            supervisor: Supervisor::new(config),
            listeners: Arc::new(ListenerRegistry::new()),
            window: WindowTracker::default(),
            build_mode,
            exit_request_allowance: AtomicBool::new(false),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub fn window(&self) -> &WindowTracker {
        &self.window
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }

    pub fn allow_next_exit_request(&self) {
        self.exit_request_allowance.store(true, Ordering::SeqCst);
    }

    pub fn take_exit_request_allowance(&self) -> bool {
        self.exit_request_allowance.swap(false, Ordering::SeqCst)
    }

    pub async fn shutdown_async(&self) {
        self.supervisor.stop().await;
    }

    pub fn shutdown_blocking(&self) {
        tauri::async_runtime::block_on(self.shutdown_async())
    }
}
