use std::fmt;

use tauri::{AppHandle, Manager};

use crate::backend;
use crate::context::AppContext;
use crate::ipc::events;
use crate::window_host;

#[derive(Debug)]
pub enum RuntimeCoordinatorError {
    Config(String),
}

impl fmt::Display for RuntimeCoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RuntimeCoordinatorError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitRequestedDecision {
    AllowImmediateExit,
    StopBackendThenExit(i32),
    StopBackendAndStayResident,
}

/// `code` is `None` when the request comes from the last window closing.
pub fn decide_exit_requested(
    has_exit_request_allowance: bool,
    code: Option<i32>,
    exit_when_all_windows_closed: bool,
) -> ExitRequestedDecision {
    if has_exit_request_allowance {
        return ExitRequestedDecision::AllowImmediateExit;
    }
    match code {
        None if !exit_when_all_windows_closed => ExitRequestedDecision::StopBackendAndStayResident,
        code => ExitRequestedDecision::StopBackendThenExit(code.unwrap_or(0)),
    }
}

pub fn initialize(app: &tauri::App) -> Result<(), RuntimeCoordinatorError> {
    let resource_dir = app.path().resource_dir().ok();
    let config = backend::desktop_supervisor_config(resource_dir.as_deref())
        .map_err(|err| RuntimeCoordinatorError::Config(err.to_string()))?;
    log::info!(
        "backend configured: url={} mode={:?} dir={}",
        config.backend_url(),
        config.launch.mode,
        config.launch.backend_dir.display()
    );

    let context = AppContext::new(config);
    let status_rx = context.supervisor().subscribe();
    let listeners = context.listeners().clone();
    app.manage(context);
    events::spawn_status_forwarder(app.handle().clone(), status_rx, listeners);

    let app_handle = app.handle().clone();
    tauri::async_runtime::spawn(async move {
        launch(&app_handle).await;
    });
    Ok(())
}

/// Start the backend, then open the main window whether or not it came up.
pub async fn launch(app: &AppHandle) {
    let context = app.state::<AppContext>();
    if let Err(err) = backend::start_backend(context.supervisor()).await {
        log::error!("{err}");
    }
    if let Err(err) = window_host::create_main_window(app, &context) {
        log::error!("{err}");
    }
}

pub fn handle_exit_requested(app: &AppHandle, code: Option<i32>, api: &tauri::ExitRequestApi) {
    let Some(context) = app.try_state::<AppContext>() else {
        return;
    };
    let decision = decide_exit_requested(
        context.take_exit_request_allowance(),
        code,
        window_host::should_exit_when_all_windows_closed(),
    );

    match decision {
        ExitRequestedDecision::AllowImmediateExit => {
            log::info!("exit request allowed after backend cleanup");
        }
        ExitRequestedDecision::StopBackendAndStayResident => {
            api.prevent_exit();
            log::info!("all windows closed; stopping backend and staying resident");
            let app_handle = app.clone();
            tauri::async_runtime::spawn(async move {
                app_handle.state::<AppContext>().shutdown_async().await;
            });
        }
        ExitRequestedDecision::StopBackendThenExit(exit_code) => {
            // Stop runs off the event loop; exit is re-issued once it finishes.
            api.prevent_exit();
            log::info!("exit requested, stopping backend first");
            let app_handle = app.clone();
            tauri::async_runtime::spawn(async move {
                let context = app_handle.state::<AppContext>();
                context.shutdown_async().await;
                context.allow_next_exit_request();
                app_handle.exit(exit_code);
            });
        }
    }
}

pub fn handle_exit(app: &AppHandle) {
    if let Some(context) = app.try_state::<AppContext>() {
        context.shutdown_blocking();
    }
}

/// Dock reactivation with nothing visible: bring the backend back and
/// re-create the main window.
pub fn handle_reopen(app: &AppHandle, has_visible_windows: bool) {
    if has_visible_windows {
        return;
    }
    let app_handle = app.clone();
    tauri::async_runtime::spawn(async move {
        launch(&app_handle).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowance_lets_exit_through() {
        assert_eq!(
            decide_exit_requested(true, Some(0), true),
            ExitRequestedDecision::AllowImmediateExit
        );
        assert_eq!(
            decide_exit_requested(true, None, false),
            ExitRequestedDecision::AllowImmediateExit
        );
    }

    #[test]
    fn last_window_closing_respects_platform_convention() {
        assert_eq!(
            decide_exit_requested(false, None, true),
            ExitRequestedDecision::StopBackendThenExit(0)
        );
        assert_eq!(
            decide_exit_requested(false, None, false),
            ExitRequestedDecision::StopBackendAndStayResident
        );
    }

    #[test]
    fn explicit_exit_always_stops_backend_first() {
        assert_eq!(
            decide_exit_requested(false, Some(0), false),
            ExitRequestedDecision::StopBackendThenExit(0)
        );
    }

    #[test]
    fn explicit_exit_code_survives_backend_cleanup() {
        assert_eq!(
            decide_exit_requested(false, Some(3), true),
            ExitRequestedDecision::StopBackendThenExit(3)
        );
    }
}
