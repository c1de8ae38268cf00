pub mod events;

use serde::Serialize;
use tauri::ipc::Channel;
use tauri::{AppHandle, WebviewWindow};
use tauri_plugin_dialog::{DialogExt, FilePath};
use tokio::sync::oneshot;
use vidgo_supervisor::client::FileFilter;
use vidgo_supervisor::BackendPhase;

use crate::context::AppContext;
use events::StatusListener;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DesktopRuntimeStatus {
    pub running: bool,
    pub phase: BackendPhase,
    pub backend_url: String,
    pub backend_pid: Option<u32>,
    pub build_mode: String,
    pub status_listeners: usize,
}

pub fn backend_status_from_context(context: &AppContext) -> bool {
    context.supervisor().is_running()
}

pub fn backend_url_from_context(context: &AppContext) -> String {
    context.supervisor().backend_url().to_string()
}

/// Stop then start. Failures are logged; the caller only sees the running flag.
pub async fn restart_backend_from_context(context: &AppContext) -> bool {
    match context.supervisor().restart().await {
        Ok(running) => running,
        Err(err) => {
            log::error!("backend restart failed: {err}");
            context.supervisor().is_running()
        }
    }
}

pub fn runtime_status_from_context(context: &AppContext) -> DesktopRuntimeStatus {
    let supervisor = context.supervisor();
    let build_mode = if context.build_mode().is_development() {
        "development"
    } else {
        "packaged"
    };
    DesktopRuntimeStatus {
        running: supervisor.is_running(),
        phase: supervisor.phase(),
        backend_url: supervisor.backend_url().to_string(),
        backend_pid: supervisor.pid(),
        build_mode: build_mode.to_string(),
        status_listeners: context.listeners().len(),
    }
}

pub fn register_status_listener(context: &AppContext, listener: Box<dyn StatusListener>) -> u64 {
    context.listeners().register(listener)
}

pub fn remove_listeners_from_context(context: &AppContext, channel: &str) -> usize {
    context.listeners().remove_all(channel)
}

/// Node-style platform identifiers the interface already understands.
pub fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

#[tauri::command]
pub fn get_backend_status(context: tauri::State<'_, AppContext>) -> bool {
    backend_status_from_context(&context)
}

#[tauri::command]
pub fn get_backend_url(context: tauri::State<'_, AppContext>) -> String {
    backend_url_from_context(&context)
}

#[tauri::command]
pub async fn restart_backend(context: tauri::State<'_, AppContext>) -> Result<bool, String> {
    Ok(restart_backend_from_context(&context).await)
}

#[tauri::command]
pub fn desktop_runtime_status(context: tauri::State<'_, AppContext>) -> DesktopRuntimeStatus {
    runtime_status_from_context(&context)
}

#[tauri::command]
pub fn get_app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
pub fn get_platform() -> String {
    platform_name().to_string()
}

#[tauri::command]
pub fn is_desktop_runtime() -> bool {
    true
}

#[tauri::command]
pub async fn select_directory(app: AppHandle) -> Result<Option<String>, String> {
    let (tx, rx) = oneshot::channel();
    app.dialog().file().pick_folder(move |path| {
        let _ = tx.send(path.map(dialog_path));
    });
    rx.await
        .map_err(|_| "directory dialog closed without a result".to_string())
}

#[tauri::command]
pub async fn select_file(
    app: AppHandle,
    filters: Option<Vec<FileFilter>>,
) -> Result<Option<String>, String> {
    let mut dialog = app.dialog().file();
    for filter in filters.unwrap_or_default() {
        let extensions: Vec<&str> = filter.extensions.iter().map(String::as_str).collect();
        dialog = dialog.add_filter(filter.name.as_str(), &extensions);
    }

    let (tx, rx) = oneshot::channel();
    dialog.pick_file(move |path| {
        let _ = tx.send(path.map(dialog_path));
    });
    rx.await
        .map_err(|_| "file dialog closed without a result".to_string())
}

fn dialog_path(path: FilePath) -> String {
    path.to_string()
}

#[tauri::command]
pub fn minimize_window(window: WebviewWindow) {
    if let Err(err) = window.minimize() {
        log::warn!("minimize failed: {err}");
    }
}

#[tauri::command]
pub fn maximize_window(window: WebviewWindow) {
    let result = match window.is_maximized() {
        Ok(true) => window.unmaximize(),
        Ok(false) => window.maximize(),
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        log::warn!("maximize toggle failed: {err}");
    }
}

#[tauri::command]
pub fn close_window(window: WebviewWindow) {
    if let Err(err) = window.close() {
        log::warn!("close failed: {err}");
    }
}

#[tauri::command]
pub fn on_backend_status_change(
    context: tauri::State<'_, AppContext>,
    on_event: Channel<bool>,
) -> u64 {
    register_status_listener(&context, Box::new(on_event))
}

#[tauri::command]
pub fn remove_all_listeners(context: tauri::State<'_, AppContext>, channel: String) -> usize {
    remove_listeners_from_context(&context, &channel)
}
