pub mod backend;
pub mod context;
pub mod ipc;
pub mod runtime_coordinator;
pub mod window_host;

use tauri::webview::PageLoadEvent;
use tauri::{Manager, RunEvent, WindowEvent};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
  let app = match tauri::Builder::default()
    .plugin(
      tauri_plugin_log::Builder::default()
        .level(log::LevelFilter::Info)
        .build(),
    )
    .plugin(tauri_plugin_dialog::init())
    .invoke_handler(tauri::generate_handler![
      ipc::get_backend_status,
      ipc::get_backend_url,
      ipc::restart_backend,
      ipc::desktop_runtime_status,
      ipc::get_app_version,
      ipc::get_platform,
      ipc::is_desktop_runtime,
      ipc::select_directory,
      ipc::select_file,
      ipc::minimize_window,
      ipc::maximize_window,
      ipc::close_window,
      ipc::on_backend_status_change,
      ipc::remove_all_listeners,
    ])
    .on_page_load(|webview, payload| {
      if matches!(payload.event(), PageLoadEvent::Finished) {
        window_host::handle_page_loaded(webview.app_handle(), webview.label());
      }
    })
    .on_window_event(|window, event| {
      if matches!(event, WindowEvent::Destroyed) {
        window_host::handle_window_destroyed(window.app_handle(), window.label());
      }
    })
    .setup(|app| {
      if let Err(err) = runtime_coordinator::initialize(app) {
        log::error!("failed to initialize desktop runtime: {err}");
        return Err(Box::new(err));
      }
      Ok(())
    })
    .build(tauri::generate_context!()) {
      Ok(app) => app,
      Err(err) => {
        eprintln!("Failed to start Tauri app: {err}");
        return;
      }
    };

  app.run(|app_handle, event| match event {
    RunEvent::ExitRequested { code, api, .. } => {
      runtime_coordinator::handle_exit_requested(app_handle, code, &api);
    }
    RunEvent::Exit => runtime_coordinator::handle_exit(app_handle),
    #[cfg(target_os = "macos")]
    RunEvent::Reopen {
      has_visible_windows,
      ..
    } => runtime_coordinator::handle_reopen(app_handle, has_visible_windows),
    _ => {}
  });
}
