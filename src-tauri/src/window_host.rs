use std::fmt;
use std::sync::{Mutex, PoisonError};

use tauri::{AppHandle, Manager, Url, WebviewUrl, WebviewWindowBuilder};
use vidgo_supervisor::launch_plan::BuildMode;

use crate::context::AppContext;

pub const MAIN_WINDOW_LABEL: &str = "main";
pub const DEFAULT_DEV_SERVER_URL: &str = "http://localhost:4173";
const BUNDLED_ENTRY: &str = "index.html";

#[derive(Debug)]
pub enum WindowHostError {
    InvalidDevServerUrl(String),
    Build(String),
}

impl fmt::Display for WindowHostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDevServerUrl(msg) => write!(f, "{msg}"),
            Self::Build(msg) => write!(f, "Failed to create main window: {msg}"),
        }
    }
}

impl std::error::Error for WindowHostError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowLifecycle {
    NotCreated,
    CreatedHidden,
    Shown,
    Closed,
}

/// Tracks the single main window. `Closed` allows re-creation the same way
/// `NotCreated` does.
pub struct WindowTracker {
    state: Mutex<WindowLifecycle>,
}

impl Default for WindowTracker {
    fn default() -> Self {
        Self {
            state: Mutex::new(WindowLifecycle::NotCreated),
        }
    }
}

impl WindowTracker {
    pub fn state(&self) -> WindowLifecycle {
        *self.lock()
    }

    /// Claims creation of the main window; false when one already exists.
    pub fn begin_create(&self) -> bool {
        let mut state = self.lock();
        match *state {
            WindowLifecycle::NotCreated | WindowLifecycle::Closed => {
                *state = WindowLifecycle::CreatedHidden;
                true
            }
            WindowLifecycle::CreatedHidden | WindowLifecycle::Shown => false,
        }
    }

    pub fn creation_failed(&self) {
        let mut state = self.lock();
        if *state == WindowLifecycle::CreatedHidden {
            *state = WindowLifecycle::NotCreated;
        }
    }

    /// True only for the first paint-ready signal after creation.
    pub fn mark_shown(&self) -> bool {
        let mut state = self.lock();
        if *state == WindowLifecycle::CreatedHidden {
            *state = WindowLifecycle::Shown;
            true
        } else {
            false
        }
    }

    pub fn mark_closed(&self) {
        *self.lock() = WindowLifecycle::Closed;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WindowLifecycle> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiSource {
    DevServer(Url),
    Bundled,
}

impl UiSource {
    fn webview_url(&self) -> WebviewUrl {
        match self {
            Self::DevServer(url) => WebviewUrl::External(url.clone()),
            Self::Bundled => WebviewUrl::App(BUNDLED_ENTRY.into()),
        }
    }
}

pub fn resolve_ui_source(
    mode: BuildMode,
    dev_server_url: Option<String>,
) -> Result<UiSource, WindowHostError> {
    if !mode.is_development() {
        return Ok(UiSource::Bundled);
    }

    let raw = dev_server_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DEV_SERVER_URL.to_string());
    Url::parse(&raw).map(UiSource::DevServer).map_err(|err| {
        WindowHostError::InvalidDevServerUrl(format!("Invalid UI dev server URL ({raw}): {err}"))
    })
}

/// macOS keeps the app alive with no windows open.
pub fn should_exit_when_all_windows_closed() -> bool {
    !cfg!(target_os = "macos")
}

pub fn create_main_window(app: &AppHandle, context: &AppContext) -> Result<(), WindowHostError> {
    if !context.window().begin_create() {
        log::debug!("main window already exists; creation skipped");
        return Ok(());
    }

    let result = resolve_ui_source(
        context.build_mode(),
        std::env::var("VITE_DEV_SERVER_URL").ok(),
    )
    .and_then(|source| build_main_window(app, &source));
    if result.is_err() {
        context.window().creation_failed();
    }
    result
}

fn build_main_window(app: &AppHandle, source: &UiSource) -> Result<(), WindowHostError> {
    log::info!("creating main window from {source:?}");
    let builder = WebviewWindowBuilder::new(app, MAIN_WINDOW_LABEL, source.webview_url())
        .title("VidGo")
        .inner_size(1400.0, 900.0)
        .min_inner_size(1024.0, 768.0)
        .visible(false);

    #[cfg(target_os = "macos")]
    let builder = builder
        .hidden_title(true)
        .title_bar_style(tauri::TitleBarStyle::Overlay);

    #[cfg_attr(not(debug_assertions), allow(unused_variables))]
    let window = builder
        .build()
        .map_err(|err| WindowHostError::Build(err.to_string()))?;

    #[cfg(debug_assertions)]
    window.open_devtools();

    Ok(())
}

/// Shows the main window on its first finished page load.
pub fn handle_page_loaded(app: &AppHandle, label: &str) {
    if label != MAIN_WINDOW_LABEL {
        return;
    }
    let Some(context) = app.try_state::<AppContext>() else {
        return;
    };
    if !context.window().mark_shown() {
        return;
    }
    if let Some(window) = app.get_webview_window(MAIN_WINDOW_LABEL) {
        if let Err(err) = window.show() {
            log::warn!("failed to show main window: {err}");
        }
        let _ = window.set_focus();
    }
}

pub fn handle_window_destroyed(app: &AppHandle, label: &str) {
    if label != MAIN_WINDOW_LABEL {
        return;
    }
    if let Some(context) = app.try_state::<AppContext>() {
        context.window().mark_closed();
        log::info!("main window closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_shows_once_and_allows_recreation_after_close() {
        let tracker = WindowTracker::default();
        assert_eq!(tracker.state(), WindowLifecycle::NotCreated);

        assert!(tracker.begin_create());
        assert!(!tracker.begin_create(), "second window must not be created");
        assert_eq!(tracker.state(), WindowLifecycle::CreatedHidden);

        assert!(tracker.mark_shown());
        assert!(!tracker.mark_shown(), "later page loads must not re-show");
        assert_eq!(tracker.state(), WindowLifecycle::Shown);

        tracker.mark_closed();
        assert_eq!(tracker.state(), WindowLifecycle::Closed);
        assert!(tracker.begin_create());
    }

    #[test]
    fn failed_creation_returns_to_not_created() {
        let tracker = WindowTracker::default();
        assert!(tracker.begin_create());
        tracker.creation_failed();
        assert_eq!(tracker.state(), WindowLifecycle::NotCreated);
        assert!(!tracker.mark_shown());
    }

    #[test]
    fn development_prefers_dev_server_override() {
        let source = resolve_ui_source(
            BuildMode::Development,
            Some("http://localhost:5173/".to_string()),
        )
        .expect("valid url");
        assert_eq!(
            source,
            UiSource::DevServer(Url::parse("http://localhost:5173/").expect("url"))
        );

        let fallback = resolve_ui_source(BuildMode::Development, Some("  ".to_string()))
            .expect("default url");
        assert_eq!(
            fallback,
            UiSource::DevServer(Url::parse(DEFAULT_DEV_SERVER_URL).expect("url"))
        );
    }

    #[test]
    fn packaged_always_uses_bundled_ui() {
        let source = resolve_ui_source(BuildMode::Packaged, Some("not a url".to_string()))
            .expect("bundled");
        assert_eq!(source, UiSource::Bundled);
    }

    #[test]
    fn invalid_dev_server_url_is_rejected() {
        let err = resolve_ui_source(BuildMode::Development, Some("not a url".to_string()))
            .expect_err("invalid url");
        assert!(matches!(err, WindowHostError::InvalidDevServerUrl(_)));
    }
}
