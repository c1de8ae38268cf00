use std::fmt;
use std::path::{Path, PathBuf};

use vidgo_supervisor::launch_plan::BuildMode;
use vidgo_supervisor::{Supervisor, SupervisorConfig, SupervisorError};

#[derive(Debug)]
pub enum BackendStartupError {
    Config(String),
    Start(SupervisorError),
}

impl fmt::Display for BackendStartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "{msg}"),
            Self::Start(err) => write!(f, "Failed to start backend: {err}"),
        }
    }
}

impl std::error::Error for BackendStartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Start(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesktopBindOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl DesktopBindOverrides {
    pub fn from_env() -> Self {
        let host = std::env::var("VIDGO_DESKTOP_HOST")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let port = std::env::var("VIDGO_DESKTOP_PORT")
            .ok()
            .and_then(|value| value.trim().parse::<u16>().ok());
        Self { host, port }
    }
}

pub fn apply_desktop_bind_overrides(
    config: SupervisorConfig,
    overrides: DesktopBindOverrides,
) -> SupervisorConfig {
    config.apply_bind_override(overrides.host, overrides.port)
}

/// Directory a relative backend dir is resolved against: the workspace root
/// in development, the bundle resources once packaged.
pub fn backend_dir_base(mode: BuildMode, resource_dir: Option<&Path>) -> Option<PathBuf> {
    match mode {
        BuildMode::Development => Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .map(Path::to_path_buf),
        BuildMode::Packaged => resource_dir.map(Path::to_path_buf),
    }
}

pub fn apply_desktop_runtime_overrides(
    mut config: SupervisorConfig,
    bind_overrides: DesktopBindOverrides,
    backend_dir_base: Option<&Path>,
) -> Result<SupervisorConfig, BackendStartupError> {
    config = apply_desktop_bind_overrides(config, bind_overrides);

    if config.launch.backend_dir.is_relative() {
        let base = backend_dir_base.ok_or_else(|| {
            BackendStartupError::Config(format!(
                "Cannot resolve backend directory ({}) without a {} base directory",
                config.launch.backend_dir.display(),
                match config.launch.mode {
                    BuildMode::Development => "workspace",
                    BuildMode::Packaged => "resource",
                }
            ))
        })?;
        config.launch.backend_dir = base.join(&config.launch.backend_dir);
    }

    Ok(config)
}

pub fn desktop_supervisor_config(
    resource_dir: Option<&Path>,
) -> Result<SupervisorConfig, BackendStartupError> {
    let base = SupervisorConfig::from_env();
    let dir_base = backend_dir_base(base.launch.mode, resource_dir);
    apply_desktop_runtime_overrides(base, DesktopBindOverrides::from_env(), dir_base.as_deref())
}

/// Starts the backend, first letting any in-flight stop finish.
pub async fn start_backend(supervisor: &Supervisor) -> Result<(), BackendStartupError> {
    supervisor.wait_while_stopping().await;
    supervisor.start().await.map_err(BackendStartupError::Start)?;
    log::info!("backend listening on {}", supervisor.backend_url());
    Ok(())
}
