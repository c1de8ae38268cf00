use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub const MANAGE_SCRIPT: &str = "manage.py";

#[cfg(target_os = "windows")]
pub const PACKAGED_EXECUTABLE: &str = "vidgo-backend.exe";
#[cfg(not(target_os = "windows"))]
pub const PACKAGED_EXECUTABLE: &str = "vidgo-backend";

/// Selects between the interpreted dev server and the bundled executable,
/// and between the UI dev server and bundled UI files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    Packaged,
}

impl BuildMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" | "packaged" => Some(Self::Packaged),
            _ => None,
        }
    }

    /// An explicit override wins; otherwise debug builds run in development mode.
    pub fn detect(raw_override: Option<&str>, debug_build: bool) -> Self {
        raw_override
            .and_then(Self::parse)
            .unwrap_or(if debug_build {
                Self::Development
            } else {
                Self::Packaged
            })
    }

    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSettings {
    pub mode: BuildMode,
    pub backend_dir: PathBuf,
    pub python: Option<String>,
    pub custom_command: Option<String>,
}

/// A fully resolved command line for the backend process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LaunchPlanError {
    InvalidCommand(String),
    EmptyCommand,
    MissingEntrypoint(PathBuf),
}

impl fmt::Display for LaunchPlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCommand(cmd) => write!(f, "invalid VIDGO_BACKEND_CMD: {cmd}"),
            Self::EmptyCommand => write!(f, "VIDGO_BACKEND_CMD is empty"),
            Self::MissingEntrypoint(path) => {
                write!(f, "backend entrypoint is missing: {}", path.display())
            }
        }
    }
}

impl std::error::Error for LaunchPlanError {}

impl LaunchSettings {
    pub fn resolve(&self, bind_addr: &str) -> Result<LaunchPlan, LaunchPlanError> {
        let mut plan = match &self.custom_command {
            Some(custom) => resolve_custom(custom, &self.backend_dir)?,
            None => match self.mode {
                BuildMode::Development => self.resolve_development(bind_addr)?,
                BuildMode::Packaged => self.resolve_packaged()?,
            },
        };
        plan.env
            .push(("VIDGO_BACKEND_BIND".to_string(), bind_addr.to_string()));
        Ok(plan)
    }

    fn resolve_development(&self, bind_addr: &str) -> Result<LaunchPlan, LaunchPlanError> {
        let script = self.backend_dir.join(MANAGE_SCRIPT);
        if !script.is_file() {
            return Err(LaunchPlanError::MissingEntrypoint(script));
        }

        let program = self
            .python
            .clone()
            .unwrap_or_else(|| default_python().to_string());

        Ok(LaunchPlan {
            program,
            args: vec![
                MANAGE_SCRIPT.to_string(),
                "runserver".to_string(),
                bind_addr.to_string(),
                "--noreload".to_string(),
            ],
            cwd: self.backend_dir.clone(),
            env: vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())],
        })
    }

    fn resolve_packaged(&self) -> Result<LaunchPlan, LaunchPlanError> {
        let executable = self.backend_dir.join(PACKAGED_EXECUTABLE);
        if !executable.is_file() {
            return Err(LaunchPlanError::MissingEntrypoint(executable));
        }

        Ok(LaunchPlan {
            program: executable.to_string_lossy().to_string(),
            args: Vec::new(),
            cwd: self.backend_dir.clone(),
            env: Vec::new(),
        })
    }
}

fn resolve_custom(custom: &str, backend_dir: &Path) -> Result<LaunchPlan, LaunchPlanError> {
    let mut pieces =
        shlex::split(custom).ok_or_else(|| LaunchPlanError::InvalidCommand(custom.to_string()))?;
    if pieces.is_empty() {
        return Err(LaunchPlanError::EmptyCommand);
    }
    let program = pieces.remove(0);

    let cwd = if backend_dir.is_dir() {
        backend_dir.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    };

    Ok(LaunchPlan {
        program,
        args: pieces,
        cwd,
        env: Vec::new(),
    })
}

fn default_python() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: BuildMode, backend_dir: &Path) -> LaunchSettings {
        LaunchSettings {
            mode,
            backend_dir: backend_dir.to_path_buf(),
            python: None,
            custom_command: None,
        }
    }

    #[test]
    fn build_mode_override_beats_build_profile() {
        assert_eq!(BuildMode::detect(Some("production"), true), BuildMode::Packaged);
        assert_eq!(BuildMode::detect(Some("DEV"), false), BuildMode::Development);
        assert_eq!(BuildMode::detect(Some("bogus"), true), BuildMode::Development);
        assert_eq!(BuildMode::detect(None, false), BuildMode::Packaged);
    }

    #[test]
    fn development_plan_runs_manage_py_without_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join(MANAGE_SCRIPT), "").expect("write manage.py");

        let plan = settings(BuildMode::Development, dir.path())
            .resolve("127.0.0.1:18000")
            .expect("dev plan should resolve");

        assert_eq!(plan.program, default_python());
        assert_eq!(
            plan.args,
            vec!["manage.py", "runserver", "127.0.0.1:18000", "--noreload"]
        );
        assert_eq!(plan.cwd, dir.path());
        assert!(plan
            .env
            .contains(&("PYTHONUNBUFFERED".to_string(), "1".to_string())));
        assert!(plan
            .env
            .contains(&("VIDGO_BACKEND_BIND".to_string(), "127.0.0.1:18000".to_string())));
    }

    #[test]
    fn development_plan_honours_python_override() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join(MANAGE_SCRIPT), "").expect("write manage.py");
        let mut settings = settings(BuildMode::Development, dir.path());
        settings.python = Some("/opt/conda/bin/python".to_string());

        let plan = settings.resolve("127.0.0.1:18000").expect("dev plan");
        assert_eq!(plan.program, "/opt/conda/bin/python");
    }

    #[test]
    fn development_plan_requires_manage_py() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = settings(BuildMode::Development, dir.path())
            .resolve("127.0.0.1:18000")
            .expect_err("missing manage.py should fail");
        assert_eq!(
            err,
            LaunchPlanError::MissingEntrypoint(dir.path().join(MANAGE_SCRIPT))
        );
    }

    #[test]
    fn packaged_plan_runs_bundled_executable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let exe = dir.path().join(PACKAGED_EXECUTABLE);
        std::fs::write(&exe, "").expect("write executable");

        let plan = settings(BuildMode::Packaged, dir.path())
            .resolve("127.0.0.1:18000")
            .expect("packaged plan should resolve");
        assert_eq!(plan.program, exe.to_string_lossy());
        assert!(plan.args.is_empty());
        assert_eq!(plan.cwd, dir.path());
    }

    #[test]
    fn packaged_plan_reports_missing_executable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = settings(BuildMode::Packaged, dir.path())
            .resolve("127.0.0.1:18000")
            .expect_err("missing executable should fail");
        assert!(err.to_string().contains(PACKAGED_EXECUTABLE));
    }

    #[test]
    fn custom_command_is_split_with_shell_quoting() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut settings = settings(BuildMode::Packaged, dir.path());
        settings.custom_command = Some("uv run 'main app.py' --port 18000".to_string());

        let plan = settings.resolve("127.0.0.1:18000").expect("custom plan");
        assert_eq!(plan.program, "uv");
        assert_eq!(plan.args, vec!["run", "main app.py", "--port", "18000"]);
        assert_eq!(plan.cwd, dir.path());
    }

    #[test]
    fn custom_command_rejects_unbalanced_quotes_and_blank_input() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut settings = settings(BuildMode::Development, dir.path());

        settings.custom_command = Some("python 'unterminated".to_string());
        assert!(matches!(
            settings.resolve("127.0.0.1:18000"),
            Err(LaunchPlanError::InvalidCommand(_))
        ));

        settings.custom_command = Some("   ".to_string());
        assert_eq!(
            settings.resolve("127.0.0.1:18000"),
            Err(LaunchPlanError::EmptyCommand)
        );
    }
}
