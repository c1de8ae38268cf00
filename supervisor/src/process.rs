use std::io;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::launch_plan::LaunchPlan;

#[cfg(target_os = "windows")]
const WINDOWS_CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub fn spawn(plan: &LaunchPlan) -> io::Result<Child> {
    let mut command = Command::new(&plan.program);
    command
        .args(&plan.args)
        .current_dir(&plan.cwd)
        .envs(plan.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(target_os = "windows")]
    {
        command.creation_flags(WINDOWS_CREATE_NO_WINDOW);
    }
    command.spawn()
}

/// Stream the child's stdout/stderr into the log, one record per line.
pub fn forward_output(child: &mut Child) {
    let pid = child.id();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, pid, OutputStream::Stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, pid, OutputStream::Stderr));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(reader: R, pid: Option<u32>, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match stream {
                OutputStream::Stdout => info!(target: "backend", ?pid, "{line}"),
                OutputStream::Stderr if looks_like_failure(&line) => {
                    error!(target: "backend", ?pid, "{line}")
                }
                OutputStream::Stderr => warn!(target: "backend", ?pid, "{line}"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(target: "backend", ?pid, error = %err, "stopped reading backend output");
                break;
            }
        }
    }
}

fn looks_like_failure(line: &str) -> bool {
    line.contains("ERROR") || line.contains("Traceback") || line.contains("Exception")
}

/// Ask the process to exit: SIGTERM on POSIX, `taskkill /f /t` on Windows.
pub async fn request_graceful_stop(pid: u32) -> io::Result<()> {
    let pid_arg = pid.to_string();
    #[cfg(target_os = "windows")]
    let (label, program, args) = ("taskkill", "taskkill", vec!["/pid", pid_arg.as_str(), "/f", "/t"]);
    #[cfg(not(target_os = "windows"))]
    let (label, program, args) = ("kill -TERM", "kill", vec!["-TERM", pid_arg.as_str()]);

    let mut command = Command::new(program);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(target_os = "windows")]
    {
        command.creation_flags(WINDOWS_CREATE_NO_WINDOW);
    }

    let status = command.status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "{label} returned non-zero: pid={pid}, status={status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::looks_like_failure;

    #[test]
    fn failure_heuristic_matches_python_tracebacks() {
        assert!(looks_like_failure("Traceback (most recent call last):"));
        assert!(looks_like_failure("ERROR: could not bind"));
        assert!(!looks_like_failure("[19/Oct/2026 10:00:00] \"GET /api/health/ HTTP/1.1\" 200 15"));
    }
}
