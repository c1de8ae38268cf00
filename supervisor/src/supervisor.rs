//! Backend process supervisor.
//!
//! Owns at most one backend child process and moves it through
//! `Idle -> Starting -> Running -> Stopping -> Idle`. Every phase change goes
//! through [`Shared::set_phase`], which also publishes the running flag, so
//! `running` is true exactly while the phase is `Running` (and therefore
//! while a child handle exists).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::health::{HealthProbe, HttpHealthProbe};
use crate::launch_plan::LaunchPlanError;
use crate::process;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for BackendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub enum SupervisorError {
    Launch(LaunchPlanError),
    Spawn {
        program: String,
        source: std::io::Error,
    },
    ReadinessTimeout {
        attempts: u32,
        interval: Duration,
    },
    ExitedDuringStartup(String),
    StartCancelled,
    StartAborted(BackendPhase),
    Busy(BackendPhase),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch(err) => write!(f, "failed to resolve backend launch plan: {err}"),
            Self::Spawn { program, source } => {
                write!(f, "failed to spawn backend ({program}): {source}")
            }
            Self::ReadinessTimeout { attempts, interval } => write!(
                f,
                "backend failed to start within timeout ({attempts} attempts every {}ms)",
                interval.as_millis()
            ),
            Self::ExitedDuringStartup(status) => {
                write!(f, "backend exited before becoming healthy: {status}")
            }
            Self::StartCancelled => write!(f, "backend start cancelled by stop request"),
            Self::StartAborted(phase) => {
                write!(f, "concurrent backend start did not succeed (now {phase})")
            }
            Self::Busy(phase) => write!(f, "backend is {phase}; try again once it settles"),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Launch(err) => Some(err),
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum StartupSignal {
    Pending,
    Stopped,
    Exited(String),
}

struct ChildHandle {
    generation: u64,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited_rx: watch::Receiver<bool>,
}

struct Inner {
    phase: BackendPhase,
    generation: u64,
    child: Option<ChildHandle>,
    startup_tx: Option<watch::Sender<StartupSignal>>,
    health_shutdown: Option<watch::Sender<bool>>,
}

struct Shared<P> {
    config: SupervisorConfig,
    backend_url: String,
    probe: P,
    inner: Mutex<Inner>,
    phase_tx: watch::Sender<BackendPhase>,
    running_tx: watch::Sender<bool>,
}

impl<P> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, inner: &mut Inner, phase: BackendPhase) {
        inner.phase = phase;
        self.phase_tx.send_replace(phase);
        let running = phase == BackendPhase::Running;
        self.running_tx.send_if_modified(|current| {
            let changed = *current != running;
            *current = running;
            changed
        });
    }

    fn stop_health_check(inner: &mut Inner) {
        if let Some(shutdown) = inner.health_shutdown.take() {
            let _ = shutdown.send(true);
        }
    }

    fn on_exit(&self, generation: u64, status: &str) {
        let mut inner = self.lock();
        if inner.generation != generation || inner.child.is_none() {
            return;
        }

        let previous = inner.phase;
        inner.child = None;
        Self::stop_health_check(&mut inner);
        if let Some(startup) = inner.startup_tx.take() {
            let _ = startup.send(StartupSignal::Exited(status.to_string()));
        }
        self.set_phase(&mut inner, BackendPhase::Idle);
        drop(inner);

        match previous {
            BackendPhase::Stopping => info!(%status, "backend exited"),
            BackendPhase::Starting => warn!(%status, "backend exited during startup"),
            BackendPhase::Running => warn!(%status, "backend exited unexpectedly"),
            BackendPhase::Idle => {}
        }
    }

    fn finish_stop(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.phase == BackendPhase::Stopping {
            inner.child = None;
            self.set_phase(&mut inner, BackendPhase::Idle);
        }
    }
}

struct Launch {
    generation: u64,
    startup_rx: watch::Receiver<StartupSignal>,
    started_at: Instant,
}

/// Cheap to clone; all clones drive the same backend.
pub struct Supervisor<P = HttpHealthProbe> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for Supervisor<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Supervisor<HttpHealthProbe> {
    pub fn new(config: SupervisorConfig) -> Self {
        let probe = HttpHealthProbe::new(config.probe_timeout());
        Self::with_probe(config, probe)
    }
}

impl<P: HealthProbe> Supervisor<P> {
    pub fn with_probe(config: SupervisorConfig, probe: P) -> Self {
        let backend_url = config.backend_url();
        let (phase_tx, _) = watch::channel(BackendPhase::Idle);
        let (running_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                backend_url,
                probe,
                inner: Mutex::new(Inner {
                    phase: BackendPhase::Idle,
                    generation: 0,
                    child: None,
                    startup_tx: None,
                    health_shutdown: None,
                }),
                phase_tx,
                running_tx,
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    pub fn backend_url(&self) -> &str {
        &self.shared.backend_url
    }

    pub fn is_running(&self) -> bool {
        *self.shared.running_tx.borrow()
    }

    pub fn phase(&self) -> BackendPhase {
        self.shared.lock().phase
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.lock().child.as_ref().and_then(|child| child.pid)
    }

    /// Running-flag updates; only actual changes are published.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.running_tx.subscribe()
    }

    /// Spawn the backend and wait until it reports healthy.
    ///
    /// A no-op when already running. While another start is in flight this
    /// waits for that attempt instead of spawning a second process.
    ///
    /// Readiness polling belongs to the supervisor, not to this future:
    /// dropping it leaves the attempt running to completion.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let outcome_rx = {
            let mut inner = self.shared.lock();
            match inner.phase {
                BackendPhase::Running => {
                    debug!("backend already running; start ignored");
                    return Ok(());
                }
                BackendPhase::Stopping => return Err(SupervisorError::Busy(BackendPhase::Stopping)),
                BackendPhase::Starting => None,
                BackendPhase::Idle => {
                    let launch = self.launch(&mut inner)?;
                    Some(self.spawn_readiness(launch))
                }
            }
        };

        match outcome_rx {
            Some(outcome_rx) => outcome_rx
                .await
                .unwrap_or(Err(SupervisorError::StartCancelled)),
            None => self.join_inflight_start().await,
        }
    }

    /// Stop the backend. Never fails: resolves once the process is gone,
    /// force-killing it when the grace period runs out.
    ///
    /// The graceful-then-forced sequence runs in its own task, so dropping
    /// this future does not strand the backend in `Stopping`.
    pub async fn stop(&self) {
        let mut exited_rx = {
            let mut inner = self.shared.lock();
            Shared::<P>::stop_health_check(&mut inner);

            let phase = inner.phase;
            let Some(child) = inner.child.as_mut() else {
                return;
            };
            let exited_rx = child.exited_rx.clone();
            if phase != BackendPhase::Stopping {
                let generation = child.generation;
                let pid = child.pid;
                let kill_tx = child.kill_tx.take();
                if let Some(startup) = inner.startup_tx.take() {
                    let _ = startup.send(StartupSignal::Stopped);
                }
                self.shared.set_phase(&mut inner, BackendPhase::Stopping);
                spawn_stop_sequence(
                    Arc::clone(&self.shared),
                    generation,
                    pid,
                    kill_tx,
                    exited_rx.clone(),
                );
            }
            exited_rx
        };

        wait_for_exit(&mut exited_rx).await;
    }

    /// Stop then start; reports the running flag afterwards.
    pub async fn restart(&self) -> Result<bool, SupervisorError> {
        self.stop().await;
        self.start().await?;
        Ok(self.is_running())
    }

    /// Resolves once no stop is in progress.
    pub async fn wait_while_stopping(&self) {
        let mut phase_rx = self.shared.phase_tx.subscribe();
        let _ = phase_rx
            .wait_for(|phase| *phase != BackendPhase::Stopping)
            .await;
    }

    fn launch(&self, inner: &mut Inner) -> Result<Launch, SupervisorError> {
        let config = &self.shared.config;
        let plan = config
            .launch
            .resolve(&config.bind_addr())
            .map_err(SupervisorError::Launch)?;

        info!(
            program = %plan.program,
            args = ?plan.args,
            cwd = %plan.cwd.display(),
            mode = ?config.launch.mode,
            "starting backend"
        );
        let mut child = process::spawn(&plan).map_err(|source| SupervisorError::Spawn {
            program: plan.program.clone(),
            source,
        })?;
        let pid = child.id();
        process::forward_output(&mut child);

        inner.generation += 1;
        let generation = inner.generation;
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        let (startup_tx, startup_rx) = watch::channel(StartupSignal::Pending);

        inner.child = Some(ChildHandle {
            generation,
            pid,
            kill_tx: Some(kill_tx),
            exited_rx,
        });
        inner.startup_tx = Some(startup_tx);
        self.shared.set_phase(inner, BackendPhase::Starting);

        spawn_exit_monitor(Arc::clone(&self.shared), child, generation, kill_rx, exited_tx);

        Ok(Launch {
            generation,
            startup_rx,
            started_at: Instant::now(),
        })
    }

    fn spawn_readiness(&self, launch: Launch) -> oneshot::Receiver<Result<(), SupervisorError>> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let supervisor = self.clone();
        tokio::spawn(async move {
            let outcome = supervisor.await_readiness(launch).await;
            let _ = outcome_tx.send(outcome);
        });
        outcome_rx
    }

    async fn await_readiness(&self, launch: Launch) -> Result<(), SupervisorError> {
        let Launch {
            generation,
            mut startup_rx,
            started_at,
        } = launch;
        let attempts = self.shared.config.readiness_attempts.max(1);
        let interval = self.shared.config.readiness_interval();

        for attempt in 0..attempts {
            let healthy = tokio::select! {
                healthy = self.shared.probe.check(&self.shared.backend_url) => healthy,
                signal = interrupted(&mut startup_rx) => return Err(signal_error(signal)),
            };
            if healthy {
                return self.promote(generation, attempt + 1, started_at);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                signal = interrupted(&mut startup_rx) => return Err(signal_error(signal)),
            }
        }

        warn!(
            attempts,
            interval_ms = interval.as_millis() as u64,
            url = %self.shared.backend_url,
            "backend never became healthy; stopping it"
        );
        self.stop().await;
        Err(SupervisorError::ReadinessTimeout { attempts, interval })
    }

    fn promote(
        &self,
        generation: u64,
        attempt: u32,
        started_at: Instant,
    ) -> Result<(), SupervisorError> {
        let mut inner = self.shared.lock();
        if inner.phase != BackendPhase::Starting
            || inner.generation != generation
            || inner.child.is_none()
        {
            return Err(SupervisorError::StartCancelled);
        }

        inner.startup_tx = None;
        self.shared.set_phase(&mut inner, BackendPhase::Running);
        inner.health_shutdown = Some(self.spawn_health_check());

        info!(
            attempt,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            url = %self.shared.backend_url,
            "backend is ready"
        );
        Ok(())
    }

    async fn join_inflight_start(&self) -> Result<(), SupervisorError> {
        let mut phase_rx = self.shared.phase_tx.subscribe();
        let phase = phase_rx
            .wait_for(|phase| *phase != BackendPhase::Starting)
            .await
            .map(|phase| *phase)
            .unwrap_or(BackendPhase::Idle);
        match phase {
            BackendPhase::Running => Ok(()),
            other => Err(SupervisorError::StartAborted(other)),
        }
    }

    fn spawn_health_check(&self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let interval = shared.config.health_check_interval();

        tokio::spawn(async move {
            loop {
                if sleep_or_shutdown(interval, &mut shutdown_rx).await {
                    break;
                }
                let healthy = shared.probe.check(&shared.backend_url).await;
                if healthy {
                    debug!(url = %shared.backend_url, "backend health check passed");
                } else if *shared.running_tx.borrow() {
                    warn!(url = %shared.backend_url, "backend health check failed");
                }
            }
        });

        shutdown_tx
    }
}

fn spawn_stop_sequence<P: HealthProbe>(
    shared: Arc<Shared<P>>,
    generation: u64,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    mut exited_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        info!(?pid, "stopping backend");
        if let Some(pid) = pid {
            if let Err(err) = process::request_graceful_stop(pid).await {
                warn!(pid, error = %err, "graceful stop request failed");
            }
        }

        let grace = shared.config.stop_grace();
        if tokio::time::timeout(grace, wait_for_exit(&mut exited_rx))
            .await
            .is_err()
        {
            warn!(
                ?pid,
                grace_ms = grace.as_millis() as u64,
                "backend did not exit after graceful stop; forcing kill"
            );
            if let Some(kill_tx) = kill_tx {
                let _ = kill_tx.send(());
            }
            wait_for_exit(&mut exited_rx).await;
        }

        shared.finish_stop(generation);
        info!(?pid, "backend stopped");
    });
}

fn spawn_exit_monitor<P: HealthProbe>(
    shared: Arc<Shared<P>>,
    mut child: Child,
    generation: u64,
    mut kill_rx: oneshot::Receiver<()>,
    exited_tx: watch::Sender<bool>,
) {
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = &mut kill_rx => {
                if let Err(err) = child.start_kill() {
                    warn!(error = %err, "force kill failed");
                }
                child.wait().await
            }
        };
        let status = match status {
            Ok(status) => status.to_string(),
            Err(err) => format!("wait failed: {err}"),
        };
        shared.on_exit(generation, &status);
        let _ = exited_tx.send(true);
    });
}

async fn interrupted(startup_rx: &mut watch::Receiver<StartupSignal>) -> StartupSignal {
    match startup_rx
        .wait_for(|signal| *signal != StartupSignal::Pending)
        .await
    {
        Ok(signal) => signal.clone(),
        Err(_) => StartupSignal::Stopped,
    }
}

fn signal_error(signal: StartupSignal) -> SupervisorError {
    match signal {
        StartupSignal::Exited(status) => SupervisorError::ExitedDuringStartup(status),
        StartupSignal::Pending | StartupSignal::Stopped => SupervisorError::StartCancelled,
    }
}

async fn wait_for_exit(exited_rx: &mut watch::Receiver<bool>) {
    let _ = exited_rx.wait_for(|exited| *exited).await;
}

async fn sleep_or_shutdown(duration: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown_rx.changed() => match changed {
            Ok(_) => *shutdown_rx.borrow(),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_signals_map_to_start_errors() {
        assert!(matches!(
            signal_error(StartupSignal::Stopped),
            SupervisorError::StartCancelled
        ));
        assert!(matches!(
            signal_error(StartupSignal::Exited("exit status: 1".into())),
            SupervisorError::ExitedDuringStartup(status) if status == "exit status: 1"
        ));
    }

    #[test]
    fn readiness_timeout_message_mentions_budget() {
        let err = SupervisorError::ReadinessTimeout {
            attempts: 30,
            interval: Duration::from_millis(1_000),
        };
        assert_eq!(
            err.to_string(),
            "backend failed to start within timeout (30 attempts every 1000ms)"
        );
    }

    #[tokio::test]
    async fn sleep_or_shutdown_reports_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");
        assert!(sleep_or_shutdown(Duration::from_secs(60), &mut rx).await);
    }
}
