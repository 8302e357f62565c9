//! External process supervision
//!
//! Every stage of the SDR pipeline is an external program. A
//! [`ProcessSupervisor`] owns one of them: it spawns the child on a
//! dedicated thread, sends its output to a log file, watches for exit and
//! reports the outcome to the ground station as a status text.
//!
//! # Exit classification
//!
//! Checked in this order:
//!
//! 1. `stop()` was called: **terminated**, never restarted
//! 2. exit code 0: **clean exit**
//! 3. anything else: **failure**, restarted if the policy allows
//!
//! A child that cannot be spawned (missing program, unwritable log) is a
//! failure with code 255 and follows the same restart policy.
//!
//! # Status texts
//!
//! - `Process start: <name>`
//! - `Process end: <name>`
//! - `Process terminated: <name>`
//! - `Process fail: <code> <name>`, with ` - Restarting` appended when the
//!   process will be started again

pub mod pipe;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::communication::mavlink::status_notifier::StatusSink;

pub use pipe::{PipeRole, SharedPipe};

/// Exit code reported when the child could not be spawned
pub const SPAWN_FAILURE_CODE: i32 = 255;

/// Interval between exit polls of a running child
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor for {0} already started")]
    AlreadyStarted(String),

    #[error("failed to spawn supervision thread: {0}")]
    Thread(#[from] io::Error),
}

/// Restart behaviour after a failure exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    Never,
    Restart { max_restarts: u32, delay: Duration },
}

impl RestartPolicy {
    fn allows(&self, restarts_so_far: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::Restart {
                max_restarts,
                delay,
            } => (restarts_so_far < max_restarts).then_some(delay),
        }
    }
}

/// How a supervised run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Clean,
    Terminated,
    Failed(i32),
}

impl ExitOutcome {
    pub fn classify(code: i32, terminated: bool) -> Self {
        if terminated {
            Self::Terminated
        } else if code == 0 {
            Self::Clean
        } else {
            Self::Failed(code)
        }
    }

    fn status_text(&self, name: &str, restarting: bool) -> String {
        let mut text = match self {
            Self::Clean => format!("Process end: {name}"),
            Self::Terminated => format!("Process terminated: {name}"),
            Self::Failed(code) => format!("Process fail: {code} {name}"),
        };
        if restarting {
            text.push_str(" - Restarting");
        }
        text
    }
}

/// What to run and where its output goes
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Short name used in status texts
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// stdout (unless piped) and stderr are written here
    pub log_path: PathBuf,
    pub pipe: PipeRole,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            log_path: log_path.into(),
            pipe: PipeRole::None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn pipe(mut self, role: PipeRole) -> Self {
        self.pipe = role;
        self
    }

    /// Program and arguments as one line, for logs
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn spawn(&self) -> io::Result<Child> {
        let log = File::create(&self.log_path)?;
        let mut command = Command::new(&self.program);
        command.args(&self.args).stderr(log.try_clone()?);

        match &self.pipe {
            PipeRole::None => {
                command.stdin(Stdio::null()).stdout(log);
            }
            PipeRole::StdinFromPipe(pipe) => {
                command.stdin(pipe.stdin()?).stdout(log);
            }
            PipeRole::StdoutToPipe(pipe) => {
                command.stdin(Stdio::null()).stdout(pipe.stdout()?);
            }
        }
        command.spawn()
    }
}

/// Called once with the final outcome when supervision ends
pub type ExitCallback = Box<dyn FnOnce(ExitOutcome) + Send>;

struct Shared {
    child: Mutex<Option<Child>>,
    terminated: AtomicBool,
    running: AtomicBool,
    restarts: AtomicU32,
    outcome: Mutex<Option<ExitOutcome>>,
}

/// Supervises one external process
pub struct ProcessSupervisor {
    spec: Arc<ProcessSpec>,
    policy: RestartPolicy,
    sink: Arc<dyn StatusSink>,
    shared: Arc<Shared>,
    stop_tx: Mutex<Option<Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessSupervisor {
    pub fn new(spec: ProcessSpec, policy: RestartPolicy, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            spec: Arc::new(spec),
            policy,
            sink,
            shared: Arc::new(Shared {
                child: Mutex::new(None),
                terminated: AtomicBool::new(false),
                running: AtomicBool::new(false),
                restarts: AtomicU32::new(0),
                outcome: Mutex::new(None),
            }),
            stop_tx: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Supervision thread still active
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn restarts(&self) -> u32 {
        self.shared.restarts.load(Ordering::Relaxed)
    }

    /// Final outcome once supervision has ended
    pub fn outcome(&self) -> Option<ExitOutcome> {
        *self.shared.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// OS process id of the live child
    pub fn pid(&self) -> Option<u32> {
        self.shared
            .child
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Child::id)
    }

    pub fn start(&self) -> Result<(), SupervisorError> {
        self.start_with(None)
    }

    /// Start supervision; `on_exit` runs on the supervision thread with the
    /// final outcome
    pub fn start_with(&self, on_exit: Option<ExitCallback>) -> Result<(), SupervisorError> {
        let mut thread = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if thread.is_some() {
            return Err(SupervisorError::AlreadyStarted(self.spec.name.clone()));
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        self.shared.running.store(true, Ordering::Release);

        let spec = self.spec.clone();
        let shared = self.shared.clone();
        let sink = self.sink.clone();
        let policy = self.policy;
        let handle = std::thread::Builder::new()
            .name(format!("proc-{}", spec.name))
            .spawn(move || {
                let outcome = supervise(&spec, policy, sink.as_ref(), &shared, &stop_rx);
                *shared.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
                shared.running.store(false, Ordering::Release);
                if let Some(on_exit) = on_exit {
                    on_exit(outcome);
                }
            })
            .inspect_err(|_| self.shared.running.store(false, Ordering::Release))?;

        *self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(stop_tx);
        *thread = Some(handle);
        Ok(())
    }

    /// Terminate the child and wait for supervision to end
    ///
    /// Idempotent. Safe to call from the supervisor's own exit callback.
    pub fn stop(&self) {
        self.shared.terminated.store(true, Ordering::Release);
        drop(self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()).take());

        if let Some(child) = self
            .shared
            .child
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            crate::log_debug!("Killing {} (pid {})", self.spec.name, child.id());
            if let Err(e) = child.kill() {
                crate::log_debug!("Kill {} failed: {}", self.spec.name, e);
            }
        }

        let handle = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                crate::log_error!("Supervision thread for {} panicked", self.spec.name);
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn supervise(
    spec: &ProcessSpec,
    policy: RestartPolicy,
    sink: &dyn StatusSink,
    shared: &Shared,
    stop_rx: &Receiver<()>,
) -> ExitOutcome {
    loop {
        if shared.terminated.load(Ordering::Acquire) {
            sink.info(&ExitOutcome::Terminated.status_text(&spec.name, false));
            return ExitOutcome::Terminated;
        }

        sink.info(&format!("Process start: {}", spec.name));
        crate::log_info!(
            "Process start: {} '{}' > {}",
            spec.name,
            spec.command_line(),
            spec.log_path.display()
        );

        // A spawn failure is an ordinary failure with code 255
        let code = match spec.spawn() {
            Ok(child) => {
                *shared.child.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
                wait_for_exit(shared)
            }
            Err(e) => {
                crate::log_error!("Failed to spawn {}: {}", spec.command_line(), e);
                SPAWN_FAILURE_CODE
            }
        };

        let outcome = ExitOutcome::classify(code, shared.terminated.load(Ordering::Acquire));
        let delay = match outcome {
            ExitOutcome::Failed(_) => policy.allows(shared.restarts.load(Ordering::Relaxed)),
            _ => None,
        };

        let text = outcome.status_text(&spec.name, delay.is_some());
        match outcome {
            ExitOutcome::Failed(_) => sink.error(&text),
            _ => sink.info(&text),
        }

        let Some(delay) = delay else {
            return outcome;
        };
        shared.restarts.fetch_add(1, Ordering::Relaxed);
        match stop_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return ExitOutcome::Terminated,
        }
    }
}

/// Poll the child until it exits; returns its exit code
fn wait_for_exit(shared: &Shared) -> i32 {
    loop {
        {
            let mut slot = shared.child.lock().unwrap_or_else(|e| e.into_inner());
            let Some(child) = slot.as_mut() else {
                return SPAWN_FAILURE_CODE;
            };
            // stop() may have raced the spawn
            if shared.terminated.load(Ordering::Acquire) {
                let _ = child.kill();
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    *slot = None;
                    return exit_code(status);
                }
                Ok(None) => {}
                Err(e) => {
                    crate::log_error!("Waiting on pid {} failed: {}", child.id(), e);
                    let _ = child.kill();
                    let _ = child.wait();
                    *slot = None;
                    return SPAWN_FAILURE_CODE;
                }
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(SPAWN_FAILURE_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILURE_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mavlink::status_notifier::RecordingSink;
    use std::time::Instant;

    fn spec(dir: &tempfile::TempDir, name: &str, script: &str) -> ProcessSpec {
        ProcessSpec::new(name, "sh", dir.path().join(format!("{name}.log"))).args(["-c", script])
    }

    fn wait_done(supervisor: &ProcessSupervisor) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!supervisor.is_running(), "supervision did not finish");
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(ExitOutcome::classify(0, true), ExitOutcome::Terminated);
        assert_eq!(ExitOutcome::classify(137, true), ExitOutcome::Terminated);
        assert_eq!(ExitOutcome::classify(0, false), ExitOutcome::Clean);
        assert_eq!(ExitOutcome::classify(2, false), ExitOutcome::Failed(2));
    }

    #[test]
    fn test_status_texts() {
        assert_eq!(ExitOutcome::Clean.status_text("csdr", false), "Process end: csdr");
        assert_eq!(
            ExitOutcome::Failed(3).status_text("csdr", true),
            "Process fail: 3 csdr - Restarting"
        );
    }

    #[test]
    fn test_clean_exit_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let supervisor = ProcessSupervisor::new(
            spec(&dir, "echo", "echo hello; echo oops >&2"),
            RestartPolicy::Never,
            sink.clone(),
        );
        supervisor.start().unwrap();
        wait_done(&supervisor);

        assert_eq!(supervisor.outcome(), Some(ExitOutcome::Clean));
        assert_eq!(sink.messages(), vec!["Process start: echo", "Process end: echo"]);
        let log = std::fs::read_to_string(dir.path().join("echo.log")).unwrap();
        assert!(log.contains("hello"));
        assert!(log.contains("oops"));
    }

    #[test]
    fn test_failure_without_restart_ends_supervision() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let supervisor =
            ProcessSupervisor::new(spec(&dir, "bad", "exit 3"), RestartPolicy::Never, sink.clone());
        supervisor.start().unwrap();
        wait_done(&supervisor);

        assert_eq!(supervisor.outcome(), Some(ExitOutcome::Failed(3)));
        assert_eq!(supervisor.restarts(), 0);
        assert!(sink.contains("Process fail: 3 bad"));
    }

    #[test]
    fn test_restart_until_limit() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let policy = RestartPolicy::Restart {
            max_restarts: 2,
            delay: Duration::from_millis(10),
        };
        let supervisor = ProcessSupervisor::new(spec(&dir, "flaky", "exit 1"), policy, sink.clone());
        supervisor.start().unwrap();
        wait_done(&supervisor);

        assert_eq!(supervisor.restarts(), 2);
        let messages = sink.messages();
        assert_eq!(
            messages.iter().filter(|m| *m == "Process start: flaky").count(),
            3
        );
        assert_eq!(
            messages
                .iter()
                .filter(|m| *m == "Process fail: 1 flaky - Restarting")
                .count(),
            2
        );
        assert_eq!(messages.last().unwrap(), "Process fail: 1 flaky");
    }

    #[test]
    fn test_stop_before_exit_is_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let policy = RestartPolicy::Restart {
            max_restarts: 5,
            delay: Duration::from_millis(10),
        };
        let supervisor = ProcessSupervisor::new(spec(&dir, "sleeper", "sleep 30"), policy, sink.clone());
        supervisor.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.pid().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        supervisor.stop();

        assert!(!supervisor.is_running());
        assert_eq!(supervisor.outcome(), Some(ExitOutcome::Terminated));
        assert_eq!(supervisor.restarts(), 0);
        assert!(sink.contains("Process terminated: sleeper"));

        // Idempotent
        supervisor.stop();
    }

    #[test]
    fn test_spawn_failure_restarted_per_policy() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let policy = RestartPolicy::Restart {
            max_restarts: 3,
            delay: Duration::from_millis(10),
        };
        let supervisor = ProcessSupervisor::new(
            ProcessSpec::new("missing", dir.path().join("no-such-program"), dir.path().join("m.log")),
            policy,
            sink.clone(),
        );
        supervisor.start().unwrap();
        wait_done(&supervisor);

        assert_eq!(supervisor.outcome(), Some(ExitOutcome::Failed(SPAWN_FAILURE_CODE)));
        assert_eq!(supervisor.restarts(), 3);
        let restarting = sink
            .messages()
            .iter()
            .filter(|t| t.as_str() == "Process fail: 255 missing - Restarting")
            .count();
        assert_eq!(restarting, 3);
        assert!(sink.contains("Process fail: 255 missing"));
    }

    #[test]
    fn test_spawn_failure_abandoned_without_restart_policy() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let supervisor = ProcessSupervisor::new(
            ProcessSpec::new("missing", dir.path().join("no-such-program"), dir.path().join("m.log")),
            RestartPolicy::Never,
            sink.clone(),
        );
        supervisor.start().unwrap();
        wait_done(&supervisor);

        assert_eq!(supervisor.outcome(), Some(ExitOutcome::Failed(SPAWN_FAILURE_CODE)));
        assert_eq!(supervisor.restarts(), 0);
        assert_eq!(sink.messages(), vec!["Process start: missing", "Process fail: 255 missing"]);
    }

    #[test]
    fn test_exit_callback_receives_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let supervisor = ProcessSupervisor::new(
            spec(&dir, "once", "true"),
            RestartPolicy::Never,
            Arc::new(RecordingSink::new()),
        );
        supervisor
            .start_with(Some(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            })))
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), ExitOutcome::Clean);
    }

    #[test]
    fn test_double_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(
            spec(&dir, "twice", "sleep 30"),
            RestartPolicy::Never,
            Arc::new(RecordingSink::new()),
        );
        supervisor.start().unwrap();
        assert!(matches!(supervisor.start(), Err(SupervisorError::AlreadyStarted(_))));
        supervisor.stop();
    }
}
