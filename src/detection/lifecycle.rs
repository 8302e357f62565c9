//! Pipeline lifecycle worker
//!
//! Starting and stopping the SDR pipeline can take a while (spawning several
//! processes, killing and reaping them), so the command handler acknowledges
//! first and hands the work to this worker. Jobs run one at a time in
//! submission order on a dedicated thread, which keeps a STOP_DETECTION from
//! overtaking the START_DETECTION before it.
//!
//! The worker owns the active supervisors. The list sits behind a mutex so
//! the handler can inspect it; only the worker mutates it.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::pipeline::DetectionPipeline;
use crate::communication::mavlink::status_notifier::StatusSink;
use crate::supervisor::{ExitCallback, ProcessSpec, ProcessSupervisor, RestartPolicy, SharedPipe};

/// Work items for the lifecycle thread
pub enum LifecycleJob {
    /// Start every process of a detection run, then announce the center
    StartDetection(DetectionPipeline),
    /// Start a single raw-capture process; `on_exit` fires when it ends
    StartCapture {
        spec: ProcessSpec,
        on_exit: ExitCallback,
    },
    /// Stop and forget every supervised process, optionally announcing it
    StopAll { announce: Option<&'static str> },
    /// Forget supervisors whose supervision has ended
    ReapFinished,
    /// Reply once every earlier job has completed
    Sync(Sender<()>),
}

#[derive(Default)]
struct ActiveProcesses {
    supervisors: Vec<Arc<ProcessSupervisor>>,
    pipe: Option<Arc<SharedPipe>>,
}

/// Handle to the lifecycle thread
pub struct LifecycleWorker {
    tx: Mutex<Option<Sender<LifecycleJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    active: Arc<Mutex<ActiveProcesses>>,
}

impl LifecycleWorker {
    pub fn start(policy: RestartPolicy, sink: Arc<dyn StatusSink>) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<LifecycleJob>();
        let active = Arc::new(Mutex::new(ActiveProcesses::default()));

        let worker_active = active.clone();
        let handle = std::thread::Builder::new()
            .name("pipeline-lifecycle".into())
            .spawn(move || {
                for job in rx.iter() {
                    run_job(job, policy, &sink, &worker_active);
                }
                stop_all(&worker_active);
                crate::log_debug!("Lifecycle worker exiting");
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            active,
        })
    }

    /// Queue a job; false once the worker has shut down
    pub fn submit(&self, job: LifecycleJob) -> bool {
        match self.tx.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    /// Wait until every job submitted so far has run
    pub fn sync(&self, timeout: Duration) -> bool {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.submit(LifecycleJob::Sync(tx)) && rx.recv_timeout(timeout).is_ok()
    }

    /// Supervisors currently held, running or not
    pub fn active_count(&self) -> usize {
        self.lock_active().supervisors.len()
    }

    /// Names of the supervised processes, in start order
    pub fn active_names(&self) -> Vec<String> {
        self.lock_active()
            .supervisors
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn has_pipe(&self) -> bool {
        self.lock_active().pipe.is_some()
    }

    /// Stop every process and join the worker
    pub fn shutdown(&self) {
        drop(self.tx.lock().unwrap_or_else(|e| e.into_inner()).take());
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if handle.join().is_err() {
                crate::log_error!("Lifecycle worker panicked");
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, ActiveProcesses> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn run_job(
    job: LifecycleJob,
    policy: RestartPolicy,
    sink: &Arc<dyn StatusSink>,
    active: &Mutex<ActiveProcesses>,
) {
    match job {
        LifecycleJob::StartDetection(pipeline) => {
            let mut started = Vec::with_capacity(pipeline.specs.len());
            for spec in pipeline.specs {
                started.push(start_supervisor(spec, policy, sink, None));
            }
            {
                let mut active = active.lock().unwrap_or_else(|e| e.into_inner());
                active.supervisors.extend(started);
                active.pipe = pipeline.pipe;
            }
            sink.info(&format!(
                "#All processes started at center hz: {:.3}",
                f64::from(pipeline.center_hz) / 1e6
            ));
        }
        LifecycleJob::StartCapture { spec, on_exit } => {
            let supervisor = start_supervisor(spec, RestartPolicy::Never, sink, Some(on_exit));
            active
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .supervisors
                .push(supervisor);
        }
        LifecycleJob::StopAll { announce } => {
            stop_all(active);
            if let Some(text) = announce {
                sink.info(text);
            }
        }
        LifecycleJob::ReapFinished => {
            let finished: Vec<_> = {
                let mut active = active.lock().unwrap_or_else(|e| e.into_inner());
                let (running, finished): (Vec<_>, Vec<_>) = std::mem::take(&mut active.supervisors)
                    .into_iter()
                    .partition(|s| s.is_running());
                active.supervisors = running;
                finished
            };
            for supervisor in &finished {
                crate::log_debug!("Reaped {}", supervisor.name());
            }
        }
        LifecycleJob::Sync(reply) => {
            let _ = reply.send(());
        }
    }
}

fn start_supervisor(
    spec: ProcessSpec,
    policy: RestartPolicy,
    sink: &Arc<dyn StatusSink>,
    on_exit: Option<ExitCallback>,
) -> Arc<ProcessSupervisor> {
    let supervisor = Arc::new(ProcessSupervisor::new(spec, policy, sink.clone()));
    if let Err(e) = supervisor.start_with(on_exit) {
        crate::log_error!("{}", e);
        sink.error(&format!("Process fail: {} {}", crate::supervisor::SPAWN_FAILURE_CODE, supervisor.name()));
    }
    supervisor
}

/// Stop supervisors in start order, then release the pipe
fn stop_all(active: &Mutex<ActiveProcesses>) {
    // Take the list first so supervisors are joined without the lock held
    let (supervisors, pipe) = {
        let mut active = active.lock().unwrap_or_else(|e| e.into_inner());
        (std::mem::take(&mut active.supervisors), active.pipe.take())
    };
    for supervisor in &supervisors {
        supervisor.stop();
    }
    drop(supervisors);
    drop(pipe);
}
