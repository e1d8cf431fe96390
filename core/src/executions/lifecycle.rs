//! Job lifecycle controller
//!
//! One `JobControl` per job. Pause and interrupt are cooperative: clients flip
//! flags here, and the interpreters call `checkpoint()` at every node boundary.
//! The pause flag and the job status are published through `watch` channels so
//! a suspended interpreter, a cancellable sleep, and completion waiters are all
//! woken without polling. Every transition happens under `state`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Interrupted;
use crate::model::ClientInteraction;
use crate::types::JobStatus;

type AbortHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ControlState {
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    interaction: Option<ClientInteraction>,
    abort_hooks: Vec<AbortHook>,
}

pub struct JobControl {
    state: Mutex<ControlState>,
    status: watch::Sender<JobStatus>,
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl fmt::Debug for JobControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobControl")
            .field("status", &self.status())
            .field("paused", &self.is_paused())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    pub fn new() -> Self {
        let (status, _) = watch::channel(JobStatus::Initialized);
        let (paused, _) = watch::channel(false);
        Self {
            state: Mutex::new(ControlState::default()),
            status,
            paused,
            cancel: CancellationToken::new(),
        }
    }

    /* ===================== Queries ===================== */

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.subscribe()
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled by `interrupt()`, for waits outside this controller
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().started_at
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().stopped_at
    }

    /* ===================== Client Requests ===================== */

    /// Request a pause; takes effect at the next checkpoint
    pub fn pause(&self) {
        let _state = self.state.lock();
        if self.status().is_terminal() {
            return;
        }
        self.paused.send_replace(true);
        debug!("Pause requested");
    }

    /// Clear a pending pause and wake a suspended execution
    pub fn resume(&self) {
        let _state = self.state.lock();
        self.paused.send_replace(false);
        if self.status() == JobStatus::Paused {
            self.status.send_replace(JobStatus::Running);
        }
        debug!("Resume requested");
    }

    /// Request cancellation and wake any waiter
    pub fn interrupt(&self) {
        let _state = self.state.lock();
        if self.status().is_terminal() {
            return;
        }
        self.cancel.cancel();
        info!("Interrupt requested");
    }

    /// Store client input and wake the waiting execution
    pub fn set_interaction(&self, interaction: ClientInteraction) {
        self.state.lock().interaction = Some(interaction);
        self.resume();
    }

    /* ===================== Execution-side Primitives ===================== */

    /// Suspension point called by the interpreters at every node boundary
    pub async fn checkpoint(&self) -> Result<(), Interrupted> {
        self.try_interruption()?;
        if self.is_paused() {
            self.try_pause().await;
            self.try_interruption()?;
        }
        Ok(())
    }

    /// Block the calling execution as PAUSED until resumed or interrupted
    pub async fn try_pause(&self) {
        {
            let _state = self.state.lock();
            if self.status() == JobStatus::Running {
                self.status.send_replace(JobStatus::Paused);
                info!("Execution paused");
            }
        }

        let mut rx = self.paused.subscribe();
        tokio::select! {
            _ = async {
                let _ = rx.wait_for(|paused| !*paused).await;
            } => {}
            _ = self.cancel.cancelled() => {}
        }

        let _state = self.state.lock();
        if self.status() == JobStatus::Paused {
            self.status.send_replace(JobStatus::Running);
            info!("Execution resumed");
        }
    }

    /// Run the abort hooks once and raise `Interrupted` if cancellation was
    /// requested; a no-op otherwise
    pub fn try_interruption(&self) -> Result<(), Interrupted> {
        if !self.is_interrupted() {
            return Ok(());
        }
        let hooks = std::mem::take(&mut self.state.lock().abort_hooks);
        for hook in hooks {
            hook();
        }
        Err(Interrupted)
    }

    /// Wait up to `duration`; returns early on pause, resume, or interrupt
    pub async fn sleep(&self, duration: Duration) {
        if duration.is_zero() || self.is_interrupted() {
            return;
        }
        let mut rx = self.paused.subscribe();
        rx.borrow_and_update();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel.cancelled() => {}
            _ = rx.changed() => {}
        }
    }

    /// Arm a manual interaction wait; stale input is discarded
    pub fn begin_interaction(&self) {
        let mut state = self.state.lock();
        state.interaction = None;
        self.paused.send_replace(true);
    }

    /// Suspend until a client delivers input (or resumes without input)
    pub async fn await_interaction(&self) -> Result<Option<ClientInteraction>, Interrupted> {
        self.try_interruption()?;
        self.try_pause().await;
        self.try_interruption()?;
        Ok(self.state.lock().interaction.take())
    }

    /// Register work that must run when the interruption is first raised
    pub fn on_abort(&self, hook: impl FnOnce() + Send + 'static) {
        self.state.lock().abort_hooks.push(Box::new(hook));
    }

    /* ===================== Status Transitions ===================== */

    /// INITIALIZED → RUNNING; false if the job was already started
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if self.status() != JobStatus::Initialized {
            return false;
        }
        state.started_at = Some(Utc::now());
        self.status.send_replace(JobStatus::Running);
        true
    }

    /// Move to a terminal status; false if the job already reached one
    pub fn stop(&self, status: JobStatus) -> bool {
        debug_assert!(status.is_terminal());
        let mut state = self.state.lock();
        if self.status().is_terminal() {
            return false;
        }
        state.stopped_at = Some(Utc::now());
        state.abort_hooks.clear();
        self.paused.send_replace(false);
        self.status.send_replace(status);
        true
    }
}
