use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of one interpreter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Stop was requested; the run is unwinding and returns to `Idle`.
    Stopped,
}

/// The run flag: a cooperative cancellation token shared between the
/// interpreter and whoever may press stop.
///
/// Cloning yields another handle to the same flag. `stop` may be called
/// from any task or thread; the interpreter notices it at its next check.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    state: Arc<AtomicU8>,
}

impl RunControl {
    pub fn new() -> Self {
        RunControl::default()
    }

    pub fn state(&self) -> RunState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => RunState::Running,
            STOPPED => RunState::Stopped,
            _ => RunState::Idle,
        }
    }

    /// The flag every step boundary consults.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Request a stop. Always succeeds; returns whether a run was active.
    pub fn stop(&self) -> bool {
        let was_running = self
            .state
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if was_running {
            debug!("stop requested");
        }
        was_running
    }

    /// Idle -> Running. Fails while another run is active or unwinding.
    pub(crate) fn try_start(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Back to Idle, reporting the state the run ended in.
    pub(crate) fn finish(&self) -> RunState {
        match self.state.swap(IDLE, Ordering::AcqRel) {
            RUNNING => RunState::Running,
            STOPPED => RunState::Stopped,
            _ => RunState::Idle,
        }
    }
}
