use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::control::RunControl;

/// Source of suspension for timed blocks.
pub trait Clock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Real time through the tokio timer. Under `tokio::time::pause` the same
/// clock runs on virtual time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }
}

/// Virtual time: sleeping advances a counter and yields to the scheduler
/// instead of waiting.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed_nanos: Arc<AtomicU64>,
    stop_at: Option<(Duration, RunControl)>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock::default()
    }

    /// Press stop on `control` once virtual time reaches `deadline`.
    /// The sleep that crosses the deadline still completes.
    pub fn stop_at(mut self, deadline: Duration, control: RunControl) -> Self {
        self.stop_at = Some((deadline, control));
        self
    }

    /// Virtual time slept so far.
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::Acquire))
    }

    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let mut current = self.elapsed_nanos.load(Ordering::Acquire);
        let now = loop {
            let next = current.saturating_add(nanos);
            match self.elapsed_nanos.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };
        if let Some((deadline, control)) = &self.stop_at {
            if Duration::from_nanos(now) >= *deadline {
                control.stop();
            }
        }
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        async move {
            self.advance(duration);
            tokio::task::yield_now().await;
        }
    }
}
