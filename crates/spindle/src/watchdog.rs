//! Wall-clock bound for a single evaluation.
//!
//! The engine cannot be preempted. The watchdog only raises an
//! [`InterruptHandle`] which the interpreter polls at its own safepoints, so a
//! script that never reaches one runs past the deadline.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::{
    TRACE_TARGET_SCRIPT,
    error::{Error, Result},
};

/// Cancellation hook shared between the watchdog thread (writer) and the
/// evaluating thread (reader).
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that evaluation stops at the next safepoint.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear a pending request.
    pub fn disarm(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Signal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    fn notify(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_one();
    }

    /// Wait until notified or `deadline` passes. Returns `true` if notified.
    /// Without a deadline only a notification ends the wait.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut stopped, deadline).timed_out() {
                        return *stopped;
                    }
                }
                None => self.condvar.wait(&mut stopped),
            }
        }
        true
    }
}

/// A running watchdog. Dropping it has the same effect as [`Watchdog::stop`].
pub struct Watchdog {
    signal: Arc<Signal>,
    thread: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
    timeout: Duration,
}

impl Watchdog {
    /// Spawn the timer thread. After `timeout` elapses without a
    /// [`stop`](Self::stop), `hook` is interrupted.
    ///
    /// # Errors
    /// Returns [`Error::EngineInit`] if the thread cannot be spawned.
    pub fn start(hook: InterruptHandle, timeout: Duration) -> Result<Self> {
        let signal = Arc::new(Signal::default());
        let fired = Arc::new(AtomicBool::new(false));

        let signal_bg = Arc::clone(&signal);
        let fired_bg = Arc::clone(&fired);
        // Timeouts too large to represent as an instant never fire.
        let deadline = Instant::now().checked_add(timeout);
        let thread = std::thread::Builder::new()
            .name("spindle-watchdog".to_string())
            .spawn(move || {
                if !signal_bg.wait_until(deadline) {
                    fired_bg.store(true, Ordering::Release);
                    hook.interrupt();
                    warn!(target: TRACE_TARGET_SCRIPT, ?timeout, "watchdog deadline reached, interrupting script");
                }
            })
            .context("unable to spawn watchdog thread")
            .map_err(Error::EngineInit)?;

        debug!(target: TRACE_TARGET_SCRIPT, ?timeout, "watchdog armed");
        Ok(Self {
            signal,
            thread: Some(thread),
            fired,
            timeout,
        })
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wake the timer thread, join it, and report whether the deadline fired.
    #[must_use]
    pub fn stop(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        let Some(thread) = self.thread.take() else {
            return self.fired.load(Ordering::Acquire);
        };
        self.signal.notify();
        if thread.join().is_err() {
            warn!(target: TRACE_TARGET_SCRIPT, "watchdog thread panicked");
        }
        let fired = self.fired.load(Ordering::Acquire);
        debug!(target: TRACE_TARGET_SCRIPT, fired, "watchdog stopped");
        fired
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}
