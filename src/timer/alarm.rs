//! Alarms: "raise the signal at or after T".
//!
//! The scheduler keeps exactly one alarm programmed, for the head of its
//! active list. [`ThreadAlarm`] waits on a background thread;
//! [`ManualAlarm`] only records what it was asked, for embedders that
//! drive their own loop.

use super::signal::AlarmSignal;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long an idle alarm thread sleeps between shutdown checks.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// A one-shot wake-up facility.
pub trait Alarm: fmt::Debug {
    /// Arrange for the signal to be raised at or after `deadline`,
    /// replacing any earlier request. `None` disarms.
    fn program(&mut self, deadline: Option<Instant>);
}

/// Alarm backed by a dedicated thread.
///
/// Deadlines travel to the thread over a channel; when the current one
/// passes, the thread raises the signal and goes idle.
pub struct ThreadAlarm {
    /// Handle to the alarm thread.
    handle: Option<JoinHandle<()>>,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
    /// Deadline requests.
    deadline_tx: Sender<Option<Instant>>,
}

impl ThreadAlarm {
    /// Spawn the alarm thread, raising `signal` on expiry.
    ///
    /// # Panics
    ///
    /// Panics if the OS fails to spawn the alarm thread.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn(signal: AlarmSignal) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let (deadline_tx, deadline_rx) = bounded(16);

        let handle = thread::Builder::new()
            .name("quill-alarm".to_string())
            .spawn(move || {
                Self::run_loop(&deadline_rx, &shutdown_clone, &signal);
            })
            .expect("Failed to spawn alarm thread");

        Self {
            handle: Some(handle),
            shutdown,
            deadline_tx,
        }
    }

    /// Signal the alarm thread to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Wait for the alarm thread to finish.
    pub fn join(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn run_loop(deadline_rx: &Receiver<Option<Instant>>, shutdown: &AtomicBool, signal: &AlarmSignal) {
        let mut deadline: Option<Instant> = None;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let request = match deadline {
                Some(at) => deadline_rx.recv_deadline(at.min(Instant::now() + IDLE_WAIT)),
                None => deadline_rx.recv_timeout(IDLE_WAIT),
            };

            match request {
                Ok(next) => deadline = next,
                Err(RecvTimeoutError::Timeout) => {
                    if deadline.is_some_and(|at| Instant::now() >= at) {
                        tracing::trace!(message = "alarm expired");
                        signal.raise();
                        deadline = None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Alarm for ThreadAlarm {
    fn program(&mut self, deadline: Option<Instant>) {
        // Fails only once the thread has exited.
        let _ = self.deadline_tx.send(deadline);
    }
}

impl fmt::Debug for ThreadAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadAlarm")
            .field("running", &self.handle.is_some())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for ThreadAlarm {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Alarm that records its deadline and fires only when asked.
///
/// Clones share state, so a caller can keep one to inspect or fire while
/// the scheduler owns the other.
#[derive(Debug, Clone)]
pub struct ManualAlarm {
    signal: AlarmSignal,
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl ManualAlarm {
    /// An unarmed alarm that raises `signal`.
    pub fn new(signal: AlarmSignal) -> Self {
        Self {
            signal,
            deadline: Arc::default(),
        }
    }

    /// The currently programmed deadline.
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the signal if the deadline has been reached by `now`,
    /// disarming the alarm. Returns whether it fired.
    pub fn fire_if_due(&self, now: Instant) -> bool {
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        match *deadline {
            Some(at) if at <= now => {
                *deadline = None;
                self.signal.raise();
                true
            }
            _ => false,
        }
    }
}

impl Alarm for ManualAlarm {
    fn program(&mut self, deadline: Option<Instant>) {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner) = deadline;
    }
}
