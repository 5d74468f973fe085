//! Timer Scheduler: due-time ordered timers driven by one alarm.
//!
//! Timers live in an arena; the active list holds their ids sorted by
//! expiration, and timers suspended by [`TimerScheduler::stop_other_timers`]
//! wait in a separate stopped list. Freed arena slots are reused for new
//! timers. Every touch of either list happens with the alarm signal
//! blocked, and callbacks run only from [`TimerScheduler::run_pending`].

use super::alarm::{Alarm, ManualAlarm, ThreadAlarm};
use super::clock::{Clock, ManualClock, SystemClock};
use super::signal::AlarmSignal;
use crate::arena::{Arena, ArenaKey};
use std::fmt;
use std::time::{Duration, Instant};

/// Handle to a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(ArenaKey);

impl TimerId {
    /// Integer form of the handle.
    pub const fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    /// Rebuild a handle from [`TimerId::to_bits`].
    pub const fn from_bits(bits: u64) -> Self {
        Self(ArenaKey::from_bits(bits))
    }
}

/// When a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Once, at the given instant.
    Absolute(Instant),
    /// Once, this long after it is started.
    Relative(Duration),
    /// Every interval, starting one interval after it is started.
    Continuous(Duration),
}

/// Code run when a timer fires. Receives the scheduler, so it can start or
/// cancel timers (itself included).
pub type TimerCallback = Box<dyn FnMut(&mut TimerScheduler, TimerId)>;

struct Timer {
    kind: TimerKind,
    expiration: Instant,
    /// Out while the callback is running.
    callback: Option<TimerCallback>,
}

impl Timer {
    /// Repeat interval for continuous timers. Never zero, so a rescheduled
    /// timer is always strictly later than the time it fired at.
    fn interval(&self) -> Option<Duration> {
        match self.kind {
            TimerKind::Continuous(every) => Some(every.max(Duration::from_nanos(1))),
            TimerKind::Absolute(_) | TimerKind::Relative(_) => None,
        }
    }
}

/// The timer scheduler.
pub struct TimerScheduler {
    clock: Box<dyn Clock>,
    alarm: Box<dyn Alarm>,
    signal: AlarmSignal,
    timers: Arena<Timer>,
    /// Sorted ascending by expiration; equal expirations in start order.
    active: Vec<TimerId>,
    stopped: Vec<TimerId>,
    alarms_on: bool,
}

impl TimerScheduler {
    /// A scheduler reading `clock` and programming `alarm`, which must raise
    /// `signal` when it expires.
    pub fn new(clock: impl Clock + 'static, alarm: impl Alarm + 'static, signal: AlarmSignal) -> Self {
        Self {
            clock: Box::new(clock),
            alarm: Box::new(alarm),
            signal,
            timers: Arena::new(),
            active: Vec::new(),
            stopped: Vec::new(),
            alarms_on: true,
        }
    }

    /// A scheduler on the system clock with a background alarm thread.
    ///
    /// # Panics
    ///
    /// Panics if the OS fails to spawn the alarm thread.
    #[allow(clippy::missing_panics_doc)]
    pub fn with_thread_alarm() -> Self {
        let signal = AlarmSignal::new();
        let alarm = ThreadAlarm::spawn(signal.clone());
        Self::new(SystemClock, alarm, signal)
    }

    /// A scheduler on a manual clock with a manual alarm. Returns the clock
    /// and alarm handles for the caller to drive.
    pub fn manual() -> (Self, ManualClock, ManualAlarm) {
        let signal = AlarmSignal::new();
        let clock = ManualClock::new();
        let alarm = ManualAlarm::new(signal.clone());
        let scheduler = Self::new(clock.clone(), alarm.clone(), signal);
        (scheduler, clock, alarm)
    }

    /// The signal this scheduler polls.
    pub const fn signal(&self) -> &AlarmSignal {
        &self.signal
    }

    /// Current time on the scheduler's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Start a timer and return its handle.
    pub fn start<F>(&mut self, kind: TimerKind, callback: F) -> TimerId
    where
        F: FnMut(&mut Self, TimerId) + 'static,
    {
        let _block = self.signal.block();
        let now = self.clock.now();
        let expiration = match kind {
            TimerKind::Absolute(at) => at,
            TimerKind::Relative(after) | TimerKind::Continuous(after) => now + after,
        };
        let id = TimerId(self.timers.insert(Timer {
            kind,
            expiration,
            callback: Some(Box::new(callback)),
        }));
        self.schedule(id, expiration);
        tracing::debug!(message = "timer started", timer = ?id, kind = ?kind, in_ms = expiration.saturating_duration_since(now).as_millis());
        self.set_alarm();
        id
    }

    /// Cancel a timer, active or stopped. Returns whether there was one;
    /// cancelling a timer that already fired or was cancelled does nothing.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let _block = self.signal.block();
        let listed = remove_id(&mut self.active, id) || remove_id(&mut self.stopped, id);
        if !listed {
            return false;
        }
        self.timers.remove(id.0);
        tracing::debug!(message = "timer cancelled", timer = ?id);
        true
    }

    /// Suspend every active timer except `keep`. With `None`, or a `keep`
    /// that is not active, every active timer is suspended.
    pub fn stop_other_timers(&mut self, keep: Option<TimerId>) {
        let _block = self.signal.block();
        let keep = keep.filter(|&id| remove_id(&mut self.active, id));
        let moved = self.active.len();
        self.stopped.append(&mut self.active);
        self.active.extend(keep);
        tracing::debug!(message = "timers stopped", kept = ?keep, stopped = moved);
        self.set_alarm();
    }

    /// Return every suspended timer to the active list.
    pub fn run_all_timers(&mut self) {
        let _block = self.signal.block();
        if self.stopped.is_empty() {
            return;
        }
        let resumed = self.stopped.len();
        for id in std::mem::take(&mut self.stopped) {
            if let Some(expiration) = self.expiration(id) {
                self.schedule(id, expiration);
            }
        }
        tracing::debug!(message = "timers resumed", resumed);
        self.set_alarm();
    }

    /// Fire every active timer that is due, in expiration order, and
    /// reprogram the alarm. Returns how many fired.
    ///
    /// A continuous timer is rescheduled one interval after now before its
    /// callback runs, so it fires at most once per call however late the
    /// call is.
    pub fn run_pending(&mut self) -> usize {
        let _block = self.signal.block();
        let now = self.clock.now();
        let mut fired = 0;

        while let Some(&id) = self.active.first() {
            let Some(timer) = self.timers.get_mut(id.0) else {
                self.active.remove(0);
                continue;
            };
            if timer.expiration > now {
                break;
            }
            self.active.remove(0);

            let callback = if let Some(every) = timer.interval() {
                let next = now + every;
                timer.expiration = next;
                let callback = timer.callback.take();
                self.schedule(id, next);
                callback
            } else {
                self.timers.remove(id.0).and_then(|timer| timer.callback)
            };

            tracing::trace!(message = "timer fired", timer = ?id);
            fired += 1;

            if let Some(mut callback) = callback {
                callback(self, id);
                // Put it back unless the callback cancelled its own timer.
                if let Some(timer) = self.timers.get_mut(id.0) {
                    if timer.callback.is_none() {
                        timer.callback = Some(callback);
                    }
                }
            }
        }

        self.set_alarm();
        fired
    }

    /// Run due timers if the alarm has gone off since the last poll.
    /// Returns how many fired.
    pub fn poll(&mut self) -> usize {
        if self.signal.take_pending() {
            self.run_pending()
        } else {
            0
        }
    }

    /// Enable or disable the alarm. While disabled, due timers still fire
    /// from an explicit [`run_pending`](Self::run_pending).
    pub fn turn_on(&mut self, on: bool) {
        let _block = self.signal.block();
        self.alarms_on = on;
        if on {
            self.set_alarm();
        } else {
            self.alarm.program(None);
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Whether `id` is waiting in the active list.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.active.contains(&id)
    }

    /// Whether `id` is suspended.
    pub fn is_stopped(&self, id: TimerId) -> bool {
        self.stopped.contains(&id)
    }

    /// When `id` next fires, if it is alive.
    pub fn expiration(&self, id: TimerId) -> Option<Instant> {
        self.timers.get(id.0).map(|t| t.expiration)
    }

    /// The kind `id` was started with.
    pub fn kind(&self, id: TimerId) -> Option<TimerKind> {
        self.timers.get(id.0).map(|t| t.kind)
    }

    /// Expiration of the head of the active list.
    pub fn next_expiration(&self) -> Option<Instant> {
        self.active.first().and_then(|&id| self.expiration(id))
    }

    /// Timers alive, active or stopped.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is alive.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Insert `id` into the active list after every timer due no later.
    fn schedule(&mut self, id: TimerId, expiration: Instant) {
        let timers = &self.timers;
        let at = self
            .active
            .partition_point(|other| timers.get(other.0).is_some_and(|t| t.expiration <= expiration));
        self.active.insert(at, id);
    }

    fn set_alarm(&mut self) {
        if self.alarms_on {
            let next = self.next_expiration();
            self.alarm.program(next);
        }
    }
}

fn remove_id(list: &mut Vec<TimerId>, id: TimerId) -> bool {
    list.iter()
        .position(|&other| other == id)
        .map(|at| list.remove(at))
        .is_some()
}

impl fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("clock", &self.clock)
            .field("alarm", &self.alarm)
            .field("active", &self.active)
            .field("stopped", &self.stopped)
            .field("alarms_on", &self.alarms_on)
            .finish_non_exhaustive()
    }
}
