//! Timers: deferred work fired from cooperative poll points.
//!
//! An [`Alarm`] raises an [`AlarmSignal`] when the earliest timer is due;
//! raising only sets a flag. The embedder calls
//! [`TimerScheduler::poll`] (or [`TimerScheduler::run_pending`]) at points
//! where running arbitrary callbacks is safe, never in the middle of a
//! buffer mutation.
//!
//! ```ignore
//! let mut timers = TimerScheduler::with_thread_alarm();
//! timers.start(TimerKind::Continuous(Duration::from_millis(500)), |_, _| blink_cursor());
//! loop {
//!     handle_input();
//!     timers.poll();
//! }
//! ```

mod alarm;
mod clock;
mod scheduler;
mod signal;

pub use alarm::{Alarm, ManualAlarm, ThreadAlarm};
pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{TimerCallback, TimerId, TimerKind, TimerScheduler};
pub use signal::{AlarmSignal, SignalBlock};
