//! Explicitly owned countdown timers.
//!
//! A `TimerSlot` holds at most one armed deadline.  Arming always cancels
//! the previous handle first, and a fired timer disarms itself, so a stale
//! countdown can never fire after its owner moved on.  Time is supplied by
//! the caller in milliseconds.

use tracing::trace;

/// Identity of one arming of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy)]
struct Armed {
    handle: TimerHandle,
    started_ms: f64,
    deadline_ms: f64,
}

/// A single-shot timer owned by one state machine.
#[derive(Debug, Clone)]
pub struct TimerSlot {
    name: &'static str,
    armed: Option<Armed>,
    next_id: u64,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            armed: None,
            next_id: 1,
        }
    }

    /// Arm for `duration_ms` from `now_ms`, cancelling any previous arming.
    pub fn arm(&mut self, now_ms: f64, duration_ms: f64) -> TimerHandle {
        self.cancel();
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.armed = Some(Armed {
            handle,
            started_ms: now_ms,
            deadline_ms: now_ms + duration_ms.max(0.0),
        });
        trace!("{} timer armed ({:.0}ms)", self.name, duration_ms);
        handle
    }

    /// Disarm. Returns the handle that was cancelled, if any.
    pub fn cancel(&mut self) -> Option<TimerHandle> {
        let prev = self.armed.take().map(|a| a.handle);
        if prev.is_some() {
            trace!("{} timer cancelled", self.name);
        }
        prev
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn handle(&self) -> Option<TimerHandle> {
        self.armed.map(|a| a.handle)
    }

    /// Fire if the deadline has passed. Fires at most once per arming.
    pub fn poll(&mut self, now_ms: f64) -> Option<TimerHandle> {
        match self.armed {
            Some(a) if now_ms >= a.deadline_ms => {
                self.armed = None;
                trace!("{} timer fired", self.name);
                Some(a.handle)
            }
            _ => None,
        }
    }

    /// Remaining milliseconds, or `None` when disarmed.
    pub fn remaining_ms(&self, now_ms: f64) -> Option<f64> {
        self.armed.map(|a| (a.deadline_ms - now_ms).max(0.0))
    }

    /// Visible whole-second countdown (rounded up).
    pub fn remaining_secs(&self, now_ms: f64) -> Option<u32> {
        self.remaining_ms(now_ms)
            .map(|ms| (ms / 1000.0).ceil() as u32)
    }

    /// Fraction of the armed duration that has elapsed (0.0-1.0).
    pub fn progress(&self, now_ms: f64) -> Option<f32> {
        self.armed.map(|a| {
            let total = a.deadline_ms - a.started_ms;
            if total <= 0.0 {
                1.0
            } else {
                ((now_ms - a.started_ms) / total).clamp(0.0, 1.0) as f32
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once() {
        let mut t = TimerSlot::new("test");
        let h = t.arm(0.0, 1000.0);
        assert!(t.poll(999.0).is_none());
        assert_eq!(t.poll(1000.0), Some(h));
        assert!(t.poll(1500.0).is_none());
        assert!(!t.is_armed());
    }

    #[test]
    fn test_rearm_cancels_previous() {
        let mut t = TimerSlot::new("test");
        let first = t.arm(0.0, 1000.0);
        let second = t.arm(500.0, 1000.0);
        assert_ne!(first, second);
        // The first deadline passes without firing.
        assert!(t.poll(1000.0).is_none());
        assert_eq!(t.poll(1500.0), Some(second));
    }

    #[test]
    fn test_cancel() {
        let mut t = TimerSlot::new("test");
        let h = t.arm(0.0, 100.0);
        assert_eq!(t.cancel(), Some(h));
        assert!(t.cancel().is_none());
        assert!(t.poll(200.0).is_none());
    }

    #[test]
    fn test_remaining_secs_rounds_up() {
        let mut t = TimerSlot::new("test");
        t.arm(0.0, 3000.0);
        assert_eq!(t.remaining_secs(0.0), Some(3));
        assert_eq!(t.remaining_secs(100.0), Some(3));
        assert_eq!(t.remaining_secs(1000.0), Some(2));
        assert_eq!(t.remaining_secs(2999.0), Some(1));
        assert_eq!(t.remaining_secs(3200.0), Some(0));
    }

    #[test]
    fn test_progress() {
        let mut t = TimerSlot::new("test");
        assert!(t.progress(0.0).is_none());
        t.arm(1000.0, 1000.0);
        assert!((t.progress(1500.0).unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(t.progress(5000.0), Some(1.0));
    }
}
