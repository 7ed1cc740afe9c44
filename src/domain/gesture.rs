use std::time::{Duration, Instant};

pub const LONG_PRESS_DWELL: Duration = Duration::from_millis(500);
pub const LONG_PRESS_JITTER_PX: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LongPressConfig {
    pub dwell: Duration,
    pub jitter_px: f64,
}

impl Default for LongPressConfig {
    fn default() -> Self {
        Self {
            dwell: LONG_PRESS_DWELL,
            jitter_px: LONG_PRESS_JITTER_PX,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LongPress<T> {
    pub target: T,
    pub origin: PointerPosition,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PressRelease<T> {
    /// Released before the dwell elapsed without leaving the jitter radius.
    Click(T),
    /// The press already fired as a long-press, or was cancelled by movement.
    Consumed,
    Idle,
}

#[derive(Clone, Debug)]
struct PendingPress<T> {
    target: T,
    origin: PointerPosition,
    started_at: Instant,
    fired: bool,
    cancelled: bool,
}

/// Cancellable long-press timer. The owner feeds pointer events and polls it from its event
/// loop; nothing here sleeps or spawns.
#[derive(Clone, Debug)]
pub struct LongPressTracker<T> {
    config: LongPressConfig,
    pending: Option<PendingPress<T>>,
}

impl<T: Clone> LongPressTracker<T> {
    pub fn new(config: LongPressConfig) -> Self {
        Self {
            config,
            pending: None,
        }
    }

    pub fn press(&mut self, target: T, origin: PointerPosition, now: Instant) {
        self.pending = Some(PendingPress {
            target,
            origin,
            started_at: now,
            fired: false,
            cancelled: false,
        });
    }

    /// Returns true when this movement cancelled a press that had not fired yet.
    pub fn moved(&mut self, position: PointerPosition) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        if pending.fired || pending.cancelled {
            return false;
        }
        let dx = (position.x - pending.origin.x).abs();
        let dy = (position.y - pending.origin.y).abs();
        if dx > self.config.jitter_px || dy > self.config.jitter_px {
            pending.cancelled = true;
            return true;
        }
        false
    }

    pub fn poll(&mut self, now: Instant) -> Option<LongPress<T>> {
        let pending = self.pending.as_mut()?;
        if pending.fired || pending.cancelled {
            return None;
        }
        if now.saturating_duration_since(pending.started_at) < self.config.dwell {
            return None;
        }
        pending.fired = true;
        Some(LongPress {
            target: pending.target.clone(),
            origin: pending.origin,
        })
    }

    pub fn release(&mut self) -> PressRelease<T> {
        match self.pending.take() {
            None => PressRelease::Idle,
            Some(pending) if pending.fired || pending.cancelled => PressRelease::Consumed,
            Some(pending) => PressRelease::Click(pending.target),
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Time left before an armed press fires; lets the event loop size its poll timeout.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let pending = self.pending.as_ref()?;
        if pending.fired || pending.cancelled {
            return None;
        }
        Some(
            self.config
                .dwell
                .saturating_sub(now.saturating_duration_since(pending.started_at)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> LongPressTracker<&'static str> {
        LongPressTracker::new(LongPressConfig::default())
    }

    #[test]
    fn fires_after_dwell_when_pointer_stays_still() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.press("m1", PointerPosition::new(100.0, 100.0), start);
        assert!(tracker.poll(start + Duration::from_millis(499)).is_none());
        let fired = tracker
            .poll(start + Duration::from_millis(500))
            .expect("long press fires");
        assert_eq!(fired.target, "m1");
        assert!(tracker.poll(start + Duration::from_millis(900)).is_none());
        assert_eq!(tracker.release(), PressRelease::Consumed);
    }

    #[test]
    fn movement_within_jitter_keeps_press_armed() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.press("m1", PointerPosition::new(100.0, 100.0), start);
        assert!(!tracker.moved(PointerPosition::new(110.0, 90.0)));
        assert!(tracker.poll(start + Duration::from_millis(600)).is_some());
    }

    #[test]
    fn movement_beyond_jitter_on_one_axis_cancels() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.press("m1", PointerPosition::new(100.0, 100.0), start);
        assert!(tracker.moved(PointerPosition::new(100.0, 110.5)));
        assert!(tracker.poll(start + Duration::from_millis(600)).is_none());
        assert_eq!(tracker.release(), PressRelease::Consumed);
    }

    #[test]
    fn quick_release_is_a_click() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.press("m1", PointerPosition::new(0.0, 0.0), start);
        assert!(tracker.poll(start + Duration::from_millis(100)).is_none());
        assert_eq!(tracker.release(), PressRelease::Click("m1"));
        assert_eq!(tracker.release(), PressRelease::Idle);
    }

    #[test]
    fn remaining_counts_down() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.press("m1", PointerPosition::new(0.0, 0.0), start);
        assert_eq!(
            tracker.remaining(start + Duration::from_millis(200)),
            Some(Duration::from_millis(300))
        );
        tracker.cancel();
        assert_eq!(tracker.remaining(start), None);
    }
}
