//! Edge debouncing for push-button inputs.
//!
//! Contacts bounce for a few milliseconds on both press and release. An
//! edge is accepted only when it changes the logical level and arrives at
//! least `interval` after the previously accepted edge. The last raw level
//! is remembered, so a change rejected inside the interval is emitted by
//! [`EdgeDebouncer::settle`] once the interval has passed and the level has
//! held.

use std::time::{Duration, Instant};

/// Logical edge on a button input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

#[derive(Debug, Clone)]
pub struct EdgeDebouncer {
    interval: Duration,
    last: Option<(Edge, Instant)>,
    raw: bool,
}

impl EdgeDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            raw: false,
        }
    }

    fn pressed(&self) -> bool {
        matches!(self.last, Some((Edge::Pressed, _)))
    }

    /// Feed a raw level change observed at `at`; returns the accepted edge, if any.
    pub fn accept(&mut self, pressed: bool, at: Instant) -> Option<Edge> {
        self.raw = pressed;
        self.settle(at)
    }

    /// Re-check the last raw level at `at` and emit the edge it implies, if
    /// the level differs from the logical state and the interval has passed.
    pub fn settle(&mut self, at: Instant) -> Option<Edge> {
        if self.raw == self.pressed() {
            return None;
        }
        if let Some((_, prev_at)) = self.last {
            if at.saturating_duration_since(prev_at) < self.interval {
                return None;
            }
        }
        let edge = if self.raw { Edge::Pressed } else { Edge::Released };
        self.last = Some((edge, at));
        Some(edge)
    }

    /// Instant at which a held level change becomes acceptable, if one is pending.
    pub fn pending_until(&self) -> Option<Instant> {
        if self.raw == self.pressed() {
            return None;
        }
        self.last.map(|(_, at)| at + self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_bounces_inside_interval() {
        let t0 = Instant::now();
        let mut d = EdgeDebouncer::new(Duration::from_millis(200));
        assert_eq!(d.accept(true, t0), Some(Edge::Pressed));
        assert_eq!(d.accept(false, t0 + Duration::from_millis(5)), None);
        assert_eq!(d.accept(true, t0 + Duration::from_millis(9)), None);
        assert_eq!(d.pending_until(), None);
        assert_eq!(
            d.accept(false, t0 + Duration::from_millis(900)),
            Some(Edge::Released)
        );
    }

    #[test]
    fn ignores_repeated_level_and_leading_release() {
        let t0 = Instant::now();
        let mut d = EdgeDebouncer::new(Duration::from_millis(200));
        assert_eq!(d.accept(false, t0), None);
        assert_eq!(d.pending_until(), None);
        assert_eq!(d.accept(true, t0), Some(Edge::Pressed));
        assert_eq!(d.accept(true, t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn short_tap_is_released_once_interval_passes() {
        let t0 = Instant::now();
        let ms = |n| t0 + Duration::from_millis(n);
        let mut d = EdgeDebouncer::new(Duration::from_millis(200));
        assert_eq!(d.accept(true, ms(0)), Some(Edge::Pressed));
        assert_eq!(d.accept(false, ms(120)), None);
        assert_eq!(d.pending_until(), Some(ms(200)));
        assert_eq!(d.settle(ms(150)), None);
        assert_eq!(d.settle(ms(200)), Some(Edge::Released));
        assert_eq!(d.pending_until(), None);
        assert_eq!(d.settle(ms(400)), None);
    }
}
