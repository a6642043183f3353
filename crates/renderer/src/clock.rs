#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Abstraction over where frame timestamps originate from.
pub trait Clock {
    /// Samples the current monotonic timestamp.
    fn now(&self) -> Instant;
}

/// Clock backed by the system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same timeline, so a
/// test can keep one handle while the scheduler owns another.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct ManualClock {
    now: Rc<Cell<Instant>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

#[cfg(test)]
impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// One iteration of the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    pub start: Instant,
    /// Elapsed animation time since the previous tick, excluding voluntary sleeps.
    pub delta: Duration,
}

impl FrameTick {
    pub fn new(start: Instant, delta: Duration) -> Self {
        Self { start, delta }
    }

    pub fn seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

/// Produces [`FrameTick`]s from a [`Clock`].
///
/// The first tick carries a zero delta. Time reported through
/// [`FrameClock::discount`] is removed from the next delta so idle sleeps do
/// not make the animation jump.
#[derive(Debug)]
pub struct FrameClock<C> {
    clock: C,
    origin: Option<Instant>,
    previous: Option<Instant>,
    discounted: Duration,
}

impl<C: Clock> FrameClock<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            origin: None,
            previous: None,
            discounted: Duration::ZERO,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn tick(&mut self) -> FrameTick {
        let start = self.clock.now();
        let raw = self
            .previous
            .map(|previous| start.saturating_duration_since(previous))
            .unwrap_or(Duration::ZERO);
        let delta = raw.saturating_sub(std::mem::take(&mut self.discounted));
        self.previous = Some(start);
        self.origin.get_or_insert(start);
        FrameTick::new(start, delta)
    }

    /// Excludes `slept` from the delta of the next tick.
    pub fn discount(&mut self, slept: Duration) {
        self.discounted = self.discounted.saturating_add(slept);
    }

    /// Wall-clock seconds since the first tick.
    pub fn elapsed_seconds(&self) -> f32 {
        match (self.origin, self.previous) {
            (Some(origin), Some(previous)) => {
                previous.saturating_duration_since(origin).as_secs_f32()
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_has_zero_delta() {
        let clock = ManualClock::new();
        let mut frames = FrameClock::new(clock.clone());
        clock.advance(Duration::from_millis(250));
        assert_eq!(frames.tick().delta, Duration::ZERO);
    }

    #[test]
    fn delta_tracks_clock_between_ticks() {
        let clock = ManualClock::new();
        let mut frames = FrameClock::new(clock.clone());
        frames.tick();
        clock.advance(Duration::from_millis(16));
        let tick = frames.tick();
        assert_eq!(tick.delta, Duration::from_millis(16));
        assert_eq!(tick.start, clock.now());
    }

    #[test]
    fn discounted_sleep_is_removed_from_next_delta_only() {
        let clock = ManualClock::new();
        let mut frames = FrameClock::new(clock.clone());
        frames.tick();

        clock.advance(Duration::from_millis(5));
        clock.advance(Duration::from_secs(1));
        frames.discount(Duration::from_secs(1));
        assert_eq!(frames.tick().delta, Duration::from_millis(5));

        clock.advance(Duration::from_millis(7));
        assert_eq!(frames.tick().delta, Duration::from_millis(7));
    }

    #[test]
    fn oversized_discount_saturates_at_zero() {
        let clock = ManualClock::new();
        let mut frames = FrameClock::new(clock.clone());
        frames.tick();
        clock.advance(Duration::from_millis(3));
        frames.discount(Duration::from_millis(10));
        assert_eq!(frames.tick().delta, Duration::ZERO);
    }

    #[test]
    fn elapsed_seconds_counts_wall_time() {
        let clock = ManualClock::new();
        let mut frames = FrameClock::new(clock.clone());
        frames.tick();
        clock.advance(Duration::from_secs(2));
        frames.discount(Duration::from_secs(1));
        frames.tick();
        assert!((frames.elapsed_seconds() - 2.0).abs() < 1e-6);
    }
}
