//! Shutdown effect state machine.
//!
//! ```text
//!   On ──▶ PoweringOff ──▶ Off ──▶ PoweringOn ──▶ On
//!   p=0      p: 0 → 1      p=1      p: 1 → 0      p=0
//! ```
//!
//! `progress` is advanced by `rate * delta` each tick and pinned while the
//! effect rests. The shader brightness is derived from progress through an
//! easing curve whose endpoints map exactly to fully on and fully off.

use std::time::Duration;

use tracing::debug;

use crate::clock::FrameTick;

/// Easing shape applied to progress before it becomes brightness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    Smoothstep,
    EaseInOut,
}

impl Easing {
    pub fn sample(self, t: f32) -> f32 {
        let clamped = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => clamped,
            Easing::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            Easing::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
        }
    }
}

/// Which transitions the effect runs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectSequence {
    /// Power the display down once and rest at `Off`.
    PowerOff,
    /// Power the display up once and rest at `On`.
    PowerOn,
    /// Power down, rest at `Off` until woken, power up, stay on for `hold`,
    /// then power down again.
    Cycle { hold: Duration },
}

/// Where the display is in its power cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fully lit, progress 0.
    On,
    /// Collapsing towards black; progress rises.
    PoweringOff,
    /// Fully dark, progress 1.
    Off,
    /// Expanding back to full brightness; progress falls.
    PoweringOn,
}

/// CRT style power transition advanced by frame time.
///
/// `progress` runs from 0 (on) to 1 (off) at `rate` units per second and is
/// always clamped to that range. [`ShutdownEffect::update`] reports `true`
/// only on the tick that reaches `On` or `Off`.
#[derive(Debug, Clone)]
pub struct ShutdownEffect {
    phase: Phase,
    progress: f32,
    rate: f32,
    easing: Easing,
    sequence: EffectSequence,
    held: Duration,
}

impl ShutdownEffect {
    /// Starts the first transition of `sequence`. Negative rates are treated
    /// as zero, which holds the effect where it starts.
    pub fn new(rate: f32, sequence: EffectSequence, easing: Easing) -> Self {
        let (phase, progress) = match sequence {
            EffectSequence::PowerOff | EffectSequence::Cycle { .. } => (Phase::PoweringOff, 0.0),
            EffectSequence::PowerOn => (Phase::PoweringOn, 1.0),
        };
        Self {
            phase,
            progress,
            rate: rate.max(0.0),
            easing,
            sequence,
            held: Duration::ZERO,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Linear transition progress in `[0, 1]`, before easing.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Display brightness for the current progress: 1 fully on, 0 fully off.
    pub fn brightness(&self) -> f32 {
        1.0 - self.easing.sample(self.progress)
    }

    /// True while nothing will change until an external request arrives, so
    /// the caller may throttle itself.
    pub fn is_resting(&self) -> bool {
        match self.phase {
            Phase::Off => true,
            Phase::On => !matches!(self.sequence, EffectSequence::Cycle { .. }),
            Phase::PoweringOff | Phase::PoweringOn => false,
        }
    }

    /// Advances the animation by one tick.
    ///
    /// Returns true only on the tick where progress reaches its bound and the
    /// phase settles into `Off` or `On`.
    pub fn update(&mut self, tick: &FrameTick) -> bool {
        let step = self.rate * tick.seconds();
        match self.phase {
            Phase::PoweringOff => {
                self.progress = (self.progress + step).clamp(0.0, 1.0);
                if self.progress >= 1.0 {
                    self.progress = 1.0;
                    self.enter(Phase::Off);
                    return true;
                }
                false
            }
            Phase::PoweringOn => {
                self.progress = (self.progress - step).clamp(0.0, 1.0);
                if self.progress <= 0.0 {
                    self.progress = 0.0;
                    self.enter(Phase::On);
                    return true;
                }
                false
            }
            Phase::On => {
                if let EffectSequence::Cycle { hold } = self.sequence {
                    self.held = self.held.saturating_add(tick.delta);
                    if self.held >= hold {
                        self.enter(Phase::PoweringOff);
                    }
                }
                false
            }
            Phase::Off => false,
        }
    }

    /// Starts powering up unless already on or on the way. Returns whether
    /// the direction changed.
    pub fn power_on(&mut self) -> bool {
        match self.phase {
            Phase::Off | Phase::PoweringOff => {
                self.enter(Phase::PoweringOn);
                true
            }
            Phase::On | Phase::PoweringOn => false,
        }
    }

    /// Starts powering down unless already off or on the way. Returns whether
    /// the direction changed.
    pub fn power_off(&mut self) -> bool {
        match self.phase {
            Phase::On | Phase::PoweringOn => {
                self.enter(Phase::PoweringOff);
                true
            }
            Phase::Off | Phase::PoweringOff => false,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, progress = self.progress, "shutdown effect phase change");
        self.phase = phase;
        self.held = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn tick(millis: u64) -> FrameTick {
        FrameTick::new(Instant::now(), Duration::from_millis(millis))
    }

    #[test]
    fn linear_curve_increases_monotonically() {
        let curve = Easing::Linear;
        let mut last = 0.0;
        for step in 0..=10 {
            let sample = curve.sample(step as f32 / 10.0);
            assert!(sample >= last - f32::EPSILON);
            last = sample;
        }
    }

    #[test]
    fn every_curve_hits_exact_endpoints() {
        for curve in [Easing::Linear, Easing::Smoothstep, Easing::EaseInOut] {
            assert_eq!(curve.sample(0.0), 0.0);
            assert_eq!(curve.sample(1.0), 1.0);
            assert_eq!(curve.sample(-3.0), 0.0);
            assert_eq!(curve.sample(7.0), 1.0);
        }
    }

    #[test]
    fn ease_in_out_accelerates_then_decelerates() {
        let curve = Easing::EaseInOut;
        let first = curve.sample(0.25);
        let mid = curve.sample(0.5);
        let last = curve.sample(0.75);
        assert!(first < mid);
        assert!(last > mid);
        assert!((mid - 0.5).abs() < 1e-6);
    }

    #[test]
    fn power_off_at_one_per_second_settles_by_the_63rd_tick() {
        let mut effect = ShutdownEffect::new(1.0, EffectSequence::PowerOff, Easing::Linear);
        let mut settled_on = None;
        for call in 1..=100 {
            if effect.update(&tick(16)) {
                settled_on = Some(call);
                break;
            }
        }
        let call = settled_on.expect("effect settles");
        assert!(call <= 63, "settled on call {call}");
        assert!(call >= 62, "settled early on call {call}");
        assert_eq!(effect.phase(), Phase::Off);
        assert_eq!(effect.progress(), 1.0);
        assert_eq!(effect.brightness(), 0.0);
    }

    #[test]
    fn progress_stays_clamped_and_monotonic_for_any_delta() {
        for millis in [0, 1, 16, 333, 999, 1_000, 5_000, 86_400_000] {
            let mut effect = ShutdownEffect::new(1.7, EffectSequence::PowerOff, Easing::Smoothstep);
            let mut last = effect.progress();
            for _ in 0..8 {
                effect.update(&tick(millis));
                let progress = effect.progress();
                assert!((0.0..=1.0).contains(&progress));
                assert!(progress >= last);
                last = progress;
            }

            let mut effect = ShutdownEffect::new(1.7, EffectSequence::PowerOn, Easing::Linear);
            let mut last = effect.progress();
            for _ in 0..8 {
                effect.update(&tick(millis));
                let progress = effect.progress();
                assert!((0.0..=1.0).contains(&progress));
                assert!(progress <= last);
                last = progress;
            }
        }
    }

    #[test]
    fn settle_signal_is_edge_triggered() {
        let mut effect = ShutdownEffect::new(4.0, EffectSequence::PowerOff, Easing::Linear);
        let signals: Vec<bool> = (0..10).map(|_| effect.update(&tick(100))).collect();
        assert_eq!(signals.iter().filter(|signal| **signal).count(), 1);
        assert!(signals[2]);
        assert!(!signals[3]);
        assert!(effect.is_resting());
    }

    #[test]
    fn power_on_request_overrides_direction_and_signals_again() {
        let mut effect = ShutdownEffect::new(2.0, EffectSequence::PowerOff, Easing::Linear);
        assert!(effect.update(&tick(600)));
        assert!(!effect.update(&tick(600)));

        assert!(effect.power_on());
        assert!(!effect.power_on());
        assert_eq!(effect.phase(), Phase::PoweringOn);
        assert!(!effect.is_resting());

        assert!(!effect.update(&tick(250)));
        assert!((effect.progress() - 0.5).abs() < 1e-6);
        assert!(effect.update(&tick(250)));
        assert_eq!(effect.phase(), Phase::On);
        assert_eq!(effect.brightness(), 1.0);
    }

    #[test]
    fn power_off_mid_power_on_reverses_from_current_progress() {
        let mut effect = ShutdownEffect::new(1.0, EffectSequence::PowerOn, Easing::Linear);
        effect.update(&tick(400));
        assert!((effect.progress() - 0.6).abs() < 1e-6);
        assert!(effect.power_off());
        effect.update(&tick(100));
        assert!((effect.progress() - 0.7).abs() < 1e-6);
        assert_eq!(effect.phase(), Phase::PoweringOff);
    }

    #[test]
    fn progress_is_pinned_while_resting() {
        let mut effect = ShutdownEffect::new(1.0, EffectSequence::PowerOn, Easing::Linear);
        effect.update(&tick(2_000));
        assert_eq!(effect.phase(), Phase::On);
        for _ in 0..5 {
            assert!(!effect.update(&tick(500)));
            assert_eq!(effect.progress(), 0.0);
        }
        assert!(effect.is_resting());
    }

    #[test]
    fn cycle_holds_on_then_powers_off_again() {
        let mut effect = ShutdownEffect::new(
            1.0,
            EffectSequence::Cycle {
                hold: Duration::from_secs(2),
            },
            Easing::Linear,
        );
        assert!(effect.update(&tick(1_000)));
        assert!(effect.is_resting());
        effect.power_on();
        assert!(effect.update(&tick(1_000)));
        assert_eq!(effect.phase(), Phase::On);
        assert!(!effect.is_resting());

        assert!(!effect.update(&tick(1_500)));
        assert_eq!(effect.phase(), Phase::On);
        assert!(!effect.update(&tick(600)));
        assert_eq!(effect.phase(), Phase::PoweringOff);
    }

    #[test]
    fn negative_rate_is_treated_as_stalled() {
        let mut effect = ShutdownEffect::new(-1.0, EffectSequence::PowerOff, Easing::Linear);
        effect.update(&tick(1_000));
        assert_eq!(effect.progress(), 0.0);
    }

    #[test]
    fn new_starts_the_first_transition_of_the_sequence() {
        let off = ShutdownEffect::new(1.0, EffectSequence::PowerOff, Easing::Linear);
        assert_eq!((off.phase(), off.progress()), (Phase::PoweringOff, 0.0));
        assert_eq!(off.brightness(), 1.0);

        let on = ShutdownEffect::new(1.0, EffectSequence::PowerOn, Easing::Linear);
        assert_eq!((on.phase(), on.progress()), (Phase::PoweringOn, 1.0));
        assert_eq!(on.brightness(), 0.0);

        let cycle = ShutdownEffect::new(
            1.0,
            EffectSequence::Cycle {
                hold: Duration::from_secs(1),
            },
            Easing::Linear,
        );
        assert_eq!(cycle.phase(), Phase::PoweringOff);
    }
}
