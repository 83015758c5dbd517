use nih_plug::nih_debug_assert;

/// Once the envelope is this close to its target it snaps onto it. Without this a slow envelope
/// would stall one ulp away from 1.0 and the release tail would run through denormals.
const SETTLE_THRESHOLD: f64 = 1e-9;

/// Convert a time constant in milliseconds to a one-pole smoothing coefficient. A zero time
/// constant gives a coefficient of exactly zero, so the envelope jumps straight to its target.
pub fn time_ms_to_coefficient(time_ms: f32, sample_rate: f32) -> f64 {
    nih_debug_assert!(sample_rate > 0.0, "invalid sample rate {}", sample_rate);
    if time_ms <= 0.0 || sample_rate <= 0.0 {
        return 0.0;
    }

    let time_samples = time_ms as f64 * 0.001 * sample_rate as f64;
    (-1.0 / time_samples).exp()
}

/// Smooths the gate's open/closed indicator into a gain between 0 and 1, rising with the attack
/// time constant and falling with the release time constant.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    envelope: f64,
    attack_coefficient: f64,
    release_coefficient: f64,
    sample_rate: f32,
    /// The attack and release times the coefficients were last computed for.
    times_ms: Option<(f32, f32)>,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            envelope: 0.0,
            attack_coefficient: 0.0,
            release_coefficient: 0.0,
            sample_rate,
            times_ms: None,
        }
    }

    /// Update the smoothing coefficients. This is called once per block, so it only does the
    /// actual work when one of the inputs changed.
    pub fn set_coefficients(&mut self, attack_ms: f32, release_ms: f32, sample_rate: f32) {
        if self.times_ms == Some((attack_ms, release_ms)) && self.sample_rate == sample_rate {
            return;
        }

        self.attack_coefficient = time_ms_to_coefficient(attack_ms, sample_rate);
        self.release_coefficient = time_ms_to_coefficient(release_ms, sample_rate);
        self.sample_rate = sample_rate;
        self.times_ms = Some((attack_ms, release_ms));
    }

    /// Move the envelope one sample towards `target`, which is 1.0 while the signal is above the
    /// threshold and 0.0 otherwise. Returns the new envelope value.
    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        let target = target as f64;
        let coefficient = if target > self.envelope {
            self.attack_coefficient
        } else {
            self.release_coefficient
        };

        self.envelope = target + coefficient * (self.envelope - target);
        if (self.envelope - target).abs() < SETTLE_THRESHOLD {
            self.envelope = target;
        }

        self.envelope as f32
    }

    pub fn value(&self) -> f32 {
        self.envelope as f32
    }

    pub fn attack_coefficient(&self) -> f64 {
        self.attack_coefficient
    }

    pub fn release_coefficient(&self) -> f64 {
        self.release_coefficient
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// An upper bound on how many samples it takes to settle with `coefficient`.
    fn settle_bound(coefficient: f64) -> usize {
        if coefficient <= 0.0 {
            return 1;
        }
        let exact = SETTLE_THRESHOLD.ln() / coefficient.ln();
        (exact * 1.01).ceil() as usize + 16
    }

    #[test]
    fn test_coefficient_formula() {
        let coef = time_ms_to_coefficient(10.0, 48000.0);
        let expected = (-1.0_f64 / 480.0).exp();
        assert!((coef - expected).abs() < 1e-12);
    }

    #[test]
    fn test_zero_time_coefficient_is_exactly_zero() {
        assert_eq!(time_ms_to_coefficient(0.0, 48000.0), 0.0);
        assert_eq!(time_ms_to_coefficient(0.0, 8000.0), 0.0);
    }

    #[test]
    fn test_zero_attack_snaps_open() {
        let mut follower = EnvelopeFollower::new(48000.0);
        follower.set_coefficients(100.0, 100.0, 48000.0);
        for _ in 0..10 {
            follower.process(1.0);
        }
        follower.process(0.0);
        assert!(follower.value() > 0.0 && follower.value() < 1.0);

        follower.set_coefficients(0.0, 100.0, 48000.0);
        assert_eq!(follower.process(1.0), 1.0);
    }

    #[test]
    fn test_zero_release_snaps_closed() {
        let mut follower = EnvelopeFollower::new(48000.0);
        follower.set_coefficients(5.0, 0.0, 48000.0);
        follower.process(1.0);
        follower.process(1.0);
        assert!(follower.value() > 0.0);

        assert_eq!(follower.process(0.0), 0.0);
    }

    #[test]
    fn test_attack_step() {
        // The first step from a closed gate covers `1 - coefficient` of the distance
        let mut follower = EnvelopeFollower::new(1000.0);
        follower.set_coefficients(10.0, 10.0, 1000.0);
        let first = follower.process(1.0);
        let expected = 1.0 - (-0.1_f64).exp();
        assert!((first as f64 - expected).abs() < 1e-6);

        // After one time constant the envelope is at roughly 1 - 1/e
        for _ in 1..10 {
            follower.process(1.0);
        }
        assert!((follower.value() - 0.632).abs() < 0.01);
    }

    #[test]
    fn test_attack_and_release_are_independent() {
        let mut follower = EnvelopeFollower::new(1000.0);
        follower.set_coefficients(1.0, 50.0, 1000.0);
        for _ in 0..50 {
            follower.process(1.0);
        }
        assert_eq!(follower.value(), 1.0);

        // A slow release keeps most of the level after a few samples
        for _ in 0..5 {
            follower.process(0.0);
        }
        assert!(follower.value() > 0.85);
    }

    #[test]
    fn test_set_coefficients_is_idempotent() {
        let mut cached = EnvelopeFollower::new(48000.0);
        let mut fresh = EnvelopeFollower::new(48000.0);
        let input = [1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

        for _ in 0..4 {
            cached.set_coefficients(12.5, 80.0, 48000.0);
            // Forget the cached times so every block recomputes
            fresh.times_ms = None;
            fresh.set_coefficients(12.5, 80.0, 48000.0);
            for &target in &input {
                assert_eq!(cached.process(target), fresh.process(target));
            }
        }
    }

    #[test]
    fn test_sample_rate_change_recomputes() {
        let mut follower = EnvelopeFollower::new(44100.0);
        follower.set_coefficients(10.0, 100.0, 44100.0);
        let before = follower.attack_coefficient();
        follower.set_coefficients(10.0, 100.0, 96000.0);
        assert!(follower.attack_coefficient() > before);
        assert_eq!(
            follower.release_coefficient(),
            time_ms_to_coefficient(100.0, 96000.0)
        );
    }

    #[test]
    fn test_reset() {
        let mut follower = EnvelopeFollower::new(48000.0);
        follower.set_coefficients(1.0, 1.0, 48000.0);
        for _ in 0..100 {
            follower.process(1.0);
        }
        follower.reset();
        assert_eq!(follower.value(), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Feeding an open gate from silence rises monotonically without overshoot and lands on
        /// exactly 1.0 within the bound set by the attack coefficient.
        #[test]
        fn attack_converges_to_one(
            attack_ms in 0.0f32..=400.0,
            sample_rate in 8000.0f32..=48000.0,
        ) {
            let mut follower = EnvelopeFollower::new(sample_rate);
            follower.set_coefficients(attack_ms, 100.0, sample_rate);
            let bound = settle_bound(follower.attack_coefficient());

            let mut previous = follower.process(1.0);
            prop_assert!(previous > 0.0);
            let mut steps = 1;
            while previous < 1.0 {
                let current = follower.process(1.0);
                prop_assert!(current >= previous, "{} fell to {}", previous, current);
                prop_assert!(current <= 1.0);
                previous = current;
                steps += 1;
                prop_assert!(steps <= bound, "not settled after {} samples", steps);
            }

            // Stays put once open
            prop_assert_eq!(follower.process(1.0), 1.0);
        }

        /// The release phase mirrors the attack phase down to exactly 0.0.
        #[test]
        fn release_converges_to_zero(
            release_ms in 0.0f32..=400.0,
            sample_rate in 8000.0f32..=48000.0,
        ) {
            let mut follower = EnvelopeFollower::new(sample_rate);
            follower.set_coefficients(0.0, release_ms, sample_rate);
            prop_assert_eq!(follower.process(1.0), 1.0);
            let bound = settle_bound(follower.release_coefficient());

            let mut previous = follower.process(0.0);
            prop_assert!(previous < 1.0);
            let mut steps = 1;
            while previous > 0.0 {
                let current = follower.process(0.0);
                prop_assert!(current <= previous, "{} rose to {}", previous, current);
                prop_assert!(current >= 0.0);
                previous = current;
                steps += 1;
                prop_assert!(steps <= bound, "not settled after {} samples", steps);
            }
        }

        /// Any gate pattern keeps the envelope inside [0, 1].
        #[test]
        fn envelope_stays_bounded(
            attack_ms in 0.0f32..=400.0,
            release_ms in 0.0f32..=400.0,
            gates in prop::collection::vec(any::<bool>(), 1..512),
        ) {
            let mut follower = EnvelopeFollower::new(48000.0);
            follower.set_coefficients(attack_ms, release_ms, 48000.0);
            for open in gates {
                let value = follower.process(if open { 1.0 } else { 0.0 });
                prop_assert!((0.0..=1.0).contains(&value));
            }
        }
    }
}
