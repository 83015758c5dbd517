use nih_plug::nih_debug_assert;
use nih_plug::util::db_to_gain;

use crate::envelope::EnvelopeFollower;

/// The sample rate the engine assumes until the host tells it otherwise.
pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// A snapshot of the gate's parameters, in their user facing units. This is read once at the start
/// of every block so the gate behaves consistently within a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSettings {
    /// Level in decibels below which the gate closes.
    pub threshold_db: f32,
    /// Envelope rise time in milliseconds.
    pub attack_ms: f32,
    /// Envelope fall time in milliseconds.
    pub release_ms: f32,
    /// Blend between the gated signal at 1.0 and the dry signal at 0.0.
    pub mix: f32,
    /// Output trim in decibels.
    pub volume_db: f32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            threshold_db: -12.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            mix: 1.0,
            volume_db: 0.0,
        }
    }
}

/// Runs the noise gate over blocks of audio. Every channel has its own envelope follower, and the
/// followers are only ever (re)allocated in [`GateEngine::prepare()`].
#[derive(Debug, Clone)]
pub struct GateEngine {
    followers: Vec<EnvelopeFollower>,
    sample_rate: f32,
}

impl Default for GateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GateEngine {
    /// Create an engine without any channels. Call [`GateEngine::prepare()`] before processing.
    pub fn new() -> Self {
        Self {
            followers: Vec::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Allocate one fresh envelope follower per channel. This allocates and must not be called from
    /// the audio thread.
    pub fn prepare(&mut self, num_channels: usize, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.followers.clear();
        self.followers
            .resize_with(num_channels, || EnvelopeFollower::new(sample_rate));
    }

    /// Close the gate on every channel.
    pub fn reset(&mut self) {
        for follower in &mut self.followers {
            follower.reset();
        }
    }

    pub fn num_channels(&self) -> usize {
        self.followers.len()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// The current envelope for a channel, or `None` if that channel was never prepared.
    pub fn envelope(&self, channel: usize) -> Option<f32> {
        self.followers.get(channel).map(EnvelopeFollower::value)
    }

    /// Gate a block of audio in place. `channels` holds one slice per channel. Channels beyond the
    /// prepared channel count are left untouched.
    pub fn process_block(&mut self, settings: &GateSettings, channels: &mut [&mut [f32]]) {
        nih_debug_assert!(
            channels.len() <= self.followers.len(),
            "got {} channels but only {} were prepared",
            channels.len(),
            self.followers.len()
        );

        let threshold_gain = db_to_gain(settings.threshold_db);
        let volume_gain = db_to_gain(settings.volume_db);
        let mix = settings.mix;
        let mix_inverse = 1.0 - mix;

        for (channel, follower) in channels.iter_mut().zip(self.followers.iter_mut()) {
            follower.set_coefficients(settings.attack_ms, settings.release_ms, self.sample_rate);

            for sample in channel.iter_mut() {
                let input = *sample;
                let target = if input.abs() > threshold_gain { 1.0 } else { 0.0 };
                let gate = follower.process(target);

                *sample = volume_gain * ((mix * gate + mix_inverse) * input);
            }
        }
    }
}
