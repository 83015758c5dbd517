use nih_plug::prelude::*;
use std::sync::Arc;

pub mod envelope;
pub use envelope::{time_ms_to_coefficient, EnvelopeFollower};
pub mod gate;
pub use gate::{GateEngine, GateSettings};

pub struct NoiseGate {
    params: Arc<NoiseGateParams>,
    engine: GateEngine,
}

#[derive(Params)]
pub struct NoiseGateParams {
    /// Level below which the gate closes.
    #[id = "threshold"]
    pub threshold: FloatParam,

    /// How fast the gate opens once the signal crosses the threshold.
    #[id = "attack"]
    pub attack: FloatParam,

    /// How fast the gate closes once the signal drops below the threshold.
    #[id = "release"]
    pub release: FloatParam,

    /// Blend between the gated and the dry signal, `1.0` being fully gated.
    #[id = "mix"]
    pub mix: FloatParam,

    /// Output trim applied after the mix.
    #[id = "volume"]
    pub volume: FloatParam,
}

impl Default for NoiseGate {
    fn default() -> Self {
        // Stereo at the default rate so the plugin can process before the host initializes it
        let mut engine = GateEngine::new();
        engine.prepare(2, gate::DEFAULT_SAMPLE_RATE);

        Self {
            params: Arc::new(NoiseGateParams::default()),
            engine,
        }
    }
}

impl Default for NoiseGateParams {
    fn default() -> Self {
        let defaults = GateSettings::default();

        Self {
            threshold: FloatParam::new(
                "Threshold",
                defaults.threshold_db,
                FloatRange::Linear { min: -60.0, max: 0.0 },
            )
            .with_step_size(1.0)
            .with_unit(" dB"),
            attack: FloatParam::new(
                "Attack",
                defaults.attack_ms,
                FloatRange::Skewed {
                    min: 0.0,
                    max: 400.0,
                    factor: 0.3,
                },
            )
            .with_step_size(0.05)
            .with_unit(" ms")
            .with_value_to_string(formatters::v2s_f32_rounded(2)),
            release: FloatParam::new(
                "Release",
                defaults.release_ms,
                FloatRange::Skewed {
                    min: 0.0,
                    max: 400.0,
                    factor: 0.3,
                },
            )
            .with_step_size(0.05)
            .with_unit(" ms")
            .with_value_to_string(formatters::v2s_f32_rounded(2)),
            mix: FloatParam::new("Mix", defaults.mix, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_step_size(0.05)
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(0))
                .with_string_to_value(formatters::s2v_f32_percentage()),
            volume: FloatParam::new(
                "Volume",
                defaults.volume_db,
                FloatRange::Linear {
                    min: -12.0,
                    max: 12.0,
                },
            )
            .with_step_size(0.1)
            .with_unit(" dB")
            .with_value_to_string(formatters::v2s_f32_rounded(1)),
        }
    }
}

impl NoiseGateParams {
    /// Read the current parameter values. Each read is a single atomic load, so this is safe to
    /// call from the audio thread while the host or the GUI changes parameters.
    pub fn snapshot(&self) -> GateSettings {
        GateSettings {
            threshold_db: self.threshold.value(),
            attack_ms: self.attack.value(),
            release_ms: self.release.value(),
            mix: self.mix.value(),
            volume_db: self.volume.value(),
        }
    }
}

impl Plugin for NoiseGate {
    const NAME: &'static str = "Noise Gate Rs";
    const VENDOR: &'static str = "Noise Gate Rs";
    const URL: &'static str = env!("CARGO_PKG_HOMEPAGE");
    const EMAIL: &'static str = "info@example.com";

    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo is the default, mono hosts get their own layout. Every channel is gated
    // independently.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const MIDI_OUTPUT: MidiConfig = MidiConfig::None;

    // Parameters are read once per block
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        if buffer_config.sample_rate <= 0.0 {
            nih_error!("Refusing to run at a sample rate of {}", buffer_config.sample_rate);
            return false;
        }

        let num_channels = audio_io_layout
            .main_output_channels
            .map(NonZeroU32::get)
            .unwrap_or(0) as usize;
        self.engine.prepare(num_channels, buffer_config.sample_rate);
        nih_log!(
            "Gating {} channel(s) at {} Hz",
            num_channels,
            buffer_config.sample_rate
        );

        true
    }

    fn reset(&mut self) {
        // Called from the audio thread, this only touches the preallocated envelopes
        self.engine.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let settings = self.params.snapshot();
        self.engine.process_block(&settings, buffer.as_slice());

        ProcessStatus::Normal
    }
}

impl ClapPlugin for NoiseGate {
    const CLAP_ID: &'static str = "com.noise-gate-rs.gate";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Noise gate with attack, release and mix");
    const CLAP_MANUAL_URL: Option<&'static str> = Some(Self::URL);
    const CLAP_SUPPORT_URL: Option<&'static str> = None;

    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Mono,
        ClapFeature::Stereo,
        ClapFeature::Gate,
    ];
}

impl Vst3Plugin for NoiseGate {
    const VST3_CLASS_ID: [u8; 16] = *b"NoiseGateRsFx!!!";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Dynamics];
}

nih_export_clap!(NoiseGate);
nih_export_vst3!(NoiseGate);
