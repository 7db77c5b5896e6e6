//! The per-note playback and modulation kernel.

use crate::envelope::{Envelope, EnvelopeParameters};
use crate::error::VoiceResult;
use crate::fixed_point::FixedPoint;
use crate::generator::{GeneratorSet, SFGenerator, N_GENERATORS};
use crate::lfo::Lfo;
use crate::modulator::{ControllerState, GeneralController, Modulator, ModulatorDescriptor};
use crate::sample::{LoopMode, Sample};
use crate::stereo::StereoValue;
use crate::tables::{centibel_to_ratio, key_to_hz};

/// A single sounding note: one sample, its generator values, its
/// modulators, and the envelope/LFO/phase state needed to render it.
///
/// Construction can fail (invalid loop points surface from [`Sample`]
/// before a `Voice` ever exists); once built, every method here is
/// realtime-safe -- no allocation, no I/O, no panics.
///
/// Call [`Voice::render`] then [`Voice::update`] once per output sample,
/// in that order: `render` reads the waveform at the voice's current
/// phase, `update` advances phase, envelopes, and LFOs for the frame
/// that follows. Calling them out of order or skipping one desyncs the
/// two, since `render` never itself moves the playback position.
#[derive(Debug)]
pub struct Voice {
    sample: Sample,
    generators: GeneratorSet,
    modulators: Vec<Modulator>,
    controllers: ControllerState,
    /// Dense cache of `sum(modulator contributions)` per destination,
    /// recomputed only when a controller that feeds a modulator changes.
    modulations: [f64; N_GENERATORS],

    vol_envelope: Envelope,
    mod_envelope: Envelope,
    mod_lfo: Lfo,
    vib_lfo: Lfo,

    phase: FixedPoint,
    /// `delta_phase_factor * keyToHz(sample_pitch)` baseline; recomputed
    /// once at construction, since the sample's own root key and tuning
    /// correction never change for the life of a voice.
    delta_phase_factor: f64,
    /// `rootKey - correction/100`, the sample's native playback pitch in
    /// key units.
    sample_pitch: f64,
    /// Cached result of the `voicePitch` formula; recomputed whenever a
    /// coarse/fine tune, scale tuning, or pitch-destination modulation
    /// changes.
    voice_pitch: f64,
    /// The phase increment to apply on the *next* [`Voice::update`] call,
    /// recomputed at the end of every `update` from the current envelope
    /// and LFO pitch contributions.
    delta_phase: FixedPoint,

    output_sample_rate: f64,

    /// The MIDI key as played, before any `keynum` generator override.
    actual_key: u8,
    /// The key this voice actually sounds at -- `actual_key` unless the
    /// `keynum` generator overrides it.
    key: u8,
    velocity: u8,
    channel: u8,
    releasing: bool,
}

impl Voice {
    /// Construct a voice for one note-on.
    ///
    /// `extra_modulators` are layered on top of the two implicit default
    /// modulators (velocity -> attenuation, pitch wheel -> pitch); an
    /// extra modulator with the same source and destination as a default
    /// replaces it, matching how a bank's explicit modulators override
    /// the implicit ones.
    pub fn try_new(
        sample: Sample,
        generators: GeneratorSet,
        extra_modulators: Vec<Modulator>,
        output_sample_rate: f64,
        key: u8,
        velocity: u8,
        channel: u8,
    ) -> VoiceResult<Self> {
        let mut modulators = vec![
            Modulator::new(ModulatorDescriptor::default_velocity_to_attenuation()),
            Modulator::new(ModulatorDescriptor::default_pitch_bend()),
        ];
        for extra in extra_modulators {
            if let Some(existing) = modulators.iter_mut().find(|m| {
                m.descriptor.source.domain == extra.descriptor.source.domain
                    && m.descriptor.destination == extra.descriptor.destination
            }) {
                *existing = extra;
            } else {
                modulators.push(extra);
            }
        }

        let actual_key = key;
        let effective_key = {
            let override_key = generators.get(SFGenerator::Keynum);
            if override_key >= 0 {
                override_key as u8
            } else {
                actual_key
            }
        };
        let effective_velocity = {
            let override_velocity = generators.get(SFGenerator::Velocity);
            if override_velocity >= 0 {
                override_velocity as u8
            } else {
                velocity
            }
        };

        let sample_rate = sample.sample_rate() as f64;
        let vol_envelope = Envelope::new(sample_rate, EnvelopeParameters::default());
        let mod_envelope = Envelope::new(sample_rate, EnvelopeParameters::default());
        let mod_lfo = Lfo::new(sample_rate, 0.0, 0.0);
        let vib_lfo = Lfo::new(sample_rate, 0.0, 0.0);

        let root_key = {
            let overriding = generators.get(SFGenerator::OverridingRootKey);
            if overriding >= 0 {
                overriding as u8
            } else {
                sample.original_key()
            }
        };
        let sample_pitch = root_key as f64 - sample.correction_cents() as f64 / 100.0;
        let delta_phase_factor = sample_rate / (output_sample_rate * key_to_hz(sample_pitch));

        let mut controllers = ControllerState::new();
        controllers.update_sf_controller(GeneralController::NoteOnVelocity, effective_velocity as f64);
        controllers.update_sf_controller(GeneralController::NoteOnKeyNumber, effective_key as f64);

        let mut voice = Self {
            sample,
            generators,
            modulators,
            controllers,
            modulations: [0.0; N_GENERATORS],
            vol_envelope,
            mod_envelope,
            mod_lfo,
            vib_lfo,
            phase: FixedPoint::from_frames(0),
            delta_phase_factor,
            sample_pitch,
            voice_pitch: sample_pitch,
            delta_phase: FixedPoint::ZERO,
            output_sample_rate,
            actual_key,
            key: effective_key,
            velocity: effective_velocity,
            channel,
            releasing: false,
        };
        voice.phase = FixedPoint::from_frames(voice.sample.start());
        voice.update_modulated_params();
        voice.delta_phase = voice.compute_delta_phase();
        Ok(voice)
    }

    /// Merge one more modulator in after construction (a bank's per-zone
    /// modulator that wasn't known at note-on time), replacing any
    /// existing modulator with the same source and destination.
    pub fn add_modulator(&mut self, modulator: Modulator) {
        if let Some(existing) = self
            .modulators
            .iter_mut()
            .find(|m| m.descriptor.source.domain == modulator.descriptor.source.domain && m.descriptor.destination == modulator.descriptor.destination)
        {
            *existing = modulator;
        } else {
            self.modulators.push(modulator);
        }
        self.update_modulated_params();
    }

    /// Overwrite a generator's static value directly (e.g. an exclusive
    /// class kill or a host automation lane), without triggering
    /// recomputation -- callers that need the change reflected
    /// immediately should follow up with [`Voice::update_modulated_params`].
    pub fn override_generator(&mut self, gen: SFGenerator, value: i16) {
        self.generators.set(gen, value);
    }

    /// Feed a non-MIDI-CC controller update (velocity, pressure, pitch
    /// wheel, ...) and recompute any modulators that read it.
    pub fn update_sf_controller(&mut self, controller: GeneralController, raw: f64) {
        self.controllers.update_sf_controller(controller, raw);
        if self.modulators.iter().any(|m| m.descriptor.reads_sf_controller(controller)) {
            self.update_modulated_params();
        }
    }

    /// Feed a MIDI continuous-controller update and recompute any
    /// modulators that read it.
    pub fn update_midi_controller(&mut self, cc: u8, value: u8) {
        self.controllers.update_midi_controller(cc, value);
        if self.modulators.iter().any(|m| m.descriptor.reads_midi_controller(cc)) {
            self.update_modulated_params();
        }
    }

    /// Re-sum every modulator against the current controller state and
    /// propagate destination-specific side effects (envelope section
    /// retargeting, LFO delay/frequency, and the cached `voicePitch`).
    pub fn update_modulated_params(&mut self) {
        self.modulations = [0.0; N_GENERATORS];
        for modulator in &self.modulators {
            let dest = modulator.destination().index();
            self.modulations[dest] += modulator.value(&self.controllers);
        }

        // Hold/decay sections shorten as the playing key rises above 60;
        // keynumToXHold/Decay are cents-per-key scaling factors applied
        // against the generator-resolved (post-keynum-override) key.
        let key_scale = 60.0 - self.key as f64;
        let vol_hold = self.effective_generator(SFGenerator::HoldVolEnv)
            + self.effective_generator(SFGenerator::KeynumToVolEnvHold) * key_scale;
        let vol_decay = self.effective_generator(SFGenerator::DecayVolEnv)
            + self.effective_generator(SFGenerator::KeynumToVolEnvDecay) * key_scale;
        self.vol_envelope.retarget(EnvelopeParameters::from_timecents(
            self.effective_generator(SFGenerator::DelayVolEnv),
            self.effective_generator(SFGenerator::AttackVolEnv),
            vol_hold,
            vol_decay,
            self.effective_generator(SFGenerator::SustainVolEnv),
            self.effective_generator(SFGenerator::ReleaseVolEnv),
        ));

        let mod_hold = self.effective_generator(SFGenerator::HoldModEnv)
            + self.effective_generator(SFGenerator::KeynumToModEnvHold) * key_scale;
        let mod_decay = self.effective_generator(SFGenerator::DecayModEnv)
            + self.effective_generator(SFGenerator::KeynumToModEnvDecay) * key_scale;
        // sustainModEnv is in tenths of a percent of attenuation (0 = no
        // attenuation, 1000 = fully attenuated), unlike sustainVolEnv's
        // centibels, so it's converted to a linear level directly here
        // rather than through `centibel_to_ratio`.
        let mod_sustain_level = 1.0 - (self.effective_generator(SFGenerator::SustainModEnv).clamp(0.0, 1000.0) / 1000.0);
        self.mod_envelope.retarget(EnvelopeParameters {
            sustain_level: mod_sustain_level,
            ..EnvelopeParameters::from_timecents(
                self.effective_generator(SFGenerator::DelayModEnv),
                self.effective_generator(SFGenerator::AttackModEnv),
                mod_hold,
                mod_decay,
                0.0,
                self.effective_generator(SFGenerator::ReleaseModEnv),
            )
        });

        self.mod_lfo
            .retarget(self.effective_generator(SFGenerator::DelayModLFO), self.effective_generator(SFGenerator::FreqModLFO));
        self.vib_lfo
            .retarget(self.effective_generator(SFGenerator::DelayVibLFO), self.effective_generator(SFGenerator::FreqVibLFO));

        let scale_tuning = self.effective_generator(SFGenerator::ScaleTuning) * 0.01;
        let coarse_tune = self.effective_generator(SFGenerator::CoarseTune);
        let fine_tune = self.effective_generator(SFGenerator::FineTune) * 0.01;
        self.voice_pitch = self.sample_pitch
            + 1e-4 * self.modulations[SFGenerator::Pitch.index()]
            + scale_tuning * (self.actual_key as f64 - self.sample_pitch)
            + coarse_tune
            + fine_tune;
    }

    /// A generator's value plus whatever modulators currently add to it.
    fn effective_generator(&self, gen: SFGenerator) -> f64 {
        self.generators.get(gen) as f64 + self.modulations[gen.index()]
    }

    /// Begin the release stage of both envelopes. In [`LoopMode::Looped`]
    /// mode the voice still finishes at the next loop boundary rather
    /// than draining through a release tail; [`LoopMode::LoopedWithRemainder`]
    /// plays out `end_loop..end` once before finishing.
    pub fn release(&mut self) {
        self.releasing = true;
        self.vol_envelope.release();
        self.mod_envelope.release();
    }

    pub fn is_sounding(&self) -> bool {
        !self.vol_envelope.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        !self.is_sounding()
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    pub fn actual_key(&self) -> u8 {
        self.actual_key
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn exclusive_class(&self) -> i16 {
        self.generators.get(SFGenerator::ExclusiveClass)
    }

    pub fn phase(&self) -> FixedPoint {
        self.phase
    }

    /// The static attenuation-and-pan contribution to output amplitude:
    /// `centibelToRatio(0.4 * initialAttenuation + modulations) *
    /// equalPowerPan(pan)`. Excludes the volume envelope and the LFO
    /// tremolo depth (`modLfoToVolume`), both of which vary every sample
    /// and are folded in separately by [`Voice::render`].
    pub fn panned_volume(&self) -> StereoValue {
        let attenuation_cb = 0.4 * self.generators.get(SFGenerator::InitialAttenuation) as f64
            + self.modulations[SFGenerator::InitialAttenuation.index()];
        let amplitude = centibel_to_ratio(attenuation_cb);

        let pan_units = self.effective_generator(SFGenerator::Pan).clamp(-500.0, 500.0);
        let left = (std::f64::consts::PI * (-pan_units + 500.0) / 2000.0).sin();
        let right = (std::f64::consts::PI * (pan_units + 500.0) / 2000.0).sin();
        StereoValue::new(amplitude * left, amplitude * right)
    }

    /// `deltaPhase` for the upcoming sample, folding the cached
    /// `voicePitch` together with the modulation envelope's and both
    /// LFOs' current pitch-depth contributions.
    fn compute_delta_phase(&self) -> FixedPoint {
        let env_pitch = self.mod_envelope.value() * self.effective_generator(SFGenerator::ModEnvToPitch) * 0.01;
        let lfo_pitch = (self.vib_lfo.value() * self.effective_generator(SFGenerator::VibLfoToPitch)
            + self.mod_lfo.value() * self.effective_generator(SFGenerator::ModLfoToPitch))
            * 0.01;
        let target_key = self.voice_pitch + env_pitch + lfo_pitch;
        let ratio = self.delta_phase_factor * key_to_hz(target_key);
        FixedPoint::from_f64(ratio)
    }

    /// Linear-interpolated sample value at the current phase, in roughly
    /// `[-1, 1]` (not clipped).
    fn interpolated_sample(&self) -> f64 {
        let index = self.phase.integer();
        let a = self.sample.frame(index) as f64;
        let b = self.sample.frame(index + 1) as f64;
        (a + (b - a) * self.phase.fractional()) / 32767.0
    }

    /// Render the current sample frame without advancing playback state.
    /// Returns silence once the voice has finished.
    pub fn render(&mut self) -> StereoValue {
        if self.is_finished() {
            return StereoValue::ZERO;
        }
        let tremolo = centibel_to_ratio(self.mod_lfo.value() * self.effective_generator(SFGenerator::ModLfoToVolume));
        let gain = self.vol_envelope.value() * tremolo;
        self.panned_volume() * gain * self.interpolated_sample()
    }

    /// Advance phase, envelopes, and LFOs by one output sample. Must be
    /// called once per frame after [`Voice::render`]; a no-op once the
    /// voice has finished.
    pub fn update(&mut self) {
        if self.is_finished() {
            return;
        }

        self.phase.add_assign(self.delta_phase);

        match self.sample.loop_mode() {
            LoopMode::Unlooped => {
                if self.phase.integer() > self.sample.end().saturating_sub(1) {
                    self.finish();
                    return;
                }
            }
            LoopMode::Looped => {
                if self.phase.integer() > self.sample.end_loop().saturating_sub(1) {
                    if self.releasing {
                        self.finish();
                        return;
                    }
                    self.phase.sub_assign_frames(self.sample.loop_len());
                }
            }
            LoopMode::LoopedWithRemainder => {
                if self.releasing {
                    if self.phase.integer() > self.sample.end().saturating_sub(1) {
                        self.finish();
                        return;
                    }
                } else if self.phase.integer() > self.sample.end_loop().saturating_sub(1) {
                    self.phase.sub_assign_frames(self.sample.loop_len());
                }
            }
        }

        self.vib_lfo.update();
        self.mod_lfo.update();
        self.vol_envelope.update();
        self.mod_envelope.update();

        self.delta_phase = self.compute_delta_phase();
    }

    fn finish(&mut self) {
        self.vol_envelope.finish();
        self.mod_envelope.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulator::ControllerDomain;
    use std::sync::Arc;

    fn sine_sample(len: usize, sample_rate: u32) -> Sample {
        let data: Vec<i16> = (0..len).map(|i| (8000.0 * (i as f64 * 0.05).sin()) as i16).collect();
        Sample::try_new(Arc::from(data), 0, len as u32, 0, 0, sample_rate, 60, 0, LoopMode::Unlooped).unwrap()
    }

    fn looped_sample(len: usize, sample_rate: u32) -> Sample {
        let data: Vec<i16> = (0..len).map(|i| (8000.0 * (i as f64 * 0.05).sin()) as i16).collect();
        Sample::try_new(Arc::from(data), 0, len as u32, 10, len as u32 - 10, sample_rate, 60, 0, LoopMode::Looped).unwrap()
    }

    fn instant_release_generators() -> GeneratorSet {
        let mut generators = GeneratorSet::new();
        generators.set(SFGenerator::ReleaseVolEnv, -12000);
        generators
    }

    fn basic_voice(sample: Sample, key: u8, velocity: u8) -> Voice {
        Voice::try_new(sample, GeneratorSet::new(), Vec::new(), 44100.0, key, velocity, 0).unwrap()
    }

    fn run(voice: &mut Voice, frames: usize) -> Vec<StereoValue> {
        (0..frames)
            .map(|_| {
                let out = voice.render();
                voice.update();
                out
            })
            .collect()
    }

    // S1: an unlooped sample plays through to its natural end, finishes, and
    // produces finite, nonzero output along the way.
    #[test]
    fn s1_unloop_playback_finishes_and_renders_finite() {
        let mut voice = Voice::try_new(sine_sample(1024, 48000), instant_release_generators(), Vec::new(), 48000.0, 69, 100, 0).unwrap();
        let frames = run(&mut voice, 2000);
        assert!(voice.is_finished());
        assert!(frames.iter().any(|f| f.left != 0.0 || f.right != 0.0));
        assert!(frames.iter().all(|f| f.left.is_finite() && f.right.is_finite()));
    }

    // S2: a looped voice's phase stays inside [0, endLoop) once the loop engages.
    #[test]
    fn s2_loop_wrap_stays_within_loop_span() {
        let mut voice = basic_voice(looped_sample(100, 44100), 60, 100);
        for _ in 0..1000 {
            voice.render();
            voice.update();
            assert!(voice.phase().integer() < 90, "phase escaped loop span: {}", voice.phase().integer());
        }
    }

    // S3: releasing a Looped voice finishes it at the next loop boundary rather than draining.
    #[test]
    fn s3_release_in_looped_mode_finishes_at_loop_boundary() {
        let mut voice = basic_voice(looped_sample(100, 44100), 60, 100);
        for _ in 0..500 {
            voice.render();
            voice.update();
        }
        voice.release();
        let mut finished_at = None;
        for i in 0..1000 {
            voice.render();
            voice.update();
            if voice.is_finished() {
                finished_at = Some(i);
                break;
            }
        }
        assert!(finished_at.is_some(), "looped voice never finished after release");
        assert_eq!(voice.render(), StereoValue::ZERO);
    }

    // S4: full pitch-wheel deflection bends exactly two semitones up.
    #[test]
    fn s4_full_pitch_bend_is_two_semitones() {
        let mut voice = basic_voice(sine_sample(1000, 44100), 60, 100);
        voice.update_sf_controller(GeneralController::PitchWheel, 8192.0);
        let ratio = {
            let delta = voice.compute_delta_phase();
            delta.integer() as f64 + delta.fractional()
        };
        let expected = 2f64.powf(2.0 / 12.0);
        assert!((ratio - expected).abs() < 1e-6, "got {ratio}, expected {expected}");
    }

    // S5: pan law is symmetric and centered pan splits power evenly.
    #[test]
    fn s5_pan_law_symmetric_and_centered() {
        let mut voice = basic_voice(sine_sample(1000, 44100), 60, 100);
        let centered = voice.panned_volume();
        let quarter = std::f64::consts::FRAC_PI_4;
        assert!((centered.left - quarter.sin()).abs() < 1e-12);
        assert!((centered.right - quarter.sin()).abs() < 1e-12);

        voice.override_generator(SFGenerator::Pan, 250);
        voice.update_modulated_params();
        let right_biased = voice.panned_volume();

        voice.override_generator(SFGenerator::Pan, -250);
        voice.update_modulated_params();
        let left_biased = voice.panned_volume();

        assert!((left_biased.left - right_biased.right).abs() < 1e-12);
        assert!((left_biased.right - right_biased.left).abs() < 1e-12);
    }

    // S6: two equal-and-opposite modulators to the same destination cancel out.
    #[test]
    fn s6_opposing_modulators_to_same_destination_cancel() {
        use crate::modulator::{ControllerSource, CurveType, Direction, Polarity, TransformOp};
        let source = ControllerSource::new(
            ControllerDomain::Midi(1),
            Polarity::Unipolar,
            Direction::Positive,
            CurveType::Linear,
        );
        let mut voice = basic_voice(sine_sample(1000, 44100), 60, 100);
        voice.add_modulator(Modulator::new(ModulatorDescriptor {
            source,
            amount_source: crate::modulator::ControllerSource::NONE,
            amount: 960,
            destination: SFGenerator::InitialAttenuation,
            transform: TransformOp::Linear,
        }));
        voice.add_modulator(Modulator::new(ModulatorDescriptor {
            source,
            amount_source: crate::modulator::ControllerSource::NONE,
            amount: -960,
            destination: SFGenerator::InitialAttenuation,
            transform: TransformOp::Linear,
        }));
        voice.update_midi_controller(1, 100);
        assert_eq!(voice.modulations[SFGenerator::InitialAttenuation.index()], 0.0);
    }

    #[test]
    fn exclusive_class_reads_generator() {
        let mut generators = GeneratorSet::new();
        generators.set(SFGenerator::ExclusiveClass, 3);
        let voice = Voice::try_new(sine_sample(1000, 44100), generators, Vec::new(), 44100.0, 60, 100, 0).unwrap();
        assert_eq!(voice.exclusive_class(), 3);
    }

    #[test]
    fn octave_up_doubles_phase_increment() {
        let low = basic_voice(sine_sample(1000, 44100), 60, 100);
        let high = basic_voice(sine_sample(1000, 44100), 72, 100);
        let low_rate = { let d = low.compute_delta_phase(); d.integer() as f64 + d.fractional() };
        let high_rate = { let d = high.compute_delta_phase(); d.integer() as f64 + d.fractional() };
        assert!((high_rate / low_rate - 2.0).abs() < 1e-6);
    }

    mod invariants {
        use super::*;

        // Invariant 1: phase sits at sample.start before the first update.
        #[test]
        fn fresh_voice_phase_is_at_sample_start() {
            let voice = basic_voice(sine_sample(1000, 44100), 60, 100);
            assert_eq!(voice.phase().integer(), 0);
            assert!(voice.is_sounding());
        }

        // Invariant 8: repeating an identical controller update is idempotent.
        #[test]
        fn repeated_identical_controller_update_is_idempotent() {
            let mut voice = basic_voice(sine_sample(1000, 44100), 60, 100);
            voice.update_sf_controller(GeneralController::PitchWheel, 4096.0);
            let once = voice.modulations;
            voice.update_sf_controller(GeneralController::PitchWheel, 4096.0);
            assert_eq!(once, voice.modulations);
        }

        // Invariant 9: overrideGenerator + update_modulated_params is idempotent for fixed inputs.
        #[test]
        fn override_generator_then_recompute_is_idempotent() {
            let mut voice = basic_voice(sine_sample(1000, 44100), 60, 100);
            voice.override_generator(SFGenerator::Pan, 200);
            voice.update_modulated_params();
            let first = voice.panned_volume();
            voice.update_modulated_params();
            let second = voice.panned_volume();
            assert_eq!(first, second);
        }

        // Invariant 2: an unreleased looped voice never advances past endLoop.
        #[test]
        fn looped_voice_phase_never_exceeds_loop_end() {
            let mut voice = basic_voice(looped_sample(100, 44100), 60, 100);
            for _ in 0..50_000 {
                voice.render();
                voice.update();
                assert!(voice.phase().integer() < 90);
            }
        }
    }
}
