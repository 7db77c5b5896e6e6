//! DAHDSR (delay, attack, hold, decay, sustain, release) envelope
//! generator, used for both the volume and the modulation envelope.

use crate::tables::{centibel_to_ratio, timecent_to_second};

/// The attenuation, expressed in centibels, that decay and release are
/// defined to fall by over one section-length. 1000 centibels is 100dB,
/// deep enough to be inaudible, matching the convention already used by
/// [`centibel_to_ratio`]'s `-200` divisor.
const FALL_ATTENUATION_CB: f64 = 1000.0;

/// Which stage of the six-section envelope is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Finished,
}

/// Per-section durations in seconds, plus the sustain level as a linear
/// amplitude ratio. Built once from the raw generator values and reused
/// for every note that shares them.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeParameters {
    pub delay: f64,
    pub attack: f64,
    pub hold: f64,
    pub decay: f64,
    pub sustain_level: f64,
    pub release: f64,
}

impl EnvelopeParameters {
    /// Build from (possibly modulated, hence `f64`) SF2 generator values:
    /// delay/attack/hold/decay/release in timecents, sustain in centibels
    /// of attenuation from full scale.
    pub fn from_timecents(delay_tc: f64, attack_tc: f64, hold_tc: f64, decay_tc: f64, sustain_cb: f64, release_tc: f64) -> Self {
        Self {
            delay: timecent_to_second(delay_tc),
            attack: timecent_to_second(attack_tc),
            hold: timecent_to_second(hold_tc),
            decay: timecent_to_second(decay_tc),
            sustain_level: centibel_to_ratio(sustain_cb),
            release: timecent_to_second(release_tc),
        }
    }
}

/// A running DAHDSR envelope, sampled once per frame via [`Envelope::value`].
#[derive(Debug, Clone)]
pub struct Envelope {
    sample_rate: f64,
    params: EnvelopeParameters,
    stage: EnvelopeStage,
    samples_in_stage: u32,
    /// Current output level, linear amplitude in `[0, 1]`.
    level: f64,
    /// Level latched at the instant `release()` was called; release decays
    /// from here rather than from 1.0, so releasing early during decay
    /// doesn't pop.
    release_start_level: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64, params: EnvelopeParameters) -> Self {
        Self {
            sample_rate,
            params,
            stage: EnvelopeStage::Delay,
            samples_in_stage: 0,
            level: 0.0,
            release_start_level: 0.0,
        }
    }

    /// Advance the envelope by one sample frame and return the new level.
    pub fn update(&mut self) -> f64 {
        let p = &self.params;
        let t = self.samples_in_stage as f64 / self.sample_rate;

        match self.stage {
            EnvelopeStage::Delay => {
                self.level = 0.0;
                if t >= p.delay {
                    self.advance(EnvelopeStage::Attack);
                }
            }
            EnvelopeStage::Attack => {
                self.level = if p.attack <= 0.0 { 1.0 } else { (t / p.attack).min(1.0) };
                if t >= p.attack {
                    self.advance(EnvelopeStage::Hold);
                }
            }
            EnvelopeStage::Hold => {
                self.level = 1.0;
                if t >= p.hold {
                    self.advance(EnvelopeStage::Decay);
                }
            }
            EnvelopeStage::Decay => {
                self.level = exponential_fall(1.0, p.decay, t);
                if t >= p.decay || self.level <= p.sustain_level {
                    self.level = p.sustain_level;
                    self.advance(EnvelopeStage::Sustain);
                }
            }
            EnvelopeStage::Sustain => {
                self.level = p.sustain_level;
            }
            EnvelopeStage::Release => {
                self.level = exponential_fall(self.release_start_level, p.release, t);
                if t >= p.release || self.level <= 0.0001 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Finished;
                }
            }
            EnvelopeStage::Finished => {
                self.level = 0.0;
            }
        }

        self.samples_in_stage = self.samples_in_stage.wrapping_add(1);
        self.level
    }

    /// Move to the release stage from wherever the envelope currently is.
    pub fn release(&mut self) {
        if self.stage == EnvelopeStage::Finished {
            return;
        }
        self.release_start_level = self.level;
        self.advance(EnvelopeStage::Release);
    }

    /// Replace the section parameters in place, leaving the current stage,
    /// elapsed time, and level untouched -- a generator update retargets
    /// the envelope's future shape without restarting or popping it.
    pub fn retarget(&mut self, params: EnvelopeParameters) {
        self.params = params;
    }

    /// Force the envelope to its terminal, silent state immediately.
    pub fn finish(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeStage::Finished;
    }

    pub fn value(&self) -> f64 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Finished
    }

    fn advance(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.samples_in_stage = 0;
    }
}

/// Exponential decay from `start` towards zero over `section_len` seconds,
/// falling by [`FALL_ATTENUATION_CB`] centibels across that span. A
/// zero-or-negative section length collapses to an immediate drop to zero,
/// matching the delay/attack-free generator defaults.
fn exponential_fall(start: f64, section_len: f64, t: f64) -> f64 {
    if section_len <= 0.0 {
        return 0.0;
    }
    let ratio_at_end = centibel_to_ratio(FALL_ATTENUATION_CB);
    start * ratio_at_end.powf(t / section_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(delay: f64, attack: f64, hold: f64, decay: f64, sustain: f64, release: f64) -> EnvelopeParameters {
        EnvelopeParameters {
            delay,
            attack,
            hold,
            decay,
            sustain_level: sustain,
            release,
        }
    }

    #[test]
    fn delay_stage_holds_silence() {
        let mut env = Envelope::new(1000.0, params(0.01, 0.0, 0.0, 0.0, 1.0, 0.0));
        for _ in 0..5 {
            assert_eq!(env.update(), 0.0);
        }
        assert_eq!(env.stage(), EnvelopeStage::Delay);
    }

    #[test]
    fn attack_ramps_linearly_to_one() {
        // attack = 0.01s at 1000 Hz is 10 samples; a few extra iterations
        // give the delay-to-attack transition room before checking the peak.
        let mut env = Envelope::new(1000.0, params(0.0, 0.01, 0.0, 0.0, 1.0, 0.0));
        let mut last = 0.0;
        for _ in 0..20 {
            let v = env.update();
            assert!(v >= last - 1e-9);
            last = v;
        }
        assert!((last - 1.0).abs() < 1e-6, "got {last}");
    }

    #[test]
    fn hold_stage_stays_at_full_scale() {
        // Zero-length delay and attack sections each consume one `update`
        // call to transition out of, rather than cascading within a call.
        let mut env = Envelope::new(1000.0, params(0.0, 0.0, 0.01, 0.0, 0.3, 0.0));
        env.update(); // Delay -> Attack
        let v = env.update(); // Attack -> Hold
        assert_eq!(v, 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Hold);
    }

    #[test]
    fn decay_approaches_sustain_level() {
        let mut env = Envelope::new(1000.0, params(0.0, 0.0, 0.0, 0.05, 0.25, 0.0));
        let mut v = 1.0;
        for _ in 0..200 {
            v = env.update();
        }
        assert!((v - 0.25).abs() < 0.05, "expected near 0.25, got {v}");
    }

    #[test]
    fn sustain_holds_constant() {
        let mut env = Envelope::new(1000.0, params(0.0, 0.0, 0.0, 0.001, 0.4, 1.0));
        for _ in 0..50 {
            env.update();
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        let first = env.update();
        let second = env.update();
        assert_eq!(first, second);
        assert_eq!(first, 0.4);
    }

    #[test]
    fn release_decays_from_current_level_to_zero() {
        let mut env = Envelope::new(1000.0, params(0.0, 0.0, 0.0, 0.001, 0.5, 0.05));
        for _ in 0..10 {
            env.update();
        }
        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        let mut last = 1.0;
        for _ in 0..500 {
            let v = env.update();
            assert!(v <= last + 1e-9);
            last = v;
        }
        assert!(env.is_finished());
        assert_eq!(env.value(), 0.0);
    }

    #[test]
    fn release_from_delay_stage_goes_silent_immediately() {
        let mut env = Envelope::new(1000.0, params(1.0, 0.1, 0.0, 0.1, 0.5, 0.0));
        env.update();
        env.release();
        // release_start_level was 0 (still in delay), release section is 0.
        for _ in 0..5 {
            env.update();
        }
        assert!(env.is_finished());
    }

    #[test]
    fn finish_is_immediate_and_terminal() {
        let mut env = Envelope::new(1000.0, params(0.0, 0.01, 0.0, 0.0, 1.0, 1.0));
        env.update();
        env.finish();
        assert!(env.is_finished());
        assert_eq!(env.update(), 0.0);
    }
}
