//! Modulator sources, curves, and the modulator evaluation pipeline.
//!
//! A modulator maps up to two controller readings through independent
//! normalization curves, multiplies them together with a fixed amount,
//! and adds the result to a generator destination. This mirrors the
//! SoundFont 2 modulator model (source x amountSource x amount ->
//! destination), generalized here to a small set of controller domains.

use crate::generator::SFGenerator;

/// The controllers an application can drive without going through a MIDI
/// continuous-controller number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneralController {
    /// Always reads as 1.0; used as a modulator's `amount_source` when the
    /// amount should apply unconditionally.
    NoController,
    NoteOnVelocity,
    NoteOnKeyNumber,
    PolyPressure,
    ChannelPressure,
    PitchWheel,
    /// Scalar: semitones of bend per full-scale pitch wheel deflection.
    /// Bypasses curve normalization entirely (see [`ControllerSource`]).
    PitchWheelSensitivity,
    /// Scalar passthrough reserved for chained modulators; reads as 1.0
    /// since cross-modulator linking is not implemented.
    Link,
}

impl GeneralController {
    /// Scalar controllers bypass unipolar/bipolar curve normalization and
    /// are used directly as the raw numeric value.
    const fn is_scalar(self) -> bool {
        matches!(self, Self::NoController | Self::PitchWheelSensitivity | Self::Link)
    }
}

/// Where a controller reading comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerDomain {
    General(GeneralController),
    /// A MIDI continuous controller number, 0..=127.
    Midi(u8),
}

/// Whether a normalized value stays in `[0, 1]` or spans `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Unipolar,
    Bipolar,
}

/// Whether increasing controller input increases or decreases the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

/// The response curve applied to a normalized `[0, 1]` (or `[-1, 1]`
/// magnitude) fraction before the polarity mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveType {
    Linear,
    Concave,
    Convex,
    Switch,
}

/// Post-multiplication transform applied to a modulator's product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOp {
    Linear,
    AbsoluteValue,
}

/// A fully-specified controller reading and how to normalize it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSource {
    pub domain: ControllerDomain,
    pub polarity: Polarity,
    pub direction: Direction,
    pub curve: CurveType,
}

impl ControllerSource {
    pub const fn new(domain: ControllerDomain, polarity: Polarity, direction: Direction, curve: CurveType) -> Self {
        Self { domain, polarity, direction, curve }
    }

    /// A source that always contributes a neutral multiplier of 1.0.
    pub const NONE: Self = Self::new(
        ControllerDomain::General(GeneralController::NoController),
        Polarity::Unipolar,
        Direction::Positive,
        CurveType::Linear,
    );
}

/// Live controller values a [`Modulator`] reads from. Owned by the voice
/// (or its caller) and updated as MIDI/host events arrive.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub note_on_velocity: u8,
    pub note_on_key: u8,
    pub poly_pressure: u8,
    pub channel_pressure: u8,
    /// Pitch wheel position centered on zero: `0` is no bend, `+8192` is
    /// the nominal full upward deflection used by the default pitch-bend
    /// modulator, matching a 14-bit MIDI value with 8192 subtracted.
    pub pitch_wheel: i32,
    /// Semitones of bend per full-scale pitch wheel deflection.
    pub pitch_wheel_sensitivity: f64,
    pub midi_cc: [u8; 128],
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            note_on_velocity: 0,
            note_on_key: 0,
            poly_pressure: 0,
            channel_pressure: 0,
            pitch_wheel: 0,
            pitch_wheel_sensitivity: 2.0,
            midi_cc: [0; 128],
        }
    }
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update one of the non-MIDI-CC general controllers.
    pub fn update_sf_controller(&mut self, controller: GeneralController, raw: f64) {
        match controller {
            GeneralController::NoteOnVelocity => self.note_on_velocity = raw.clamp(0.0, 127.0) as u8,
            GeneralController::NoteOnKeyNumber => self.note_on_key = raw.clamp(0.0, 127.0) as u8,
            GeneralController::PolyPressure => self.poly_pressure = raw.clamp(0.0, 127.0) as u8,
            GeneralController::ChannelPressure => self.channel_pressure = raw.clamp(0.0, 127.0) as u8,
            GeneralController::PitchWheel => self.pitch_wheel = raw as i32,
            GeneralController::PitchWheelSensitivity => self.pitch_wheel_sensitivity = raw,
            GeneralController::NoController | GeneralController::Link => {}
        }
    }

    /// Update a single MIDI continuous controller (0..=127 value clamped).
    pub fn update_midi_controller(&mut self, cc: u8, value: u8) {
        if let Some(slot) = self.midi_cc.get_mut(cc as usize) {
            *slot = value;
        }
    }

    fn raw_and_range(&self, domain: ControllerDomain) -> (f64, SourceRange) {
        match domain {
            ControllerDomain::General(GeneralController::NoteOnVelocity) => {
                (self.note_on_velocity as f64, SourceRange::Unsigned(127.0))
            }
            ControllerDomain::General(GeneralController::NoteOnKeyNumber) => {
                (self.note_on_key as f64, SourceRange::Unsigned(127.0))
            }
            ControllerDomain::General(GeneralController::PolyPressure) => {
                (self.poly_pressure as f64, SourceRange::Unsigned(127.0))
            }
            ControllerDomain::General(GeneralController::ChannelPressure) => {
                (self.channel_pressure as f64, SourceRange::Unsigned(127.0))
            }
            ControllerDomain::General(GeneralController::PitchWheel) => {
                (self.pitch_wheel as f64, SourceRange::Centered(8192.0))
            }
            ControllerDomain::Midi(cc) => (self.midi_cc[cc as usize] as f64, SourceRange::Unsigned(127.0)),
            // Scalar domains never reach here; see `scalar_value`.
            ControllerDomain::General(GeneralController::NoController) => (0.0, SourceRange::Unsigned(1.0)),
            ControllerDomain::General(GeneralController::PitchWheelSensitivity) => (0.0, SourceRange::Unsigned(1.0)),
            ControllerDomain::General(GeneralController::Link) => (0.0, SourceRange::Unsigned(1.0)),
        }
    }

    fn scalar_value(&self, controller: GeneralController) -> f64 {
        match controller {
            GeneralController::NoController | GeneralController::Link => 1.0,
            GeneralController::PitchWheelSensitivity => self.pitch_wheel_sensitivity,
            _ => unreachable!("scalar_value called on a non-scalar controller"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SourceRange {
    /// Raw value spans `[0, max]`.
    Unsigned(f64),
    /// Raw value spans `[-max, max]`, already centered on zero.
    Centered(f64),
}

/// Evaluate a [`ControllerSource`] against live controller state, producing
/// a value in `[0, 1]` (unipolar) or `[-1, 1]` (bipolar) -- or, for scalar
/// general controllers, the raw scalar unchanged.
pub fn evaluate_source(source: &ControllerSource, state: &ControllerState) -> f64 {
    if let ControllerDomain::General(controller) = source.domain {
        if controller.is_scalar() {
            return state.scalar_value(controller);
        }
    }

    let (raw, range) = state.raw_and_range(source.domain);
    match range {
        SourceRange::Unsigned(max) => {
            let mut frac = if max > 0.0 { (raw / max).clamp(0.0, 1.0) } else { 0.0 };
            if source.direction == Direction::Negative {
                frac = 1.0 - frac;
            }
            let shaped = shape(frac, source.curve);
            match source.polarity {
                Polarity::Unipolar => shaped,
                Polarity::Bipolar => 2.0 * shaped - 1.0,
            }
        }
        SourceRange::Centered(max) => {
            let mut frac = if max > 0.0 { (raw / max).clamp(-1.0, 1.0) } else { 0.0 };
            if source.direction == Direction::Negative {
                frac = -frac;
            }
            let sign = frac.signum();
            let shaped = sign * shape(frac.abs(), source.curve);
            match source.polarity {
                Polarity::Bipolar => shaped,
                Polarity::Unipolar => (shaped + 1.0) / 2.0,
            }
        }
    }
}

/// Shape a `[0, 1]` fraction according to a response curve.
fn shape(x: f64, curve: CurveType) -> f64 {
    match curve {
        CurveType::Linear => x,
        CurveType::Concave => concave(x),
        CurveType::Convex => 1.0 - concave(1.0 - x),
        CurveType::Switch => {
            if x < 0.5 {
                0.0
            } else {
                1.0
            }
        }
    }
}

/// `-(20/96) * log10(1 - x^2)`: 0 at x=0, rising slowly at first and
/// diverging to `+inf` as x -> 1, clamped to `[0, 1]`. `log10(0.0)` is
/// `-inf` rather than `NaN`, so the clamp alone handles x=1 with no
/// special case.
fn concave(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    ((-20.0 / 96.0) * (1.0 - x * x).log10()).clamp(0.0, 1.0)
}

/// One source -> destination modulation path: `value = amount *
/// evaluate(source) * evaluate(amount_source)`, optionally rectified.
#[derive(Debug, Clone, Copy)]
pub struct ModulatorDescriptor {
    pub source: ControllerSource,
    pub amount_source: ControllerSource,
    pub amount: i16,
    pub destination: SFGenerator,
    pub transform: TransformOp,
}

impl ModulatorDescriptor {
    /// `NoteOnVelocity -> initialAttenuation`, the default source of
    /// velocity-sensitive loudness every preset gets unless overridden.
    pub const fn default_velocity_to_attenuation() -> Self {
        Self {
            source: ControllerSource::new(
                ControllerDomain::General(GeneralController::NoteOnVelocity),
                Polarity::Unipolar,
                Direction::Negative,
                CurveType::Concave,
            ),
            amount_source: ControllerSource::NONE,
            amount: 960,
            destination: SFGenerator::InitialAttenuation,
            transform: TransformOp::Linear,
        }
    }

    /// `PitchWheel * PitchWheelSensitivity -> pitch`, the default modulator
    /// that lets the MIDI pitch wheel bend every voice.
    pub const fn default_pitch_bend() -> Self {
        Self {
            source: ControllerSource::new(
                ControllerDomain::General(GeneralController::PitchWheel),
                Polarity::Bipolar,
                Direction::Positive,
                CurveType::Linear,
            ),
            amount_source: ControllerSource::new(
                ControllerDomain::General(GeneralController::PitchWheelSensitivity),
                Polarity::Unipolar,
                Direction::Positive,
                CurveType::Linear,
            ),
            amount: 10000,
            destination: SFGenerator::Pitch,
            transform: TransformOp::Linear,
        }
    }

    /// Whether this modulator's source or amount-source reads the given
    /// general controller, so callers can skip recomputation otherwise.
    pub fn reads_sf_controller(&self, controller: GeneralController) -> bool {
        matches(self.source.domain, controller) || matches(self.amount_source.domain, controller)
    }

    /// Whether this modulator's source or amount-source reads the given
    /// MIDI CC number.
    pub fn reads_midi_controller(&self, cc: u8) -> bool {
        self.source.domain == ControllerDomain::Midi(cc) || self.amount_source.domain == ControllerDomain::Midi(cc)
    }
}

fn matches(domain: ControllerDomain, controller: GeneralController) -> bool {
    domain == ControllerDomain::General(controller)
}

/// A bound modulator: a descriptor plus the evaluation entry point.
#[derive(Debug, Clone, Copy)]
pub struct Modulator {
    pub descriptor: ModulatorDescriptor,
}

impl Modulator {
    pub const fn new(descriptor: ModulatorDescriptor) -> Self {
        Self { descriptor }
    }

    /// The modulator's current contribution to its destination generator:
    /// `amount * transform(source) * amount_source`, with the transform
    /// applied to `source` alone before the other two factors multiply in.
    pub fn value(&self, state: &ControllerState) -> f64 {
        let src = evaluate_source(&self.descriptor.source, state);
        let amt_src = evaluate_source(&self.descriptor.amount_source, state);
        let transformed = match self.descriptor.transform {
            TransformOp::Linear => src,
            TransformOp::AbsoluteValue => src.abs(),
        };
        transformed * amt_src * self.descriptor.amount as f64
    }

    pub fn destination(&self) -> SFGenerator {
        self.descriptor.destination
    }
}
