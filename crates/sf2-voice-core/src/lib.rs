//! # sf2-voice-core
//!
//! Core per-voice DSP and modulation kernel for SoundFont 2 playback.
//!
//! This crate owns one thing: turning a single SoundFont sample, its
//! generator values, and its modulators into a stream of stereo frames.
//! It has no external dependencies, so it can be embedded in a realtime
//! audio thread, a batch offline renderer, or a WebAssembly build without
//! pulling in logging, allocation policies, or I/O it doesn't need.
//!
//! ## Main Types
//!
//! - [`Voice`] - the per-note playback and modulation kernel
//! - [`Sample`] - waveform metadata and loop points for one playable sample
//! - [`GeneratorSet`] - the dense `destination -> int16` generator table
//! - [`Modulator`] - one controller-driven modulation path
//! - [`Envelope`] - the DAHDSR envelope generator
//! - [`Lfo`] - the triangle low frequency oscillator
//! - [`VoiceConfigError`] - errors raised while constructing a voice
//!
//! ## Non-goals
//!
//! This crate does not parse SoundFont bank files, decode MIDI messages,
//! or talk to an audio device; it starts from already-resolved generator
//! and modulator values and produces floating-point frames.

pub mod envelope;
pub mod error;
pub mod fixed_point;
pub mod generator;
pub mod lfo;
pub mod modulator;
pub mod sample;
pub mod stereo;
pub mod tables;
pub mod voice;

pub use envelope::{Envelope, EnvelopeParameters, EnvelopeStage};
pub use error::{VoiceConfigError, VoiceResult};
pub use fixed_point::FixedPoint;
pub use generator::{GeneratorSet, SFGenerator, N_GENERATORS};
pub use lfo::Lfo;
pub use modulator::{
    ControllerDomain, ControllerSource, ControllerState, CurveType, Direction, GeneralController, Modulator,
    ModulatorDescriptor, Polarity, TransformOp,
};
pub use sample::{LoopMode, Sample};
pub use stereo::StereoValue;
pub use tables::{absolute_cent_to_hz, centibel_to_ratio, join_bytes, key_to_hz, timecent_to_second};
pub use voice::Voice;
