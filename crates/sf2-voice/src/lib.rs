//! # sf2-voice
//!
//! Convenience layer around [`sf2_voice_core`]: ergonomic builders for
//! generator and modulator sets, and `log`-based diagnostics around
//! voice construction failures.
//!
//! `sf2-voice-core` itself stays dependency-free so it can run on a
//! realtime audio thread without pulling in a logging backend; this
//! crate is where that tradeoff is made the other way, for the
//! non-realtime code (bank loading, voice allocation) that decides
//! whether a note can be played at all.

use std::sync::Arc;

use sf2_voice_core::{
    GeneratorSet, LoopMode, Modulator, SFGenerator, Sample, Voice, VoiceConfigError, VoiceResult,
};

/// A [`GeneratorSet`] under construction, with chained setters in place
/// of sixty individual field assignments.
#[derive(Debug, Clone, Default)]
pub struct GeneratorSetBuilder {
    generators: GeneratorSet,
}

impl GeneratorSetBuilder {
    pub fn new() -> Self {
        Self { generators: GeneratorSet::new() }
    }

    /// Set one generator's raw value and keep building.
    pub fn with(mut self, gen: SFGenerator, value: i16) -> Self {
        self.generators.set(gen, value);
        self
    }

    pub fn build(self) -> GeneratorSet {
        self.generators
    }
}

/// Everything needed to start a note, gathered from a bank's preset and
/// instrument zones by the (out-of-scope) loader.
pub struct VoiceSpec {
    pub data: Arc<[i16]>,
    pub start: u32,
    pub end: u32,
    pub start_loop: u32,
    pub end_loop: u32,
    pub sample_rate: u32,
    pub original_key: u8,
    pub correction_cents: i32,
    pub loop_mode: LoopMode,
    pub generators: GeneratorSet,
    pub modulators: Vec<Modulator>,
}

/// Build a [`Voice`] from a [`VoiceSpec`], logging the reason a request
/// was rejected before returning the error to the caller.
///
/// Construction failures (bad loop points, a truncated sample buffer) are
/// expected to happen occasionally with malformed or hand-edited banks;
/// logging here means the caller doesn't need its own copy of this
/// diagnostic message at every call site.
pub fn try_build_voice(spec: VoiceSpec, output_sample_rate: f64, key: u8, velocity: u8, channel: u8) -> VoiceResult<Voice> {
    // Bank-provided addresses are adjusted by the zone's fine/coarse offset
    // generator pairs before anything downstream ever sees them.
    let start = Sample::resolve_address(
        spec.start,
        spec.generators.get(SFGenerator::StartAddrsOffset),
        spec.generators.get(SFGenerator::StartAddrsCoarseOffset),
    );
    let end = Sample::resolve_address(
        spec.end,
        spec.generators.get(SFGenerator::EndAddrsOffset),
        spec.generators.get(SFGenerator::EndAddrsCoarseOffset),
    );
    let start_loop = Sample::resolve_address(
        spec.start_loop,
        spec.generators.get(SFGenerator::StartloopAddrsOffset),
        spec.generators.get(SFGenerator::StartloopAddrsCoarseOffset),
    );
    let end_loop = Sample::resolve_address(
        spec.end_loop,
        spec.generators.get(SFGenerator::EndloopAddrsOffset),
        spec.generators.get(SFGenerator::EndloopAddrsCoarseOffset),
    );

    let sample = Sample::try_new(
        spec.data,
        start,
        end,
        start_loop,
        end_loop,
        spec.sample_rate,
        spec.original_key,
        spec.correction_cents,
        spec.loop_mode,
    )
    .inspect_err(|err| log::warn!("rejecting voice for key {key}: {err}"))?;

    Voice::try_new(sample, spec.generators, spec.modulators, output_sample_rate, key, velocity, channel).inspect_err(
        |err| log::warn!("voice construction failed for key {key}: {err}"),
    )
}

/// Convenience wrapper reporting the most common rejection reasons with
/// a bit more context than [`VoiceConfigError`]'s `Display` alone.
pub fn describe_rejection(err: &VoiceConfigError) -> String {
    match err {
        VoiceConfigError::InvalidLoopPoints { .. } => {
            format!("{err} -- check the instrument zone's loop generators against the sample header")
        }
        VoiceConfigError::SampleBufferTooSmall { .. } => {
            format!("{err} -- the sample data may have been truncated when the bank was loaded")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(len: usize) -> VoiceSpec {
        VoiceSpec {
            data: Arc::from((0..len as i16).collect::<Vec<_>>()),
            start: 0,
            end: len as u32,
            start_loop: 0,
            end_loop: 0,
            sample_rate: 44100,
            original_key: 60,
            correction_cents: 0,
            loop_mode: LoopMode::Unlooped,
            generators: GeneratorSetBuilder::new().with(SFGenerator::Pan, 0).build(),
            modulators: Vec::new(),
        }
    }

    #[test]
    fn builds_a_valid_voice() {
        let voice = try_build_voice(spec(1000), 44100.0, 60, 100, 0).unwrap();
        assert_eq!(voice.key(), 60);
    }

    #[test]
    fn rejects_truncated_sample_with_context() {
        let mut bad = spec(10);
        bad.end = 20;
        let err = try_build_voice(bad, 44100.0, 60, 100, 0).unwrap_err();
        assert!(describe_rejection(&err).contains("truncated"));
    }

    #[test]
    fn end_addrs_offset_generator_shrinks_the_playable_range() {
        // end=1000 with a fine offset of -100 should land the resolved
        // end at 900, well inside the 1000-frame buffer either way, but
        // a coarse offset that pushed it past the buffer must still
        // surface as a rejection.
        let mut with_offset = spec(1000);
        with_offset.generators.set(SFGenerator::EndAddrsOffset, -100);
        let voice = try_build_voice(with_offset, 44100.0, 60, 100, 0).unwrap();
        assert!(voice.is_sounding());

        let mut overshoots = spec(1000);
        overshoots.generators.set(SFGenerator::EndAddrsCoarseOffset, 1);
        let err = try_build_voice(overshoots, 44100.0, 60, 100, 0).unwrap_err();
        assert!(matches!(err, VoiceConfigError::SampleBufferTooSmall { .. }));
    }

    #[test]
    fn generator_set_builder_chains() {
        let generators = GeneratorSetBuilder::new().with(SFGenerator::Pan, 100).with(SFGenerator::CoarseTune, -2).build();
        assert_eq!(generators.get(SFGenerator::Pan), 100);
        assert_eq!(generators.get(SFGenerator::CoarseTune), -2);
    }
}
