//! Cached exponential conversion maps shared by every voice.
//!
//! These are process-wide, written once, and read-only afterwards — any
//! thread may call them without synchronization once the first call has
//! paid the one-time build cost (`std::sync::OnceLock`).

use std::sync::OnceLock;

const CENTIBEL_TABLE_LEN: usize = 1442;
const CENT_TABLE_LEN: usize = 1200;

/// Amplitude ratio for a centibel attenuation value.
///
/// `cb <= 0` returns `1.0` (no attenuation); `cb >= 1441` returns `0.0`
/// (silence). Otherwise `10^(floor(cb) / -200)`.
///
/// Note the divisor of `-200` rather than the SoundFont spec's `-100` —
/// this is an intentional, documented compatibility compromise with the
/// bank files this engine targets, carried over unchanged from the
/// reference implementation. Do not "fix" this to `-100`.
pub fn centibel_to_ratio(cb: f64) -> f64 {
    if cb <= 0.0 {
        return 1.0;
    }
    if cb >= (CENTIBEL_TABLE_LEN - 1) as f64 {
        return 0.0;
    }
    static TABLE: OnceLock<[f64; CENTIBEL_TABLE_LEN]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = [0.0_f64; CENTIBEL_TABLE_LEN];
        for (i, slot) in t.iter_mut().enumerate() {
            *slot = 10f64.powf(i as f64 / -200.0);
        }
        t
    });
    table[cb as usize]
}

/// Frequency in Hz for a (possibly fractional) MIDI key number.
///
/// `key < 0` returns `1.0` (used as a sentinel by callers that clamp
/// negative pitches to silence rather than branch on it). Otherwise this
/// is standard 12-tone equal temperament referenced to A4 = 440 Hz at
/// key 69, backed by a 1200-entry per-cent ratio table so the per-voice
/// hot path only does a table lookup plus one `powi` for the octave.
pub fn key_to_hz(key: f64) -> f64 {
    if key < 0.0 {
        return 1.0;
    }
    static TABLE: OnceLock<[f64; CENT_TABLE_LEN]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = [0.0_f64; CENT_TABLE_LEN];
        for (i, slot) in t.iter_mut().enumerate() {
            *slot = 2f64.powf(i as f64 / CENT_TABLE_LEN as f64);
        }
        t
    });

    let cents_from_a4 = key * 100.0 - 6900.0;
    let octave = (cents_from_a4 / CENT_TABLE_LEN as f64).floor();
    let mut idx = (cents_from_a4 - octave * CENT_TABLE_LEN as f64).round() as i64;
    idx = idx.clamp(0, CENT_TABLE_LEN as i64 - 1);
    440.0 * table[idx as usize] * 2f64.powi(octave as i32)
}

/// Seconds for a timecent duration: `2^(tc/1200)`.
pub fn timecent_to_second(tc: f64) -> f64 {
    2f64.powf(tc / 1200.0)
}

/// Frequency in Hz for an absolute-cent value: `8.176 * 2^(ac/1200)`.
pub fn absolute_cent_to_hz(ac: f64) -> f64 {
    8.176 * 2f64.powf(ac / 1200.0)
}

/// Combine a 14-bit MIDI value from its most- and least-significant 7-bit
/// bytes: `(msb << 7) | lsb`.
pub fn join_bytes(msb: u8, lsb: u8) -> u16 {
    ((msb as u16) << 7) | lsb as u16
}
