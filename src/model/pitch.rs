//! Conversions between MIDI note + pitch bend pairs and absolute 53-TET steps.
//!
//! Bends assume the ±2 semitone (±200 cent) range configured over RPN 0.

/// Absolute microtonal pitch, 53 steps per octave counted from MIDI note 0.
pub type Step53 = i32;

pub const TET_53: f64 = 53.0;
pub const PB_RANGE_CENTS: f64 = 200.0;
pub const PB_MAX: i16 = 8191;
pub const PB_MIN: i16 = -8192;

/// Highest step the default vocabulary tokenizes (10 octaves).
pub const MAX_53TET_STEP: u16 = 530;

const CENTS_PER_OCTAVE: f64 = 1200.0;

pub fn to_step53(midi_note: u8, pitch_bend: i16) -> Step53 {
    let cents = pitch_bend as f64 / PB_MAX as f64 * PB_RANGE_CENTS;
    let base_step = midi_note as f64 * TET_53 / 12.0;
    let deviation_steps = cents * TET_53 / CENTS_PER_OCTAVE;

    (base_step + deviation_steps).round_ties_even() as Step53
}

/// Nearest 12-TET note plus the bend carrying the residual.
///
/// Not an exact inverse of [`to_step53`]: both directions round, and steps
/// beyond the MIDI note range saturate the bend. Re-deriving the step from the
/// returned pair lands within one step of the input for every pair that
/// [`to_step53`] can produce.
pub fn from_step53(step: Step53) -> (u8, i16) {
    let nearest = (step as f64 * 12.0 / TET_53).round_ties_even();
    let midi_note = nearest.clamp(0.0, 127.0) as u8;

    let residual_steps = step as f64 - midi_note as f64 * TET_53 / 12.0;
    let residual_cents = residual_steps * CENTS_PER_OCTAVE / TET_53;
    let bend = (residual_cents / PB_RANGE_CENTS * PB_MAX as f64).round_ties_even();

    (midi_note, bend.clamp(PB_MIN as f64, PB_MAX as f64) as i16)
}

/// Clamps a step into `[0, max_pitch]`.
pub fn clamp_step(step: Step53, max_pitch: u16) -> u16 {
    step.clamp(0, max_pitch as Step53) as u16
}
