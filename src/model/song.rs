use crate::model::pitch::Step53;
use serde::{Deserialize, Serialize};

/// Smallest chord length produced by the grouper, in beats.
pub const MIN_CHORD_BEATS: f64 = 0.25;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub step_53: Step53,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn new(step_53: Step53, velocity: u8) -> Self {
        Self { step_53, velocity }
    }
}

/// A cluster of near-simultaneous notes, ordered by ascending pitch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChordEvent {
    pub onset_beats: f64,
    pub duration_beats: f64,
    pub notes: Vec<NoteEvent>,
}

impl ChordEvent {
    /// Builds a chord, stable-sorting the notes by pitch so ties keep insertion order.
    pub fn new(onset_beats: f64, duration_beats: f64, mut notes: Vec<NoteEvent>) -> Self {
        notes.sort_by_key(|note| note.step_53);
        Self {
            onset_beats,
            duration_beats,
            notes,
        }
    }

    pub fn offset_beats(&self) -> f64 {
        self.onset_beats + self.duration_beats
    }

    /// Sorted pitch content, used when comparing reconstructions.
    pub fn pitch_set(&self) -> Vec<Step53> {
        let mut pitches: Vec<Step53> = self.notes.iter().map(|n| n.step_53).collect();
        pitches.sort_unstable();
        pitches
    }
}

/// Rounds to 4 decimal places, the resolution chord timings are stored at.
pub(crate) fn round_beats(beats: f64) -> f64 {
    (beats * 10_000.0).round_ties_even() / 10_000.0
}
