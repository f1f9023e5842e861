use crate::model::config::TokenizerConfig;
use crate::model::quantize::dequantize_velocity;
use crate::model::song::{ChordEvent, NoteEvent, round_beats};
use crate::model::token::{Structural, Token};
use std::iter::Peekable;

/// Chord length used when a chord carries no usable duration token.
pub const DEFAULT_DURATION_BEATS: f64 = 4.0;

/// Velocity used when a pitch token is not followed by a velocity token.
pub const DEFAULT_VELOCITY: u8 = 80;

/// Rebuilds chord events from tokens on an absolute beat timeline.
///
/// Model output is not guaranteed to be grammatical, so nothing here fails:
/// a truncated chord is closed at the end of input, stray tokens are skipped,
/// and chords without notes are dropped without advancing time.
pub fn decode(tokens: &[Token], config: &TokenizerConfig) -> Vec<ChordEvent> {
    decode_stream(tokens.iter().copied().map(Some), config)
}

/// Like [`decode`], for raw token strings. Strings outside the grammar are
/// skipped in place, so they still separate a pitch from a later velocity.
pub fn decode_strs<S: AsRef<str>>(tokens: &[S], config: &TokenizerConfig) -> Vec<ChordEvent> {
    decode_stream(tokens.iter().map(|s| Token::parse(s.as_ref())), config)
}

fn decode_stream<I>(stream: I, config: &TokenizerConfig) -> Vec<ChordEvent>
where
    I: Iterator<Item = Option<Token>>,
{
    let beats_per_bar = config.beats_per_bar as f64;
    let mut stream = stream.peekable();
    let mut chords: Vec<ChordEvent> = Vec::new();
    let mut current_beat = 0.0f64;

    while let Some(token) = stream.next() {
        match token {
            Some(Token::Structural(Structural::Bar)) => {
                current_beat = ((current_beat / beats_per_bar).floor() + 1.0) * beats_per_bar;
            }
            Some(Token::Structural(Structural::ChordStart)) => {
                if let Some(chord) = read_chord(&mut stream, current_beat, config) {
                    current_beat += chord.duration_beats;
                    chords.push(chord);
                }
            }
            _ => {}
        }
    }

    chords
}

/// Consumes tokens up to and including `CHORD_END`, or to the end of input.
fn read_chord<I>(
    stream: &mut Peekable<I>,
    onset_beats: f64,
    config: &TokenizerConfig,
) -> Option<ChordEvent>
where
    I: Iterator<Item = Option<Token>>,
{
    let mut duration = DEFAULT_DURATION_BEATS;
    let mut notes: Vec<NoteEvent> = Vec::new();

    while let Some(token) = stream.next() {
        match token {
            Some(Token::Structural(Structural::ChordEnd)) => break,
            // a zero or negative length would move the timeline backwards
            Some(Token::Duration(beats)) if beats.is_finite() && beats > 0.0 => duration = beats,
            Some(Token::Pitch(step)) => {
                let velocity = match stream.peek().copied() {
                    Some(Some(Token::Velocity(bin))) => {
                        stream.next();
                        dequantize_velocity(bin, config.num_vel_bins)
                    }
                    _ => DEFAULT_VELOCITY,
                };
                notes.push(NoteEvent::new(step as i32, velocity));
            }
            _ => {}
        }
    }

    if notes.is_empty() {
        return None;
    }

    Some(ChordEvent::new(round_beats(onset_beats), duration, notes))
}
