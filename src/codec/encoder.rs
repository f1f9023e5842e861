use crate::model::config::TokenizerConfig;
use crate::model::pitch::clamp_step;
use crate::model::quantize::{quantize_duration, quantize_velocity};
use crate::model::song::{ChordEvent, NoteEvent};
use crate::model::token::Token;
use log::debug;

/// Notes beyond this count (by ascending pitch) are dropped from a chord.
pub const MAX_CHORD_NOTES: usize = 8;

/// Flattens chord events into tokens:
/// `<start>? (BAR | CHORD_START DUR_d (P_s V_b)* CHORD_END)* <end>?`
///
/// An empty chord list encodes to an empty sequence, boundary tokens included.
pub fn encode(chords: &[ChordEvent], config: &TokenizerConfig, add_boundary: bool) -> Vec<Token> {
    if chords.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<&ChordEvent> = chords.iter().collect();
    ordered.sort_by(|a, b| a.onset_beats.total_cmp(&b.onset_beats));

    let beats_per_bar = config.beats_per_bar as f64;
    let mut tokens: Vec<Token> = Vec::new();

    if add_boundary {
        tokens.push(Token::START);
    }

    let mut last_bar: i64 = -1;
    for chord in ordered {
        let current_bar = (chord.onset_beats / beats_per_bar).floor() as i64;
        if current_bar > last_bar {
            // the first chord opens the sequence without a BAR
            if last_bar >= 0 {
                for _ in last_bar..current_bar {
                    tokens.push(Token::BAR);
                }
            }
            last_bar = current_bar;
        }

        encode_chord(chord, config, &mut tokens);
    }

    if add_boundary {
        tokens.push(Token::END);
    }

    tokens
}

fn encode_chord(chord: &ChordEvent, config: &TokenizerConfig, tokens: &mut Vec<Token>) {
    tokens.push(Token::CHORD_START);
    tokens.push(Token::Duration(quantize_duration(
        chord.duration_beats,
        &config.duration_grid,
    )));

    let mut notes: Vec<&NoteEvent> = chord.notes.iter().collect();
    notes.sort_by_key(|n| n.step_53);
    if notes.len() > MAX_CHORD_NOTES {
        debug!(
            "Chord at beat {} has {} notes, keeping the lowest {}",
            chord.onset_beats,
            notes.len(),
            MAX_CHORD_NOTES
        );
        notes.truncate(MAX_CHORD_NOTES);
    }

    for note in notes {
        tokens.push(Token::Pitch(clamp_step(note.step_53, config.max_pitch)));
        tokens.push(Token::Velocity(quantize_velocity(
            note.velocity,
            config.num_vel_bins,
        )));
    }

    tokens.push(Token::CHORD_END);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::song::NoteEvent;
    use pretty_assertions::assert_eq;

    fn chord(onset: f64, duration: f64, steps: &[i32]) -> ChordEvent {
        ChordEvent::new(
            onset,
            duration,
            steps.iter().map(|&s| NoteEvent::new(s, 64)).collect(),
        )
    }

    fn render(tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn four_note_chord() {
        let chords = vec![ChordEvent::new(
            0.0,
            1.0,
            vec![
                NoteEvent::new(130, 60),
                NoteEvent::new(160, 70),
                NoteEvent::new(182, 80),
                NoteEvent::new(201, 90),
            ],
        )];

        let tokens = encode(&chords, &TokenizerConfig::default(), false);
        assert_eq!(
            render(&tokens),
            "CHORD_START DUR_1.0 P_130 V_4 P_160 V_5 P_182 V_6 P_201 V_6 CHORD_END"
        );
    }

    #[test]
    fn boundaries_wrap_sequence() {
        let tokens = encode(&[chord(0.0, 4.0, &[200])], &TokenizerConfig::default(), true);
        assert_eq!(tokens.first(), Some(&Token::START));
        assert_eq!(tokens.last(), Some(&Token::END));
    }

    #[test]
    fn one_bar_between_adjacent_bars() {
        let tokens = encode(
            &[chord(0.0, 4.0, &[200]), chord(4.0, 4.0, &[210])],
            &TokenizerConfig::default(),
            false,
        );
        assert_eq!(tokens.iter().filter(|t| **t == Token::BAR).count(), 1);
        let bar = tokens.iter().position(|t| *t == Token::BAR).unwrap();
        assert_eq!(tokens[bar - 1], Token::CHORD_END);
        assert_eq!(tokens[bar + 1], Token::CHORD_START);
    }

    #[test]
    fn skipped_bars_each_get_a_marker() {
        let tokens = encode(
            &[chord(1.0, 1.0, &[200]), chord(13.0, 1.0, &[210])],
            &TokenizerConfig::default(),
            false,
        );
        assert_eq!(tokens.iter().filter(|t| **t == Token::BAR).count(), 3);
    }

    #[test]
    fn no_leading_bar_for_late_first_chord() {
        let tokens = encode(&[chord(9.0, 1.0, &[200])], &TokenizerConfig::default(), false);
        assert_eq!(tokens[0], Token::CHORD_START);
        assert!(!tokens.contains(&Token::BAR));
    }

    #[test]
    fn same_bar_chords_share_it() {
        let tokens = encode(
            &[chord(0.0, 1.0, &[200]), chord(1.0, 1.0, &[201]), chord(3.5, 0.5, &[202])],
            &TokenizerConfig::default(),
            false,
        );
        assert!(!tokens.contains(&Token::BAR));
    }

    #[test]
    fn empty_input_empty_output() {
        assert!(encode(&[], &TokenizerConfig::default(), true).is_empty());
        assert!(encode(&[], &TokenizerConfig::default(), false).is_empty());
    }

    #[test]
    fn ten_notes_keep_lowest_eight() {
        let steps: Vec<i32> = (0..10).rev().map(|i| 150 + i * 10).collect();
        let tokens = encode(&[chord(0.0, 1.0, &steps)], &TokenizerConfig::default(), false);

        let pitches: Vec<u16> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Pitch(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(pitches, vec![150, 160, 170, 180, 190, 200, 210, 220]);
    }

    #[test]
    fn out_of_range_pitch_clamped() {
        let tokens = encode(&[chord(0.0, 1.0, &[-5, 700])], &TokenizerConfig::default(), false);
        assert!(tokens.contains(&Token::Pitch(0)));
        assert!(tokens.contains(&Token::Pitch(530)));
    }

    #[test]
    fn durations_are_quantized() {
        let tokens = encode(&[chord(0.0, 2.6, &[200])], &TokenizerConfig::default(), false);
        assert_eq!(tokens[1], Token::Duration(2.67));
    }

    #[test]
    fn unsorted_input_is_ordered_by_onset() {
        let tokens = encode(
            &[chord(4.0, 1.0, &[210]), chord(0.0, 1.0, &[200])],
            &TokenizerConfig::default(),
            false,
        );
        assert_eq!(tokens[2], Token::Pitch(200));
        assert_eq!(tokens.iter().filter(|t| **t == Token::BAR).count(), 1);
    }
}
