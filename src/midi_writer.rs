use crate::error::{Error, Result};
use crate::model::config::WriteOptions;
use crate::model::pitch::from_step53;
use crate::model::song::ChordEvent;
use log::debug;
use midly::num::{u4, u7, u15, u24, u28};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, Track, TrackEvent,
    TrackEventKind,
};
use std::fs;
use std::path::Path;

/// First and last MPE member channels. Channel 0 stays free for global messages.
const FIRST_NOTE_CHANNEL: u8 = 1;
const LAST_NOTE_CHANNEL: u8 = 15;

const CC_RPN_MSB: u8 = 101;
const CC_RPN_LSB: u8 = 100;
const CC_DATA_ENTRY_MSB: u8 = 6;
const CC_DATA_ENTRY_LSB: u8 = 38;
const RPN_NULL: u8 = 127;
const BEND_RANGE_SEMITONES: u8 = 2;

const MAX_DELTA: u32 = (1 << 28) - 1;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// Ordering of simultaneous messages: bends land before the notes they tune,
/// releases before new attacks.
const PRIORITY_PITCH_BEND: u8 = 0;
const PRIORITY_NOTE_OFF: u8 = 1;
const PRIORITY_NOTE_ON: u8 = 2;

/// Round robin over the MPE member channels, carried across chords.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelAllocator {
    counter: usize,
}

impl ChannelAllocator {
    pub fn next_channel(&mut self) -> u8 {
        let span = (LAST_NOTE_CHANNEL - FIRST_NOTE_CHANNEL + 1) as usize;
        let channel = FIRST_NOTE_CHANNEL + (self.counter % span) as u8;
        self.counter = self.counter.wrapping_add(1);
        channel
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledMessage {
    tick: u64,
    priority: u8,
    channel: u8,
    message: MidiMessage,
}

pub fn write_midi_file<P: AsRef<Path>>(
    chords: &[ChordEvent],
    path: P,
    options: &WriteOptions,
) -> Result<()> {
    let bytes = chords_to_midi_bytes(chords, options)?;

    if let Some(parent) = path.as_ref().parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    fs::write(path.as_ref(), bytes).map_err(|e| Error::io(path.as_ref(), e))
}

pub fn chords_to_midi_bytes(chords: &[ChordEvent], options: &WriteOptions) -> Result<Vec<u8>> {
    let smf = chords_to_smf(chords, options);
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).map_err(Error::MidiWrite)?;
    Ok(bytes)
}

/// Renders chord events as a two track SMF: tempo and bend range setup first,
/// then every note on one merged track.
pub fn chords_to_smf(chords: &[ChordEvent], options: &WriteOptions) -> Smf<'static> {
    let ticks_per_beat = options.ticks_per_beat.clamp(1, 0x7FFF);

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_beat)),
    ));
    smf.tracks.push(setup_track(options.tempo_bpm));
    smf.tracks
        .push(note_track(&schedule_notes(chords, ticks_per_beat as f64)));

    smf
}

fn setup_track(tempo_bpm: f64) -> Track<'static> {
    let tempo_bpm = if tempo_bpm.is_finite() && tempo_bpm > 0.0 {
        tempo_bpm
    } else {
        120.0
    };
    let micros_per_beat = (MICROSECONDS_PER_MINUTE / tempo_bpm).round().clamp(1.0, 16_777_215.0);

    let mut track: Track<'static> = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_beat as u32))),
    }];

    for channel in FIRST_NOTE_CHANNEL..=LAST_NOTE_CHANNEL {
        let rpn = [
            (CC_RPN_MSB, 0),
            (CC_RPN_LSB, 0),
            (CC_DATA_ENTRY_MSB, BEND_RANGE_SEMITONES),
            (CC_DATA_ENTRY_LSB, 0),
            (CC_RPN_MSB, RPN_NULL),
            (CC_RPN_LSB, RPN_NULL),
        ];
        for (controller, value) in rpn {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(channel),
                    message: MidiMessage::Controller {
                        controller: u7::new(controller),
                        value: u7::new(value),
                    },
                },
            });
        }
    }

    track.push(end_of_track(0));
    track
}

fn schedule_notes(chords: &[ChordEvent], ticks_per_beat: f64) -> Vec<ScheduledMessage> {
    let mut channels = ChannelAllocator::default();
    let mut scheduled: Vec<ScheduledMessage> = Vec::new();

    for chord in chords {
        let onset_ticks = beats_to_ticks(chord.onset_beats, ticks_per_beat);
        let offset_ticks = beats_to_ticks(chord.offset_beats(), ticks_per_beat).max(onset_ticks);

        for note in chord.notes.iter() {
            let channel = channels.next_channel();
            let (midi_note, bend) = from_step53(note.step_53);
            let key = u7::new(midi_note.min(127));
            let vel = u7::new(note.velocity.clamp(1, 127));

            scheduled.push(ScheduledMessage {
                tick: onset_ticks,
                priority: PRIORITY_PITCH_BEND,
                channel,
                message: MidiMessage::PitchBend {
                    bend: PitchBend::from_int(bend),
                },
            });
            scheduled.push(ScheduledMessage {
                tick: onset_ticks,
                priority: PRIORITY_NOTE_ON,
                channel,
                message: MidiMessage::NoteOn { key, vel },
            });
            scheduled.push(ScheduledMessage {
                tick: offset_ticks,
                priority: PRIORITY_NOTE_OFF,
                channel,
                message: MidiMessage::NoteOff { key, vel },
            });
        }
    }

    // stable, so equal keys keep chord and note order
    scheduled.sort_by_key(|m| (m.tick, m.priority));

    debug!(
        "Scheduled {} messages for {} chords",
        scheduled.len(),
        chords.len()
    );

    scheduled
}

fn note_track(scheduled: &[ScheduledMessage]) -> Track<'static> {
    let mut track: Track<'static> = Vec::with_capacity(scheduled.len() + 1);
    let mut last_tick: u64 = 0;

    for msg in scheduled {
        let delta = (msg.tick - last_tick).min(MAX_DELTA as u64) as u32;
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(msg.channel),
                message: msg.message,
            },
        });
        last_tick = msg.tick;
    }

    track.push(end_of_track(0));
    track
}

fn end_of_track(delta: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// Truncates toward zero; negative or non-finite positions land on tick 0.
fn beats_to_ticks(beats: f64, ticks_per_beat: f64) -> u64 {
    let ticks = beats * ticks_per_beat;
    if ticks.is_finite() && ticks > 0.0 {
        ticks as u64
    } else {
        0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::midi_importer::midi_bytes_to_chords;
    use crate::model::song::NoteEvent;

    fn midi_events(track: &Track) -> Vec<(u32, u8, MidiMessage)> {
        track
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi { channel, message } => {
                    Some((e.delta.as_int(), channel.as_int(), message))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn channels_cycle_through_fifteen() {
        let mut alloc = ChannelAllocator::default();
        let channels: Vec<u8> = (0..17).map(|_| alloc.next_channel()).collect();
        assert_eq!(channels[0], 1);
        assert_eq!(channels[14], 15);
        assert_eq!(channels[15], 1);
        assert_eq!(channels[16], 2);
    }

    #[test]
    fn setup_track_sets_bend_range_once() {
        let smf = chords_to_smf(&[], &WriteOptions::default());
        assert_eq!(smf.tracks.len(), 2);

        let setup = midi_events(&smf.tracks[0]);
        assert_eq!(setup.len(), 15 * 6);
        assert!(setup.iter().all(|(delta, channel, _)| *delta == 0 && *channel != 0));

        let first_channel: Vec<(u8, u8)> = setup
            .iter()
            .filter(|(_, channel, _)| *channel == 1)
            .filter_map(|(_, _, message)| match message {
                MidiMessage::Controller { controller, value } => {
                    Some((controller.as_int(), value.as_int()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            first_channel,
            vec![(101, 0), (100, 0), (6, 2), (38, 0), (101, 127), (100, 127)]
        );

        assert!(matches!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000
        ));
        assert!(midi_events(&smf.tracks[1]).is_empty());
    }

    #[test]
    fn message_order_and_deltas() {
        let chords = vec![
            ChordEvent::new(0.0, 1.0, vec![NoteEvent::new(265, 64), NoteEvent::new(269, 64)]),
            ChordEvent::new(1.0, 0.5, vec![NoteEvent::new(274, 100)]),
        ];
        let smf = chords_to_smf(&chords, &WriteOptions::default());
        let events = midi_events(&smf.tracks[1]);

        let kinds: Vec<(u32, u8, &str)> = events
            .iter()
            .map(|(delta, channel, message)| {
                let kind = match message {
                    MidiMessage::PitchBend { .. } => "bend",
                    MidiMessage::NoteOn { .. } => "on",
                    MidiMessage::NoteOff { .. } => "off",
                    _ => "other",
                };
                (*delta, *channel, kind)
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                (0, 1, "bend"),
                (0, 2, "bend"),
                (0, 1, "on"),
                (0, 2, "on"),
                (960, 3, "bend"),
                (0, 1, "off"),
                (0, 2, "off"),
                (0, 3, "on"),
                (480, 3, "off"),
            ]
        );
    }

    #[test]
    fn bends_carry_microtones() {
        let chords = vec![ChordEvent::new(0.0, 1.0, vec![NoteEvent::new(269, 90)])];
        let smf = chords_to_smf(&chords, &WriteOptions::default());
        let events = midi_events(&smf.tracks[1]);

        let (midi_note, bend) = from_step53(269);
        assert_eq!(midi_note, 61);
        assert!(matches!(
            events[0].2,
            MidiMessage::PitchBend { bend: b } if b.as_int() == bend
        ));
        assert!(matches!(
            events[1].2,
            MidiMessage::NoteOn { key, vel } if key.as_int() == 61 && vel.as_int() == 90
        ));
    }

    #[test]
    fn written_file_reimports() {
        let chords = vec![
            ChordEvent::new(0.0, 2.0, vec![NoteEvent::new(212, 64), NoteEvent::new(243, 95)]),
            ChordEvent::new(2.0, 1.0, vec![NoteEvent::new(150, 32), NoteEvent::new(160, 32)]),
        ];
        let bytes = chords_to_midi_bytes(&chords, &WriteOptions::default()).unwrap();
        let reimported = midi_bytes_to_chords(&bytes, 1.0).unwrap();

        assert_eq!(reimported.len(), 2);
        for (original, back) in chords.iter().zip(reimported.iter()) {
            assert_eq!(back.onset_beats, original.onset_beats);
            assert_eq!(back.duration_beats, original.duration_beats);
            for (a, b) in original.pitch_set().iter().zip(back.pitch_set().iter()) {
                assert!((a - b).abs() <= 1);
            }
        }
    }

    #[test]
    fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.mid");
        let chords = vec![ChordEvent::new(0.0, 1.0, vec![NoteEvent::new(200, 64)])];

        write_midi_file(&chords, &path, &WriteOptions::default()).unwrap();
        assert!(path.exists());
    }
}
