use crate::error::{Error, Result};
use crate::model::pitch::{Step53, to_step53};
use crate::model::song::{ChordEvent, MIN_CHORD_BEATS, NoteEvent, round_beats};
use log::{debug, warn};
use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const MIDI_CHANNELS: usize = 16;

/// The subset of a MIDI stream the grouper cares about, with absolute ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpeMessage {
    PitchBend { tick: u64, channel: u8, bend: i16 },
    NoteOn { tick: u64, channel: u8, key: u8, velocity: u8 },
    NoteOff { tick: u64, channel: u8, key: u8 },
}

/// A note with both ends known, ready for clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteRecord {
    pub onset_ticks: u64,
    pub offset_ticks: u64,
    pub step_53: Step53,
    pub velocity: u8,
}

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    onset_ticks: u64,
    step_53: Step53,
    velocity: u8,
}

/// Latest pitch bend seen on each channel, threaded through a single scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelBendTable {
    bends: [i16; MIDI_CHANNELS],
}

impl ChannelBendTable {
    pub fn get(&self, channel: u8) -> i16 {
        self.bends
            .get(channel as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&mut self, channel: u8, bend: i16) {
        if let Some(slot) = self.bends.get_mut(channel as usize) {
            *slot = bend;
        }
    }
}

pub fn import_midi_file<P: AsRef<Path>>(path: P, speed: f64) -> Result<Vec<ChordEvent>> {
    let bytes = fs::read(path.as_ref()).map_err(|e| Error::io(path.as_ref(), e))?;
    midi_bytes_to_chords(&bytes, speed)
}

/// Parses an MPE MIDI file into chord events. A file without any complete
/// notes yields an empty list rather than an error.
pub fn midi_bytes_to_chords(bytes: &[u8], speed: f64) -> Result<Vec<ChordEvent>> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(Error::InvalidSpeed(speed));
    }

    let smf = Smf::parse(bytes).map_err(|e| Error::MidiParse(e.to_string()))?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(fps, subframe) => {
            return Err(Error::UnsupportedTiming(format!(
                "SMPTE timecode ({:?}, {} subframes) is not supported",
                fps, subframe
            )));
        }
    };

    if ticks_per_beat == 0 {
        return Err(Error::UnsupportedTiming("zero ticks per beat".into()));
    }

    debug!("Ticks per beat: {}", ticks_per_beat);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let records = finalize_notes(smf_messages(&smf));
    Ok(group_chords(records, ticks_per_beat, speed))
}

/// Flattens every track into the message stream, track by track, in file order.
fn smf_messages(smf: &Smf) -> Vec<MpeMessage> {
    let mut messages = Vec::new();

    for track in smf.tracks.iter() {
        let mut abs_tick: u64 = 0;
        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            let TrackEventKind::Midi { channel, message } = &event.kind else {
                continue;
            };
            let channel = channel.as_int();

            match message {
                MidiMessage::PitchBend { bend } => messages.push(MpeMessage::PitchBend {
                    tick: abs_tick,
                    channel,
                    bend: bend.0.as_int() as i16 - 8192,
                }),
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    messages.push(MpeMessage::NoteOn {
                        tick: abs_tick,
                        channel,
                        key: key.as_int(),
                        velocity: vel.as_int(),
                    })
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    messages.push(MpeMessage::NoteOff {
                        tick: abs_tick,
                        channel,
                        key: key.as_int(),
                    })
                }
                _ => {}
            }
        }
    }

    messages
}

/// Pairs note-ons with their note-offs, resolving each note's 53-TET step
/// from its channel's bend at the moment it starts.
///
/// Orphaned note-offs are dropped, as are notes still sounding at the end of
/// the stream. A repeated note-on for a sounding key replaces the open one.
pub fn finalize_notes<I>(messages: I) -> Vec<NoteRecord>
where
    I: IntoIterator<Item = MpeMessage>,
{
    let mut bends = ChannelBendTable::default();
    let mut open_notes: HashMap<(u8, u8), OpenNote> = HashMap::new();
    let mut records: Vec<NoteRecord> = Vec::new();

    for message in messages {
        match message {
            MpeMessage::PitchBend { channel, bend, .. } => bends.set(channel, bend),
            MpeMessage::NoteOn {
                tick,
                channel,
                key,
                velocity,
            } => {
                let open = OpenNote {
                    onset_ticks: tick,
                    step_53: to_step53(key, bends.get(channel)),
                    velocity,
                };
                if open_notes.insert((channel, key), open).is_some() {
                    debug!(
                        "Retriggered NoteOn for {} ch{} at tick {} replaces the open note..!",
                        key, channel, tick
                    );
                }
            }
            MpeMessage::NoteOff { tick, channel, key } => {
                if let Some(open) = open_notes.remove(&(channel, key)) {
                    records.push(NoteRecord {
                        onset_ticks: open.onset_ticks,
                        offset_ticks: tick,
                        step_53: open.step_53,
                        velocity: open.velocity,
                    });
                } else {
                    debug!("Orphaned NoteOff for {} ch{} at tick {}..!", key, channel, tick);
                }
            }
        }
    }

    if !open_notes.is_empty() {
        warn!(
            "Dropping {} note(s) that were never released..!",
            open_notes.len()
        );
    }

    records
}

/// Greedily clusters note records whose onsets fall within
/// `max(1, ticks_per_beat / 48)` ticks of the first note in the cluster.
pub fn group_chords(
    mut records: Vec<NoteRecord>,
    ticks_per_beat: u64,
    speed: f64,
) -> Vec<ChordEvent> {
    if records.is_empty() || ticks_per_beat == 0 {
        return Vec::new();
    }

    records.sort_by_key(|r| (r.onset_ticks, r.step_53));

    let tolerance = (ticks_per_beat / 48).max(1);
    let mut chords: Vec<ChordEvent> = Vec::new();
    let mut cluster: Vec<NoteRecord> = Vec::new();
    let mut cluster_onset = records[0].onset_ticks;
    let mut cluster_offset = 0u64;

    for record in records.into_iter() {
        if record.onset_ticks.abs_diff(cluster_onset) > tolerance {
            chords.push(close_cluster(
                &cluster,
                cluster_onset,
                cluster_offset,
                ticks_per_beat,
                speed,
            ));
            cluster.clear();
            cluster_onset = record.onset_ticks;
            cluster_offset = 0;
        }

        cluster_offset = cluster_offset.max(record.offset_ticks);
        cluster.push(record);
    }

    if !cluster.is_empty() {
        chords.push(close_cluster(
            &cluster,
            cluster_onset,
            cluster_offset,
            ticks_per_beat,
            speed,
        ));
    }

    chords
}

fn close_cluster(
    cluster: &[NoteRecord],
    onset_ticks: u64,
    offset_ticks: u64,
    ticks_per_beat: u64,
    speed: f64,
) -> ChordEvent {
    let tpb = ticks_per_beat as f64;
    let onset_beats = onset_ticks as f64 / tpb / speed;
    let duration_beats = offset_ticks.saturating_sub(onset_ticks) as f64 / tpb / speed;

    let notes = cluster
        .iter()
        .map(|r| NoteEvent::new(r.step_53, r.velocity))
        .collect();

    ChordEvent::new(
        round_beats(onset_beats),
        round_beats(duration_beats.max(MIN_CHORD_BEATS)),
        notes,
    )
}
