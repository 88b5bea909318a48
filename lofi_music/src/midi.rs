// MIDI output from sequences.
//
// Converts a Sequence into a Standard MIDI File for playback. Output is SMF
// Format 0: one track holding the track name, tempo, the instrument's program
// change at tick 0, and note on/off pairs for every chord and note. Rests emit
// no events; their time is folded into the delta of whatever follows.
//
// Uses the `midly` crate for MIDI writing. The conversion is a pure function
// of the sequence, so equal sequences give byte-identical files.

use crate::error::LofiError;
use crate::sequence::Sequence;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Output tempo in beats per minute.
pub const TEMPO_BPM: u32 = 120;

/// Note-on velocity for every sounding pitch.
const VELOCITY: u8 = 90;

const CHANNEL: u8 = 0;

const TRACK_NAME: &[u8] = b"lofi";

/// Convert a sequence to MIDI and write it to a file, replacing any existing one.
pub fn write_midi(sequence: &Sequence, path: &Path) -> Result<(), LofiError> {
    let buf = encode(sequence)?;
    std::fs::write(path, &buf).map_err(|source| LofiError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode a sequence as SMF bytes.
pub fn encode(sequence: &Sequence) -> Result<Vec<u8>, LofiError> {
    let smf = sequence_to_smf(sequence);
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(LofiError::Encode)?;
    Ok(buf)
}

/// Quarter-note time to ticks.
fn to_ticks(quarters: f64) -> u32 {
    (quarters * f64::from(TICKS_PER_QUARTER)).round() as u32
}

/// Convert a sequence to an in-memory SMF.
fn sequence_to_smf(sequence: &Sequence) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));
    let channel = u4::new(CHANNEL);

    // (absolute tick, event) in emission order; deltas are derived afterwards.
    let mut timed: Vec<(u32, TrackEventKind<'static>)> = vec![
        (0, TrackEventKind::Meta(MetaMessage::TrackName(TRACK_NAME))),
        (
            0,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(60_000_000 / TEMPO_BPM))),
        ),
        (
            0,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(sequence.instrument.program()),
                },
            },
        ),
    ];

    for event in sequence.events() {
        if event.is_rest() {
            continue;
        }
        let start = to_ticks(event.offset);
        let end = to_ticks(event.end());
        for pitch in event.pitches() {
            timed.push((
                start,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(pitch.midi()),
                        vel: u7::new(VELOCITY),
                    },
                },
            ));
        }
        for pitch in event.pitches() {
            timed.push((
                end,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(pitch.midi()),
                        vel: u7::new(0),
                    },
                },
            ));
        }
    }

    // End of track sits at the end of the last event, trailing rests included.
    timed.push((
        to_ticks(sequence.total_duration()),
        TrackEventKind::Meta(MetaMessage::EndOfTrack),
    ));

    let mut track: Track<'static> = Vec::with_capacity(timed.len());
    let mut last_tick = 0u32;
    for (tick, kind) in timed {
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind,
        });
        last_tick = tick;
    }
    smf.tracks.push(track);
    smf
}
