// In-memory representation of a generated piece.
//
// A `Sequence` is one instrument plus an ordered list of events (chords,
// notes, rests) laid end to end. Times are in quarter-note units: 1.0 is one
// quarter note. Offsets are never set by callers; `Sequence::push` assigns
// each event the running sum of the durations before it, so the timeline is
// always gapless and non-overlapping.
//
// Sequences are only built inside this crate (by generator.rs), so the
// duration check in `push` is an internal invariant, not an API error path.
//
// MIDI is derived from the sequence (see midi.rs), never the other way around.

use crate::error::LofiError;
use serde::{Serialize, Serializer};
use std::fmt;

/// A MIDI key number, displayed in scientific pitch notation (60 = "C4").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pitch(u8);

impl Pitch {
    pub const G3: Pitch = Pitch(55);
    pub const C4: Pitch = Pitch(60);
    pub const E4: Pitch = Pitch(64);
    pub const G4: Pitch = Pitch(67);
    pub const A4: Pitch = Pitch(69);
    pub const D5: Pitch = Pitch(74);

    /// Build a pitch from a MIDI key number. Keys above 127 are clamped.
    pub const fn from_midi(key: u8) -> Self {
        if key > 127 { Pitch(127) } else { Pitch(key) }
    }

    pub fn midi(self) -> u8 {
        self.0
    }

    /// Octave number in scientific pitch notation (C4 = middle C).
    pub fn octave(self) -> i8 {
        (self.0 / 12) as i8 - 1
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        write!(f, "{}{}", NAMES[(self.0 % 12) as usize], self.octave())
    }
}

impl Serialize for Pitch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The instrument timbres a sequence can be voiced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Instrument {
    AcousticGuitar,
    Piano,
    Flute,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [
        Instrument::AcousticGuitar,
        Instrument::Piano,
        Instrument::Flute,
    ];

    /// General MIDI program number (0-based).
    pub fn program(self) -> u8 {
        match self {
            Instrument::AcousticGuitar => 24, // Acoustic Guitar (nylon)
            Instrument::Piano => 0,           // Acoustic Grand Piano
            Instrument::Flute => 73,
        }
    }
}

/// What an event sounds like. Rests carry no pitch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "pitches", rename_all = "lowercase")]
pub enum EventKind {
    Chord(Vec<Pitch>),
    Note(Pitch),
    Rest,
}

/// One placed event on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MusicalEvent {
    pub kind: EventKind,
    /// Length in quarter notes.
    pub duration: f64,
    /// Start time in quarter notes from the beginning of the piece.
    pub offset: f64,
}

impl MusicalEvent {
    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }

    /// Pitches sounded by this event, empty for a rest.
    pub fn pitches(&self) -> &[Pitch] {
        match &self.kind {
            EventKind::Chord(pitches) => pitches,
            EventKind::Note(pitch) => std::slice::from_ref(pitch),
            EventKind::Rest => &[],
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, EventKind::Rest)
    }
}

/// An instrument (placed at offset 0) followed by events laid end to end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    pub instrument: Instrument,
    events: Vec<MusicalEvent>,
}

impl Sequence {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            events: Vec::new(),
        }
    }

    /// Append an event at the current end of the sequence and return it.
    ///
    /// Panics if `duration` is negative or not finite.
    pub(crate) fn push(&mut self, kind: EventKind, duration: f64) -> &MusicalEvent {
        assert!(
            duration.is_finite() && duration >= 0.0,
            "event duration must be finite and non-negative, got {duration}"
        );
        let offset = self.total_duration();
        self.events.push(MusicalEvent {
            kind,
            duration,
            offset,
        });
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &[MusicalEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// End time of the last event, 0.0 for an empty sequence.
    pub fn total_duration(&self) -> f64 {
        self.events.last().map_or(0.0, MusicalEvent::end)
    }

    /// Compact JSON form, used for debug logging.
    pub fn to_json(&self) -> Result<String, LofiError> {
        Ok(serde_json::to_string(self)?)
    }
}
