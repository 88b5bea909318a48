// Random sequence generation.
//
// Picks an instrument, then lays down a fixed number of events, each one a
// chord, a single note, or a rest chosen with equal probability. The palettes
// are fixed: chords are one of C4/E4/G4 stacked under A4 and D5, notes are
// one of E4/G3/C4. All randomness comes from the caller's `LofiRng`, so a
// seed reproduces the same sequence and the same file byte for byte.

use crate::error::LofiError;
use crate::midi::write_midi;
use crate::sequence::{EventKind, Instrument, Pitch, Sequence};
use lofi_prng::LofiRng;
use std::path::Path;

/// Number of events in every generated sequence.
pub const EVENT_COUNT: usize = 16;

/// Chord length in quarter notes.
pub const CHORD_DURATION: f64 = 1.0;
pub const NOTE_DURATION: f64 = 0.5;
pub const REST_DURATION: f64 = 0.25;

/// Candidates for the variable chord tone.
pub const CHORD_ROOTS: [Pitch; 3] = [Pitch::C4, Pitch::E4, Pitch::G4];

/// Tones present in every chord.
pub const CHORD_UPPER: [Pitch; 2] = [Pitch::A4, Pitch::D5];

pub const NOTE_PITCHES: [Pitch; 3] = [Pitch::E4, Pitch::G3, Pitch::C4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Chord,
    Note,
    Rest,
}

const KINDS: [Kind; 3] = [Kind::Chord, Kind::Note, Kind::Rest];

/// Build a complete sequence in memory.
pub fn generate_sequence(rng: &mut LofiRng) -> Sequence {
    let instrument = pick(rng, &Instrument::ALL);
    let mut sequence = Sequence::new(instrument);

    for _ in 0..EVENT_COUNT {
        let (kind, duration) = match pick(rng, &KINDS) {
            Kind::Chord => random_chord(rng),
            Kind::Note => random_note(rng),
            Kind::Rest => random_rest(),
        };
        sequence.push(kind, duration);
    }
    sequence
}

/// Generate a sequence, write it to `path` as MIDI, and return it.
///
/// An existing file at `path` is overwritten.
pub fn generate(path: &Path, rng: &mut LofiRng) -> Result<Sequence, LofiError> {
    let sequence = generate_sequence(rng);
    log::debug!("generated sequence: {}", sequence.to_json()?);
    write_midi(&sequence, path)?;
    log::info!(
        "wrote {} events ({} quarter notes) with {:?} to {}",
        sequence.len(),
        sequence.total_duration(),
        sequence.instrument,
        path.display()
    );
    Ok(sequence)
}

fn random_chord(rng: &mut LofiRng) -> (EventKind, f64) {
    let mut pitches = Vec::with_capacity(1 + CHORD_UPPER.len());
    pitches.push(pick(rng, &CHORD_ROOTS));
    pitches.extend_from_slice(&CHORD_UPPER);
    (EventKind::Chord(pitches), CHORD_DURATION)
}

fn random_note(rng: &mut LofiRng) -> (EventKind, f64) {
    (EventKind::Note(pick(rng, &NOTE_PITCHES)), NOTE_DURATION)
}

fn random_rest() -> (EventKind, f64) {
    (EventKind::Rest, REST_DURATION)
}

/// Uniform pick from a non-empty constant palette.
fn pick<T: Copy, const N: usize>(rng: &mut LofiRng, items: &[T; N]) -> T {
    items[rng.range_usize(0, N)]
}
