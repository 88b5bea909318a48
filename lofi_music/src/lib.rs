// Lofi MIDI sketch generator
//
// Builds a short random sequence of chords, notes, and rests for one
// randomly chosen instrument, writes it as a Standard MIDI File, and offers
// to play it back through a MIDI output device.
//
// Architecture:
// - sequence.rs: Pitches, instruments, events, and the offset-assigning Sequence
// - generator.rs: Random palette selection that fills a 16-event Sequence
// - midi.rs: Sequence to SMF conversion and file output
// - playback.rs: File loading, timeline flattening, threaded playback via midir
// - prompt.rs: The y/n loop that drives playback after generation
// - config.rs: Command-line options (output path, seed, port)
// - error.rs: Generation and playback error types
//
// Generation is deterministic given a seed (see lofi_prng).

pub mod config;
pub mod error;
pub mod generator;
pub mod midi;
pub mod playback;
pub mod prompt;
pub mod sequence;
