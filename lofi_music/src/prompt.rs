// Interactive y/n loop run after generation.
//
// Reads one answer per line: "y" plays the generated file and asks again,
// "n" exits, anything else gets a reminder and asks again. Answers are
// trimmed and case-insensitive. Lines that are not valid UTF-8 count as
// unrecognized answers. End of input exits like "n".

use std::io::{self, BufRead, Write};
use std::path::Path;

pub const PROMPT: &str = "Play the generated MIDI file? (y/n): ";
pub const EXIT_MESSAGE: &str = "Exiting...";
pub const RETRY_MESSAGE: &str = "Please enter 'y' or 'n'.";

/// Anything that can play a MIDI file to completion, reporting problems on `out`.
pub trait Player {
    fn play(&mut self, path: &Path, out: &mut dyn Write);
}

/// Run the prompt until the user answers "n" or input ends.
///
/// Returns how many times playback was requested.
pub fn run_prompt<R: BufRead, W: Write, P: Player>(
    input: &mut R,
    out: &mut W,
    player: &mut P,
    path: &Path,
) -> io::Result<usize> {
    let mut plays = 0;
    let mut line = Vec::new();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            // Keep the exit message on its own line after the dangling prompt.
            writeln!(out)?;
            writeln!(out, "{EXIT_MESSAGE}")?;
            return Ok(plays);
        }

        match String::from_utf8_lossy(&line).trim().to_lowercase().as_str() {
            "y" => {
                plays += 1;
                player.play(path, out);
            }
            "n" => {
                writeln!(out, "{EXIT_MESSAGE}")?;
                return Ok(plays);
            }
            other => {
                log::debug!("unrecognized answer {other:?}");
                writeln!(out, "{RETRY_MESSAGE}")?;
            }
        }
    }
}
