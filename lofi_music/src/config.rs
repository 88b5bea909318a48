// Run configuration from the command line.
//
// Usage:
//   lofi [output.mid] [--seed N] [--port NAME]
//
// Simple `std::env::args()` matching, no argument-parsing dependency. Every
// field has a default, so a bare `lofi` run writes `lofi_output.mid` from a
// fresh seed and asks whether to play it.

use std::path::PathBuf;

pub const DEFAULT_OUTPUT: &str = "lofi_output.mid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Where the MIDI file is written (and read back for playback).
    pub output: PathBuf,
    /// Fixed seed for a reproducible run; a clock seed is used when absent.
    pub seed: Option<u64>,
    /// Substring of the MIDI output port name to play through.
    pub port_hint: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            seed: None,
            port_hint: None,
        }
    }
}

impl RunConfig {
    /// Parse arguments, excluding the program name.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, String> {
        let mut config = RunConfig::default();
        let mut output_set = false;
        let mut i = 0;

        while i < args.len() {
            match args[i].as_ref() {
                "--seed" => {
                    i += 1;
                    config.seed = Some(
                        args.get(i)
                            .and_then(|s| s.as_ref().parse().ok())
                            .ok_or("--seed requires an unsigned integer")?,
                    );
                }
                "--port" => {
                    i += 1;
                    config.port_hint = Some(
                        args.get(i)
                            .map(|s| s.as_ref().to_string())
                            .ok_or("--port requires a value")?,
                    );
                }
                flag if flag.starts_with("--") => {
                    return Err(format!("unknown option '{flag}'"));
                }
                path if !output_set => {
                    config.output = PathBuf::from(path);
                    output_set = true;
                }
                extra => return Err(format!("unexpected argument '{extra}'")),
            }
            i += 1;
        }
        Ok(config)
    }
}
