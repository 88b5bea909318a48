// Error types for generation and playback.
//
// Generation errors propagate to `main` and end the process. Playback errors
// are caught inside `PlaybackController::play` and reported as messages.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LofiError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode MIDI: {0}")]
    Encode(#[source] std::io::Error),

    #[error("failed to serialize sequence: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("could not initialize MIDI output: {0}")]
    Init(String),

    #[error("no MIDI output port available{}", hint.as_ref().map(|h| format!(" matching '{h}'")).unwrap_or_default())]
    NoOutputPort { hint: Option<String> },

    #[error("could not connect to MIDI port '{port}': {message}")]
    Connect { port: String, message: String },

    #[error("could not load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("failed to send MIDI message: {0}")]
    Send(String),

    #[error("player thread panicked")]
    PlayerPanicked,
}
