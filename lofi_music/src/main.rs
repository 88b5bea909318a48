// Lofi MIDI sketch generator: CLI entry point.
//
// Generates a random 16-event sequence, writes it to MIDI, then asks on
// stdin whether to play it. See config.rs for the options.
//
// Usage:
//   cargo run -p lofi_music -- [output.mid] [--seed N] [--port NAME]
//
// Set RUST_LOG=debug to see the generated sequence as JSON.

use lofi_music::config::RunConfig;
use lofi_music::generator::generate;
use lofi_music::playback::{MidirBackend, PlaybackController};
use lofi_music::prompt::run_prompt;
use lofi_prng::LofiRng;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match RunConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Usage: lofi [output.mid] [--seed N] [--port NAME]");
            std::process::exit(1);
        }
    };

    let mut rng = match config.seed {
        Some(seed) => LofiRng::new(seed),
        None => LofiRng::from_clock(),
    };
    println!("Seed: {}", rng.seed());

    let sequence = match generate(&config.output, &mut rng) {
        Ok(sequence) => sequence,
        Err(e) => {
            eprintln!("Error generating MIDI: {e}");
            std::process::exit(1);
        }
    };
    println!(
        "Instrument: {:?}, {} events, {} quarter notes",
        sequence.instrument,
        sequence.len(),
        sequence.total_duration()
    );
    println!("MIDI file saved as: {}", config.output.display());

    let mut player = PlaybackController::new(MidirBackend::new(config.port_hint.clone()));
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    if let Err(e) = run_prompt(&mut stdin.lock(), &mut stdout.lock(), &mut player, &config.output) {
        log::error!("prompt aborted: {e}");
        std::process::exit(1);
    }
}
