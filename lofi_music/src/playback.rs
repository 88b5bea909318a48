// MIDI file playback through an output device.
//
// `PlaybackController::play` is the whole public story: open the output
// (once, reused across calls), load and flatten the file into a timeline,
// hand the timeline to a player thread, and block until the thread reports
// it is no longer busy. Any failure along the way is reported as a message
// and the call returns normally, so a missing synth or a bad file never ends
// the program.
//
// The output side is abstracted behind `AudioBackend` / `MidiSink`. The
// production backend connects to a system MIDI output port through `midir`
// (a software synth like TiMidity or FluidSynth, or the OS default synth).
// Files are parsed with `midly`; all tracks are merged into one timeline
// with tempo changes applied, and only channel messages are sent. Playback
// lasts until the file's final event (end-of-track included), so trailing
// rests are waited out before the call returns.

use crate::error::PlaybackError;
use crate::prompt::Player;
use midir::{MidiOutput, MidiOutputConnection};
use midly::live::LiveEvent;
use midly::{MetaMessage, Smf, Timing, TrackEventKind};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default MIDI tempo (120 BPM) used until a tempo event says otherwise.
const DEFAULT_TEMPO_US: u32 = 500_000;

/// How often `play` checks whether the player thread has finished.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An open MIDI output that accepts raw channel messages.
pub trait MidiSink: Send + 'static {
    fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError>;
}

/// Something that can open a `MidiSink`. Opening may touch hardware, so the
/// controller does it at most once and keeps the sink between plays.
pub trait AudioBackend {
    type Sink: MidiSink;

    fn open(&mut self) -> Result<Self::Sink, PlaybackError>;
}

/// System MIDI output via `midir`.
#[derive(Debug, Clone)]
pub struct MidirBackend {
    client_name: String,
    /// Connect to the first port whose name contains this, instead of the
    /// first port overall.
    port_hint: Option<String>,
}

impl MidirBackend {
    pub fn new(port_hint: Option<String>) -> Self {
        Self {
            client_name: "lofi".to_string(),
            port_hint,
        }
    }
}

impl AudioBackend for MidirBackend {
    type Sink = MidiOutputConnection;

    fn open(&mut self) -> Result<MidiOutputConnection, PlaybackError> {
        let output =
            MidiOutput::new(&self.client_name).map_err(|e| PlaybackError::Init(e.to_string()))?;

        let mut chosen = None;
        for port in output.ports() {
            let name = output.port_name(&port).unwrap_or_default();
            log::debug!("found MIDI output port '{name}'");
            let matches = match &self.port_hint {
                Some(hint) => name.contains(hint.as_str()),
                None => true,
            };
            if matches {
                chosen = Some((port, name));
                break;
            }
        }
        let (port, name) = chosen.ok_or_else(|| PlaybackError::NoOutputPort {
            hint: self.port_hint.clone(),
        })?;

        log::info!("connecting to MIDI output '{name}'");
        output
            .connect(&port, "lofi-playback")
            .map_err(|e| PlaybackError::Connect {
                port: name,
                message: e.to_string(),
            })
    }
}

impl MidiSink for MidiOutputConnection {
    fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError> {
        MidiOutputConnection::send(self, message).map_err(|e| PlaybackError::Send(e.to_string()))
    }
}

/// A message scheduled relative to the start of playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub at: Duration,
    pub message: Vec<u8>,
}

/// Every channel message of a file, merged across tracks, in play order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    pub entries: Vec<Scheduled>,
    /// Time of the file's last event of any kind, so trailing rests up to
    /// end-of-track are part of playback.
    pub end: Duration,
}

impl Timeline {
    /// Length of playback: the later of the last message and the file end.
    pub fn duration(&self) -> Duration {
        let last = self.entries.last().map_or(Duration::ZERO, |e| e.at);
        last.max(self.end)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read and flatten a MIDI file.
pub fn load_timeline(path: &Path) -> Result<Timeline, PlaybackError> {
    let bytes = std::fs::read(path).map_err(|source| PlaybackError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let smf = Smf::parse(&bytes)?;
    Ok(timeline_from_smf(&smf))
}

/// Merge all tracks of a parsed file into one timeline.
pub fn timeline_from_smf(smf: &Smf<'_>) -> Timeline {
    // (absolute tick, track, index within track, event)
    let mut merged: Vec<(u64, usize, usize, &TrackEventKind<'_>)> = Vec::new();
    for (ti, track) in smf.tracks.iter().enumerate() {
        let mut tick = 0u64;
        for (ei, event) in track.iter().enumerate() {
            tick += u64::from(event.delta.as_int());
            merged.push((tick, ti, ei, &event.kind));
        }
    }
    merged.sort_by_key(|&(tick, ti, ei, _)| (tick, ti, ei));

    let mut tempo_us = DEFAULT_TEMPO_US;
    let mut elapsed_us = 0.0f64;
    let mut last_tick = 0u64;
    let mut entries = Vec::new();

    for (tick, _, _, kind) in merged {
        let ticks = (tick - last_tick) as f64;
        elapsed_us += match smf.header.timing {
            Timing::Metrical(tpq) => ticks * f64::from(tempo_us) / f64::from(tpq.as_int()),
            Timing::Timecode(fps, subframe) => {
                ticks * 1_000_000.0 / (f64::from(fps.as_f32()) * f64::from(subframe))
            }
        };
        last_tick = tick;

        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => tempo_us = t.as_int(),
            TrackEventKind::Midi { .. } => {
                if let Some(live @ LiveEvent::Midi { .. }) = kind.as_live_event() {
                    let mut message = Vec::with_capacity(3);
                    if live.write_std(&mut message).is_ok() {
                        entries.push(Scheduled {
                            at: Duration::from_micros(elapsed_us.round() as u64),
                            message,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Timeline {
        entries,
        end: Duration::from_micros(elapsed_us.round() as u64),
    }
}

/// A playback running on its own thread.
pub struct PlaybackHandle<S> {
    busy: Arc<AtomicBool>,
    thread: JoinHandle<(S, Result<(), PlaybackError>)>,
}

impl<S> PlaybackHandle<S> {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Wait for the thread and take the sink back along with its outcome.
    pub fn join(self) -> Result<(S, Result<(), PlaybackError>), PlaybackError> {
        self.thread.join().map_err(|_| PlaybackError::PlayerPanicked)
    }
}

/// Clears the busy flag when the player thread exits, panics included.
struct ClearOnDrop(Arc<AtomicBool>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Send every timeline entry at its scheduled time, wait out the file end,
/// then silence all channels.
fn spawn_player<S: MidiSink>(mut sink: S, timeline: Timeline) -> PlaybackHandle<S> {
    let busy = Arc::new(AtomicBool::new(true));
    let flag = ClearOnDrop(busy.clone());
    let thread = std::thread::spawn(move || {
        let _flag = flag;
        let start = Instant::now();
        let mut result = Ok(());
        for entry in &timeline.entries {
            let now = start.elapsed();
            if entry.at > now {
                std::thread::sleep(entry.at - now);
            }
            if let Err(e) = sink.send(&entry.message) {
                result = Err(e);
                break;
            }
        }
        if result.is_ok() {
            let now = start.elapsed();
            if timeline.end > now {
                std::thread::sleep(timeline.end - now);
            }
        }
        // All notes off, so a failed or truncated playback cannot hang notes.
        for channel in 0..16u8 {
            let _ = sink.send(&[0xB0 | channel, 123, 0]);
        }
        (sink, result)
    });
    PlaybackHandle { busy, thread }
}

/// Owns the output device and plays files through it.
pub struct PlaybackController<B: AudioBackend> {
    backend: B,
    sink: Option<B::Sink>,
    poll_interval: Duration,
}

impl<B: AudioBackend> PlaybackController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            sink: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.sink.is_some()
    }

    /// Open the output if it is not open yet.
    pub fn init(&mut self) -> Result<(), PlaybackError> {
        if self.sink.is_none() {
            self.sink = Some(self.backend.open()?);
        }
        Ok(())
    }

    /// Start playing a timeline on the player thread.
    pub fn start(&mut self, timeline: Timeline) -> Result<PlaybackHandle<B::Sink>, PlaybackError> {
        self.init()?;
        match self.sink.take() {
            Some(sink) => Ok(spawn_player(sink, timeline)),
            None => Err(PlaybackError::Init("output closed".to_string())),
        }
    }

    /// Play a file and block until it finishes, returning any failure.
    pub fn try_play(&mut self, path: &Path, out: &mut dyn Write) -> Result<(), PlaybackError> {
        self.init()?;
        let timeline = load_timeline(path)?;
        log::info!(
            "playing {} messages over {:.1}s from {}",
            timeline.len(),
            timeline.duration().as_secs_f64(),
            path.display()
        );
        let _ = writeln!(out, "Playing: {}", path.display());
        let handle = self.start(timeline)?;
        while handle.is_busy() {
            std::thread::sleep(self.poll_interval);
        }
        let (sink, result) = handle.join()?;
        self.sink = Some(sink);
        result
    }

    /// Play a file and block until it finishes. Failures are written to
    /// `out` and logged; they never propagate.
    pub fn play(&mut self, path: &Path, out: &mut dyn Write) {
        if let Err(e) = self.try_play(path, out) {
            log::error!("playback of {} failed: {e}", path.display());
            let _ = writeln!(out, "Error playing MIDI: {e}");
        }
    }
}

impl<B: AudioBackend> Player for PlaybackController<B> {
    fn play(&mut self, path: &Path, out: &mut dyn Write) {
        PlaybackController::play(self, path, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header, MidiMessage, TrackEvent};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

    impl MidiSink for Recorder {
        fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError> {
            self.0.lock().unwrap().push(message.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        sink: Recorder,
        opens: usize,
    }

    impl AudioBackend for RecordingBackend {
        type Sink = Recorder;
        fn open(&mut self) -> Result<Recorder, PlaybackError> {
            self.opens += 1;
            Ok(self.sink.clone())
        }
    }

    struct Exploding;

    impl MidiSink for Exploding {
        fn send(&mut self, _message: &[u8]) -> Result<(), PlaybackError> {
            panic!("synth crashed");
        }
    }

    struct ExplodingBackend;

    impl AudioBackend for ExplodingBackend {
        type Sink = Exploding;
        fn open(&mut self) -> Result<Exploding, PlaybackError> {
            Ok(Exploding)
        }
    }

    struct NoDevice;

    impl AudioBackend for NoDevice {
        type Sink = Recorder;
        fn open(&mut self) -> Result<Recorder, PlaybackError> {
            Err(PlaybackError::Init("no audio device".to_string()))
        }
    }

    fn note(delta: u32, on: bool, key: u8) -> TrackEvent<'static> {
        let key = u7::new(key);
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: if on {
                    MidiMessage::NoteOn { key, vel: u7::new(100) }
                } else {
                    MidiMessage::NoteOff { key, vel: u7::new(0) }
                },
            },
        }
    }

    /// Two notes at a tempo of 1ms per quarter, so playback takes ~2ms,
    /// followed by `trailing` ticks of silence before end-of-track.
    fn fast_file_bytes_with_tail(trailing: u32) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(480)),
        ));
        smf.tracks.push(vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1000))),
            },
            note(0, true, 60),
            note(480, false, 60),
            note(0, true, 64),
            note(480, false, 64),
            TrackEvent {
                delta: u28::new(trailing),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ]);
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    fn fast_file_bytes() -> Vec<u8> {
        fast_file_bytes_with_tail(0)
    }

    /// Write `bytes` into a fresh temporary directory, removed on drop.
    fn temp_file(name: &str, bytes: &[u8]) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn timeline_applies_tempo() {
        let bytes = fast_file_bytes();
        let timeline = timeline_from_smf(&Smf::parse(&bytes).unwrap());
        assert_eq!(timeline.len(), 4);
        assert_eq!(timeline.entries[0].message, vec![0x90, 60, 100]);
        assert_eq!(timeline.entries[1].at, Duration::from_micros(1000));
        assert_eq!(timeline.entries[3].at, Duration::from_micros(2000));
        assert_eq!(timeline.duration(), Duration::from_micros(2000));
    }

    #[test]
    fn timeline_ends_at_end_of_track() {
        // 4800 ticks of trailing silence at 1ms per quarter = 10ms.
        let bytes = fast_file_bytes_with_tail(4800);
        let timeline = timeline_from_smf(&Smf::parse(&bytes).unwrap());
        assert_eq!(timeline.entries[3].at, Duration::from_micros(2000));
        assert_eq!(timeline.end, Duration::from_micros(12_000));
        assert_eq!(timeline.duration(), Duration::from_micros(12_000));
    }

    #[test]
    fn timeline_merges_tracks_in_time_order() {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        smf.tracks.push(vec![note(0, true, 60), note(960, false, 60)]);
        smf.tracks.push(vec![note(480, true, 67), note(960, false, 67)]);
        let timeline = timeline_from_smf(&smf);
        let keys: Vec<u8> = timeline.entries.iter().map(|e| e.message[1]).collect();
        assert_eq!(keys, vec![60, 67, 60, 67]);
        // Default tempo: 480 ticks = 0.5s.
        assert_eq!(timeline.entries[1].at, Duration::from_millis(500));
        assert_eq!(timeline.entries[3].at, Duration::from_millis(1500));
    }

    #[test]
    fn plays_every_message_then_silences() {
        let (_dir, path) = temp_file("fast.mid", &fast_file_bytes());
        let mut controller = PlaybackController::new(RecordingBackend::default())
            .with_poll_interval(Duration::from_millis(1));
        let recorder = controller.backend.sink.clone();
        let mut out = Vec::new();
        controller.play(&path, &mut out);

        let sent = recorder.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 4 + 16);
        assert_eq!(sent[0], vec![0x90, 60, 100]);
        assert_eq!(sent[4], vec![0xB0, 123, 0]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Playing: "), "{text}");
        assert!(!text.contains("Error"), "{text}");
    }

    #[test]
    fn init_is_idempotent_across_plays() {
        let (_dir, path) = temp_file("twice.mid", &fast_file_bytes());
        let mut controller = PlaybackController::new(RecordingBackend::default())
            .with_poll_interval(Duration::from_millis(1));
        let mut out = Vec::new();
        controller.play(&path, &mut out);
        controller.play(&path, &mut out);
        assert!(controller.is_initialized());
        assert_eq!(controller.backend.opens, 1);
    }

    #[test]
    fn missing_file_reports_and_returns() {
        let mut controller = PlaybackController::new(RecordingBackend::default());
        let mut out = Vec::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.mid");
        controller.play(&path, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Error playing MIDI: could not load"), "{text}");
        assert!(matches!(
            controller.try_play(&path, &mut Vec::new()),
            Err(PlaybackError::Load { .. })
        ));
    }

    #[test]
    fn garbage_file_reports_parse_error() {
        let (_dir, path) = temp_file("garbage.mid", b"not a midi file");
        let mut controller = PlaybackController::new(RecordingBackend::default());
        let mut out = Vec::new();
        controller.play(&path, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Error playing MIDI: invalid MIDI file"), "{text}");
    }

    #[test]
    fn device_failure_reports_and_returns() {
        let (_dir, path) = temp_file("nodevice.mid", &fast_file_bytes());
        let mut controller = PlaybackController::new(NoDevice);
        let mut out = Vec::new();
        controller.play(&path, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Error playing MIDI: could not initialize MIDI output: no audio device\n"
        );
        assert!(!controller.is_initialized());
    }

    #[test]
    fn play_waits_out_trailing_silence() {
        let (_dir, path) = temp_file("tail.mid", &fast_file_bytes_with_tail(24_000));
        let mut controller = PlaybackController::new(RecordingBackend::default())
            .with_poll_interval(Duration::from_millis(1));
        let started = Instant::now();
        controller.play(&path, &mut Vec::new());
        // 2ms of notes plus 50ms of silence before end-of-track.
        assert!(started.elapsed() >= Duration::from_millis(52));
    }

    #[test]
    fn panicking_sink_reports_and_returns() {
        let (dir, path) = temp_file("panic.mid", &fast_file_bytes());
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut controller = PlaybackController::new(ExplodingBackend)
                .with_poll_interval(Duration::from_millis(1));
            let mut out = Vec::new();
            controller.play(&path, &mut out);
            let initialized = controller.is_initialized();
            let _ = tx.send((String::from_utf8(out).unwrap(), initialized));
        });
        let (text, initialized) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("play did not return after the player thread panicked");
        assert!(
            text.ends_with("Error playing MIDI: player thread panicked\n"),
            "{text}"
        );
        // The sink died with the thread; the next play reopens the output.
        assert!(!initialized);
        drop(dir);
    }
}
