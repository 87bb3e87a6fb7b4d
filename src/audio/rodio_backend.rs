//! rodio output backend
//!
//! rodio's `OutputStream` cannot leave the thread that opened it, so every
//! handle owns a dedicated audio thread and drives it over a command channel.

use std::fs::File;
use std::io::BufReader;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tokio::sync::watch;

use super::{MediaFactory, MediaHandle, MediaStatus};

const END_CHECK_INTERVAL: Duration = Duration::from_millis(200);

enum Command {
    Play,
    Pause,
    Stop,
    Seek(Duration),
}

/// Opens files on the default output device.
#[derive(Default)]
pub struct RodioFactory;

impl RodioFactory {
    pub fn new() -> Self {
        Self
    }
}

impl MediaFactory for RodioFactory {
    fn create(&self, path: &str) -> Result<Arc<dyn MediaHandle>> {
        let handle = RodioHandle::open(path)?;
        Ok(Arc::new(handle))
    }
}

/// Wall-clock position tracking; rodio 0.17 sinks do not report a position.
#[derive(Default)]
struct Clock {
    anchor: Option<Instant>,
    offset: Duration,
}

impl Clock {
    fn position(&self) -> Duration {
        self.offset + self.anchor.map(|a| a.elapsed()).unwrap_or_default()
    }

    fn start(&mut self) {
        if self.anchor.is_none() {
            self.anchor = Some(Instant::now());
        }
    }

    fn halt(&mut self) {
        self.offset = self.position();
        self.anchor = None;
    }

    fn jump(&mut self, to: Duration) {
        let running = self.anchor.is_some();
        self.offset = to;
        self.anchor = running.then(Instant::now);
    }
}

struct RodioHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Sender<MediaStatus>,
    clock: Arc<Mutex<Clock>>,
    duration: f64,
}

impl RodioHandle {
    fn open(path: &str) -> Result<Self> {
        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<f64>>();
        let (status, _) = watch::channel(MediaStatus::None);
        let clock = Arc::new(Mutex::new(Clock::default()));

        let file_path = path.to_string();
        let thread_status = status.clone();
        let thread_clock = clock.clone();
        thread::Builder::new()
            .name("amerpire-audio".into())
            .spawn(move || {
                let output = match Output::open(&file_path) {
                    Ok((output, duration)) => {
                        let _ = ready_tx.send(Ok(duration));
                        output
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_audio_thread(output, inbox, thread_status, thread_clock);
                tracing::debug!(path = %file_path, "Audio thread finished");
            })
            .context("spawning audio thread")?;

        let duration = ready_rx
            .recv()
            .map_err(|_| anyhow!("audio thread exited before opening {}", path))??;
        tracing::info!(path, duration, "Opened audio file");

        Ok(Self {
            commands,
            status,
            clock,
            duration,
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("audio thread is gone"))
    }

    fn with_clock(&self, f: impl FnOnce(&mut Clock)) {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut clock);
    }
}

/// Audio thread state. Seeking rebuilds the sink from a fresh decoder
/// skipped ahead, since rodio 0.17 sinks cannot seek.
struct Output {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Sink,
    path: String,
}

impl Output {
    fn open(path: &str) -> Result<(Self, f64)> {
        let (stream, stream_handle) =
            OutputStream::try_default().context("opening default output device")?;
        let source = decode(path)?;
        let duration = source
            .total_duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let sink = Sink::try_new(&stream_handle).context("creating audio sink")?;
        sink.pause();
        sink.append(source);

        let output = Self {
            _stream: stream,
            stream_handle,
            sink,
            path: path.to_string(),
        };
        Ok((output, duration))
    }

    fn seek(&mut self, to: Duration) -> Result<()> {
        let source = decode(&self.path)?.skip_duration(to);
        let sink = Sink::try_new(&self.stream_handle).context("creating audio sink")?;
        if self.sink.is_paused() {
            sink.pause();
        }
        sink.append(source);
        self.sink.stop();
        self.sink = sink;
        Ok(())
    }
}

fn decode(path: &str) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    Decoder::new(BufReader::new(file)).with_context(|| format!("decoding {}", path))
}

fn run_audio_thread(
    mut output: Output,
    inbox: mpsc::Receiver<Command>,
    status: watch::Sender<MediaStatus>,
    clock: Arc<Mutex<Clock>>,
) {
    loop {
        match inbox.recv_timeout(END_CHECK_INTERVAL) {
            Ok(Command::Play) => output.sink.play(),
            Ok(Command::Pause) => output.sink.pause(),
            Ok(Command::Stop) => {
                output.sink.stop();
                break;
            }
            Ok(Command::Seek(to)) => {
                if let Err(e) = output.seek(to) {
                    tracing::warn!(error = %e, "Seek failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if output.sink.empty() {
                    clock.lock().unwrap_or_else(|e| e.into_inner()).halt();
                    status.send_replace(MediaStatus::Stopped);
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[async_trait]
impl MediaHandle for RodioHandle {
    fn play(&self) -> Result<()> {
        self.send(Command::Play)?;
        self.status.send_replace(MediaStatus::Starting);
        self.with_clock(Clock::start);
        self.status.send_replace(MediaStatus::Running);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.send(Command::Pause)?;
        self.with_clock(Clock::halt);
        self.status.send_replace(MediaStatus::Paused);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        // Already finished is fine
        let _ = self.send(Command::Stop);
        self.with_clock(|clock| *clock = Clock::default());
        self.status.send_replace(MediaStatus::Stopped);
        Ok(())
    }

    fn seek_to(&self, position_ms: f64) -> Result<()> {
        let to = Duration::from_secs_f64((position_ms / 1000.0).max(0.0));
        self.send(Command::Seek(to))?;
        self.with_clock(|clock| clock.jump(to));
        Ok(())
    }

    async fn current_position(&self) -> Result<f64> {
        let position = self
            .clock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .position();
        Ok(position.as_secs_f64())
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn status(&self) -> watch::Receiver<MediaStatus> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_advances_while_running() {
        let mut clock = Clock::default();
        assert_eq!(clock.position(), Duration::ZERO);

        clock.jump(Duration::from_secs(30));
        assert_eq!(clock.position(), Duration::from_secs(30));

        clock.start();
        clock.halt();
        let paused_at = clock.position();
        assert!(paused_at >= Duration::from_secs(30));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.position(), paused_at);
    }

    #[test]
    fn play_after_the_track_finished_keeps_it_stopped() {
        let (commands, inbox) = mpsc::channel();
        drop(inbox);
        let (status, _) = watch::channel(MediaStatus::Stopped);
        let handle = RodioHandle {
            commands,
            status,
            clock: Arc::new(Mutex::new(Clock::default())),
            duration: 10.0,
        };
        let mut rx = handle.status();

        assert!(handle.play().is_err());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), MediaStatus::Stopped);
    }
}
