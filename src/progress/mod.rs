//! Progress reporting that stays off the write path.
//!
//! [`Reporter::wrap`] puts a [`ProgressWriter`] in front of any sink. Each
//! write bumps an atomic byte counter and at most makes one hand-off attempt
//! to a background thread, which owns the [`Render`]er. How the hand-off
//! behaves is chosen by [`Policy`].
//!
//! The background thread is joined when the writer is finished or dropped,
//! so nothing is rendered after the transfer that owns it has ended.

pub mod render;

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::warn;

pub use render::{BarRenderer, LineRenderer, QuietRenderer, Render, RenderStyle, status_line};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Policy {
    /// Every write waits for the renderer to take its update
    Blocking,
    /// Updates are dropped while the renderer is busy
    #[default]
    Lossy,
    /// No hand-off; the renderer samples the counter on an interval
    Polling,
}

/// Byte counter shared between the write path and the renderer.
#[derive(Debug)]
pub struct ProgressState {
    written: AtomicU64,
    total: u64,
}

impl ProgressState {
    fn new(total: u64) -> Self {
        Self {
            written: AtomicU64::new(0),
            total,
        }
    }

    fn advance(&self, n: u64) -> u64 {
        self.written.fetch_add(n, Ordering::AcqRel) + n
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Declared size, 0 when unknown.
    pub fn total(&self) -> u64 {
        self.total
    }

    fn clamp(&self, written: u64) -> u64 {
        if self.total > 0 {
            written.min(self.total)
        } else {
            written
        }
    }

    fn is_complete(&self, written: u64) -> bool {
        self.total > 0 && written >= self.total
    }

    fn reached_total(&self) -> bool {
        if self.total == 0 {
            return false;
        }
        match self.written.compare_exchange(
            self.total,
            self.total,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => current >= self.total,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    pub policy: Policy,
    pub interval: Duration,
}

impl Default for Reporter {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl Reporter {
    pub fn new(policy: Policy, interval: Duration) -> Self {
        Self { policy, interval }
    }

    /// Wraps `sink` and starts the renderer thread for one transfer of
    /// `total` bytes (0 when unknown).
    pub fn wrap<W: Write>(
        &self,
        sink: W,
        total: u64,
        renderer: Box<dyn Render>,
    ) -> io::Result<ProgressWriter<W>> {
        let state = Arc::new(ProgressState::new(total));
        let (tx, rx) = mpsc::sync_channel(0);

        let worker = Worker {
            policy: self.policy,
            interval: self.interval,
            state: Arc::clone(&state),
            rx,
            renderer,
            last: None,
        };
        let handle = thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || worker.run())?;

        Ok(ProgressWriter {
            inner: sink,
            state,
            activity: Activity {
                policy: self.policy,
                tx: Some(tx),
                handle: Some(handle),
            },
        })
    }
}

pub struct ProgressWriter<W> {
    inner: W,
    state: Arc<ProgressState>,
    activity: Activity,
}

impl<W> ProgressWriter<W> {
    pub fn written(&self) -> u64 {
        self.state.written()
    }

    pub fn total(&self) -> u64 {
        self.state.total()
    }

    /// Stops the renderer, lets it draw the final state and returns the sink.
    pub fn finish(self) -> W {
        let Self {
            inner, activity, ..
        } = self;
        drop(activity);
        inner
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        let written = self.state.advance(n as u64);
        self.activity.notify(written);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Foreground handle on the renderer thread.
struct Activity {
    policy: Policy,
    tx: Option<SyncSender<u64>>,
    handle: Option<JoinHandle<Box<dyn Render>>>,
}

impl Activity {
    fn notify(&self, written: u64) {
        let Some(tx) = &self.tx else {
            return;
        };
        // Send errors mean the renderer already drew the final state.
        match self.policy {
            Policy::Blocking => {
                let _ = tx.send(written);
            }
            Policy::Lossy => {
                let _ = tx.try_send(written);
            }
            Policy::Polling => {}
        }
    }
}

impl Drop for Activity {
    fn drop(&mut self) {
        // Disconnecting wakes the renderer for its last frame.
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(mut renderer) => renderer.conclude(),
                Err(_) => warn!("progress renderer panicked"),
            }
        }
    }
}

struct Worker {
    policy: Policy,
    interval: Duration,
    state: Arc<ProgressState>,
    rx: Receiver<u64>,
    renderer: Box<dyn Render>,
    last: Option<u64>,
}

impl Worker {
    fn run(mut self) -> Box<dyn Render> {
        match self.policy {
            Policy::Blocking => self.run_blocking(),
            Policy::Lossy => self.run_lossy(),
            Policy::Polling => self.run_polling(),
        }
        self.renderer
    }

    /// Renders `written` unless it would not move the display forward.
    fn emit(&mut self, written: u64) {
        let written = self.state.clamp(written);
        if self.last.is_some_and(|last| written <= last) {
            return;
        }
        self.renderer.render(written, self.state.total());
        self.last = Some(written);
    }

    fn emit_current(&mut self) {
        let written = self.state.written();
        self.emit(written);
    }

    fn run_blocking(&mut self) {
        loop {
            match self.rx.recv() {
                Ok(written) => {
                    self.emit(written);
                    if self.state.is_complete(written) {
                        return;
                    }
                }
                Err(_) => {
                    self.emit_current();
                    return;
                }
            }
        }
    }

    fn run_lossy(&mut self) {
        let mut last_frame: Option<Instant> = None;
        loop {
            match self.rx.recv_timeout(self.interval) {
                Ok(written) => {
                    if self.state.is_complete(written) {
                        self.emit(written);
                        return;
                    }
                    if last_frame.is_none_or(|at| at.elapsed() >= self.interval) {
                        self.emit(written);
                        last_frame = Some(Instant::now());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let written = self.state.written();
                    self.emit(written);
                    if self.state.is_complete(written) {
                        return;
                    }
                    last_frame = Some(Instant::now());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.emit_current();
                    return;
                }
            }
        }
    }

    fn run_polling(&mut self) {
        loop {
            match self.rx.recv_timeout(self.interval) {
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {
                    if self.state.reached_total() {
                        let total = self.state.total();
                        self.emit(total);
                        return;
                    }
                    self.emit_current();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.emit_current();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    const ALL: [Policy; 3] = [Policy::Blocking, Policy::Lossy, Policy::Polling];

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<(u64, u64)>>>,
        concluded: Arc<AtomicBool>,
        stall: Duration,
    }

    impl Recorder {
        fn stalled(stall: Duration) -> Self {
            Self {
                stall,
                ..Self::default()
            }
        }

        fn values(&self) -> Vec<u64> {
            self.frames.lock().unwrap().iter().map(|(w, _)| *w).collect()
        }
    }

    impl Render for Recorder {
        fn render(&mut self, written: u64, total: u64) {
            thread::sleep(self.stall);
            self.frames.lock().unwrap().push((written, total));
        }

        fn conclude(&mut self) {
            self.concluded.store(true, Ordering::SeqCst);
        }
    }

    fn drive(policy: Policy, chunks: &[usize], total: u64) -> Vec<u64> {
        let recorder = Recorder::default();
        let reporter = Reporter::new(policy, Duration::from_millis(5));
        let mut writer = reporter
            .wrap(io::sink(), total, Box::new(recorder.clone()))
            .unwrap();
        for &len in chunks {
            writer.write_all(&vec![0u8; len]).unwrap();
        }
        writer.finish();
        assert!(recorder.concluded.load(Ordering::SeqCst));
        recorder.values()
    }

    fn assert_increasing(values: &[u64]) {
        assert!(
            values.windows(2).all(|w| w[0] < w[1]),
            "renders went backwards: {values:?}"
        );
    }

    #[test]
    fn blocking_renders_every_intermediate_state() {
        assert_eq!(drive(Policy::Blocking, &[10, 20, 30], 60), vec![10, 30, 60]);
    }

    #[test]
    fn last_render_equals_total_for_every_policy() {
        let chunks = vec![7; 1000];
        for policy in ALL {
            let values = drive(policy, &chunks, 7000);
            assert_eq!(values.last(), Some(&7000), "{policy:?}");
            assert_increasing(&values);
        }
    }

    #[test]
    fn unknown_total_renders_final_count() {
        for policy in ALL {
            let values = drive(policy, &[3, 4, 5], 0);
            assert_eq!(values.last(), Some(&12), "{policy:?}");
            assert_increasing(&values);
        }
    }

    #[test]
    fn renders_never_exceed_declared_total() {
        for policy in ALL {
            let values = drive(policy, &[6, 9], 10);
            assert!(values.iter().all(|&v| v <= 10), "{policy:?}: {values:?}");
            assert_eq!(values.last(), Some(&10), "{policy:?}");
        }
    }

    #[test]
    fn lossy_writes_do_not_wait_for_a_stalled_renderer() {
        let stall = Duration::from_millis(300);
        let recorder = Recorder::stalled(stall);
        let reporter = Reporter::new(Policy::Lossy, Duration::from_millis(1));
        let mut writer = reporter
            .wrap(io::sink(), 0, Box::new(recorder.clone()))
            .unwrap();

        let chunk = [0u8; 1024];
        let started = Instant::now();
        for _ in 0..10_000 {
            writer.write_all(&chunk).unwrap();
        }
        let elapsed = started.elapsed();
        assert!(elapsed < stall, "writes took {elapsed:?}");

        assert_eq!(writer.written(), 10_000 * 1024);
        writer.finish();
        assert_eq!(recorder.values().last(), Some(&(10_000 * 1024)));
    }

    #[test]
    fn blocking_writes_wait_for_the_renderer() {
        let stall = Duration::from_millis(50);
        let recorder = Recorder::stalled(stall);
        let reporter = Reporter::new(Policy::Blocking, Duration::from_millis(1));
        let mut writer = reporter
            .wrap(io::sink(), 3, Box::new(recorder.clone()))
            .unwrap();

        let started = Instant::now();
        for _ in 0..3 {
            writer.write_all(b"x").unwrap();
        }
        assert!(started.elapsed() >= stall * 2);

        writer.finish();
        assert_eq!(recorder.values(), vec![1, 2, 3]);
    }

    #[test]
    fn polling_stops_on_its_own_once_total_is_reached() {
        let recorder = Recorder::default();
        let reporter = Reporter::new(Policy::Polling, Duration::from_millis(2));
        let mut writer = reporter
            .wrap(io::sink(), 64, Box::new(recorder.clone()))
            .unwrap();
        writer.write_all(&[1u8; 64]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.values().last() != Some(&64) {
            assert!(Instant::now() < deadline, "renderer never saw completion");
            thread::sleep(Duration::from_millis(2));
        }
        writer.finish();
        assert_eq!(recorder.values().last(), Some(&64));
    }

    #[test]
    fn lossy_stops_on_its_own_once_total_is_reached() {
        let recorder = Recorder::stalled(Duration::from_millis(30));
        let reporter = Reporter::new(Policy::Lossy, Duration::from_millis(5));
        let mut writer = reporter
            .wrap(io::sink(), 100, Box::new(recorder.clone()))
            .unwrap();
        for _ in 0..10 {
            writer.write_all(&[0u8; 10]).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while !writer
            .activity
            .handle
            .as_ref()
            .is_some_and(|handle| handle.is_finished())
        {
            assert!(Instant::now() < deadline, "renderer never saw completion");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(recorder.values().last(), Some(&100));
        assert_increasing(&recorder.values());
        assert!(!recorder.concluded.load(Ordering::SeqCst));

        writer.finish();
        assert!(recorder.concluded.load(Ordering::SeqCst));
        assert_eq!(recorder.values().last(), Some(&100));
    }

    #[test]
    fn dropping_the_writer_stops_the_renderer() {
        let recorder = Recorder::default();
        let reporter = Reporter::new(Policy::Lossy, Duration::from_millis(1));
        let mut writer = reporter
            .wrap(io::sink(), 100, Box::new(recorder.clone()))
            .unwrap();
        writer.write_all(&[0u8; 40]).unwrap();
        drop(writer);

        assert!(recorder.concluded.load(Ordering::SeqCst));
        let frames = recorder.values();
        assert_eq!(frames.last(), Some(&40));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(recorder.values(), frames);
    }

    #[test]
    fn finish_returns_the_sink_with_all_bytes() {
        let reporter = Reporter::default();
        let mut writer = reporter
            .wrap(Vec::new(), 11, Box::new(QuietRenderer))
            .unwrap();
        writer.write_all(b"HELLO-WORLD").unwrap();
        assert_eq!(writer.written(), 11);
        assert_eq!(writer.total(), 11);
        assert_eq!(writer.finish(), b"HELLO-WORLD");
    }

    #[test]
    fn reached_total_handles_exact_and_overshoot() {
        let state = ProgressState::new(10);
        assert!(!state.reached_total());
        state.advance(10);
        assert!(state.reached_total());
        state.advance(5);
        assert!(state.reached_total());
        assert_eq!(state.clamp(state.written()), 10);

        let unknown = ProgressState::new(0);
        unknown.advance(5);
        assert!(!unknown.reached_total());
        assert_eq!(unknown.clamp(5), 5);
    }
}
