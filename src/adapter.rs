//! Signal source adapter - one live tap per source, one frame per tick
//!
//! [`SignalSourceAdapter::open`] attaches a tap to a source through an
//! [`AudioBackend`] and returns a [`StreamHandle`]. At most one tap is active
//! per source: opening a source again disconnects the previous tap first, and
//! the old handle then reports [`AdapterError::Detached`].
//!
//! The handle owns one reusable frame. Each [`StreamHandle::next_frame`] copies
//! the newest `2N` samples out of the tap, runs the spectrum analyser over
//! them and overwrites the frame in place.

use crate::audio::{AudioConfig, CaptureError, SpectrumAnalyser};
use crate::frame::{validate_bin_count, FrameError, SampleFrame};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Adapter errors
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Audio source is not ready: {0:?}")]
    SourceUnavailable(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    InvalidConfig(#[from] FrameError),

    #[error("Stream was closed")]
    Closed,

    #[error("Stream was detached by a newer open on {0}")]
    Detached(String),
}

/// A live tap on one audio source
pub trait Tap: Send {
    /// Sample rate of the tapped stream, constant while attached
    fn sample_rate(&self) -> u32;

    /// Copy the newest `out.len()` mono samples into `out`, oldest first
    fn read_latest(&self, out: &mut [f32]);

    /// Detach from the source. Called exactly once by the adapter.
    fn disconnect(&mut self);
}

/// Something that can attach taps to sources
pub trait AudioBackend: Send + Sync {
    /// Attach a tap that can serve at least `window_len` samples per read
    fn attach(&self, source_id: &str, window_len: usize) -> Result<Box<dyn Tap>, AdapterError>;
}

/// Registry slot for one source. `tap` is `None` while the backend is still
/// attaching.
struct ActiveTap {
    generation: u64,
    tap: Option<Box<dyn Tap>>,
}

#[derive(Default)]
struct TapRegistry {
    taps: HashMap<String, ActiveTap>,
    next_generation: u64,
}

impl TapRegistry {
    /// Claim `source_id` for a new generation, returning the displaced tap
    fn reserve(&mut self, source_id: &str) -> (u64, Option<ActiveTap>) {
        let generation = self.next_generation;
        self.next_generation += 1;
        let previous = self.taps.insert(
            source_id.to_string(),
            ActiveTap {
                generation,
                tap: None,
            },
        );
        (generation, previous)
    }

    /// Install an attached tap if `generation` still owns the source.
    /// Hands the tap back when a newer open took over.
    fn install(
        &mut self,
        source_id: &str,
        generation: u64,
        tap: Box<dyn Tap>,
    ) -> Result<(), Box<dyn Tap>> {
        match self.taps.get_mut(source_id) {
            Some(active) if active.generation == generation => {
                active.tap = Some(tap);
                Ok(())
            }
            _ => Err(tap),
        }
    }

    /// Remove the slot for `source_id` if it has `generation`
    fn release(&mut self, source_id: &str, generation: u64) -> Option<ActiveTap> {
        match self.taps.get(source_id) {
            Some(active) if active.generation == generation => self.taps.remove(source_id),
            _ => None,
        }
    }
}

/// Opens taps on audio sources and hands out stream handles
pub struct SignalSourceAdapter<B: AudioBackend> {
    backend: B,
    config: AudioConfig,
    registry: Arc<Mutex<TapRegistry>>,
}

impl<B: AudioBackend> SignalSourceAdapter<B> {
    /// Create an adapter. Fails if the configured bin count is unsupported.
    pub fn new(backend: B, config: AudioConfig) -> Result<Self, AdapterError> {
        validate_bin_count(config.frequency_bin_count)?;
        Ok(Self {
            backend,
            config,
            registry: Arc::new(Mutex::new(TapRegistry::default())),
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Attach to `source_id` and return a handle producing frames.
    ///
    /// A tap already active on the same source is disconnected before the
    /// new one is attached. Failures are returned once; nothing is retried.
    pub fn open(&self, source_id: &str) -> Result<StreamHandle, AdapterError> {
        if source_id.trim().is_empty() {
            return Err(AdapterError::SourceUnavailable(source_id.to_string()));
        }

        let bins = self.config.frequency_bin_count;
        let window_len = self.config.fft_size();

        // Only the reservation happens under the lock; attaching can take as
        // long as the device needs without stalling other streams
        let (generation, previous) = self.registry.lock().reserve(source_id);

        if let Some(mut tap) = previous.and_then(|previous| {
            log::info!(
                "Detaching previous tap on {} (generation {})",
                source_id,
                previous.generation
            );
            previous.tap
        }) {
            tap.disconnect();
        }

        let mut tap = match self.backend.attach(source_id, window_len) {
            Ok(tap) => tap,
            Err(e) => {
                self.registry.lock().release(source_id, generation);
                return Err(e);
            }
        };

        let sample_rate = tap.sample_rate();
        if sample_rate == 0 {
            self.registry.lock().release(source_id, generation);
            tap.disconnect();
            return Err(FrameError::InvalidSampleRate.into());
        }

        let installed = self.registry.lock().install(source_id, generation, tap);
        if let Err(mut tap) = installed {
            log::info!(
                "Open of {} superseded while attaching (generation {})",
                source_id,
                generation
            );
            tap.disconnect();
            return Err(AdapterError::Detached(source_id.to_string()));
        }

        log::info!(
            "Tap attached to {}: {} Hz, {} bins (generation {})",
            source_id,
            sample_rate,
            bins,
            generation
        );

        Ok(StreamHandle {
            source_id: source_id.to_string(),
            generation,
            sample_rate,
            registry: self.registry.clone(),
            analyser: SpectrumAnalyser::new(bins, self.config.min_decibels),
            window: vec![0.0; window_len],
            frame: SampleFrame::silent(bins, sample_rate, self.config.min_decibels),
            closed: false,
        })
    }

    /// Number of taps currently attached
    pub fn active_taps(&self) -> usize {
        self.registry
            .lock()
            .taps
            .values()
            .filter(|active| active.tap.is_some())
            .count()
    }

    /// True if a tap is attached to `source_id`
    pub fn is_active(&self, source_id: &str) -> bool {
        self.registry
            .lock()
            .taps
            .get(source_id)
            .map_or(false, |active| active.tap.is_some())
    }
}

/// Exclusive handle on one attached tap.
///
/// Dropping the handle closes it.
pub struct StreamHandle {
    source_id: String,
    generation: u64,
    sample_rate: u32,
    registry: Arc<Mutex<TapRegistry>>,
    analyser: SpectrumAnalyser,
    window: Vec<f32>,
    frame: SampleFrame,
    closed: bool,
}

impl StreamHandle {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frequency bins (N) per frame
    pub fn bin_count(&self) -> usize {
        self.frame.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Capture the current state of the tap as a frame.
    ///
    /// Never blocks on audio: it reads whatever the tap holds right now, so
    /// frames between two calls are simply skipped. The returned frame is
    /// overwritten by the next call.
    pub fn next_frame(&mut self) -> Result<&SampleFrame, AdapterError> {
        if self.closed {
            return Err(AdapterError::Closed);
        }

        {
            let registry = self.registry.lock();
            match registry.taps.get(&self.source_id) {
                Some(ActiveTap {
                    generation,
                    tap: Some(tap),
                }) if *generation == self.generation => {
                    tap.read_latest(&mut self.window);
                }
                _ => return Err(AdapterError::Detached(self.source_id.clone())),
            }
        }

        let bins = self.frame.len();
        let (spectrum_db, time_domain) = self.frame.buffers_mut();
        self.analyser.process(&self.window, spectrum_db);
        // Time-domain view is the newest N samples of the 2N window
        time_domain.copy_from_slice(&self.window[self.window.len() - bins..]);

        Ok(&self.frame)
    }

    /// Disconnect the tap. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Disconnect outside the lock; stopping a device joins its thread
        let released = self.registry.lock().release(&self.source_id, self.generation);
        if let Some(mut tap) = released.and_then(|active| active.tap) {
            tap.disconnect();
            log::info!(
                "Tap closed on {} (generation {})",
                self.source_id,
                self.generation
            );
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Backend producing a fixed sine, counting live taps
    #[derive(Clone, Default)]
    pub(crate) struct MockBackend {
        pub live: Arc<AtomicUsize>,
        pub attached: Arc<AtomicUsize>,
        pub disconnects: Arc<AtomicUsize>,
        pub fail: bool,
        pub frequency: f32,
        /// Sources whose attach sleeps for `attach_delay`
        pub slow_source: Option<&'static str>,
        pub attach_delay: Duration,
    }

    struct MockTap {
        live: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
        frequency: f32,
        connected: bool,
    }

    impl Tap for MockTap {
        fn sample_rate(&self) -> u32 {
            48000
        }

        fn read_latest(&self, out: &mut [f32]) {
            for (i, s) in out.iter_mut().enumerate() {
                *s = 0.5 * (2.0 * PI * self.frequency * i as f32 / 48000.0).sin();
            }
        }

        fn disconnect(&mut self) {
            assert!(self.connected, "tap disconnected twice");
            self.connected = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl AudioBackend for MockBackend {
        fn attach(&self, source_id: &str, _window_len: usize) -> Result<Box<dyn Tap>, AdapterError> {
            if self.fail {
                return Err(CaptureError::SourceNotFound(source_id.to_string()).into());
            }
            if self.slow_source == Some(source_id) {
                thread::sleep(self.attach_delay);
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            self.attached.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockTap {
                live: self.live.clone(),
                disconnects: self.disconnects.clone(),
                frequency: self.frequency,
                connected: true,
            }))
        }
    }

    pub(crate) fn adapter(backend: MockBackend) -> SignalSourceAdapter<MockBackend> {
        let config = AudioConfig {
            frequency_bin_count: 256,
            ..Default::default()
        };
        SignalSourceAdapter::new(backend, config).unwrap()
    }

    fn mock(frequency: f32) -> MockBackend {
        MockBackend {
            frequency,
            ..Default::default()
        }
    }

    #[test]
    fn open_close_close_leaves_no_tap() {
        let backend = mock(1000.0);
        let adapter = adapter(backend.clone());

        let mut handle = adapter.open("input:mic").unwrap();
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);

        handle.close();
        handle.close();

        assert!(handle.is_closed());
        assert_eq!(adapter.active_taps(), 0);
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert_eq!(backend.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reopening_a_source_keeps_one_tap() {
        let backend = mock(1000.0);
        let adapter = adapter(backend.clone());

        let mut first = adapter.open("system_audio").unwrap();
        let mut second = adapter.open("system_audio").unwrap();

        assert_eq!(adapter.active_taps(), 1);
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);
        assert_eq!(backend.attached.load(Ordering::SeqCst), 2);

        assert!(matches!(first.next_frame(), Err(AdapterError::Detached(_))));
        assert!(second.next_frame().is_ok());

        // Closing the stale handle must not tear down the newer tap
        first.close();
        assert!(adapter.is_active("system_audio"));

        second.close();
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
    }

    fn slow(source: &'static str) -> MockBackend {
        MockBackend {
            frequency: 1000.0,
            slow_source: Some(source),
            attach_delay: Duration::from_millis(400),
            ..Default::default()
        }
    }

    #[test]
    fn slow_attach_does_not_stall_other_streams() {
        let adapter = adapter(slow("input:slow"));
        let mut fast = adapter.open("input:fast").unwrap();

        thread::scope(|s| {
            let opening = s.spawn(|| adapter.open("input:slow").map(|handle| handle.sample_rate()));
            thread::sleep(Duration::from_millis(50));

            let started = Instant::now();
            assert!(fast.next_frame().is_ok());
            let took = started.elapsed();
            assert!(
                took < Duration::from_millis(150),
                "next_frame on input:fast took {took:?} while input:slow was attaching"
            );
            assert!(!adapter.is_active("input:slow"));

            assert_eq!(opening.join().unwrap().unwrap(), 48000);
        });
    }

    #[test]
    fn newer_open_wins_over_one_still_attaching() {
        let backend = slow("input:slow");
        let adapter = adapter(backend.clone());

        thread::scope(|s| {
            let first = s.spawn(|| adapter.open("input:slow").map(|_| ()));
            thread::sleep(Duration::from_millis(50));

            let mut second = adapter.open("input:slow").unwrap();

            assert!(matches!(
                first.join().unwrap(),
                Err(AdapterError::Detached(_))
            ));
            assert!(second.next_frame().is_ok());
            assert_eq!(adapter.active_taps(), 1);
            assert_eq!(backend.live.load(Ordering::SeqCst), 1);
            assert_eq!(backend.attached.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn different_sources_get_independent_taps() {
        let backend = mock(1000.0);
        let adapter = adapter(backend.clone());

        let _a = adapter.open("input:a").unwrap();
        let _b = adapter.open("input:b").unwrap();

        assert_eq!(adapter.active_taps(), 2);
    }

    #[test]
    fn drop_closes_the_handle() {
        let backend = mock(1000.0);
        let adapter = adapter(backend.clone());

        {
            let _handle = adapter.open("input:mic").unwrap();
            assert_eq!(backend.live.load(Ordering::SeqCst), 1);
        }

        assert_eq!(adapter.active_taps(), 0);
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn open_rejects_empty_source() {
        let adapter = adapter(mock(1000.0));
        assert!(matches!(
            adapter.open("  "),
            Err(AdapterError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn open_surfaces_backend_failure_once() {
        let backend = MockBackend {
            fail: true,
            ..Default::default()
        };
        let adapter = adapter(backend.clone());

        assert!(matches!(
            adapter.open("input:missing"),
            Err(AdapterError::Capture(CaptureError::SourceNotFound(_)))
        ));
        assert_eq!(adapter.active_taps(), 0);
    }

    #[test]
    fn new_rejects_unsupported_bin_count() {
        let config = AudioConfig {
            frequency_bin_count: 1000,
            ..Default::default()
        };
        assert!(matches!(
            SignalSourceAdapter::new(mock(1000.0), config),
            Err(AdapterError::InvalidConfig(FrameError::InvalidBinCount(1000)))
        ));
    }

    #[test]
    fn next_frame_after_close_fails() {
        let adapter = adapter(mock(1000.0));
        let mut handle = adapter.open("input:mic").unwrap();
        handle.close();

        assert!(matches!(handle.next_frame(), Err(AdapterError::Closed)));
    }

    #[test]
    fn next_frame_carries_tap_spectrum_and_waveform() {
        // Bin 32 of 256 bins at 48 kHz sits at 3000 Hz
        let adapter = adapter(mock(3000.0));
        let mut handle = adapter.open("input:mic").unwrap();

        let frame = handle.next_frame().unwrap();

        assert_eq!(frame.len(), 256);
        assert_eq!(frame.sample_rate(), 48000);
        let peak_bin = frame
            .frequency_magnitudes_db()
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &db)| if db > best.1 { (i, db) } else { best })
            .0;
        assert_eq!(peak_bin, 32);
        assert!(frame
            .time_domain_samples()
            .iter()
            .all(|s| (-0.5..=0.5).contains(s)));
    }
}
