use std::time::Instant;

use log::debug;

use crate::acquisition::{AcquisitionError, SourceKind};
use crate::utils::MAX_FFT_SIZE;

/// Mono ring of the most recent samples.
///
/// Writers push continuously and overwrite the oldest data; readers copy out
/// the latest window in playback order.
pub struct SampleRing {
    buffer: Vec<f32>,
    head: usize,
    filled: usize,
}

impl SampleRing {
    /// Creates a new ring.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of samples retained; at least one slot is always allocated
    ///
    /// # Returns
    ///
    /// An empty ring whose unwritten positions read as silence
    pub fn new(capacity: usize) -> Self {
        SampleRing {
            buffer: vec![0.0; capacity.max(1)],
            head: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Samples written so far, capped at capacity.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn push(&mut self, value: f32) {
        self.buffer[self.head] = value;
        self.head = (self.head + 1) % self.buffer.len(); // Wrap around
        self.filled = (self.filled + 1).min(self.buffer.len());
    }

    /// Pushes interleaved frames, averaging channels down to mono.
    ///
    /// # Arguments
    ///
    /// * `data` - Interleaved samples as delivered by the capture callback
    /// * `channels` - Samples per frame; a trailing partial frame is dropped
    #[cfg(any(test, feature = "portaudio"))]
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        let channels = channels.max(1);
        for frame in data.chunks_exact(channels) {
            let sum: f32 = frame.iter().sum();
            self.push(sum / channels as f32);
        }
    }

    /// Fills `dest` with the latest `dest.len()` samples, oldest first.
    ///
    /// # Arguments
    ///
    /// * `dest` - Output window; its length decides how many samples are copied
    ///
    /// Positions never written are zero, so a window wider than the ring or
    /// than what has been pushed so far starts with silence.
    pub fn copy_latest(&self, dest: &mut [f32]) {
        let cap = self.buffer.len();
        let wanted = dest.len();
        let available = self.filled.min(wanted);
        let silent = wanted - available;
        dest[..silent].fill(0.0);

        let start = (self.head + cap - available) % cap;
        for (i, slot) in dest[silent..].iter_mut().enumerate() {
            *slot = self.buffer[(start + i) % cap];
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.head = 0;
        self.filled = 0;
    }
}

/// What an opened input reports about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: f32,
    pub channels: usize,
    pub label: String,
}

/// A source of time-domain audio that the acquisition port can analyse.
pub trait InputStream {
    /// Opens the input for `kind`. Callers close any previous stream first.
    fn open(&mut self, kind: SourceKind) -> Result<StreamInfo, AcquisitionError>;

    /// Copies the most recent `dest.len()` mono samples into `dest`.
    fn read_latest(&mut self, dest: &mut [f32]);

    /// Releases the underlying resource. Safe to call when already closed.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Drives synthetic and file inputs that have no hardware clock.
#[derive(Debug, Clone)]
pub enum PlaybackClock {
    /// Follows wall time since the input was opened.
    Realtime { started: Option<Instant> },
    /// Advances `1 / reads_per_second` seconds of audio per read, whatever
    /// the wall clock says.
    Stepped { reads_per_second: u32, reads: u64 },
}

impl PlaybackClock {
    pub fn realtime() -> Self {
        PlaybackClock::Realtime { started: None }
    }

    /// Clock for deterministic runs, typically one read per scheduler tick.
    pub fn stepped(reads_per_second: u32) -> Self {
        PlaybackClock::Stepped {
            reads_per_second: reads_per_second.max(1),
            reads: 0,
        }
    }

    pub fn restart(&mut self) {
        match self {
            PlaybackClock::Realtime { started } => *started = Some(Instant::now()),
            PlaybackClock::Stepped { reads, .. } => *reads = 0,
        }
    }

    /// Frame position the input should have produced up to now.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Rate of the input being driven, in Hz
    ///
    /// # Returns
    ///
    /// Total frames since the last restart
    pub fn advance(&mut self, sample_rate: f32) -> u64 {
        match self {
            PlaybackClock::Realtime { started } => {
                let started = *started.get_or_insert_with(Instant::now);
                (started.elapsed().as_secs_f64() * f64::from(sample_rate)) as u64
            }
            PlaybackClock::Stepped { reads_per_second, reads } => {
                *reads += 1;
                (*reads as f64 * f64::from(sample_rate) / f64::from(*reads_per_second)).round() as u64
            }
        }
    }
}

/// Ring sized for the largest transform the analyser accepts.
pub fn analysis_ring() -> SampleRing {
    SampleRing::new(MAX_FFT_SIZE)
}

/// Number of frames to generate to catch up from `produced` to `target`.
///
/// Anything older than the ring would be overwritten anyway, so long gaps
/// (e.g. after a stall) are skipped.
pub fn frames_to_generate(produced: u64, target: u64, ring: &SampleRing) -> (u64, u64) {
    let behind = target.saturating_sub(produced);
    let cap = ring.capacity() as u64;
    if behind > cap {
        debug!("Input fell {} frames behind, skipping ahead", behind - cap);
        (target - cap, cap)
    } else {
        (produced, behind)
    }
}

#[cfg(feature = "portaudio")]
pub use live::PortAudioInput;

#[cfg(feature = "portaudio")]
mod live {
    use std::sync::{Arc, Mutex};

    use log::{error, info, warn};
    use portaudio as pa;
    use portaudio::stream::InputCallbackArgs;

    use super::{analysis_ring, InputStream, SampleRing, StreamInfo};
    use crate::acquisition::{AcquisitionError, SourceKind};

    const FRAMES_PER_BUFFER: u32 = 256;
    const LOOPBACK_HINTS: [&str; 5] = ["monitor", "loopback", "stereo mix", "blackhole", "what u hear"];

    /// Live capture through PortAudio.
    pub struct PortAudioInput {
        pa: pa::PortAudio,
        stream: Option<pa::Stream<pa::NonBlocking, pa::Input<f32>>>,
        ring: Arc<Mutex<SampleRing>>,
    }

    impl PortAudioInput {
        pub fn new() -> Result<Self, AcquisitionError> {
            let pa = pa::PortAudio::new().map_err(backend)?;
            info!("PortAudio initialized.");
            Ok(Self {
                pa,
                stream: None,
                ring: Arc::new(Mutex::new(analysis_ring())),
            })
        }

        fn select_device(&self, kind: SourceKind) -> Result<pa::DeviceIndex, AcquisitionError> {
            match kind {
                SourceKind::Microphone => self.pa.default_input_device().map_err(backend),
                SourceKind::System => {
                    for device in self.pa.devices().map_err(backend)? {
                        let (index, info) = device.map_err(backend)?;
                        let name = info.name.to_lowercase();
                        if info.max_input_channels > 0
                            && LOOPBACK_HINTS.iter().any(|hint| name.contains(hint))
                        {
                            info!("Using '{}' for system audio", info.name);
                            return Ok(index);
                        }
                    }
                    Err(AcquisitionError::NoDevice(kind))
                }
            }
        }
    }

    impl InputStream for PortAudioInput {
        fn open(&mut self, kind: SourceKind) -> Result<StreamInfo, AcquisitionError> {
            let device_index = self.select_device(kind)?;
            let device_info = self.pa.device_info(device_index).map_err(backend)?;
            let channels = device_info.max_input_channels.clamp(1, 2);
            let sample_rate = device_info.default_sample_rate;
            let label = device_info.name.to_string();

            let params = pa::StreamParameters::<f32>::new(
                device_index,
                channels,
                true,
                device_info.default_low_input_latency,
            );
            let settings = pa::InputStreamSettings::new(params, sample_rate, FRAMES_PER_BUFFER);

            if let Ok(mut ring) = self.ring.lock() {
                ring.clear();
            }
            let ring = Arc::clone(&self.ring);
            let channel_count = channels as usize;

            info!("Opening non-blocking PortAudio stream on '{}'.", label);
            let mut stream = self
                .pa
                .open_non_blocking_stream(settings, move |args: InputCallbackArgs<f32>| {
                    if let Ok(mut ring) = ring.lock() {
                        ring.push_interleaved(args.buffer, channel_count);
                    }
                    pa::Continue
                })
                .map_err(backend)?;
            stream.start().map_err(backend)?;
            self.stream = Some(stream);

            Ok(StreamInfo {
                sample_rate: sample_rate as f32,
                channels: channel_count,
                label,
            })
        }

        fn read_latest(&mut self, dest: &mut [f32]) {
            match self.ring.lock() {
                Ok(ring) => ring.copy_latest(dest),
                Err(_) => {
                    error!("Capture ring lock poisoned");
                    dest.fill(0.0);
                }
            }
        }

        fn close(&mut self) {
            if let Some(mut stream) = self.stream.take() {
                if let Err(e) = stream.stop() {
                    warn!("Failed to stop PortAudio stream: {}", e);
                }
                if let Err(e) = stream.close() {
                    warn!("Failed to close PortAudio stream: {}", e);
                }
                info!("PortAudio stream closed.");
            }
        }

        fn is_open(&self) -> bool {
            self.stream.is_some()
        }
    }

    impl Drop for PortAudioInput {
        fn drop(&mut self) {
            self.close();
        }
    }

    fn backend(e: pa::Error) -> AcquisitionError {
        AcquisitionError::Backend(e.to_string())
    }
}
