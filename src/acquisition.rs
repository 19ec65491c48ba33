//! The acquisition boundary: where magnitude frames come from.

use clap::ValueEnum;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyser::{AnalyserSettings, ByteAnalyser};
use crate::audio_stream::InputStream;
use crate::utils::{is_valid_fft_size, DEFAULT_SAMPLE_RATE};

/// Which input to capture: the primary (microphone) or secondary (system/tab audio) one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Microphone,
    System,
}

impl SourceKind {
    pub fn toggled(self) -> Self {
        match self {
            SourceKind::Microphone => SourceKind::System,
            SourceKind::System => SourceKind::Microphone,
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("transform size {0} is not a power of two between 32 and 32768")]
    InvalidTransformSize(usize),
    #[cfg(any(test, feature = "portaudio"))]
    #[error("no input device available for {0:?}")]
    NoDevice(SourceKind),
    #[error("audio backend error: {0}")]
    Backend(String),
    #[error("WAV input error: {0}")]
    Wav(#[from] hound::Error),
    #[error("{0} has no samples")]
    EmptyInput(String),
    #[error("this build does not include the {0} backend")]
    Unsupported(&'static str),
}

/// Supplies one magnitude frame per call plus the metadata needed to map it.
pub trait AcquisitionPort {
    /// Opens `kind`, releasing whatever was open before. No retry on failure.
    fn initialize(&mut self, kind: SourceKind, transform_size: usize) -> Result<(), AcquisitionError>;

    /// Latest magnitudes in `[0, 255]`, one per bin, or `None` when not ready.
    fn pull_frame(&mut self) -> Option<&[u8]>;

    fn sample_rate(&self) -> f32;

    /// Bins per frame; 0 while not ready.
    fn total_bins(&self) -> usize;

    fn set_transform_size(&mut self, transform_size: usize) -> Result<(), AcquisitionError>;

    /// Releases the current source, if any.
    fn release(&mut self) {}
}

struct Session {
    kind: SourceKind,
    sample_rate: f32,
    analyser: ByteAnalyser,
    time_domain: Vec<f32>,
}

/// [`AcquisitionPort`] over any [`InputStream`], analysed with a [`ByteAnalyser`].
pub struct Acquisition<I: InputStream> {
    input: I,
    settings: AnalyserSettings,
    session: Option<Session>,
}

impl<I: InputStream> Acquisition<I> {
    /// `settings` apply to every session this acquisition opens.
    pub fn new(input: I, settings: AnalyserSettings) -> Self {
        Self {
            input,
            settings,
            session: None,
        }
    }

    #[cfg(test)]
    pub fn kind(&self) -> Option<SourceKind> {
        self.session.as_ref().map(|s| s.kind)
    }

    #[cfg(test)]
    pub fn input(&self) -> &I {
        &self.input
    }
}

impl<I: InputStream> AcquisitionPort for Acquisition<I> {
    fn initialize(&mut self, kind: SourceKind, transform_size: usize) -> Result<(), AcquisitionError> {
        if !is_valid_fft_size(transform_size) {
            return Err(AcquisitionError::InvalidTransformSize(transform_size));
        }

        // Never hold two sources open at once.
        self.release();

        let stream = self.input.open(kind)?;
        info!(
            "Opened {:?} input '{}' ({} channels at {} Hz), {}-point transform",
            kind, stream.label, stream.channels, stream.sample_rate, transform_size
        );
        self.session = Some(Session {
            kind,
            sample_rate: stream.sample_rate,
            analyser: ByteAnalyser::new(transform_size, self.settings),
            time_domain: vec![0.0; transform_size],
        });
        Ok(())
    }

    fn pull_frame(&mut self) -> Option<&[u8]> {
        let session = self.session.as_mut()?;
        self.input.read_latest(&mut session.time_domain);
        Some(session.analyser.process(&session.time_domain))
    }

    fn sample_rate(&self) -> f32 {
        self.session
            .as_ref()
            .map_or(DEFAULT_SAMPLE_RATE, |s| s.sample_rate)
    }

    fn total_bins(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.analyser.bin_count())
    }

    fn set_transform_size(&mut self, transform_size: usize) -> Result<(), AcquisitionError> {
        if !is_valid_fft_size(transform_size) {
            return Err(AcquisitionError::InvalidTransformSize(transform_size));
        }
        match self.session.as_mut() {
            Some(session) => {
                if session.analyser.fft_size() != transform_size {
                    info!(
                        "Transform size {} -> {}",
                        session.analyser.fft_size(),
                        transform_size
                    );
                    session.analyser.resize(transform_size);
                    session.time_domain = vec![0.0; transform_size];
                }
            }
            None => debug!("Transform size {} noted before any input is open", transform_size),
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Releasing {:?} input", session.kind);
        }
        if self.input.is_open() {
            self.input.close();
        }
    }
}

impl<I: InputStream> Drop for Acquisition<I> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("Acquisition dropped with an open input, closing it");
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::WindowType;
    use crate::audio_stream::StreamInfo;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Records open/close calls; optionally fails to open the system source.
    struct FakeInput {
        open: bool,
        opens: Rc<Cell<u32>>,
        closes: Rc<Cell<u32>>,
        deny_system: bool,
        level: f32,
    }

    impl FakeInput {
        fn new(opens: Rc<Cell<u32>>, closes: Rc<Cell<u32>>) -> Self {
            Self { open: false, opens, closes, deny_system: false, level: 0.0 }
        }
    }

    impl InputStream for FakeInput {
        fn open(&mut self, kind: SourceKind) -> Result<StreamInfo, AcquisitionError> {
            assert!(!self.open, "opened while another source was still open");
            if self.deny_system && kind == SourceKind::System {
                return Err(AcquisitionError::NoDevice(kind));
            }
            self.open = true;
            self.opens.set(self.opens.get() + 1);
            Ok(StreamInfo { sample_rate: 48000.0, channels: 1, label: "fake".into() })
        }

        fn read_latest(&mut self, dest: &mut [f32]) {
            for (i, s) in dest.iter_mut().enumerate() {
                *s = if i % 2 == 0 { self.level } else { -self.level };
            }
        }

        fn close(&mut self) {
            self.open = false;
            self.closes.set(self.closes.get() + 1);
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    fn fake_with(settings: AnalyserSettings) -> (Acquisition<FakeInput>, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let opens = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));
        let acquisition = Acquisition::new(FakeInput::new(opens.clone(), closes.clone()), settings);
        (acquisition, opens, closes)
    }

    fn fake() -> (Acquisition<FakeInput>, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        fake_with(AnalyserSettings::default())
    }

    #[test]
    fn test_not_ready_before_initialize() {
        let (mut acquisition, _, _) = fake();
        assert_eq!(acquisition.total_bins(), 0);
        assert_eq!(acquisition.sample_rate(), DEFAULT_SAMPLE_RATE);
        assert!(acquisition.pull_frame().is_none());
        assert!(acquisition.set_transform_size(1024).is_ok());
        assert_eq!(acquisition.total_bins(), 0);
    }

    #[test]
    fn test_initialize_reports_metadata() {
        let (mut acquisition, opens, _) = fake();
        acquisition.initialize(SourceKind::Microphone, 2048).unwrap();
        assert_eq!(opens.get(), 1);
        assert_eq!(acquisition.sample_rate(), 48000.0);
        assert_eq!(acquisition.total_bins(), 1024);
        assert_eq!(acquisition.pull_frame().map(<[u8]>::len), Some(1024));
        assert_eq!(acquisition.kind(), Some(SourceKind::Microphone));
    }

    #[test]
    fn test_switching_source_closes_previous_first() {
        let (mut acquisition, opens, closes) = fake();
        acquisition.initialize(SourceKind::Microphone, 1024).unwrap();
        acquisition.initialize(SourceKind::System, 1024).unwrap();
        assert_eq!(opens.get(), 2);
        assert_eq!(closes.get(), 1);
        assert_eq!(acquisition.kind(), Some(SourceKind::System));
    }

    #[test]
    fn test_failed_initialize_leaves_nothing_open() {
        let (mut acquisition, _, closes) = fake();
        acquisition.input.deny_system = true;
        acquisition.initialize(SourceKind::Microphone, 1024).unwrap();
        let err = acquisition.initialize(SourceKind::System, 1024).unwrap_err();
        assert!(matches!(err, AcquisitionError::NoDevice(SourceKind::System)));
        assert_eq!(closes.get(), 1);
        assert!(!acquisition.input().is_open());
        assert_eq!(acquisition.total_bins(), 0);
        assert!(acquisition.pull_frame().is_none());
    }

    #[test]
    fn test_invalid_transform_size_is_rejected() {
        let (mut acquisition, opens, _) = fake();
        assert!(matches!(
            acquisition.initialize(SourceKind::Microphone, 1000),
            Err(AcquisitionError::InvalidTransformSize(1000))
        ));
        assert_eq!(opens.get(), 0);
        acquisition.initialize(SourceKind::Microphone, 512).unwrap();
        assert!(acquisition.set_transform_size(3).is_err());
        assert_eq!(acquisition.total_bins(), 256);
    }

    #[test]
    fn test_set_transform_size_changes_bins() {
        let (mut acquisition, _, _) = fake();
        acquisition.input.level = 0.5;
        acquisition.initialize(SourceKind::Microphone, 512).unwrap();
        acquisition.set_transform_size(4096).unwrap();
        assert_eq!(acquisition.total_bins(), 2048);
        let frame = acquisition.pull_frame().unwrap();
        assert_eq!(frame.len(), 2048);
        // Alternating +/- samples put all energy at the top of the spectrum.
        assert!(frame[2047] > frame[0]);
    }

    #[test]
    fn test_window_setting_reaches_analyser() {
        // Alternating +/- samples land exactly on the Nyquist bin. A rectangular
        // window keeps all of it there; the 512-point Nyquist bin itself is not
        // reported, so every reported bin is silent.
        let rectangular = AnalyserSettings {
            window: WindowType::Rectangular,
            ..AnalyserSettings::default()
        };
        let (mut acquisition, _, _) = fake_with(rectangular);
        acquisition.input.level = 0.5;
        acquisition.initialize(SourceKind::Microphone, 512).unwrap();
        let frame = acquisition.pull_frame().unwrap();
        assert!(frame.iter().all(|&b| b == 0));

        // Blackman leaks into the bins just below Nyquist.
        let (mut acquisition, _, _) = fake();
        acquisition.input.level = 0.5;
        acquisition.initialize(SourceKind::Microphone, 512).unwrap();
        let frame = acquisition.pull_frame().unwrap();
        assert!(frame[255] > 0);
    }

    #[test]
    fn test_release_closes_input() {
        let (mut acquisition, _, closes) = fake();
        acquisition.initialize(SourceKind::Microphone, 512).unwrap();
        acquisition.release();
        assert_eq!(closes.get(), 1);
        assert_eq!(acquisition.total_bins(), 0);
        acquisition.release();
        assert_eq!(closes.get(), 1);
    }
}
