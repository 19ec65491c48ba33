use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use log::{info, warn};

use crate::acquisition::{AcquisitionError, SourceKind};
use crate::audio_stream::{analysis_ring, frames_to_generate, InputStream, PlaybackClock, SampleRing, StreamInfo};
use crate::conversion::{downmix_to_mono, PackedInt};

/// Decoded mono contents of a WAV file.
#[derive(Debug, Clone)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Reads any integer or float WAV and downmixes it to mono.
pub fn read_wav(path: &Path) -> Result<WavClip, AcquisitionError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    let samples = match spec.sample_format {
        SampleFormat::Float => {
            let raw = reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?;
            downmix_to_mono(&raw, channels)
        }
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let raw = reader
                .samples::<i32>()
                .map(|s| s.map(|value| PackedInt { value, bits }))
                .collect::<Result<Vec<_>, _>>()?;
            downmix_to_mono(&raw, channels)
        }
    };
    Ok(WavClip {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Loops a WAV file as if it were a live input.
///
/// Both source kinds play the same file.
pub struct WavInput {
    path: PathBuf,
    clock: PlaybackClock,
    ring: SampleRing,
    clip: Option<WavClip>,
    produced: u64,
}

impl WavInput {
    pub fn new(path: impl Into<PathBuf>, clock: PlaybackClock) -> Self {
        Self {
            path: path.into(),
            clock,
            ring: analysis_ring(),
            clip: None,
            produced: 0,
        }
    }
}

impl InputStream for WavInput {
    fn open(&mut self, kind: SourceKind) -> Result<StreamInfo, AcquisitionError> {
        let clip = read_wav(&self.path)?;
        if clip.samples.is_empty() {
            return Err(AcquisitionError::EmptyInput(self.path.display().to_string()));
        }
        if kind == SourceKind::System {
            warn!("WAV input has no system source, playing the file instead");
        }
        info!(
            "Loaded {} ({} frames, {} channels at {} Hz)",
            self.path.display(),
            clip.samples.len(),
            clip.channels,
            clip.sample_rate
        );
        let info = StreamInfo {
            sample_rate: clip.sample_rate as f32,
            channels: usize::from(clip.channels),
            label: self.path.display().to_string(),
        };
        self.clip = Some(clip);
        self.ring.clear();
        self.clock.restart();
        self.produced = 0;
        Ok(info)
    }

    fn read_latest(&mut self, dest: &mut [f32]) {
        let Some(clip) = &self.clip else {
            dest.fill(0.0);
            return;
        };
        let target = self.clock.advance(clip.sample_rate as f32);
        let (start, count) = frames_to_generate(self.produced, target, &self.ring);
        let len = clip.samples.len() as u64;
        for n in start..start + count {
            self.ring.push(clip.samples[(n % len) as usize]);
        }
        self.produced = self.produced.max(target);
        self.ring.copy_latest(dest);
    }

    fn close(&mut self) {
        self.clip = None;
    }

    fn is_open(&self) -> bool {
        self.clip.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_ramp(path: &Path, channels: u16, frames: i16) {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for c in 0..channels {
                // Right channel is silent so the mix halves the left one.
                let value = if c == 0 { i * 1000 } else { 0 };
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_read_int_wav_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp(&path, 2, 4);
        let clip = read_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.samples.len(), 4);
        let expected = 2000.0 / 32768.0 / 2.0;
        assert!((clip.samples[2] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_read_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for s in [0.25_f32, -0.5, 1.0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        assert_eq!(read_wav(&path).unwrap().samples, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_playback_loops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");
        write_ramp(&path, 1, 3);
        // 1000 reads per second at 8 kHz is 8 frames per read.
        let mut input = WavInput::new(&path, PlaybackClock::stepped(1000));
        let info = input.open(SourceKind::Microphone).unwrap();
        assert_eq!(info.sample_rate, 8000.0);
        let mut out = [0.0; 8];
        input.read_latest(&mut out);
        let step = 1000.0 / 32768.0;
        let expected = [0.0, step, 2.0 * step, 0.0, step, 2.0 * step, 0.0, step];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = WavInput::new(dir.path().join("absent.wav"), PlaybackClock::stepped(1));
        assert!(matches!(
            input.open(SourceKind::Microphone),
            Err(AcquisitionError::Wav(_))
        ));
        assert!(!input.is_open());
    }

    #[test]
    fn test_empty_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_ramp(&path, 1, 0);
        let mut input = WavInput::new(&path, PlaybackClock::stepped(1));
        assert!(matches!(
            input.open(SourceKind::Microphone),
            Err(AcquisitionError::EmptyInput(_))
        ));
    }
}
