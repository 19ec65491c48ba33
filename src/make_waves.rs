//! Synthetic inputs for running without audio hardware.

use std::f64::consts::PI;

use log::debug;

use crate::acquisition::{AcquisitionError, SourceKind};
use crate::audio_stream::{analysis_ring, frames_to_generate, InputStream, PlaybackClock, SampleRing, StreamInfo};

const VOICE_FUNDAMENTAL_HZ: f32 = 220.0;
const VOICE_PARTIALS: usize = 8;
/// Syllable-like amplitude wobble.
const VOICE_TREMOLO_HZ: f64 = 3.0;
const SWEEP_LOW_HZ: f64 = 40.0;
const SWEEP_HIGH_HZ: f64 = 16000.0;
const SWEEP_PERIOD_SECS: f64 = 6.0;

/// Partials of a harmonic stack with `1/k` rolloff, normalized to unit sum.
pub fn harmonic_partials(fundamental: f32, count: usize) -> Vec<(f32, f32)> {
    let total: f32 = (1..=count).map(|k| 1.0 / k as f32).sum();
    (1..=count)
        .map(|k| (fundamental * k as f32, 1.0 / (k as f32 * total)))
        .collect()
}

/// Formats partials for debug output
pub fn format_partials_debug(partials: &[(f32, f32)]) -> String {
    partials
        .iter()
        .filter(|&&(f, a)| f > 0.0 && a > 0.0)
        .map(|&(freq, amp)| format!("({:.1} Hz, {:.3})", freq, amp))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
enum Voice {
    Harmonic(Vec<(f32, f32)>),
    Sweep { low: f64, high: f64, period: f64 },
}

impl Voice {
    fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Microphone => {
                Voice::Harmonic(harmonic_partials(VOICE_FUNDAMENTAL_HZ, VOICE_PARTIALS))
            }
            SourceKind::System => Voice::Sweep {
                low: SWEEP_LOW_HZ,
                high: SWEEP_HIGH_HZ,
                period: SWEEP_PERIOD_SECS,
            },
        }
    }

    fn label(&self) -> String {
        match self {
            Voice::Harmonic(partials) => format!("harmonic tone {:.0} Hz", partials[0].0),
            Voice::Sweep { low, high, .. } => format!("log sweep {:.0}-{:.0} Hz", low, high),
        }
    }

    /// Sample at absolute frame `n`, computed from time so it never drifts.
    fn sample(&self, n: u64, sample_rate: f64) -> f32 {
        let t = n as f64 / sample_rate;
        match self {
            Voice::Harmonic(partials) => {
                let tone: f64 = partials
                    .iter()
                    .map(|&(freq, amp)| f64::from(amp) * (2.0 * PI * f64::from(freq) * t).sin())
                    .sum();
                let envelope = 0.6 + 0.4 * (2.0 * PI * VOICE_TREMOLO_HZ * t).sin();
                (0.5 * envelope * tone) as f32
            }
            Voice::Sweep { low, high, period } => {
                // Exponential chirp restarting every period.
                let ratio = high / low;
                let k = ratio.ln() / period;
                let local = t % period;
                let phase = 2.0 * PI * low * ((k * local).exp() - 1.0) / k;
                (0.5 * phase.sin()) as f32
            }
        }
    }
}

/// Deterministic test signal: a voice-like harmonic stack for the microphone
/// kind, a repeating sweep across the audible range for the system kind.
pub struct ToneInput {
    sample_rate: f32,
    clock: PlaybackClock,
    ring: SampleRing,
    voice: Option<Voice>,
    produced: u64,
}

impl ToneInput {
    pub fn new(sample_rate: f32, clock: PlaybackClock) -> Self {
        Self {
            sample_rate,
            clock,
            ring: analysis_ring(),
            voice: None,
            produced: 0,
        }
    }
}

impl InputStream for ToneInput {
    fn open(&mut self, kind: SourceKind) -> Result<StreamInfo, AcquisitionError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(AcquisitionError::Backend(format!(
                "invalid tone sample rate {}",
                self.sample_rate
            )));
        }
        let voice = Voice::for_kind(kind);
        if let Voice::Harmonic(partials) = &voice {
            debug!("Tone partials: {}", format_partials_debug(partials));
        }
        let label = voice.label();
        self.voice = Some(voice);
        self.ring.clear();
        self.clock.restart();
        self.produced = 0;
        Ok(StreamInfo {
            sample_rate: self.sample_rate,
            channels: 1,
            label,
        })
    }

    fn read_latest(&mut self, dest: &mut [f32]) {
        let Some(voice) = &self.voice else {
            dest.fill(0.0);
            return;
        };
        let target = self.clock.advance(self.sample_rate);
        let (start, count) = frames_to_generate(self.produced, target, &self.ring);
        let rate = f64::from(self.sample_rate);
        for n in start..start + count {
            self.ring.push(voice.sample(n, rate));
        }
        self.produced = self.produced.max(target);
        self.ring.copy_latest(dest);
    }

    fn close(&mut self) {
        self.voice = None;
    }

    fn is_open(&self) -> bool {
        self.voice.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{Acquisition, AcquisitionPort};
    use crate::analyser::AnalyserSettings;

    fn peak_bin(frame: &[u8]) -> usize {
        frame
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_partials_are_normalized() {
        let partials = harmonic_partials(100.0, 4);
        assert_eq!(partials[3].0, 400.0);
        let sum: f32 = partials.iter().map(|p| p.1).sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(partials[0].1 > partials[1].1);
        assert_eq!(
            format_partials_debug(&partials[..1]),
            format!("(100.0 Hz, {:.3})", partials[0].1)
        );
    }

    #[test]
    fn test_closed_input_reads_silence() {
        let mut tone = ToneInput::new(48000.0, PlaybackClock::stepped(60));
        let mut out = [1.0; 64];
        tone.read_latest(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_same_clock_same_samples() {
        let mut a = ToneInput::new(48000.0, PlaybackClock::stepped(48));
        let mut b = ToneInput::new(48000.0, PlaybackClock::stepped(48));
        a.open(SourceKind::System).unwrap();
        b.open(SourceKind::System).unwrap();
        let (mut x, mut y) = ([0.0; 1024], [0.0; 1024]);
        for _ in 0..3 {
            a.read_latest(&mut x);
            b.read_latest(&mut y);
        }
        assert_eq!(x, y);
        assert!(x.iter().any(|&s| s != 0.0));
        assert!(x.iter().all(|s| s.abs() <= 0.5));
    }

    #[test]
    fn test_stepped_clock_fills_ring_gradually() {
        let mut tone = ToneInput::new(48000.0, PlaybackClock::stepped(480));
        tone.open(SourceKind::Microphone).unwrap();
        let mut out = [0.0; 256];
        tone.read_latest(&mut out);
        // One read at 480 reads per second is 100 frames; the rest is leading silence.
        assert!(out[..156].iter().all(|&s| s == 0.0));
        assert!(out[156..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_harmonic_voice_peaks_near_fundamental() {
        // A tenth of a second per read is enough to fill a 4096-point window.
        let mut acquisition = Acquisition::new(
            ToneInput::new(44100.0, PlaybackClock::stepped(10)),
            AnalyserSettings::default(),
        );
        acquisition.initialize(SourceKind::Microphone, 4096).unwrap();
        let frame = acquisition.pull_frame().unwrap().to_vec();
        // 220 Hz at 44100/4096 Hz per bin.
        let expected = (220.0_f32 / (44100.0 / 4096.0)).round() as i64;
        assert!((peak_bin(&frame) as i64 - expected).abs() <= 1);
    }

    #[test]
    fn test_invalid_rate_fails_to_open() {
        let mut tone = ToneInput::new(0.0, PlaybackClock::stepped(1));
        assert!(tone.open(SourceKind::Microphone).is_err());
        assert!(!tone.is_open());
    }
}
