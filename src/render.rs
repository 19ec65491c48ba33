//! The rendering boundary and a headless renderer.

use log::info;

use crate::config::VisualizerConfig;
use crate::spectrogram::SpectrogramSnapshot;

/// What the scheduler hands to the renderer every tick.
#[derive(Debug, Clone, Copy)]
pub enum RenderFrame<'a> {
    /// Acquisition has not produced a frequency table yet.
    NotReady,
    Ready(SpectrogramSnapshot<'a>),
}

impl<'a> RenderFrame<'a> {
    pub fn snapshot(&self) -> Option<SpectrogramSnapshot<'a>> {
        match self {
            RenderFrame::NotReady => None,
            RenderFrame::Ready(snapshot) => Some(*snapshot),
        }
    }
}

/// Consumes one frame per scheduler tick.
///
/// The snapshot borrows the buffer, so implementations copy what they need
/// before returning.
pub trait RenderingPort {
    fn consume(&mut self, frame: RenderFrame<'_>, config: &VisualizerConfig);
}

/// Summary of one rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameSummary {
    pub peak: f32,
    /// Mean height of the newest slice.
    pub newest_mean: f32,
    pub width: usize,
    pub depth: usize,
}

impl FrameSummary {
    pub fn of(snapshot: &SpectrogramSnapshot<'_>) -> Self {
        let newest = snapshot.newest();
        let newest_mean = if newest.is_empty() {
            0.0
        } else {
            newest.iter().sum::<f32>() / newest.len() as f32
        };
        Self {
            peak: snapshot.peak(),
            newest_mean,
            width: snapshot.width(),
            depth: snapshot.depth(),
        }
    }
}

/// Logs a [`FrameSummary`] every `interval` frames.
pub struct LogRenderer {
    interval: u64,
    frames: u64,
    not_ready: u64,
    last: Option<FrameSummary>,
}

impl LogRenderer {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            frames: 0,
            not_ready: 0,
            last: None,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn not_ready_frames(&self) -> u64 {
        self.not_ready
    }

    pub fn last(&self) -> Option<FrameSummary> {
        self.last
    }
}

impl RenderingPort for LogRenderer {
    fn consume(&mut self, frame: RenderFrame<'_>, config: &VisualizerConfig) {
        self.frames += 1;
        match frame {
            RenderFrame::NotReady => {
                self.not_ready += 1;
                if self.not_ready == 1 || self.frames % self.interval == 0 {
                    info!("Frame {}: waiting for audio", self.frames);
                }
            }
            RenderFrame::Ready(snapshot) => {
                let summary = FrameSummary::of(&snapshot);
                if self.frames % self.interval == 0 {
                    info!(
                        "Frame {}: {}x{} peak {:.2} newest mean {:.2} ({} / {})",
                        self.frames,
                        summary.width,
                        summary.depth,
                        summary.peak,
                        summary.newest_mean,
                        config.palette.label(),
                        config.display_mode.label()
                    );
                }
                self.last = Some(summary);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::SpectrogramBuffer;

    #[test]
    fn test_summary_of_snapshot() {
        let mut buffer = SpectrogramBuffer::new(4, 2);
        buffer.push_heights(&[1.0, 3.0, 0.0, 0.0]);
        let summary = FrameSummary::of(&buffer.snapshot());
        assert_eq!(
            summary,
            FrameSummary { peak: 3.0, newest_mean: 1.0, width: 4, depth: 2 }
        );
    }

    #[test]
    fn test_log_renderer_counts_frames() {
        let config = VisualizerConfig::default();
        let buffer = SpectrogramBuffer::new(2, 2);
        let mut renderer = LogRenderer::new(0);
        renderer.consume(RenderFrame::NotReady, &config);
        assert!(renderer.last().is_none());
        renderer.consume(RenderFrame::Ready(buffer.snapshot()), &config);
        assert_eq!(renderer.frames(), 2);
        assert_eq!(renderer.not_ready_frames(), 1);
        assert_eq!(renderer.last().map(|s| s.width), Some(2));
    }
}
