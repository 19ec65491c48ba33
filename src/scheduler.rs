//! Per-refresh driver of the acquisition → mapping → buffer → render pipeline.

use log::{debug, info, warn};

use crate::acquisition::{AcquisitionError, AcquisitionPort, SourceKind};
use crate::config::VisualizerConfig;
#[cfg(test)]
use crate::frequency_map::FrequencyIndexTable;
use crate::frequency_map::FrequencyMapper;
use crate::render::{RenderFrame, RenderingPort};
use crate::spectrogram::SpectrogramBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotStarted,
    Running,
    Paused,
}

/// What a single [`FrameScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub ingested: bool,
    /// Whether the renderer got a snapshot rather than `NotReady`.
    pub ready: bool,
    pub frame_count: u64,
    pub state: SchedulerState,
}

/// Owns the acquisition port, the frequency mapper and the height field.
///
/// Driven from a single thread, one `tick` per display refresh.
pub struct FrameScheduler<A: AcquisitionPort> {
    acquisition: A,
    mapper: FrequencyMapper,
    buffer: SpectrogramBuffer,
    state: SchedulerState,
    frame_count: u64,
    dropped_frames: u64,
    // Survives source switches so a paused view stays paused.
    paused: bool,
}

impl<A: AcquisitionPort> FrameScheduler<A> {
    /// # Panics
    ///
    /// Panics if `config.depth` is zero; configs from a `ConfigStore` never are.
    pub fn new(acquisition: A, config: &VisualizerConfig) -> Self {
        Self {
            acquisition,
            mapper: FrequencyMapper::new(),
            buffer: SpectrogramBuffer::new(config.width, config.depth),
            state: SchedulerState::NotStarted,
            frame_count: 0,
            dropped_frames: 0,
            paused: false,
        }
    }

    /// Opens `kind`, tearing down the current source first.
    ///
    /// Also used for switching sources and for user-initiated retry. On
    /// failure the scheduler is `NotStarted` with nothing left open.
    pub fn start(&mut self, kind: SourceKind, transform_size: usize) -> Result<(), AcquisitionError> {
        self.mapper.invalidate();
        match self.acquisition.initialize(kind, transform_size) {
            Ok(()) => {
                self.state = if self.paused {
                    SchedulerState::Paused
                } else {
                    SchedulerState::Running
                };
                info!("Acquisition started on {:?}", kind);
                Ok(())
            }
            Err(e) => {
                self.acquisition.release();
                self.state = SchedulerState::NotStarted;
                warn!("Acquisition failed for {:?}: {}", kind, e);
                Err(e)
            }
        }
    }

    /// The new bin count is picked up by the next tick.
    pub fn set_transform_size(&mut self, transform_size: usize) -> Result<(), AcquisitionError> {
        self.acquisition.set_transform_size(transform_size)
    }

    pub fn toggle_pause(&mut self) -> SchedulerState {
        let paused = self.state == SchedulerState::Running;
        self.set_paused(paused);
        self.state
    }

    /// Has no effect on the state until acquisition has started, but is remembered.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        self.state = match self.state {
            SchedulerState::NotStarted => SchedulerState::NotStarted,
            _ if paused => SchedulerState::Paused,
            _ => SchedulerState::Running,
        };
        debug!("Scheduler {:?} at frame {}", self.state, self.frame_count);
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames pulled but rejected by the buffer since construction.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn buffer(&self) -> &SpectrogramBuffer {
        &self.buffer
    }

    #[cfg(test)]
    pub fn frequency_table(&self) -> Option<&FrequencyIndexTable> {
        self.mapper.table()
    }

    #[cfg(test)]
    pub fn acquisition(&self) -> &A {
        &self.acquisition
    }

    /// Runs one display frame and always renders exactly once.
    pub fn tick<R: RenderingPort + ?Sized>(
        &mut self,
        config: &VisualizerConfig,
        renderer: &mut R,
    ) -> TickOutcome {
        self.buffer.reconfigure(config.width, config.depth);

        if self.state == SchedulerState::NotStarted {
            renderer.consume(RenderFrame::NotReady, config);
            return self.outcome(false, false);
        }

        let rebuilt = self.mapper.refresh(
            self.acquisition.sample_rate(),
            self.acquisition.total_bins(),
            config.width,
        );
        if rebuilt {
            if let Some(table) = self.mapper.table() {
                debug!(
                    target: "scheduler",
                    "Frame {}: {} columns over {} bins",
                    self.frame_count,
                    table.len(),
                    table.total_bins()
                );
            }
        }
        if self.mapper.table().is_none() {
            renderer.consume(RenderFrame::NotReady, config);
            return self.outcome(false, false);
        }

        let mut ingested = false;
        if self.state == SchedulerState::Running {
            let divisor = u64::from(config.speed_divisor.max(1));
            if self.frame_count % divisor == 0 {
                if let Some(frame) = self.acquisition.pull_frame() {
                    match self.buffer.ingest(frame, self.mapper.table(), config.ingest_params()) {
                        Ok(()) => ingested = true,
                        Err(e) => {
                            self.dropped_frames += 1;
                            debug!(target: "scheduler", "Dropping frame {}: {}", self.frame_count, e);
                        }
                    }
                }
            }
            self.frame_count += 1;
        }

        renderer.consume(RenderFrame::Ready(self.buffer.snapshot()), config);
        self.outcome(ingested, true)
    }

    fn outcome(&self, ingested: bool, ready: bool) -> TickOutcome {
        TickOutcome {
            ingested,
            ready,
            frame_count: self.frame_count,
            state: self.state,
        }
    }
}

impl<A: AcquisitionPort> Drop for FrameScheduler<A> {
    fn drop(&mut self) {
        self.acquisition.release();
    }
}
