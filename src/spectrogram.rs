//! Scrolling height field: `depth` time slices of `width` columns each.
//!
//! Storage is a ring of slices. Ingesting overwrites the oldest slot and moves
//! the ring head, so a new slice costs O(width) instead of shifting the whole
//! field. Readers always see slices in oldest-to-newest order through
//! [`SpectrogramSnapshot`].

use log::{debug, info};
use thiserror::Error;

use crate::frequency_map::FrequencyIndexTable;
use crate::utils::MAX_RAW_MAGNITUDE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("frequency table has {table} columns but the buffer has {width}")]
    TableWidthMismatch { table: usize, width: usize },
    #[error("frame has {len} bins but the table reads bin {needed}")]
    FrameTooShort { len: usize, needed: usize },
}

/// Per-ingest scaling parameters taken from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestParams {
    /// Raw magnitudes strictly below this read as silence.
    pub gate_threshold: u8,
    pub amplitude_scale: f32,
}

/// Gate, normalise and scale one raw magnitude.
pub fn height_for(raw: u8, params: IngestParams) -> f32 {
    let normalized = if raw < params.gate_threshold {
        0.0
    } else {
        f32::from(raw) / MAX_RAW_MAGNITUDE
    };
    normalized * params.amplitude_scale
}

pub struct SpectrogramBuffer {
    cells: Vec<f32>,
    width: usize,
    depth: usize,
    head: usize,  // Physical slot of the oldest slice
    scratch: Vec<f32>,
    ingested: u64,
}

impl SpectrogramBuffer {
    /// Creates a new zero-filled height field.
    ///
    /// # Arguments
    ///
    /// * `width` - Columns per slice; 0 makes every ingest a no-op
    /// * `depth` - Slices retained before the oldest is overwritten
    ///
    /// # Panics
    ///
    /// Panics if `depth` is zero.
    pub fn new(width: usize, depth: usize) -> Self {
        assert!(depth > 0, "spectrogram depth must be at least one slice");
        Self {
            cells: vec![0.0; width * depth],
            width,
            depth,
            head: 0,
            scratch: vec![0.0; width],
            ingested: 0,
        }
    }

    /// Number of slices ingested since the last (re)allocation.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    /// Reallocates to the new dimensions, discarding history.
    ///
    /// # Arguments
    ///
    /// * `width` - New column count
    /// * `depth` - New slice count
    ///
    /// Calling with the current dimensions keeps the content.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is zero.
    pub fn reconfigure(&mut self, width: usize, depth: usize) {
        assert!(depth > 0, "spectrogram depth must be at least one slice");
        if width == self.width && depth == self.depth {
            return;
        }
        info!(
            "Reallocating spectrogram {}x{} -> {}x{}",
            self.width, self.depth, width, depth
        );
        *self = Self::new(width, depth);
    }

    /// Maps one magnitude frame through `table` and appends it as the newest slice.
    ///
    /// # Arguments
    ///
    /// * `magnitudes` - Raw bytes, one per frequency bin
    /// * `table` - Column-to-bin lookup; without one every column reads zero
    /// * `params` - Gate and amplitude applied to each sampled byte
    ///
    /// # Returns
    ///
    /// `Ok(())` once the slice is written, or the reason the frame was rejected.
    /// Validation happens before any cell is touched, so a rejected frame
    /// leaves the buffer unchanged.
    pub fn ingest(
        &mut self,
        magnitudes: &[u8],
        table: Option<&FrequencyIndexTable>,
        params: IngestParams,
    ) -> Result<(), IngestError> {
        if self.width == 0 {
            return Ok(());
        }

        match table {
            Some(table) => {
                if table.len() != self.width {
                    return Err(IngestError::TableWidthMismatch {
                        table: table.len(),
                        width: self.width,
                    });
                }
                if let Some(needed) = table.max_index() {
                    if needed >= magnitudes.len() {
                        return Err(IngestError::FrameTooShort {
                            len: magnitudes.len(),
                            needed,
                        });
                    }
                }
                for (height, &bin) in self.scratch.iter_mut().zip(table.as_slice()) {
                    *height = height_for(magnitudes[bin], params);
                }
            }
            None => self.scratch.fill(height_for(0, params)),
        }

        let slot = self.head * self.width;
        self.cells[slot..slot + self.width].copy_from_slice(&self.scratch);
        self.advance();
        Ok(())
    }

    /// Appends already-scaled heights as the newest slice.
    ///
    /// Missing columns are zero; extra values are ignored.
    #[cfg(test)]
    pub fn push_heights(&mut self, heights: &[f32]) {
        if self.width == 0 {
            return;
        }
        let slot = self.head * self.width;
        let row = &mut self.cells[slot..slot + self.width];
        row.fill(0.0);
        for (cell, &h) in row.iter_mut().zip(heights) {
            *cell = h;
        }
        self.advance();
    }

    fn advance(&mut self) {
        self.head = (self.head + 1) % self.depth;
        self.ingested += 1;
        debug!(target: "spectrogram", "Slice #{} written, head now {}", self.ingested, self.head);
    }

    pub fn snapshot(&self) -> SpectrogramSnapshot<'_> {
        SpectrogramSnapshot {
            cells: &self.cells,
            width: self.width,
            depth: self.depth,
            head: self.head,
        }
    }
}

/// Read-only, logically ordered view of the height field.
#[derive(Debug, Clone, Copy)]
pub struct SpectrogramSnapshot<'a> {
    cells: &'a [f32],
    width: usize,
    depth: usize,
    head: usize,
}

impl<'a> SpectrogramSnapshot<'a> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Slice `index`, where 0 is the oldest and `depth - 1` the newest.
    pub fn slice(&self, index: usize) -> &'a [f32] {
        assert!(index < self.depth, "slice {} out of {}", index, self.depth);
        let physical = (self.head + index) % self.depth;
        let start = physical * self.width;
        &self.cells[start..start + self.width]
    }

    pub fn newest(&self) -> &'a [f32] {
        self.slice(self.depth - 1)
    }

    pub fn slices(&self) -> impl Iterator<Item = &'a [f32]> {
        let snapshot = *self;
        (0..self.depth).map(move |i| snapshot.slice(i))
    }

    /// Dense `[slice][column]` copy in oldest-to-newest order.
    pub fn to_vec(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.width * self.depth);
        for slice in self.slices() {
            out.extend_from_slice(slice);
        }
        out
    }

    pub fn peak(&self) -> f32 {
        self.cells.iter().copied().fold(0.0, f32::max)
    }
}
