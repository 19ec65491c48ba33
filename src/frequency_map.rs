//! Column-to-bin lookup for the spectrogram.
//!
//! Each visual column samples one frequency bin. Columns are spread over the
//! audible range with a `t^2.5` warp, which hands more columns to the low end
//! than a linear spread would.

use log::{debug, info, warn};

use crate::utils::{AUDIBLE_CEILING_HZ, LUT_WARP_EXPONENT};

/// Bin index for every visual column, non-decreasing and within
/// `[0, total_bins - 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyIndexTable {
    indices: Vec<usize>,
    total_bins: usize,
}

impl FrequencyIndexTable {
    /// Builds the table, or returns `None` while the source reports no bins.
    pub fn build(sample_rate: f32, total_bins: usize, width: usize) -> Option<Self> {
        if total_bins == 0 {
            debug!("No frequency bins yet, skipping table build");
            return None;
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            warn!("Cannot map columns for sample rate {}", sample_rate);
            return None;
        }

        let nyquist = f64::from(sample_rate) / 2.0;
        let end_bin = ((AUDIBLE_CEILING_HZ / nyquist) * total_bins as f64).floor();
        let last_bin = total_bins - 1;

        let indices = (0..width)
            .map(|j| {
                let t = if width > 1 {
                    j as f64 / (width - 1) as f64
                } else {
                    0.0
                };
                let index = (t.powf(LUT_WARP_EXPONENT) * end_bin).floor() as usize;
                index.min(last_bin)
            })
            .collect();

        Some(Self { indices, total_bins })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    pub fn total_bins(&self) -> usize {
        self.total_bins
    }

    /// Largest bin any column reads; frames must be at least this long plus one.
    pub fn max_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TableKey {
    sample_rate: f32,
    total_bins: usize,
    width: usize,
}

/// Owns the current table and rebuilds it when the inputs it was built from change.
#[derive(Debug, Default)]
pub struct FrequencyMapper {
    key: Option<TableKey>,
    table: Option<FrequencyIndexTable>,
}

impl FrequencyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure the table matches the given metadata.
    ///
    /// Returns `true` when a rebuild happened. A zero bin count leaves the
    /// mapper without a table until the source becomes ready.
    pub fn refresh(&mut self, sample_rate: f32, total_bins: usize, width: usize) -> bool {
        let key = TableKey {
            sample_rate,
            total_bins,
            width,
        };
        if self.key == Some(key) {
            return false;
        }

        self.table = FrequencyIndexTable::build(sample_rate, total_bins, width);
        self.key = Some(key);
        if self.table.is_some() {
            info!(
                "Rebuilt frequency table: {} columns over {} bins at {} Hz",
                width, total_bins, sample_rate
            );
        }
        true
    }

    pub fn table(&self) -> Option<&FrequencyIndexTable> {
        self.table.as_ref()
    }

    /// Drops the table, e.g. after the source was torn down.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.table = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_monotonic_and_in_range() {
        for &sample_rate in &[8000.0f32, 22050.0, 44100.0, 48000.0, 96000.0] {
            for &total_bins in &[1usize, 2, 16, 1024, 16384] {
                for &width in &[2usize, 3, 64, 128, 256, 1000] {
                    let table = FrequencyIndexTable::build(sample_rate, total_bins, width)
                        .expect("table should build");
                    assert_eq!(table.len(), width);
                    let indices = table.as_slice();
                    assert!(indices.windows(2).all(|w| w[0] <= w[1]));
                    assert!(indices.iter().all(|&i| i < total_bins));
                }
            }
        }
    }

    #[test]
    fn test_table_is_deterministic() {
        let a = FrequencyIndexTable::build(48000.0, 1024, 256);
        let b = FrequencyIndexTable::build(48000.0, 1024, 256);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_bins_yields_no_table() {
        assert!(FrequencyIndexTable::build(44100.0, 0, 256).is_none());
        assert!(FrequencyIndexTable::build(0.0, 1024, 256).is_none());
    }

    #[test]
    fn test_known_values() {
        // 44.1 kHz, 1024 bins: end bin is floor(20000 / 22050 * 1024) = 928
        let table = FrequencyIndexTable::build(44100.0, 1024, 5).unwrap();
        let expected: Vec<usize> = [0.0f64, 0.25, 0.5, 0.75, 1.0]
            .iter()
            .map(|t| (t.powf(2.5) * 928.0).floor() as usize)
            .collect();
        assert_eq!(table.as_slice(), expected.as_slice());
        assert_eq!(table.max_index(), Some(928));
    }

    #[test]
    fn test_low_sample_rate_clamps_to_last_bin() {
        // Nyquist of 4 kHz is far below the audible ceiling, so the top columns clamp.
        let table = FrequencyIndexTable::build(8000.0, 512, 64).unwrap();
        assert_eq!(table.max_index(), Some(511));
    }

    #[test]
    fn test_single_column_reads_bin_zero() {
        let table = FrequencyIndexTable::build(44100.0, 1024, 1).unwrap();
        assert_eq!(table.as_slice(), &[0]);
    }

    #[test]
    fn test_mapper_rebuilds_only_on_change() {
        let mut mapper = FrequencyMapper::new();
        assert!(mapper.table().is_none());

        assert!(mapper.refresh(44100.0, 0, 256));
        assert!(mapper.table().is_none());

        assert!(mapper.refresh(44100.0, 1024, 256));
        assert!(mapper.table().is_some());
        assert!(!mapper.refresh(44100.0, 1024, 256));

        assert!(mapper.refresh(48000.0, 1024, 256));
        assert!(mapper.refresh(48000.0, 2048, 256));
        assert!(mapper.refresh(48000.0, 2048, 128));
        assert_eq!(mapper.table().map(FrequencyIndexTable::len), Some(128));

        mapper.invalidate();
        assert!(mapper.table().is_none());
        assert!(mapper.refresh(48000.0, 2048, 128));
    }
}
