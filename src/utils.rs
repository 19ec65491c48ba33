use log::debug;

pub const AUDIBLE_CEILING_HZ: f64 = 20000.0;  // Highest frequency mapped onto a column
pub const LUT_WARP_EXPONENT: f64 = 2.5;  // Bends the column mapping toward low frequencies
pub const MAX_RAW_MAGNITUDE: f32 = 255.0;  // 8-bit magnitude sources
pub const DEFAULT_GATE_THRESHOLD: u8 = 8;

pub const DEFAULT_WIDTH: usize = 256;
pub const DEFAULT_DEPTH: usize = 64;
pub const COMPACT_WIDTH: usize = 128;  // Constrained devices
pub const COMPACT_DEPTH: usize = 48;
pub const DEFAULT_SPEED_DIVISOR: u32 = 4;
pub const DEFAULT_AMPLITUDE_SCALE: f32 = 30.0;

pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;  // Reported before any input is open
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;
pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const FFT_SIZES: [usize; 6] = [512, 1024, 2048, 4096, 8192, 16384];

pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

pub const SPEED_SLIDER_MAX: u32 = 10;

/// Power of two within the range the analyser accepts.
pub fn is_valid_fft_size(size: usize) -> bool {
    size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size)
}

/// Maps the 1..=10 speed slider onto a decimation divisor (10 is fastest).
pub fn speed_divisor_from_slider(slider: u32) -> u32 {
    let clamped = slider.clamp(1, SPEED_SLIDER_MAX);
    let divisor = SPEED_SLIDER_MAX + 1 - clamped;
    debug!("Speed slider {} -> divisor {}", clamped, divisor);
    divisor
}

pub fn slider_from_speed_divisor(divisor: u32) -> u32 {
    (SPEED_SLIDER_MAX + 1).saturating_sub(divisor.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_size_validation() {
        assert!(is_valid_fft_size(2048));
        assert!(is_valid_fft_size(MIN_FFT_SIZE));
        assert!(is_valid_fft_size(MAX_FFT_SIZE));
        assert!(!is_valid_fft_size(1000));
        assert!(!is_valid_fft_size(16));
        assert!(!is_valid_fft_size(65536));
        for size in FFT_SIZES {
            assert!(is_valid_fft_size(size));
        }
    }

    #[test]
    fn test_speed_slider_mapping() {
        assert_eq!(speed_divisor_from_slider(10), 1);
        assert_eq!(speed_divisor_from_slider(7), 4);
        assert_eq!(speed_divisor_from_slider(1), 10);
        assert_eq!(speed_divisor_from_slider(0), 10);
        assert_eq!(speed_divisor_from_slider(42), 1);
        assert_eq!(slider_from_speed_divisor(4), 7);
        assert_eq!(slider_from_speed_divisor(0), 10);
    }
}
