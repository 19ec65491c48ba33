// conversion.rs

/// Converts a stored sample to a float in `[-1.0, 1.0]`.
pub trait AudioSample: Copy {
    fn to_f32(self) -> f32;
}

impl AudioSample for f32 {
    fn to_f32(self) -> f32 {
        self
    }
}

impl AudioSample for i16 {
    fn to_f32(self) -> f32 {
        (self as f32 / i16::MAX as f32).clamp(-1.0, 1.0)
    }
}

impl AudioSample for i32 {
    fn to_f32(self) -> f32 {
        if self == i32::MIN {
            -1.0
        } else {
            self as f32 / i32::MAX as f32
        }
    }
}

/// Integer PCM of `bits` width, as decoded into an `i32` by `hound`.
#[derive(Debug, Clone, Copy)]
pub struct PackedInt {
    pub value: i32,
    pub bits: u16,
}

impl AudioSample for PackedInt {
    fn to_f32(self) -> f32 {
        let bits = self.bits.clamp(2, 32);
        let full_scale = (1_i64 << (bits - 1)) as f32;
        (self.value as f32 / full_scale).clamp(-1.0, 1.0)
    }
}

/// Averages interleaved frames down to one channel.
pub fn downmix_to_mono<S: AudioSample>(interleaved: &[S], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().map(|s| s.to_f32()).sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_scaling() {
        assert_eq!(i16::MAX.to_f32(), 1.0);
        assert_eq!(i16::MIN.to_f32(), -1.0);
        assert_eq!(i32::MIN.to_f32(), -1.0);
        assert_eq!(PackedInt { value: 64, bits: 8 }.to_f32(), 0.5);
        assert_eq!(PackedInt { value: -8_388_608, bits: 24 }.to_f32(), -1.0);
    }

    #[test]
    fn test_downmix() {
        let mono = downmix_to_mono(&[0.5_f32, -0.5, 1.0, 0.0, 0.25], 2);
        assert_eq!(mono, vec![0.0, 0.5]);
        assert_eq!(downmix_to_mono(&[0.25_f32, 0.75], 0), vec![0.25, 0.75]);
    }
}
