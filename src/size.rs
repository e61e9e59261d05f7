//! Byte and megabyte sizes of encoded buffers.

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Size of an encoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EncodedSize {
    bytes: usize,
}

impl EncodedSize {
    pub fn of(buffer: &[u8]) -> Self {
        Self::from_bytes(buffer.len())
    }

    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Size in MiB, used by the policy thresholds.
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / BYTES_PER_MB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn megabytes_use_binary_units() {
        let size = EncodedSize::from_bytes(512 * 1024);
        assert_eq!(size.bytes(), 524_288);
        assert!((size.megabytes() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_buffer_is_zero() {
        assert_eq!(EncodedSize::of(&[]).megabytes(), 0.0);
    }
}
