//! Input validation utilities for codec operations

use crate::error::{CodecError, Result};

/// Validate that a PCM frame has exactly the expected length
pub fn validate_frame_size(expected: usize, actual: usize) -> Result<()> {
    if actual != expected {
        return Err(CodecError::InvalidFrameSize { expected, actual });
    }
    Ok(())
}

/// Validate floating-point samples for codec processing
///
/// Samples must be finite; the codec works in the 16-bit amplitude domain
/// but does not clip its input.
pub fn validate_samples(samples: &[f32]) -> Result<()> {
    if let Some((i, sample)) = samples.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(CodecError::invalid_format(format!(
            "Sample at index {} is not finite: {}",
            i, sample
        )));
    }
    Ok(())
}

/// Validate encoded data for codec processing
pub fn validate_encoded_data(data: &[u8], capacity: usize) -> Result<()> {
    if data.is_empty() {
        return Err(CodecError::invalid_format("Encoded data cannot be empty"));
    }

    if data.len() > capacity {
        return Err(CodecError::invalid_format(format!(
            "Encoded data too large: {} bytes (capacity {})",
            data.len(),
            capacity
        )));
    }

    Ok(())
}
