//! Utility helpers shared by the codec implementations

pub mod validation;

pub use validation::{validate_encoded_data, validate_frame_size, validate_samples};
