//! CELP Test Modules
//!
//! This module organizes the session-level test suite for the CELP codec:
//! bitstream properties, encoder/decoder round trips, malformed input and
//! packet-loss concealment.

pub mod utils;

mod decoder_tests;
