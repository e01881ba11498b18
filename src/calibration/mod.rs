//! Calibration data
//!
//! Token rows fed one at a time through the model while observers record
//! activation scales. Rows come from a JSON token file or from a seeded
//! synthetic generator.

mod config;
mod set;

pub use config::{CalibrationDataConfig, DEFAULT_MAX_SEQ_LEN, DEFAULT_NUM_SAMPLES};
pub use set::CalibrationSet;
