//! CLI command implementations.

pub mod batch;
pub mod calibrate;
pub mod common;
pub mod generate;
pub mod params;
pub mod process;
