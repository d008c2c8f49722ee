//! Core foundation layer.
//!
//! Bottom layer of the crate with no internal dependencies.
//!
//! # Contents
//!
//! - [`types`]: Poses and laser scans
//! - [`math`]: Angle normalization and differences

pub mod math;
pub mod types;
