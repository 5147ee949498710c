//! Reporting metrics.
//!
//! - [`WindowedAverager`]: bounded-window running mean of logged scalars

pub mod windowed_average;

pub use windowed_average::WindowedAverager;
