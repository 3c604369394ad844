//! Numerical helpers used across the spectral pipeline
//!
//! Interpolation on tabulated wavelength grids and straight-line fits in
//! log-log space.

pub mod misc;

pub use misc::{interp, interp_zero_outside, linear_fit, InterpError, LineFit};
