//! Shared wavelength axes
//!
//! A [`WavelengthGrid`] is the token that proves two wavelength-indexed
//! quantities line up sample for sample. Spectra and resampled filter curves
//! both carry one, and broadband integration refuses to combine arrays whose
//! grids are not the same.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when building a wavelength grid
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("Wavelength grid needs at least 2 samples, got {0}")]
    TooShort(usize),

    #[error("Wavelengths must be strictly ascending (index {0})")]
    NotAscending(usize),

    #[error("Wavelengths must be finite and positive (index {0})")]
    InvalidValue(usize),
}

/// Strictly ascending wavelength samples in Å.
///
/// Cloning is cheap: the samples live behind an `Arc`, so every spectrum and
/// filter resampled onto the same grid shares one allocation.
#[derive(Clone)]
pub struct WavelengthGrid {
    values: Arc<[f64]>,
    fingerprint: u64,
}

impl WavelengthGrid {
    /// Build a grid from ascending wavelengths in Å.
    pub fn new(values: Vec<f64>) -> Result<Self, GridError> {
        if values.len() < 2 {
            return Err(GridError::TooShort(values.len()));
        }

        for (i, &v) in values.iter().enumerate() {
            if !v.is_finite() || v <= 0.0 {
                return Err(GridError::InvalidValue(i));
            }
            if i > 0 && v <= values[i - 1] {
                return Err(GridError::NotAscending(i));
            }
        }

        let fingerprint = fingerprint(&values);
        Ok(Self {
            values: values.into(),
            fingerprint,
        })
    }

    /// Uniformly spaced grid `start, start + step, ...` strictly below `stop`.
    pub fn arange(start: f64, stop: f64, step: f64) -> Result<Self, GridError> {
        let n = if step > 0.0 && stop > start {
            ((stop - start) / step).ceil() as usize
        } else {
            0
        };
        Self::new((0..n).map(|i| start + step * i as f64).collect())
    }

    /// `n` points evenly spaced in log10 between `lam_min` and `lam_max` inclusive.
    pub fn logspace(lam_min: f64, lam_max: f64, n: usize) -> Result<Self, GridError> {
        if n < 2 {
            return Err(GridError::TooShort(n));
        }
        let (lo, hi) = (lam_min.log10(), lam_max.log10());
        let step = (hi - lo) / (n - 1) as f64;
        Self::new((0..n).map(|i| 10f64.powf(lo + step * i as f64)).collect())
    }

    /// Every wavelength multiplied by `factor` (e.g. `1 + z`).
    pub fn scaled(&self, factor: f64) -> Result<Self, GridError> {
        Self::new(self.values.iter().map(|l| l * factor).collect())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first(&self) -> f64 {
        self.values[0]
    }

    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// True when both grids hold identical samples.
    pub fn same_as(&self, other: &WavelengthGrid) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
            || (self.fingerprint == other.fingerprint && self.values == other.values)
    }

    /// True when this grid holds exactly the given samples.
    pub fn matches(&self, values: &[f64]) -> bool {
        self.values.len() == values.len() && *self.values == *values
    }
}

impl PartialEq for WavelengthGrid {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for WavelengthGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WavelengthGrid({} samples, {}..{} Å, #{:016x})",
            self.len(),
            self.first(),
            self.last(),
            self.fingerprint
        )
    }
}

fn fingerprint(values: &[f64]) -> u64 {
    let mut hasher = DefaultHasher::new();
    values.len().hash(&mut hasher);
    for v in values {
        v.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}
