//! Interpolation and fitting helpers shared by the spectral code.
//!
//! Spectra and filter curves are tabulated on ascending wavelength axes, so
//! everything here assumes strictly ascending abscissae and reports a typed
//! error otherwise.

use thiserror::Error;

/// Errors that can occur during interpolation or fitting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
    #[error("X values are degenerate, a line cannot be fitted")]
    DegenerateAbscissa,
}

fn validate_table(xs: &[f64], ys: &[f64]) -> Result<(), InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }

    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }

    if xs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(InterpError::UnsortedData);
    }

    Ok(())
}

/// Index of the left edge of the interval containing `x`.
///
/// Caller guarantees `xs[0] <= x <= xs[n-1]`.
fn bracket(x: f64, xs: &[f64]) -> usize {
    // partition_point returns the first index with xs[i] > x
    let upper = xs.partition_point(|&v| v <= x);
    upper.saturating_sub(1).min(xs.len() - 2)
}

fn lerp_at(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let i = bracket(x, xs);
    let (x1, x2) = (xs[i], xs[i + 1]);
    let (y1, y2) = (ys[i], ys[i + 1]);

    if x == x1 {
        return y1;
    }
    if x == x2 {
        return y2;
    }

    let t = (x - x1) / (x2 - x1);
    y1 + t * (y2 - y1)
}

/// Linear interpolation of tabulated data at a single point.
///
/// # Errors
///
/// * `InterpError::OutOfBounds` - x is outside the range \\[xs\\[0\\], xs\\[n-1\\]\\]
/// * `InterpError::InsufficientData` - Less than 2 data points provided
/// * `InterpError::MismatchedLengths` - xs and ys have different lengths
/// * `InterpError::UnsortedData` - xs array is not strictly ascending
///
/// # Examples
///
/// ```rust
/// use synthesizer::algo::misc::interp;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let lam = vec![1000.0, 2000.0, 3000.0];
/// let lnu = vec![1.0, 3.0, 4.0];
/// assert_eq!(interp(1500.0, &lam, &lnu)?, 2.0);
/// # Ok(())
/// # }
/// ```
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    validate_table(xs, ys)?;

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];

    if !(min_x..=max_x).contains(&x) {
        return Err(InterpError::OutOfBounds(x, min_x, max_x));
    }

    Ok(lerp_at(x, xs, ys))
}

/// Linear interpolation of a table onto many points, zero outside the table.
///
/// Points below `xs[0]` or above `xs[n-1]` get exactly `0.0`; nothing is
/// extrapolated. This is the rule used when a transmission curve is moved
/// onto a foreign wavelength grid.
pub fn interp_zero_outside(points: &[f64], xs: &[f64], ys: &[f64]) -> Result<Vec<f64>, InterpError> {
    validate_table(xs, ys)?;

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];

    Ok(points
        .iter()
        .map(|&x| {
            if x < min_x || x > max_x || x.is_nan() {
                0.0
            } else {
                lerp_at(x, xs, ys)
            }
        })
        .collect())
}

/// Ordinary least squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Least squares straight line through `(xs, ys)`.
///
/// Unlike the interpolators, the abscissae need not be sorted.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Result<LineFit, InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }
    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (sxy, sxx) = xs
        .iter()
        .zip(ys)
        .fold((0.0, 0.0), |(sxy, sxx), (&x, &y)| {
            let dx = x - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

    if sxx == 0.0 {
        return Err(InterpError::DegenerateAbscissa);
    }

    let slope = sxy / sxx;
    Ok(LineFit {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}
