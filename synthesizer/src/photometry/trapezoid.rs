//! Trapezoidal integration over sampled data

use thiserror::Error;

/// Errors that can occur during trapezoidal integration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrapezoidError {
    #[error("Insufficient points for integration, need at least 2 points")]
    InsufficientPoints,

    #[error("Sample and abscissa lengths differ: {samples} vs {abscissa}")]
    LengthMismatch { samples: usize, abscissa: usize },
}

/// Composite trapezoidal rule over tabulated samples.
///
/// The abscissa does not need to be ascending: integrating over a frequency
/// axis derived from an ascending wavelength grid runs "backwards" and yields
/// a negatively signed result, exactly as the ratio-of-integrals estimators
/// downstream expect.
///
/// # Arguments
///
/// * `ys` - Sampled integrand
/// * `xs` - Abscissa at which `ys` was sampled
pub fn trapz(ys: &[f64], xs: &[f64]) -> Result<f64, TrapezoidError> {
    if ys.len() != xs.len() {
        return Err(TrapezoidError::LengthMismatch {
            samples: ys.len(),
            abscissa: xs.len(),
        });
    }

    if xs.len() < 2 {
        return Err(TrapezoidError::InsufficientPoints);
    }

    // ∫[x₁,x₂] f(x)dx ≈ (x₂-x₁) × (f(x₁)+f(x₂))/2
    let integral = xs
        .windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum();

    Ok(integral)
}

/// Trapezoidal integral of `f` evaluated at the given corners.
///
/// The corners must be strictly ascending.
pub fn trap_integrate<F>(corners: &[f64], to_integrate: F) -> Result<f64, TrapezoidError>
where
    F: Fn(f64) -> f64,
{
    let ys: Vec<f64> = corners.iter().map(|&x| to_integrate(x)).collect();
    trapz(&ys, corners)
}

/// Ratio `∫ y·w dx / ∫ w dx`, the weighted mean used by every broadband estimator.
///
/// Weights that integrate to zero give `NaN`.
pub fn weighted_mean(ys: &[f64], weights: &[f64], xs: &[f64]) -> Result<f64, TrapezoidError> {
    if ys.len() != weights.len() {
        return Err(TrapezoidError::LengthMismatch {
            samples: ys.len(),
            abscissa: weights.len(),
        });
    }

    let weighted: Vec<f64> = ys.iter().zip(weights).map(|(y, w)| y * w).collect();
    let numerator = trapz(&weighted, xs)?;
    let denominator = trapz(weights, xs)?;

    Ok(numerator / denominator)
}
