//! Intergalactic medium transmission
//!
//! Neutral hydrogen along the line of sight removes light blueward of
//! Lyman-alpha in the rest frame of the source. Models implement
//! [`IgmTransmission`] and are applied multiplicatively to observed-frame
//! flux densities.

/// Wavelength and redshift dependent transmission of the IGM.
pub trait IgmTransmission {
    /// Short identifier used in log output
    fn name(&self) -> &str;

    /// Multiplicative transmission at each observed-frame wavelength (Å)
    /// for a source at `redshift`. Returns one value per wavelength.
    fn transmission(&self, redshift: f64, lam_obs: &[f64]) -> Vec<f64>;
}

/// Lyman series line wavelengths (Å) and their absorption coefficients
const LYMAN_SERIES: [(f64, f64); 4] = [
    (1216.0, 0.0036),
    (1026.0, 0.0017),
    (973.0, 0.0012),
    (950.0, 0.00093),
];

/// Lyman limit in Å
const LYMAN_LIMIT: f64 = 912.0;

/// Madau (1996) IGM attenuation: Lyman series line blanketing plus the
/// photoelectric absorption shortward of the Lyman limit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Madau96;

impl Madau96 {
    /// Effective optical depth at one observed wavelength
    pub fn tau_eff(&self, redshift: f64, lam_obs: f64) -> f64 {
        let xe = 1.0 + redshift;
        let mut tau = 0.0;

        for &(lam_line, coefficient) in LYMAN_SERIES.iter() {
            if lam_obs <= lam_line * xe {
                tau += coefficient * (lam_obs / lam_line).powf(3.46);
            }
        }

        if lam_obs <= LYMAN_LIMIT * xe {
            let xc = lam_obs / LYMAN_LIMIT;
            tau += 0.25 * xc.powi(3) * (xe.powf(0.46) - xc.powf(0.46))
                + 9.4 * xc.powf(1.5) * (xe.powf(0.18) - xc.powf(0.18))
                - 0.7 * xc.powi(3) * (xc.powf(-1.32) - xe.powf(-1.32))
                - 0.023 * (xe.powf(1.68) - xc.powf(1.68));
        }

        tau.max(0.0)
    }
}

impl IgmTransmission for Madau96 {
    fn name(&self) -> &str {
        "Madau96"
    }

    fn transmission(&self, redshift: f64, lam_obs: &[f64]) -> Vec<f64> {
        lam_obs
            .iter()
            .map(|&l| (-self.tau_eff(redshift, l)).exp())
            .collect()
    }
}
