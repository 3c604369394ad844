//! Background cosmology
//!
//! The pipeline only needs luminosity distances. A flat ΛCDM model with the
//! Planck 2018 parameters is bundled; anything else can implement
//! [`Cosmology`].

use serde::{Deserialize, Serialize};
use uom::si::f64::Length;
use uom::si::length::centimeter;

/// Speed of light in km/s
const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Centimeters in one megaparsec
pub const CM_PER_MPC: f64 = 3.085_677_581_491_367_3e24;

/// Number of Simpson intervals used for the comoving distance integral
const SIMPSON_INTERVALS: usize = 1000;

/// Distance measures needed to move spectra to the observer frame.
pub trait Cosmology {
    /// Luminosity distance to redshift `z`
    fn luminosity_distance(&self, z: f64) -> Length;
}

/// Flat ΛCDM cosmology, radiation and massive neutrinos neglected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatLambdaCdm {
    /// Hubble constant in km/s/Mpc
    pub h0: f64,
    /// Matter density parameter today
    pub omega_m: f64,
}

impl Default for FlatLambdaCdm {
    fn default() -> Self {
        Self::planck18()
    }
}

impl FlatLambdaCdm {
    pub fn new(h0: f64, omega_m: f64) -> Self {
        Self { h0, omega_m }
    }

    /// Planck 2018 (TT,TE,EE+lowE+lensing+BAO)
    pub fn planck18() -> Self {
        Self::new(67.66, 0.30966)
    }

    /// Hubble distance c / H0 in Mpc
    pub fn hubble_distance_mpc(&self) -> f64 {
        SPEED_OF_LIGHT_KM_S / self.h0
    }

    /// Dimensionless Hubble parameter E(z) = H(z) / H0
    pub fn efunc(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        (self.omega_m * zp1.powi(3) + (1.0 - self.omega_m)).sqrt()
    }

    /// Line-of-sight comoving distance in Mpc
    pub fn comoving_distance_mpc(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }

        // Composite Simpson's rule over 1/E(z)
        let n = SIMPSON_INTERVALS;
        let h = z / n as f64;
        let mut sum = 1.0 / self.efunc(0.0) + 1.0 / self.efunc(z);
        for i in 1..n {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight / self.efunc(h * i as f64);
        }

        self.hubble_distance_mpc() * sum * h / 3.0
    }

    /// Luminosity distance in Mpc
    pub fn luminosity_distance_mpc(&self, z: f64) -> f64 {
        (1.0 + z) * self.comoving_distance_mpc(z)
    }
}

impl Cosmology for FlatLambdaCdm {
    fn luminosity_distance(&self, z: f64) -> Length {
        Length::new::<centimeter>(self.luminosity_distance_mpc(z) * CM_PER_MPC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_distance_at_zero_redshift() {
        let cosmo = FlatLambdaCdm::planck18();
        assert_eq!(cosmo.luminosity_distance(0.0).get::<centimeter>(), 0.0);
    }

    #[test]
    fn test_low_redshift_hubble_law() {
        let cosmo = FlatLambdaCdm::planck18();
        let z = 0.001;
        assert_relative_eq!(
            cosmo.luminosity_distance_mpc(z),
            cosmo.hubble_distance_mpc() * z,
            max_relative = 1e-3
        );
    }

    #[test]
    fn test_planck18_distance_at_unit_redshift() {
        // ~6791 Mpc with radiation included, slightly more without
        let d_l = FlatLambdaCdm::planck18().luminosity_distance_mpc(1.0);
        assert_relative_eq!(d_l, 6791.0, max_relative = 1e-2);
    }

    #[test]
    fn test_einstein_de_sitter() {
        // Ω_m = 1: D_C = 2 c/H0 (1 - 1/sqrt(1+z))
        let cosmo = FlatLambdaCdm::new(70.0, 1.0);
        let z = 3.0;
        let expected = 2.0 * cosmo.hubble_distance_mpc() * (1.0 - 1.0 / (1.0f64 + z).sqrt());
        assert_relative_eq!(cosmo.comoving_distance_mpc(z), expected, max_relative = 1e-9);
    }
}
