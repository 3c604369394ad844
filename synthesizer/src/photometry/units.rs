//! Physical constants and unit conversions for spectra
//!
//! Wavelengths are carried in Ångström, luminosity densities in
//! erg s⁻¹ Hz⁻¹ and observed flux densities in nJy throughout the crate.

use uom::si::f64::Length;
use uom::si::length::centimeter;

/// Constants used by the spectral pipeline
pub struct Constants {}

impl Constants {
    /// Speed of light in vacuum
    /// Units: 2.99792458e8 m/s
    pub const SPEED_OF_LIGHT_M_S: f64 = 2.99792458e8;

    /// Planck's constant
    /// Units: 6.62607015e-34 J⋅s
    pub const PLANCK_CONSTANT_SI: f64 = 6.62607015e-34;

    /// Ångström per meter. Wavelengths are divided by this to get meters.
    pub const ANGSTROM_PER_METER: f64 = 1e10;

    /// 1 Jansky in CGS units
    /// Units: 1e-23 erg s⁻¹ cm⁻² Hz⁻¹
    pub const JANSKY_IN_CGS: f64 = 1e-23;

    /// nJy per Jy
    pub const NANOJANSKY_PER_JANSKY: f64 = 1e9;

    /// AB magnitude of a 1 Jy source, m_AB = -2.5 log10(f / 1 Jy) + 8.9
    pub const AB_MAGNITUDE_OF_ONE_JANSKY: f64 = 8.9;

    /// erg s⁻¹ per W
    pub const ERG_PER_JOULE: f64 = 1e7;
}

/// Convert wavelengths from Å to m.
pub fn angstrom_to_meters(lam: f64) -> f64 {
    lam / Constants::ANGSTROM_PER_METER
}

/// Frequency (Hz) of light with wavelength `lam` in Å.
pub fn frequency_hz(lam: f64) -> f64 {
    Constants::SPEED_OF_LIGHT_M_S / angstrom_to_meters(lam)
}

/// Convert a per-Å spectral density to a per-Hz density.
///
/// # Arguments
///
/// * `lam` - wavelength in Å
/// * `flam` - spectral density per Å (e.g. erg s⁻¹ Å⁻¹)
pub fn convert_flam_to_fnu(lam: &[f64], flam: &[f64]) -> Vec<f64> {
    lam.iter()
        .zip(flam)
        .map(|(&l, &f)| f * l / frequency_hz(l))
        .collect()
}

/// Convert a per-Hz spectral density to a per-Å density.
///
/// Inverse of [`convert_flam_to_fnu`] on the same wavelength grid.
pub fn convert_fnu_to_flam(lam: &[f64], fnu: &[f64]) -> Vec<f64> {
    lam.iter()
        .zip(fnu)
        .map(|(&l, &f)| f * frequency_hz(l) / l)
        .collect()
}

/// Apparent AB magnitude to flux density in nJy.
pub fn m_to_flux(m: f64) -> f64 {
    Constants::NANOJANSKY_PER_JANSKY * 10f64.powf(-0.4 * (m - Constants::AB_MAGNITUDE_OF_ONE_JANSKY))
}

/// Observed flux density (nJy) to rest-frame luminosity density (erg s⁻¹ Hz⁻¹).
///
/// `L = f · 4π d_L² / (1 + z)`, the inverse of the redshifting applied to
/// spectra.
pub fn flux_to_luminosity(flux_njy: f64, luminosity_distance: Length, redshift: f64) -> f64 {
    let flux_cgs =
        flux_njy / (Constants::NANOJANSKY_PER_JANSKY / Constants::JANSKY_IN_CGS);
    let d_l_cm = luminosity_distance.get::<centimeter>();

    flux_cgs * 4.0 * std::f64::consts::PI * d_l_cm * d_l_cm / (1.0 + redshift)
}

/// Rest-frame luminosity density (erg s⁻¹ Hz⁻¹) to observed flux density (nJy).
pub fn luminosity_to_flux(lnu: f64, luminosity_distance: Length, redshift: f64) -> f64 {
    let d_l_cm = luminosity_distance.get::<centimeter>();
    let flux_cgs = lnu * (1.0 + redshift) / (4.0 * std::f64::consts::PI * d_l_cm * d_l_cm);

    // erg/s/Hz/cm² -> Jy -> nJy
    flux_cgs / Constants::JANSKY_IN_CGS * Constants::NANOJANSKY_PER_JANSKY
}
