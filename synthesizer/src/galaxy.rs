//! Galaxy and stellar grid collaborators
//!
//! Stellar population grids, star formation histories and image rendering
//! live outside this crate. The survey only talks to them through the
//! [`Galaxy`] trait and the [`Grid`] description below.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use thiserror::Error;
use uom::si::f64::Length;

use crate::instrument::Instrument;
use crate::photometry::grid::WavelengthGrid;
use crate::photometry::igm::IgmTransmission;
use crate::photometry::sed::{Sed, SedError};
use crate::survey::{SpectrumKind, SurveySpectra};

/// Errors reported by galaxy models
#[derive(Debug, Error)]
pub enum GalaxyError {
    #[error("Galaxy model does not support {0}")]
    Unsupported(&'static str),

    #[error("Galaxy spectrum has {actual} samples, grid has {expected}")]
    SpectrumLength { expected: usize, actual: usize },

    #[error("Attenuation requested before the intrinsic spectrum was generated")]
    NoIntrinsicSpectrum,

    #[error("Galaxy model error: {0}")]
    Model(String),

    #[error(transparent)]
    Sed(#[from] SedError),
}

/// Stellar population synthesis grid axes
#[derive(Debug, Clone)]
pub struct Grid {
    /// Rest-frame wavelengths of the template spectra (Å)
    pub lam: WavelengthGrid,
    pub log10ages: Vec<f64>,
    pub metallicities: Vec<f64>,
}

impl Grid {
    pub fn new(lam: WavelengthGrid, log10ages: Vec<f64>, metallicities: Vec<f64>) -> Self {
        Self {
            lam,
            log10ages,
            metallicities,
        }
    }
}

/// Kind of image a galaxy should render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// Smoothed particle or parametric morphology
    Smoothed,
    /// Plain histogram of the emission
    Histogram,
}

/// Everything a galaxy needs to render its images for one instrument
pub struct ImageRequest<'a> {
    pub label: &'a str,
    pub instrument: &'a Instrument,
    pub img_type: ImageType,
    pub spectrum_kind: SpectrumKind,
    pub fov: Option<Length>,
    pub super_resolution_factor: Option<u32>,
    pub rest_frame: bool,
    pub redshift: Option<f64>,
    pub igm: Option<&'a dyn IgmTransmission>,
    /// This galaxy's own spectra of `spectrum_kind`, when they have been computed
    pub spectra: Option<&'a SurveySpectra>,
}

/// Per-filter images of one galaxy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalaxyImage {
    images: BTreeMap<String, Array2<f64>>,
}

impl GalaxyImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filter_code: &str, image: Array2<f64>) {
        self.images.insert(filter_code.to_string(), image);
    }

    pub fn get(&self, filter_code: &str) -> Option<&Array2<f64>> {
        self.images.get(filter_code)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array2<f64>)> {
        self.images.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A simulated galaxy as seen by a survey.
///
/// Spectra are rest-frame luminosity densities (erg s⁻¹ Hz⁻¹) on the grid's
/// wavelength axis. Attenuation methods work on the spectrum produced by the
/// last call to [`Galaxy::generate_intrinsic_spectra`], which is why they
/// take `&mut self`.
pub trait Galaxy {
    fn generate_intrinsic_spectra(&mut self, grid: &Grid) -> Result<Array1<f64>, GalaxyError>;

    /// Intrinsic spectrum summed over the galaxy's star particles.
    ///
    /// Models without particles fall back to their integrated spectrum.
    fn generate_intrinsic_particle_spectra(&mut self, grid: &Grid) -> Result<Sed, GalaxyError> {
        let lnu = self.generate_intrinsic_spectra(grid)?;
        Ok(Sed::new(grid.lam.clone(), Some(lnu))?)
    }

    /// Intrinsic spectrum behind a uniform dust screen of V-band optical depth `tau_v`
    fn apply_screen(&mut self, tau_v: f64) -> Result<Array1<f64>, GalaxyError>;

    /// Charlot & Fall (2000) two-component attenuation
    fn apply_charlot_fall_00(
        &mut self,
        grid: &Grid,
        tau_v_ism: f64,
        tau_v_bc: f64,
    ) -> Result<Array1<f64>, GalaxyError>;

    fn make_image(&self, request: &ImageRequest<'_>) -> Result<GalaxyImage, GalaxyError>;
}

/// Dust attenuation curve slope used by [`PowerLawGalaxy`]
const ISM_SLOPE: f64 = -0.7;
const BIRTH_CLOUD_SLOPE: f64 = -1.3;
const V_BAND: f64 = 5500.0;

/// Galaxy with a pure power-law UV continuum, `f_λ ∝ λ^β`.
///
/// Handy for calibrating pipelines: its UV slope and broadband colours are
/// known analytically.
#[derive(Debug, Clone)]
pub struct PowerLawGalaxy {
    /// L_ν at 1500 Å (erg s⁻¹ Hz⁻¹)
    pub lnu_1500: f64,
    /// UV slope β of f_λ
    pub beta: f64,
    /// Fraction of the light from stars still in their birth clouds
    pub young_fraction: f64,
    lam: Option<WavelengthGrid>,
    intrinsic: Option<Array1<f64>>,
}

impl PowerLawGalaxy {
    pub fn new(lnu_1500: f64, beta: f64) -> Self {
        Self {
            lnu_1500,
            beta,
            young_fraction: 0.0,
            lam: None,
            intrinsic: None,
        }
    }

    pub fn with_young_fraction(mut self, young_fraction: f64) -> Self {
        self.young_fraction = young_fraction.clamp(0.0, 1.0);
        self
    }

    fn attenuate(&self, tau: impl Fn(f64) -> f64) -> Result<Array1<f64>, GalaxyError> {
        let (lam, intrinsic) = match (&self.lam, &self.intrinsic) {
            (Some(lam), Some(intrinsic)) => (lam, intrinsic),
            _ => return Err(GalaxyError::NoIntrinsicSpectrum),
        };

        Ok(lam
            .as_slice()
            .iter()
            .zip(intrinsic)
            .map(|(&l, &lnu)| lnu * (-tau(l)).exp())
            .collect())
    }
}

impl Galaxy for PowerLawGalaxy {
    fn generate_intrinsic_spectra(&mut self, grid: &Grid) -> Result<Array1<f64>, GalaxyError> {
        let spectrum: Array1<f64> = grid
            .lam
            .as_slice()
            .iter()
            .map(|&l| self.lnu_1500 * (l / 1500.0).powf(self.beta + 2.0))
            .collect();

        self.lam = Some(grid.lam.clone());
        self.intrinsic = Some(spectrum.clone());
        Ok(spectrum)
    }

    fn apply_screen(&mut self, tau_v: f64) -> Result<Array1<f64>, GalaxyError> {
        self.attenuate(|l| tau_v * (l / V_BAND).powf(ISM_SLOPE))
    }

    fn apply_charlot_fall_00(
        &mut self,
        grid: &Grid,
        tau_v_ism: f64,
        tau_v_bc: f64,
    ) -> Result<Array1<f64>, GalaxyError> {
        if !self.lam.as_ref().is_some_and(|lam| lam.same_as(&grid.lam)) {
            self.generate_intrinsic_spectra(grid)?;
        }

        let young = self.young_fraction;
        let (lam, intrinsic) = match (&self.lam, &self.intrinsic) {
            (Some(lam), Some(intrinsic)) => (lam, intrinsic),
            _ => return Err(GalaxyError::NoIntrinsicSpectrum),
        };

        Ok(lam
            .as_slice()
            .iter()
            .zip(intrinsic)
            .map(|(&l, &lnu)| {
                let ism = (-tau_v_ism * (l / V_BAND).powf(ISM_SLOPE)).exp();
                let bc = (-tau_v_bc * (l / V_BAND).powf(BIRTH_CLOUD_SLOPE)).exp();
                lnu * ism * (young * bc + (1.0 - young))
            })
            .collect())
    }

    fn make_image(&self, _request: &ImageRequest<'_>) -> Result<GalaxyImage, GalaxyError> {
        Err(GalaxyError::Unsupported("image rendering"))
    }
}
