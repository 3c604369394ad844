//! Survey orchestration
//!
//! A [`Survey`] holds the galaxies being observed and the instruments they
//! are observed with. It aggregates per-galaxy spectra into one batched
//! [`Sed`] per [`SpectrumKind`], turns those into per-instrument broadband
//! photometry and hands image rendering to the galaxies themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use thiserror::Error;
use uom::si::f64::Length;

use crate::cosmology::{Cosmology, FlatLambdaCdm};
use crate::galaxy::{Galaxy, GalaxyError, GalaxyImage, Grid, ImageRequest, ImageType};
use crate::instrument::{DepthUnit, Instrument, InstrumentError, InstrumentOptions, Resolution};
use crate::photometry::filters::{FilterCollection, FilterError};
use crate::photometry::grid::WavelengthGrid;
use crate::photometry::igm::IgmTransmission;
use crate::photometry::sed::{ObservedSed, Sed, SedError};

/// Errors that can occur while running a survey
#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("Unrecognised spectra type '{0}', expected intrinsic, stellar or attenuated")]
    UnrecognizedSpectrumKind(String),

    #[error("No {0} spectra have been computed for this survey")]
    MissingSpectra(SpectrumKind),

    #[error("Galaxy {index} returned {actual} wavelength samples, expected {expected}")]
    GalaxySpectrumLength {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{0} is not implemented yet")]
    Unimplemented(&'static str),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    Sed(#[from] SedError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Galaxy(#[from] GalaxyError),
}

/// Which set of survey spectra an operation works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpectrumKind {
    Intrinsic,
    Stellar,
    Attenuated,
}

impl SpectrumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpectrumKind::Intrinsic => "intrinsic",
            SpectrumKind::Stellar => "stellar",
            SpectrumKind::Attenuated => "attenuated",
        }
    }
}

impl FromStr for SpectrumKind {
    type Err = SurveyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intrinsic" => Ok(SpectrumKind::Intrinsic),
            "stellar" => Ok(SpectrumKind::Stellar),
            "attenuated" => Ok(SpectrumKind::Attenuated),
            other => Err(SurveyError::UnrecognizedSpectrumKind(other.to_string())),
        }
    }
}

impl fmt::Display for SpectrumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How per-instrument photometry is merged into the survey photometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotometryKeying {
    /// Keyed by instrument label and filter code
    #[default]
    Namespaced,
    /// Keyed by filter code only; later instruments overwrite earlier ones
    /// sharing a code
    Flattened,
}

/// Key of one entry in the survey photometry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhotometryKey {
    pub instrument: Option<String>,
    pub filter_code: String,
}

impl PhotometryKey {
    pub fn namespaced(instrument: &str, filter_code: &str) -> Self {
        Self {
            instrument: Some(instrument.to_string()),
            filter_code: filter_code.to_string(),
        }
    }

    pub fn flat(filter_code: &str) -> Self {
        Self {
            instrument: None,
            filter_code: filter_code.to_string(),
        }
    }
}

impl fmt::Display for PhotometryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instrument {
            Some(instrument) => write!(f, "{instrument}:{}", self.filter_code),
            None => f.write_str(&self.filter_code),
        }
    }
}

/// Broadband values per photometry key, one value per galaxy
pub type SurveyPhotometry = BTreeMap<PhotometryKey, Array1<f64>>;

/// One or more galaxies to add to a survey
pub enum Galaxies {
    One(Box<dyn Galaxy>),
    Many(Vec<Box<dyn Galaxy>>),
}

impl From<Box<dyn Galaxy>> for Galaxies {
    fn from(galaxy: Box<dyn Galaxy>) -> Self {
        Galaxies::One(galaxy)
    }
}

impl From<Vec<Box<dyn Galaxy>>> for Galaxies {
    fn from(galaxies: Vec<Box<dyn Galaxy>>) -> Self {
        Galaxies::Many(galaxies)
    }
}

/// Batched spectra of every galaxy, in the rest and observed frames
#[derive(Debug, Clone)]
pub struct SurveySpectra {
    pub rest: Sed,
    pub observed: ObservedSed,
}

/// Image rendering options shared by every instrument
pub struct ImageOptions<'a> {
    pub img_type: ImageType,
    pub spectrum_kind: SpectrumKind,
    pub rest_frame: bool,
    pub redshift: Option<f64>,
    pub igm: Option<&'a dyn IgmTransmission>,
}

/// Galaxies observed with a set of instruments
pub struct Survey {
    galaxies: Vec<Box<dyn Galaxy>>,
    instruments: Vec<(String, Instrument)>,
    cosmology: Box<dyn Cosmology>,
    fov: Option<Length>,
    super_resolution_factor: Option<u32>,
    seds: BTreeMap<SpectrumKind, SurveySpectra>,
    galaxy_seds: BTreeMap<SpectrumKind, Vec<SurveySpectra>>,
    photometry: SurveyPhotometry,
    images: BTreeMap<String, Vec<GalaxyImage>>,
}

impl Default for Survey {
    fn default() -> Self {
        Self::new(Box::new(FlatLambdaCdm::planck18()))
    }
}

impl Survey {
    pub fn new(cosmology: Box<dyn Cosmology>) -> Self {
        Self {
            galaxies: Vec::new(),
            instruments: Vec::new(),
            cosmology,
            fov: None,
            super_resolution_factor: None,
            seds: BTreeMap::new(),
            galaxy_seds: BTreeMap::new(),
            photometry: BTreeMap::new(),
            images: BTreeMap::new(),
        }
    }

    pub fn with_fov(mut self, fov: Length) -> Self {
        self.fov = Some(fov);
        self
    }

    pub fn with_super_resolution_factor(mut self, factor: u32) -> Self {
        self.super_resolution_factor = Some(factor);
        self
    }

    pub fn ngalaxies(&self) -> usize {
        self.galaxies.len()
    }

    pub fn ninstruments(&self) -> usize {
        self.instruments.len()
    }

    /// Filters summed over every instrument
    pub fn nfilters(&self) -> usize {
        self.instruments.iter().map(|(_, inst)| inst.nfilters()).sum()
    }

    pub fn galaxies(&self) -> &[Box<dyn Galaxy>] {
        &self.galaxies
    }

    pub fn instrument(&self, label: &str) -> Option<&Instrument> {
        self.instruments
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, inst)| inst)
    }

    /// Instruments in registration order
    pub fn instruments(&self) -> impl Iterator<Item = (&str, &Instrument)> {
        self.instruments.iter().map(|(l, inst)| (l.as_str(), inst))
    }

    pub fn cosmology(&self) -> &dyn Cosmology {
        self.cosmology.as_ref()
    }

    pub fn fov(&self) -> Option<Length> {
        self.fov
    }

    pub fn super_resolution_factor(&self) -> Option<u32> {
        self.super_resolution_factor
    }

    pub fn spectra(&self, kind: SpectrumKind) -> Option<&SurveySpectra> {
        self.seds.get(&kind)
    }

    /// Per-galaxy spectra of `kind`, in galaxy order
    pub fn galaxy_spectra(&self, kind: SpectrumKind) -> Option<&[SurveySpectra]> {
        self.galaxy_seds.get(&kind).map(Vec::as_slice)
    }

    pub fn photometry(&self) -> &SurveyPhotometry {
        &self.photometry
    }

    pub fn images(&self) -> &BTreeMap<String, Vec<GalaxyImage>> {
        &self.images
    }

    /// Register an instrument under `label`, replacing any instrument
    /// already registered under it.
    pub fn add_photometric_instrument(
        &mut self,
        label: &str,
        filters: FilterCollection,
        resolution: Option<Resolution>,
        options: InstrumentOptions,
    ) -> Result<(), SurveyError> {
        let instrument = Instrument::new(resolution, filters, options)?;
        self.add_instrument(label, instrument);
        Ok(())
    }

    /// Register an already validated instrument
    pub fn add_instrument(&mut self, label: &str, instrument: Instrument) {
        log::info!(
            "Adding instrument {label} ({}) with {} filters{}",
            instrument.name(),
            instrument.nfilters(),
            instrument
                .resolution()
                .map(|r| format!(" at {r} per pixel"))
                .unwrap_or_default()
        );

        match self.instruments.iter_mut().find(|(l, _)| l == label) {
            Some((_, existing)) => *existing = instrument,
            None => self.instruments.push((label.to_string(), instrument)),
        }
    }

    pub fn add_spectral_instrument(
        &mut self,
        _resolution: Resolution,
        _resolving_power: f64,
    ) -> Result<(), SurveyError> {
        Err(SurveyError::Unimplemented("Spectral instruments"))
    }

    /// Append one or several galaxies, keeping the existing ones first
    pub fn add_galaxies(&mut self, galaxies: impl Into<Galaxies>) {
        match galaxies.into() {
            Galaxies::One(galaxy) => self.galaxies.push(galaxy),
            Galaxies::Many(galaxies) => self.galaxies.extend(galaxies),
        }
        log::debug!("Survey now holds {} galaxies", self.ngalaxies());
    }

    /// Fails unless every instrument's depths are still magnitudes, so a
    /// conversion either touches all instruments or none.
    fn check_depths_convertible(&self) -> Result<(), SurveyError> {
        for (label, inst) in &self.instruments {
            if let Some(depths) = inst.depths() {
                if depths.unit() != DepthUnit::ApparentMagnitude {
                    log::warn!("Depths of {label} are already converted");
                    return Err(InstrumentError::DepthsAlreadyConverted(depths.unit()).into());
                }
            }
        }
        Ok(())
    }

    /// Convert every instrument's magnitude depths to nJy
    pub fn convert_mag_depth_to_fnu(&mut self) -> Result<(), SurveyError> {
        self.check_depths_convertible()?;
        for (_, inst) in self.instruments.iter_mut() {
            inst.convert_depths_to_flux()?;
        }
        Ok(())
    }

    /// Convert every instrument's magnitude depths to rest-frame luminosity
    /// densities for sources at `redshift`
    pub fn convert_mag_depth_to_lnu(&mut self, redshift: f64) -> Result<(), SurveyError> {
        let luminosity_distance = self.cosmology.luminosity_distance(redshift);
        self.check_depths_convertible()?;

        for (_, inst) in self.instruments.iter_mut() {
            inst.convert_depths_to_luminosity(luminosity_distance, redshift)?;
        }
        Ok(())
    }

    /// Same as [`Survey::convert_mag_depth_to_lnu`]
    pub fn convert_mag_depth_to_fnu0(&mut self, redshift: f64) -> Result<(), SurveyError> {
        self.convert_mag_depth_to_lnu(redshift)
    }

    fn stack_spectra<F>(&mut self, lam: &WavelengthGrid, mut spectrum: F) -> Result<Sed, SurveyError>
    where
        F: FnMut(&mut dyn Galaxy) -> Result<Array1<f64>, GalaxyError>,
    {
        let mut specs = Array2::zeros((self.galaxies.len(), lam.len()));

        for (index, (galaxy, mut row)) in self.galaxies.iter_mut().zip(specs.rows_mut()).enumerate() {
            let values = spectrum(galaxy.as_mut())?;
            if values.len() != lam.len() {
                return Err(SurveyError::GalaxySpectrumLength {
                    index,
                    expected: lam.len(),
                    actual: values.len(),
                });
            }
            row.assign(&values);
        }

        Ok(Sed::batch(lam.clone(), specs)?)
    }

    fn store_spectra(
        &mut self,
        kind: SpectrumKind,
        rest: Sed,
        redshift: Option<f64>,
        igm: Option<&dyn IgmTransmission>,
    ) -> Result<(), SurveyError> {
        let observed = match redshift {
            None => rest.rest_frame(),
            Some(z) => rest.redshift(self.cosmology.as_ref(), z, igm)?,
        };

        log::info!(
            "Computed {kind} spectra for {} galaxies at z = {}",
            rest.nspectra(),
            observed.redshift()
        );
        self.seds.insert(kind, SurveySpectra { rest, observed });
        Ok(())
    }

    /// Intrinsic integrated spectrum of every galaxy, stored as
    /// [`SpectrumKind::Stellar`]. Without a redshift the spectra stay in the
    /// rest frame.
    pub fn get_integrated_stellar_spectra(
        &mut self,
        grid: &Grid,
        redshift: Option<f64>,
        igm: Option<&dyn IgmTransmission>,
    ) -> Result<(), SurveyError> {
        let rest = self.stack_spectra(&grid.lam, |g| g.generate_intrinsic_spectra(grid))?;
        self.store_spectra(SpectrumKind::Stellar, rest, redshift, igm)
    }

    /// Stellar spectrum of each galaxy built from its particles, kept per
    /// galaxy as [`SpectrumKind::Stellar`]. Without a redshift the spectra
    /// stay in the rest frame.
    pub fn get_particle_stellar_spectra(
        &mut self,
        grid: &Grid,
        redshift: Option<f64>,
        igm: Option<&dyn IgmTransmission>,
    ) -> Result<(), SurveyError> {
        let mut spectra = Vec::with_capacity(self.galaxies.len());

        for galaxy in self.galaxies.iter_mut() {
            let rest = galaxy.generate_intrinsic_particle_spectra(grid)?;
            let observed = match redshift {
                None => rest.rest_frame(),
                Some(z) => rest.redshift(self.cosmology.as_ref(), z, igm)?,
            };
            spectra.push(SurveySpectra { rest, observed });
        }

        log::info!(
            "Computed particle stellar spectra for {} galaxies",
            spectra.len()
        );
        self.galaxy_seds.insert(SpectrumKind::Stellar, spectra);
        Ok(())
    }

    /// Screen-attenuated spectra on the grid of the stored stellar spectra
    pub fn get_integrated_spectra_screen(
        &mut self,
        tau_v: f64,
        redshift: Option<f64>,
        igm: Option<&dyn IgmTransmission>,
        kind: SpectrumKind,
    ) -> Result<(), SurveyError> {
        let lam = self
            .seds
            .get(&SpectrumKind::Stellar)
            .map(|s| s.rest.lam().clone())
            .ok_or(SurveyError::MissingSpectra(SpectrumKind::Stellar))?;

        let rest = self.stack_spectra(&lam, |g| g.apply_screen(tau_v))?;
        self.store_spectra(kind, rest, redshift, igm)
    }

    /// Charlot & Fall (2000) attenuated spectra on the grid's wavelengths
    pub fn get_integrated_spectra_charlot_fall_00(
        &mut self,
        grid: &Grid,
        tau_v_ism: f64,
        tau_v_bc: f64,
        redshift: Option<f64>,
        igm: Option<&dyn IgmTransmission>,
        kind: SpectrumKind,
    ) -> Result<(), SurveyError> {
        let rest = self.stack_spectra(&grid.lam, |g| {
            g.apply_charlot_fall_00(grid, tau_v_ism, tau_v_bc)
        })?;
        self.store_spectra(kind, rest, redshift, igm)
    }

    /// Broadband photometry of the `kind` spectra through every instrument.
    ///
    /// Filters are resampled from their original curves onto the observed
    /// wavelengths of the spectra. Nothing is written unless every
    /// instrument succeeds.
    pub fn get_photometry(
        &mut self,
        kind: SpectrumKind,
        keying: PhotometryKeying,
    ) -> Result<&SurveyPhotometry, SurveyError> {
        let spectra = self.seds.get(&kind).ok_or(SurveyError::MissingSpectra(kind))?;
        let observed = &spectra.observed;

        let mut computed = Vec::new();
        for (label, inst) in &self.instruments {
            let filters = inst.filters().resampled(observed.lam())?;
            let fluxes = observed.broadband_fluxes(&filters)?;

            for (code, values) in fluxes.into_bands() {
                let key = match keying {
                    PhotometryKeying::Namespaced => PhotometryKey::namespaced(label, &code),
                    PhotometryKeying::Flattened => PhotometryKey::flat(&code),
                };
                computed.push((key, values));
            }
        }

        for (key, values) in computed {
            if self.photometry.insert(key.clone(), values).is_some() {
                log::debug!("Overwriting photometry for {key}");
            }
        }

        Ok(&self.photometry)
    }

    /// [`Survey::get_photometry`] with the spectrum kind given by name
    pub fn get_photometry_by_name(
        &mut self,
        kind: &str,
        keying: PhotometryKeying,
    ) -> Result<&SurveyPhotometry, SurveyError> {
        let kind: SpectrumKind = kind.parse()?;
        self.get_photometry(kind, keying)
    }

    /// Images of every galaxy through every instrument, in galaxy order.
    ///
    /// Each galaxy receives its own spectra of the requested kind when
    /// [`Survey::get_particle_stellar_spectra`] has produced them.
    pub fn make_images(
        &mut self,
        options: &ImageOptions<'_>,
    ) -> Result<&BTreeMap<String, Vec<GalaxyImage>>, SurveyError> {
        let mut images = BTreeMap::new();
        let galaxy_seds = self.galaxy_seds.get(&options.spectrum_kind);

        for (label, inst) in &self.instruments {
            let per_galaxy = self
                .galaxies
                .iter()
                .enumerate()
                .map(|(index, g)| {
                    g.make_image(&ImageRequest {
                        label,
                        instrument: inst,
                        img_type: options.img_type,
                        spectrum_kind: options.spectrum_kind,
                        fov: self.fov,
                        super_resolution_factor: self.super_resolution_factor,
                        rest_frame: options.rest_frame,
                        redshift: options.redshift,
                        igm: options.igm,
                        spectra: galaxy_seds.and_then(|seds| seds.get(index)),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            images.insert(label.clone(), per_galaxy);
        }

        self.images = images;
        Ok(&self.images)
    }

    pub fn make_field_image(&mut self, _centre: (f64, f64)) -> Result<GalaxyImage, SurveyError> {
        Err(SurveyError::Unimplemented("Field images"))
    }

    pub fn make_ifus(&mut self) -> Result<(), SurveyError> {
        Err(SurveyError::Unimplemented("IFUs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::galaxy::PowerLawGalaxy;
    use crate::instrument::{Depths, PerFilter};
    use approx::assert_relative_eq;

    fn grid() -> Grid {
        Grid::new(
            WavelengthGrid::logspace(900.0, 30000.0, 2000).unwrap(),
            vec![6.0, 7.0],
            vec![0.02],
        )
    }

    fn survey_with_galaxies(n: usize) -> Survey {
        let mut survey = Survey::default();
        let galaxies: Vec<Box<dyn Galaxy>> = (0..n)
            .map(|i| Box::new(PowerLawGalaxy::new(1e28 * (i + 1) as f64, -2.0)) as Box<dyn Galaxy>)
            .collect();
        survey.add_galaxies(galaxies);
        survey
    }

    #[test]
    fn test_spectrum_kind_parsing() {
        assert_eq!("stellar".parse::<SpectrumKind>().unwrap(), SpectrumKind::Stellar);
        assert!(matches!(
            "bogus".parse::<SpectrumKind>(),
            Err(SurveyError::UnrecognizedSpectrumKind(s)) if s == "bogus"
        ));
    }

    #[test]
    fn test_counts_follow_collections() {
        let mut survey = survey_with_galaxies(2);
        survey
            .add_photometric_instrument("uvj", FilterCollection::uvj(None).unwrap(), None, Default::default())
            .unwrap();

        assert_eq!(survey.ngalaxies(), 2);
        assert_eq!(survey.ninstruments(), 1);
        assert_eq!(survey.nfilters(), 3);

        // Re-adding a label replaces the instrument
        survey
            .add_photometric_instrument("uvj", FilterCollection::uvj(None).unwrap(), None, Default::default())
            .unwrap();
        assert_eq!(survey.ninstruments(), 1);
        assert_eq!(survey.nfilters(), 3);
    }

    #[test]
    fn test_failed_instrument_is_not_registered() {
        let mut survey = Survey::default();
        let options = InstrumentOptions {
            snrs: Some(PerFilter::ByFilter([("U".to_string(), 5.0)].into_iter().collect())),
            ..Default::default()
        };

        let result = survey.add_photometric_instrument("uvj", FilterCollection::uvj(None).unwrap(), None, options);
        assert!(matches!(
            result,
            Err(SurveyError::Instrument(InstrumentError::InconsistentArguments {
                field: "snrs",
                expected: 3,
                actual: 1
            }))
        ));
        assert_eq!(survey.ninstruments(), 0);
    }

    #[test]
    fn test_rest_frame_stellar_spectra() {
        let grid = grid();
        let mut survey = survey_with_galaxies(3);
        survey.get_integrated_stellar_spectra(&grid, None, None).unwrap();

        let spectra = survey.spectra(SpectrumKind::Stellar).unwrap();
        assert_eq!(spectra.rest.lnu().dim(), (3, grid.lam.len()));
        assert!(spectra.observed.lam().same_as(&grid.lam));
        assert_eq!(spectra.observed.fnu(), spectra.rest.lnu());
    }

    #[test]
    fn test_screen_needs_stellar_spectra() {
        let mut survey = survey_with_galaxies(1);
        assert!(matches!(
            survey.get_integrated_spectra_screen(0.5, None, None, SpectrumKind::Attenuated),
            Err(SurveyError::MissingSpectra(SpectrumKind::Stellar))
        ));
    }

    #[test]
    fn test_photometry_of_flat_spectra() {
        let grid = grid();
        let mut survey = survey_with_galaxies(2);
        survey
            .add_photometric_instrument("uvj", FilterCollection::uvj(None).unwrap(), None, Default::default())
            .unwrap();
        survey.get_integrated_stellar_spectra(&grid, None, None).unwrap();

        let photometry = survey
            .get_photometry(SpectrumKind::Stellar, PhotometryKeying::Namespaced)
            .unwrap();

        assert_eq!(photometry.len(), 3);
        let v = &photometry[&PhotometryKey::namespaced("uvj", "V")];
        assert_relative_eq!(v[0], 1e28, max_relative = 1e-9);
        assert_relative_eq!(v[1], 2e28, max_relative = 1e-9);
    }

    #[test]
    fn test_depth_conversion_refused_twice() {
        let mut survey = Survey::default();
        let options = InstrumentOptions {
            depths: Some(Depths::magnitudes(28.0)),
            ..Default::default()
        };
        survey
            .add_photometric_instrument("uvj", FilterCollection::uvj(None).unwrap(), None, options)
            .unwrap();

        survey.convert_mag_depth_to_lnu(2.0).unwrap();
        let unit = survey.instrument("uvj").unwrap().depths().unwrap().unit();
        assert_eq!(unit, DepthUnit::LuminosityDensity);

        assert!(survey.convert_mag_depth_to_fnu0(2.0).is_err());
        assert!(survey.convert_mag_depth_to_fnu().is_err());
    }

    #[test]
    fn test_unimplemented_operations() {
        let mut survey = Survey::default();
        assert!(matches!(survey.make_ifus(), Err(SurveyError::Unimplemented(_))));
        assert!(matches!(
            survey.make_field_image((0.0, 0.0)),
            Err(SurveyError::Unimplemented(_))
        ));
        assert!(matches!(
            survey.add_spectral_instrument(Resolution::arcseconds(0.1), 1000.0),
            Err(SurveyError::Unimplemented(_))
        ));
    }
}
