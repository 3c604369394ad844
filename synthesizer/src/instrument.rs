//! Instrument configuration
//!
//! An [`Instrument`] bundles a filter collection with everything needed to
//! observe through it: spatial resolution, PSFs, depths, apertures, SNRs and
//! noise levels. Per-filter settings are either one value for every filter
//! or a mapping keyed by filter code; mappings are validated against the
//! filters when the instrument is built.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uom::si::angle::second;
use uom::si::f64::{Angle, Length};
use uom::si::length::centimeter;

use crate::photometry::filters::FilterCollection;
use crate::photometry::units::{flux_to_luminosity, m_to_flux};

/// Errors that can occur when configuring an instrument
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InstrumentError {
    #[error(
        "Inconsistent number of entries in instrument dictionaries, \
         len(filters)={expected}, len({field})={actual}"
    )]
    InconsistentArguments {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field} has an entry for '{code}', which is not one of the instrument's filters")]
    UnknownFilter { field: &'static str, code: String },

    #[error("Instrument needs at least one filter")]
    NoFilters,

    #[error("Depths are already in {0}, only magnitudes can be converted")]
    DepthsAlreadyConverted(DepthUnit),

    #[error("Luminosity distance must be positive, got {0} cm")]
    NonPositiveDistance(f64),

    #[error("PSF kernel must be non-empty with a positive sum")]
    InvalidPsf,

    #[error("{0} is not implemented yet")]
    Unimplemented(&'static str),
}

/// Pixel scale of the images an instrument produces
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Angular size of a pixel on the sky
    Angular(Angle),
    /// Physical size of a pixel at the source
    Physical(Length),
}

impl Resolution {
    pub fn arcseconds(value: f64) -> Self {
        Resolution::Angular(Angle::new::<second>(value))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Angular(a) => write!(f, "{:.4} arcsec", a.get::<second>()),
            Resolution::Physical(l) => write!(f, "{:.4e} cm", l.get::<centimeter>()),
        }
    }
}

/// A setting given once for every filter or per filter code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerFilter<T> {
    Uniform(T),
    ByFilter(BTreeMap<String, T>),
}

impl<T> PerFilter<T> {
    /// Value for one filter
    pub fn get(&self, code: &str) -> Option<&T> {
        match self {
            PerFilter::Uniform(v) => Some(v),
            PerFilter::ByFilter(map) => map.get(code),
        }
    }

    /// Number of entries when given per filter
    pub fn entries(&self) -> Option<usize> {
        match self {
            PerFilter::Uniform(_) => None,
            PerFilter::ByFilter(map) => Some(map.len()),
        }
    }

    /// Apply `f` to every stored value in place
    pub fn update<F>(&mut self, mut f: F)
    where
        F: FnMut(&T) -> T,
    {
        match self {
            PerFilter::Uniform(v) => *v = f(v),
            PerFilter::ByFilter(map) => {
                for v in map.values_mut() {
                    *v = f(v);
                }
            }
        }
    }

    fn validate(&self, field: &'static str, filters: &FilterCollection) -> Result<(), InstrumentError> {
        let PerFilter::ByFilter(map) = self else {
            return Ok(());
        };

        if map.len() != filters.len() {
            return Err(InstrumentError::InconsistentArguments {
                field,
                expected: filters.len(),
                actual: map.len(),
            });
        }

        if let Some(code) = map.keys().find(|code| !filters.contains(code)) {
            return Err(InstrumentError::UnknownFilter {
                field,
                code: code.clone(),
            });
        }

        Ok(())
    }
}

impl<T> From<T> for PerFilter<T> {
    fn from(value: T) -> Self {
        PerFilter::Uniform(value)
    }
}

/// Unit depths are currently expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthUnit {
    ApparentMagnitude,
    NanoJansky,
    LuminosityDensity,
}

impl fmt::Display for DepthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepthUnit::ApparentMagnitude => write!(f, "apparent AB magnitudes"),
            DepthUnit::NanoJansky => write!(f, "nJy"),
            DepthUnit::LuminosityDensity => write!(f, "erg/s/Hz"),
        }
    }
}

/// Limiting depths together with their unit
#[derive(Debug, Clone, PartialEq)]
pub struct Depths {
    values: PerFilter<f64>,
    unit: DepthUnit,
}

impl Depths {
    /// Depths given as apparent AB magnitudes
    pub fn magnitudes(values: impl Into<PerFilter<f64>>) -> Self {
        Self {
            values: values.into(),
            unit: DepthUnit::ApparentMagnitude,
        }
    }

    pub fn values(&self) -> &PerFilter<f64> {
        &self.values
    }

    pub fn unit(&self) -> DepthUnit {
        self.unit
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.values.get(code).copied()
    }

    fn require_magnitudes(&self) -> Result<(), InstrumentError> {
        match self.unit {
            DepthUnit::ApparentMagnitude => Ok(()),
            unit => Err(InstrumentError::DepthsAlreadyConverted(unit)),
        }
    }

    fn convert_to_flux(&mut self) -> Result<(), InstrumentError> {
        self.require_magnitudes()?;
        self.values.update(|&m| m_to_flux(m));
        self.unit = DepthUnit::NanoJansky;
        Ok(())
    }

    fn convert_to_luminosity(&mut self, luminosity_distance: Length, redshift: f64) -> Result<(), InstrumentError> {
        self.require_magnitudes()?;
        self.values
            .update(|&m| flux_to_luminosity(m_to_flux(m), luminosity_distance, redshift));
        self.unit = DepthUnit::LuminosityDensity;
        Ok(())
    }
}

/// Point spread function kernel in pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Psf {
    kernel: Array2<f64>,
}

impl Psf {
    /// Kernel normalised to unit sum
    pub fn new(kernel: Array2<f64>) -> Result<Self, InstrumentError> {
        let total = kernel.sum();
        if kernel.is_empty() || !(total.is_finite() && total > 0.0) {
            return Err(InstrumentError::InvalidPsf);
        }
        Ok(Self {
            kernel: kernel / total,
        })
    }

    /// Circular Gaussian with standard deviation `sigma` pixels on a
    /// `size`×`size` stamp
    pub fn gaussian(sigma: f64, size: usize) -> Result<Self, InstrumentError> {
        let centre = (size as f64 - 1.0) / 2.0;
        let kernel = Array2::from_shape_fn((size, size), |(y, x)| {
            let r2 = (x as f64 - centre).powi(2) + (y as f64 - centre).powi(2);
            (-r2 / (2.0 * sigma * sigma)).exp()
        });
        Self::new(kernel)
    }

    pub fn kernel(&self) -> &Array2<f64> {
        &self.kernel
    }
}

/// Optional per-filter settings of an instrument
#[derive(Debug, Clone, Default)]
pub struct InstrumentOptions {
    pub psfs: Option<PerFilter<Psf>>,
    pub depths: Option<Depths>,
    pub apertures: Option<PerFilter<f64>>,
    pub snrs: Option<PerFilter<f64>>,
    pub noises: Option<PerFilter<f64>>,
    pub resolving_power: Option<f64>,
}

/// One observational setup
#[derive(Debug, Clone)]
pub struct Instrument {
    resolution: Option<Resolution>,
    filters: FilterCollection,
    psfs: Option<PerFilter<Psf>>,
    depths: Option<Depths>,
    apertures: Option<PerFilter<f64>>,
    snrs: Option<PerFilter<f64>>,
    noises: Option<PerFilter<f64>>,
    resolving_power: Option<f64>,
}

impl Instrument {
    /// Build an instrument, checking every per-filter mapping against the filters
    pub fn new(
        resolution: Option<Resolution>,
        filters: FilterCollection,
        options: InstrumentOptions,
    ) -> Result<Self, InstrumentError> {
        if filters.is_empty() {
            return Err(InstrumentError::NoFilters);
        }

        if let Some(psfs) = &options.psfs {
            psfs.validate("psfs", &filters)?;
        }
        if let Some(depths) = &options.depths {
            depths.values.validate("depths", &filters)?;
        }
        if let Some(apertures) = &options.apertures {
            apertures.validate("apertures", &filters)?;
        }
        if let Some(snrs) = &options.snrs {
            snrs.validate("snrs", &filters)?;
        }
        if let Some(noises) = &options.noises {
            noises.validate("noises", &filters)?;
        }

        Ok(Self {
            resolution,
            filters,
            psfs: options.psfs,
            depths: options.depths,
            apertures: options.apertures,
            snrs: options.snrs,
            noises: options.noises,
            resolving_power: options.resolving_power,
        })
    }

    /// `observatory/instrument` part of the first filter code
    pub fn name(&self) -> &str {
        let code = self.filters.iter().next().map(|f| f.code()).unwrap_or_default();
        code.split('.').next().unwrap_or(code)
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn filters(&self) -> &FilterCollection {
        &self.filters
    }

    pub fn nfilters(&self) -> usize {
        self.filters.len()
    }

    pub fn psfs(&self) -> Option<&PerFilter<Psf>> {
        self.psfs.as_ref()
    }

    pub fn depths(&self) -> Option<&Depths> {
        self.depths.as_ref()
    }

    pub fn apertures(&self) -> Option<&PerFilter<f64>> {
        self.apertures.as_ref()
    }

    pub fn snrs(&self) -> Option<&PerFilter<f64>> {
        self.snrs.as_ref()
    }

    pub fn noises(&self) -> Option<&PerFilter<f64>> {
        self.noises.as_ref()
    }

    pub fn resolving_power(&self) -> Option<f64> {
        self.resolving_power
    }

    /// Convert magnitude depths to nJy in place. No-op without depths.
    pub fn convert_depths_to_flux(&mut self) -> Result<(), InstrumentError> {
        match &mut self.depths {
            Some(depths) => depths.convert_to_flux(),
            None => Ok(()),
        }
    }

    /// Convert magnitude depths to rest-frame luminosity densities in place.
    /// No-op without depths.
    pub fn convert_depths_to_luminosity(
        &mut self,
        luminosity_distance: Length,
        redshift: f64,
    ) -> Result<(), InstrumentError> {
        let d_l_cm = luminosity_distance.get::<centimeter>();
        if d_l_cm.is_nan() || d_l_cm <= 0.0 {
            return Err(InstrumentError::NonPositiveDistance(d_l_cm));
        }

        match &mut self.depths {
            Some(depths) => depths.convert_to_luminosity(luminosity_distance, redshift),
            None => Ok(()),
        }
    }

    /// Wavelength sampling implied by the resolving power
    pub fn lam_from_resolving_power(&self) -> Result<Vec<f64>, InstrumentError> {
        Err(InstrumentError::Unimplemented("Wavelengths from resolving power"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uvj() -> FilterCollection {
        FilterCollection::uvj(None).unwrap()
    }

    fn per_filter(values: &[(&str, f64)]) -> PerFilter<f64> {
        PerFilter::ByFilter(values.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::arcseconds(0.05).to_string(), "0.0500 arcsec");
        let physical = Resolution::Physical(Length::new::<centimeter>(3.0e21));
        assert_eq!(physical.to_string(), "3.0000e21 cm");
    }

    #[test]
    fn test_depth_count_mismatch() {
        let options = InstrumentOptions {
            depths: Some(Depths::magnitudes(per_filter(&[("U", 28.0), ("V", 28.5)]))),
            ..Default::default()
        };

        let err = Instrument::new(None, uvj(), options).unwrap_err();
        assert_eq!(
            err,
            InstrumentError::InconsistentArguments {
                field: "depths",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_matching_depths_retrievable() {
        let depths = per_filter(&[("U", 28.0), ("V", 28.5), ("J", 27.1)]);
        let options = InstrumentOptions {
            depths: Some(Depths::magnitudes(depths.clone())),
            snrs: Some(PerFilter::Uniform(5.0)),
            ..Default::default()
        };

        let inst = Instrument::new(Some(Resolution::arcseconds(0.031)), uvj(), options).unwrap();
        assert_eq!(inst.depths().unwrap().values(), &depths);
        assert_eq!(inst.depths().unwrap().unit(), DepthUnit::ApparentMagnitude);
        assert_eq!(inst.snrs().unwrap().get("J"), Some(&5.0));
    }

    #[test]
    fn test_unknown_filter_key() {
        let options = InstrumentOptions {
            apertures: Some(per_filter(&[("U", 0.3), ("V", 0.3), ("K", 0.3)])),
            ..Default::default()
        };
        assert!(matches!(
            Instrument::new(None, uvj(), options),
            Err(InstrumentError::UnknownFilter { field: "apertures", .. })
        ));
    }

    #[test]
    fn test_depth_conversion_once() {
        let options = InstrumentOptions {
            depths: Some(Depths::magnitudes(31.4)),
            ..Default::default()
        };
        let mut inst = Instrument::new(None, uvj(), options).unwrap();

        inst.convert_depths_to_flux().unwrap();
        let depths = inst.depths().unwrap();
        assert_eq!(depths.unit(), DepthUnit::NanoJansky);
        assert_relative_eq!(depths.get("V").unwrap(), 1.0, max_relative = 1e-12);

        assert_eq!(
            inst.convert_depths_to_flux(),
            Err(InstrumentError::DepthsAlreadyConverted(DepthUnit::NanoJansky))
        );
    }

    #[test]
    fn test_luminosity_conversion_rejects_zero_distance() {
        let options = InstrumentOptions {
            depths: Some(Depths::magnitudes(29.0)),
            ..Default::default()
        };
        let mut inst = Instrument::new(None, uvj(), options).unwrap();
        let zero = Length::new::<centimeter>(0.0);

        assert!(matches!(
            inst.convert_depths_to_luminosity(zero, 0.0),
            Err(InstrumentError::NonPositiveDistance(_))
        ));
        assert_eq!(inst.depths().unwrap().unit(), DepthUnit::ApparentMagnitude);
    }

    #[test]
    fn test_psf_normalised() {
        let psf = Psf::gaussian(1.5, 11).unwrap();
        assert_relative_eq!(psf.kernel().sum(), 1.0, epsilon = 1e-12);
        assert!(Psf::new(Array2::zeros((3, 3))).is_err());
    }

    #[test]
    fn test_name_and_unimplemented() {
        let grid_free = FilterCollection::top_hats(
            &[crate::photometry::filters::TopHatSpec::effective("Sim/Cam.a", 5000.0, 500.0)],
            None,
        )
        .unwrap();
        let inst = Instrument::new(None, grid_free, InstrumentOptions::default()).unwrap();

        assert_eq!(inst.name(), "Sim/Cam");
        assert!(matches!(
            inst.lam_from_resolving_power(),
            Err(InstrumentError::Unimplemented(_))
        ));
    }
}
