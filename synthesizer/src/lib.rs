//! Synthetic observations of simulated galaxies
//!
//! Spectral energy distributions, filter curves and broadband photometry,
//! plus the instrument and survey layers that turn the spectra of a set of
//! galaxies into observables.

pub mod algo;
pub mod config;
pub mod cosmology;
pub mod galaxy;
pub mod instrument;
pub mod photometry;
pub mod survey;

pub use config::{ConfigError, SurveyConfig};
pub use cosmology::{Cosmology, FlatLambdaCdm};
pub use galaxy::{Galaxy, GalaxyError, GalaxyImage, Grid, ImageRequest, ImageType, PowerLawGalaxy};
pub use instrument::{Depths, DepthUnit, Instrument, InstrumentError, InstrumentOptions, PerFilter, Psf, Resolution};
pub use photometry::{Filter, FilterCollection, ObservedSed, Sed, WavelengthGrid};
pub use survey::{PhotometryKeying, PhotometryKey, SpectrumKind, Survey, SurveyError};
