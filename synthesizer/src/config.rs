//! JSON survey configuration
//!
//! Describes the cosmology, field and instruments of a survey so that a run
//! can be reproduced from a file. Galaxies are not part of the
//! configuration; they are added to the built [`Survey`] by the caller.
//!
//! ```json
//! {
//!   "super_resolution_factor": 2,
//!   "instruments": [
//!     {
//!       "label": "rest",
//!       "filters": { "kind": "uvj" },
//!       "depths": { "U": 28.0, "V": 28.5, "J": 27.0 }
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uom::si::f64::Length;
use uom::si::length::meter;

use crate::cosmology::FlatLambdaCdm;
use crate::instrument::{Depths, Instrument, InstrumentError, InstrumentOptions, PerFilter, Psf, Resolution};
use crate::photometry::filters::{FilterCollection, FilterError, LocalFilterStore, SvoFilterSource, TopHatSpec};
use crate::survey::Survey;

/// Meters in one kiloparsec
const M_PER_KPC: f64 = 3.085_677_581_491_367_3e19;

/// PSF stamps extend this many standard deviations from the centre
const PSF_HALF_WIDTH_SIGMA: f64 = 4.0;

/// Errors that can occur while loading or applying a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Instrument '{label}': {source}")]
    Filter {
        label: String,
        #[source]
        source: FilterError,
    },

    #[error("Instrument '{label}': {source}")]
    Instrument {
        label: String,
        #[source]
        source: InstrumentError,
    },
}

/// Where an instrument's filters come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSetConfig {
    /// Rest-frame U, V, J tophats
    Uvj,
    TopHats { bands: Vec<TopHatSpec> },
    /// Curves fetched from the SVO filter profile service
    Svo {
        codes: Vec<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
    /// Curves read from `{dir}/{observatory}/{instrument}.{band}.dat`
    Local { dir: PathBuf, codes: Vec<String> },
}

impl FilterSetConfig {
    pub fn build(&self) -> Result<FilterCollection, FilterError> {
        match self {
            FilterSetConfig::Uvj => FilterCollection::uvj(None),
            FilterSetConfig::TopHats { bands } => FilterCollection::top_hats(bands, None),
            FilterSetConfig::Svo { codes, base_url } => {
                let source = match base_url {
                    Some(url) => SvoFilterSource::with_base_url(url),
                    None => SvoFilterSource::new(),
                }
                .map_err(|e| FilterError::Fetch {
                    code: codes.join(","),
                    reason: e.to_string(),
                })?;
                let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
                FilterCollection::from_source(&source, &codes, None)
            }
            FilterSetConfig::Local { dir, codes } => {
                let store = LocalFilterStore::new(dir);
                let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
                FilterCollection::from_source(&store, &codes, None)
            }
        }
    }
}

/// One photometric instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub label: String,
    pub filters: FilterSetConfig,
    #[serde(default)]
    pub resolution_arcsec: Option<f64>,
    /// Gaussian PSF standard deviation in pixels
    #[serde(default)]
    pub psf_sigma_pixels: Option<PerFilter<f64>>,
    /// Limiting apparent AB magnitudes
    #[serde(default)]
    pub depths: Option<PerFilter<f64>>,
    #[serde(default)]
    pub apertures: Option<PerFilter<f64>>,
    #[serde(default)]
    pub snrs: Option<PerFilter<f64>>,
    #[serde(default)]
    pub noises: Option<PerFilter<f64>>,
    #[serde(default)]
    pub resolving_power: Option<f64>,
}

fn gaussian_psf(sigma: f64) -> Result<Psf, InstrumentError> {
    let half = (PSF_HALF_WIDTH_SIGMA * sigma).ceil() as usize;
    Psf::gaussian(sigma, 2 * half + 1)
}

impl InstrumentConfig {
    pub fn build(&self) -> Result<Instrument, ConfigError> {
        let filters = self.filters.build().map_err(|source| ConfigError::Filter {
            label: self.label.clone(),
            source,
        })?;

        let instrument_error = |source| ConfigError::Instrument {
            label: self.label.clone(),
            source,
        };

        let psfs = match &self.psf_sigma_pixels {
            None => None,
            Some(PerFilter::Uniform(sigma)) => {
                Some(PerFilter::Uniform(gaussian_psf(*sigma).map_err(instrument_error)?))
            }
            Some(PerFilter::ByFilter(sigmas)) => Some(PerFilter::ByFilter(
                sigmas
                    .iter()
                    .map(|(code, &sigma)| gaussian_psf(sigma).map(|psf| (code.clone(), psf)))
                    .collect::<Result<_, _>>()
                    .map_err(instrument_error)?,
            )),
        };

        let options = InstrumentOptions {
            psfs,
            depths: self.depths.clone().map(Depths::magnitudes),
            apertures: self.apertures.clone(),
            snrs: self.snrs.clone(),
            noises: self.noises.clone(),
            resolving_power: self.resolving_power,
        };

        let resolution = self.resolution_arcsec.map(Resolution::arcseconds);
        Instrument::new(resolution, filters, options).map_err(instrument_error)
    }
}

/// Complete survey description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub cosmology: FlatLambdaCdm,
    /// Field of view side length in kpc
    #[serde(default)]
    pub fov_kpc: Option<f64>,
    #[serde(default)]
    pub super_resolution_factor: Option<u32>,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

impl SurveyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Survey with every configured instrument registered and no galaxies
    pub fn build(&self) -> Result<Survey, ConfigError> {
        let mut survey = Survey::new(Box::new(self.cosmology));

        if let Some(fov) = self.fov_kpc {
            survey = survey.with_fov(Length::new::<meter>(fov * M_PER_KPC));
        }
        if let Some(factor) = self.super_resolution_factor {
            survey = survey.with_super_resolution_factor(factor);
        }

        for config in &self.instruments {
            let instrument = config.build()?;
            survey.add_instrument(&config.label, instrument);
        }

        Ok(survey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::DepthUnit;
    use approx::assert_relative_eq;
    use std::io::Write;
    use uom::si::length::kilometer;

    const EXAMPLE: &str = r#"{
        "fov_kpc": 30.0,
        "super_resolution_factor": 2,
        "instruments": [
            {
                "label": "rest",
                "filters": { "kind": "uvj" },
                "resolution_arcsec": 0.05,
                "depths": { "U": 28.0, "V": 28.5, "J": 27.0 },
                "snrs": 5.0
            },
            {
                "label": "boxes",
                "filters": {
                    "kind": "top_hats",
                    "bands": [
                        { "code": "Sim/Box.blue", "lam_eff": 4500.0, "lam_fwhm": 1000.0 },
                        { "code": "Sim/Box.red", "lam_min": 6000.0, "lam_max": 7000.0 }
                    ]
                },
                "psf_sigma_pixels": 1.2
            }
        ]
    }"#;

    #[test]
    fn test_parse_and_build() {
        let config = SurveyConfig::from_json_str(EXAMPLE).unwrap();
        assert_eq!(config.cosmology, FlatLambdaCdm::planck18());

        let survey = config.build().unwrap();
        assert_eq!(survey.ninstruments(), 2);
        assert_eq!(survey.nfilters(), 5);
        assert_eq!(survey.super_resolution_factor(), Some(2));
        assert_relative_eq!(
            survey.fov().unwrap().get::<kilometer>(),
            30.0 * M_PER_KPC / 1000.0,
            max_relative = 1e-12
        );

        let rest = survey.instrument("rest").unwrap();
        assert_eq!(rest.depths().unwrap().unit(), DepthUnit::ApparentMagnitude);
        assert_eq!(rest.depths().unwrap().get("V"), Some(28.5));
        assert_eq!(rest.snrs().unwrap().get("U"), Some(&5.0));

        let boxes = survey.instrument("boxes").unwrap();
        assert_eq!(boxes.filters().filter_codes(), vec!["Sim/Box.blue", "Sim/Box.red"]);
        assert_eq!(boxes.filters().get("Sim/Box.red").unwrap().min(), Some(6001.0));
        assert!(boxes.psfs().unwrap().get("Sim/Box.red").is_some());
    }

    #[test]
    fn test_bad_depths_name_instrument() {
        let json = r#"{
            "instruments": [
                { "label": "rest", "filters": { "kind": "uvj" }, "depths": { "U": 28.0 } }
            ]
        }"#;

        let err = SurveyConfig::from_json_str(json).unwrap().build().err().unwrap();
        assert!(matches!(
            err,
            ConfigError::Instrument {
                ref label,
                source: InstrumentError::InconsistentArguments { expected: 3, actual: 1, .. }
            } if label == "rest"
        ));
    }

    #[test]
    fn test_local_filters_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Sim")).unwrap();
        let mut file = std::fs::File::create(dir.path().join("Sim").join("Cam.g.dat")).unwrap();
        writeln!(file, "4000 0.0\n4500 0.9\n5000 0.0").unwrap();

        let config = SurveyConfig {
            cosmology: FlatLambdaCdm::planck18(),
            fov_kpc: None,
            super_resolution_factor: None,
            instruments: vec![InstrumentConfig {
                label: "cam".to_string(),
                filters: FilterSetConfig::Local {
                    dir: dir.path().to_path_buf(),
                    codes: vec!["Sim/Cam.g".to_string()],
                },
                resolution_arcsec: None,
                psf_sigma_pixels: None,
                depths: None,
                apertures: None,
                snrs: None,
                noises: None,
                resolving_power: None,
            }],
        };

        let path = dir.path().join("survey.json");
        config.save_to_file(&path).unwrap();
        let loaded = SurveyConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let survey = loaded.build().unwrap();
        let filter = survey.instrument("cam").unwrap().filters().get("Sim/Cam.g").unwrap();
        assert_eq!(filter.t_peak(), 0.9);
    }

    #[test]
    fn test_missing_local_filter() {
        let dir = tempfile::tempdir().unwrap();
        let json = format!(
            r#"{{ "instruments": [ {{ "label": "cam", "filters": {{ "kind": "local", "dir": {:?}, "codes": ["Sim/Cam.z"] }} }} ] }}"#,
            dir.path()
        );

        let err = SurveyConfig::from_json_str(&json).unwrap().build().err().unwrap();
        assert!(matches!(err, ConfigError::Filter { source: FilterError::Io(_), .. }));
    }
}
