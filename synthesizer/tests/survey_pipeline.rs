//! End-to-end survey tests with synthetic power-law galaxies

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use synthesizer::galaxy::{Galaxy, GalaxyError, GalaxyImage, Grid, ImageRequest, ImageType};
use synthesizer::instrument::{Depths, InstrumentError, InstrumentOptions, PerFilter, Resolution};
use synthesizer::photometry::filters::{FilterCollection, TopHatSpec, TopHatBand};
use synthesizer::photometry::sed::SedError;
use synthesizer::photometry::units::luminosity_to_flux;
use synthesizer::photometry::{Madau96, WavelengthGrid};
use synthesizer::survey::{ImageOptions, PhotometryKey, PhotometryKeying, SpectrumKind, Survey, SurveyError};
use synthesizer::{Cosmology, FlatLambdaCdm};

/// Power-law galaxy that stamps its id into every image it renders
struct TaggedGalaxy {
    id: usize,
    lnu_1500: f64,
    beta: f64,
    lam: Option<WavelengthGrid>,
}

impl TaggedGalaxy {
    fn boxed(id: usize, lnu_1500: f64, beta: f64) -> Box<dyn Galaxy> {
        Box::new(Self {
            id,
            lnu_1500,
            beta,
            lam: None,
        })
    }

    fn spectrum(&self, lam: &WavelengthGrid, dust: impl Fn(f64) -> f64) -> Array1<f64> {
        lam.as_slice()
            .iter()
            .map(|&l| self.lnu_1500 * (l / 1500.0).powf(self.beta + 2.0) * dust(l))
            .collect()
    }
}

impl Galaxy for TaggedGalaxy {
    fn generate_intrinsic_spectra(&mut self, grid: &Grid) -> Result<Array1<f64>, GalaxyError> {
        self.lam = Some(grid.lam.clone());
        Ok(self.spectrum(&grid.lam, |_| 1.0))
    }

    fn apply_screen(&mut self, tau_v: f64) -> Result<Array1<f64>, GalaxyError> {
        let lam = self.lam.clone().ok_or(GalaxyError::NoIntrinsicSpectrum)?;
        Ok(self.spectrum(&lam, |l| (-tau_v * 5500.0 / l).exp()))
    }

    fn apply_charlot_fall_00(
        &mut self,
        grid: &Grid,
        tau_v_ism: f64,
        tau_v_bc: f64,
    ) -> Result<Array1<f64>, GalaxyError> {
        Ok(self.spectrum(&grid.lam, |l| (-(tau_v_ism + tau_v_bc) * 5500.0 / l).exp()))
    }

    fn make_image(&self, request: &ImageRequest<'_>) -> Result<GalaxyImage, GalaxyError> {
        let mut image = GalaxyImage::new();
        for filter in request.instrument.filters() {
            image.insert(filter.code(), Array2::from_elem((1, 1), self.id as f64));
        }
        if let Some(spectra) = request.spectra {
            image.insert("spectrum", Array2::from_elem((1, 1), spectra.observed.fnu()[[0, 0]]));
        }
        Ok(image)
    }
}

fn grid() -> Grid {
    Grid::new(
        WavelengthGrid::logspace(900.0, 40000.0, 3000).unwrap(),
        vec![6.0, 7.0, 8.0, 9.0],
        vec![0.001, 0.01, 0.02],
    )
}

fn survey_with_uvj() -> Survey {
    let mut survey = Survey::new(Box::new(FlatLambdaCdm::planck18()));
    survey
        .add_photometric_instrument(
            "rest",
            FilterCollection::uvj(None).unwrap(),
            Some(Resolution::arcseconds(0.05)),
            InstrumentOptions::default(),
        )
        .unwrap();
    survey
}

#[test]
fn test_add_galaxies_single_then_many() {
    let mut survey = survey_with_uvj();
    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -2.0));
    survey.add_galaxies(vec![
        TaggedGalaxy::boxed(1, 2e28, -2.0),
        TaggedGalaxy::boxed(2, 3e28, -2.0),
    ]);

    assert_eq!(survey.ngalaxies(), 3);

    let images = survey
        .make_images(&ImageOptions {
            img_type: ImageType::Smoothed,
            spectrum_kind: SpectrumKind::Stellar,
            rest_frame: true,
            redshift: None,
            igm: None,
        })
        .unwrap();

    let ids: Vec<f64> = images["rest"]
        .iter()
        .map(|img| img.get("V").unwrap()[[0, 0]])
        .collect();
    assert_eq!(ids, vec![0.0, 1.0, 2.0]);
}

#[test]
fn test_bogus_spectrum_kind_leaves_photometry_alone() {
    let mut survey = survey_with_uvj();
    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -2.3));
    survey.get_integrated_stellar_spectra(&grid(), None, None).unwrap();

    let before = survey
        .get_photometry(SpectrumKind::Stellar, PhotometryKeying::Namespaced)
        .unwrap()
        .clone();
    assert_eq!(before.len(), 3);

    let result = survey.get_photometry_by_name("bogus_type", PhotometryKeying::Namespaced);
    assert!(matches!(result, Err(SurveyError::UnrecognizedSpectrumKind(ref s)) if s == "bogus_type"));
    assert_eq!(survey.photometry(), &before);
}

#[test]
fn test_missing_spectra_leaves_photometry_alone() {
    let mut survey = survey_with_uvj();
    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -2.0));

    let result = survey.get_photometry(SpectrumKind::Attenuated, PhotometryKeying::Namespaced);
    assert!(matches!(result, Err(SurveyError::MissingSpectra(SpectrumKind::Attenuated))));
    assert!(survey.photometry().is_empty());
}

#[test]
fn test_depth_mapping_must_cover_every_filter() {
    let mut survey = Survey::default();
    let partial: PerFilter<f64> = PerFilter::ByFilter(
        [("U".to_string(), 27.5), ("J".to_string(), 26.0)]
            .into_iter()
            .collect(),
    );

    let result = survey.add_photometric_instrument(
        "rest",
        FilterCollection::uvj(None).unwrap(),
        None,
        InstrumentOptions {
            depths: Some(Depths::magnitudes(partial)),
            ..Default::default()
        },
    );
    assert!(matches!(
        result,
        Err(SurveyError::Instrument(InstrumentError::InconsistentArguments {
            field: "depths",
            expected: 3,
            actual: 2
        }))
    ));
    assert_eq!(survey.ninstruments(), 0);

    let full: PerFilter<f64> = PerFilter::ByFilter(
        [("U".to_string(), 27.5), ("V".to_string(), 28.0), ("J".to_string(), 26.0)]
            .into_iter()
            .collect(),
    );
    survey
        .add_photometric_instrument(
            "rest",
            FilterCollection::uvj(None).unwrap(),
            None,
            InstrumentOptions {
                depths: Some(Depths::magnitudes(full.clone())),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(survey.instrument("rest").unwrap().depths().unwrap().values(), &full);
    assert_eq!(survey.nfilters(), 3);
}

#[test]
fn test_zero_redshift_is_rejected() {
    let mut survey = survey_with_uvj();
    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -2.0));

    let result = survey.get_integrated_stellar_spectra(&grid(), Some(0.0), None);
    assert!(matches!(result, Err(SurveyError::Sed(SedError::NonPositiveRedshift(_)))));
    assert!(survey.spectra(SpectrumKind::Stellar).is_none());
}

#[test]
fn test_observed_photometry_of_flat_spectrum() {
    let cosmo = FlatLambdaCdm::planck18();
    let z = 1.5;
    let lnu = 4e28;

    let mut survey = survey_with_uvj();
    survey.add_galaxies(vec![TaggedGalaxy::boxed(0, lnu, -2.0), TaggedGalaxy::boxed(1, 2.0 * lnu, -2.0)]);
    survey
        .get_integrated_stellar_spectra(&grid(), Some(z), Some(&Madau96))
        .unwrap();

    let photometry = survey
        .get_photometry(SpectrumKind::Stellar, PhotometryKeying::Namespaced)
        .unwrap();

    // UVJ lies redward of Lyman-alpha at this redshift, so the IGM does nothing
    let expected = luminosity_to_flux(lnu, cosmo.luminosity_distance(z), z);
    for code in ["U", "V", "J"] {
        let values = &photometry[&PhotometryKey::namespaced("rest", code)];
        assert_relative_eq!(values[0], expected, max_relative = 1e-9);
        assert_relative_eq!(values[1], 2.0 * expected, max_relative = 1e-9);
    }
}

#[test]
fn test_screen_dims_photometry() {
    let mut survey = survey_with_uvj();
    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -2.0));

    let grid = grid();
    survey.get_integrated_stellar_spectra(&grid, None, None).unwrap();
    survey
        .get_integrated_spectra_screen(0.4, None, None, SpectrumKind::Attenuated)
        .unwrap();

    let stellar = survey
        .get_photometry(SpectrumKind::Stellar, PhotometryKeying::Flattened)
        .unwrap()
        .clone();
    let attenuated = survey
        .get_photometry(SpectrumKind::Attenuated, PhotometryKeying::Flattened)
        .unwrap();

    for code in ["U", "V", "J"] {
        let key = PhotometryKey::flat(code);
        assert!(attenuated[&key][0] < stellar[&key][0]);
    }

    let stored = survey.spectra(SpectrumKind::Attenuated).unwrap();
    assert!(stored.rest.lam().same_as(&grid.lam));
}

#[test]
fn test_charlot_fall_spectra_stored_under_requested_kind() {
    let mut survey = survey_with_uvj();
    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -2.0));

    let grid = grid();
    survey
        .get_integrated_spectra_charlot_fall_00(&grid, 0.1, 1.0, Some(2.0), None, SpectrumKind::Attenuated)
        .unwrap();

    let stored = survey.spectra(SpectrumKind::Attenuated).unwrap();
    assert_relative_eq!(stored.observed.redshift(), 2.0);
    assert!(survey.spectra(SpectrumKind::Stellar).is_none());
}

#[test]
fn test_photometry_keying_across_instruments() {
    let mut survey = survey_with_uvj();
    let narrow_v = FilterCollection::top_hats(
        &[TopHatSpec {
            code: "V".to_string(),
            band: TopHatBand::Bounds {
                lam_min: 5000.0,
                lam_max: 5200.0,
            },
        }],
        None,
    )
    .unwrap();
    survey
        .add_photometric_instrument("narrow", narrow_v, None, InstrumentOptions::default())
        .unwrap();

    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -1.0));
    survey.get_integrated_stellar_spectra(&grid(), None, None).unwrap();

    let namespaced = survey
        .get_photometry(SpectrumKind::Stellar, PhotometryKeying::Namespaced)
        .unwrap()
        .clone();
    let broad = namespaced[&PhotometryKey::namespaced("rest", "V")][0];
    let narrow = namespaced[&PhotometryKey::namespaced("narrow", "V")][0];
    assert!((broad - narrow).abs() > 1e-6 * broad);

    // Flattened keys collide on "V" and the last instrument wins
    let flattened = survey
        .get_photometry(SpectrumKind::Stellar, PhotometryKeying::Flattened)
        .unwrap();
    assert_eq!(flattened[&PhotometryKey::flat("V")][0], narrow);
    assert_eq!(flattened[&PhotometryKey::flat("U")][0], namespaced[&PhotometryKey::namespaced("rest", "U")][0]);
}

#[test]
fn test_depth_conversion_to_flux() {
    let mut survey = Survey::default();
    survey
        .add_photometric_instrument(
            "rest",
            FilterCollection::uvj(None).unwrap(),
            None,
            InstrumentOptions {
                depths: Some(Depths::magnitudes(31.4)),
                ..Default::default()
            },
        )
        .unwrap();

    survey.convert_mag_depth_to_fnu().unwrap();
    let depths = survey.instrument("rest").unwrap().depths().unwrap();
    assert_relative_eq!(depths.get("J").unwrap(), 1.0, max_relative = 1e-12);
}

#[test]
fn test_particle_spectra_reach_each_galaxy_image() {
    let cosmo = FlatLambdaCdm::planck18();
    let z = 2.0;

    let mut survey = survey_with_uvj();
    survey.add_galaxies(vec![
        TaggedGalaxy::boxed(0, 1e28, -2.0),
        TaggedGalaxy::boxed(1, 5e28, -2.0),
    ]);

    let options = ImageOptions {
        img_type: ImageType::Histogram,
        spectrum_kind: SpectrumKind::Stellar,
        rest_frame: false,
        redshift: Some(z),
        igm: None,
    };

    // Nothing computed yet, so galaxies render without spectra
    let images = survey.make_images(&options).unwrap();
    assert!(images["rest"].iter().all(|img| img.get("spectrum").is_none()));

    survey.get_particle_stellar_spectra(&grid(), Some(z), None).unwrap();

    let spectra = survey.galaxy_spectra(SpectrumKind::Stellar).unwrap();
    assert_eq!(spectra.len(), 2);
    assert_eq!(spectra[1].rest.nspectra(), 1);
    assert_relative_eq!(spectra[1].observed.redshift(), z);
    // Per-galaxy spectra do not replace the batched survey spectra
    assert!(survey.spectra(SpectrumKind::Stellar).is_none());

    let images = survey.make_images(&options).unwrap();
    let fluxes: Vec<f64> = images["rest"]
        .iter()
        .map(|img| img.get("spectrum").unwrap()[[0, 0]])
        .collect();

    let d_l = cosmo.luminosity_distance(z);
    assert_relative_eq!(fluxes[0], luminosity_to_flux(1e28, d_l, z), max_relative = 1e-9);
    assert_relative_eq!(fluxes[1], luminosity_to_flux(5e28, d_l, z), max_relative = 1e-9);
}

#[test]
fn test_particle_spectra_zero_redshift_is_rejected() {
    let mut survey = survey_with_uvj();
    survey.add_galaxies(TaggedGalaxy::boxed(0, 1e28, -2.0));

    let result = survey.get_particle_stellar_spectra(&grid(), Some(0.0), None);
    assert!(matches!(result, Err(SurveyError::Sed(SedError::NonPositiveRedshift(_)))));
    assert!(survey.galaxy_spectra(SpectrumKind::Stellar).is_none());

    survey.get_particle_stellar_spectra(&grid(), None, None).unwrap();
    let spectra = survey.galaxy_spectra(SpectrumKind::Stellar).unwrap();
    assert_eq!(spectra[0].observed.redshift(), 0.0);
}
