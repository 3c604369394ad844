//! Filter transmission curves and collections of filters
//!
//! A [`Filter`] keeps the curve it was built from (a tophat definition or a
//! tabulated curve from a [`FilterCurveSource`]) as its immutable source of
//! truth. Moving it onto another wavelength grid produces a new `Filter`
//! carrying that [`WavelengthGrid`], which is what broadband integration
//! checks before combining the curve with a spectrum.
//!
//! The synthetic photometry definitions (pivot wavelength, mean wavelength,
//! bandwidth, ...) follow the Synphot manual, section 5.1.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::grid::WavelengthGrid;
use super::trapezoid::trapz;
use crate::algo::misc::{interp_zero_outside, InterpError};

/// Default SVO filter profile service endpoint
pub const SVO_FPS_URL: &str = "http://svo2.cab.inta-csic.es/theory/fps/getdata.php";

/// Transmission threshold used by [`Filter::min`] and [`Filter::max`]
pub const SUPPORT_THRESHOLD: f64 = 1e-2;

/// Errors that can occur while building or using filters
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Wavelength and transmission vectors must have the same length ({0} vs {1})")]
    LengthMismatch(usize, usize),

    #[error("Filter curve needs at least 2 samples")]
    TooShort,

    #[error("Wavelengths must be in ascending order")]
    NotAscending,

    #[error("Invalid tophat band [{lam_min}, {lam_max}]")]
    InvalidBand { lam_min: f64, lam_max: f64 },

    #[error("Malformed filter code '{0}', expected observatory/instrument.band")]
    MalformedCode(String),

    #[error("Duplicate filter code '{0}' in collection")]
    DuplicateCode(String),

    #[error("Filters in a collection must share one wavelength grid, '{0}' differs")]
    InconsistentGrids(String),

    #[error("Failed to fetch filter curve {code}: {reason}")]
    Fetch { code: String, reason: String },

    #[error("Failed to parse filter curve {code} at line {line}")]
    Parse { code: String, line: usize },

    #[error("I/O error reading filter curve: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Interp(#[from] InterpError),
}

/// Filter identifier of the form `observatory/instrument.band`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterCode {
    pub observatory: String,
    pub instrument: String,
    pub band: String,
}

impl FilterCode {
    pub fn new(observatory: &str, instrument: &str, band: &str) -> Self {
        Self {
            observatory: observatory.to_string(),
            instrument: instrument.to_string(),
            band: band.to_string(),
        }
    }
}

impl FromStr for FilterCode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || FilterError::MalformedCode(s.to_string());

        let (observatory, rest) = s.split_once('/').ok_or_else(malformed)?;
        let (instrument, _) = rest.split_once('.').ok_or_else(malformed)?;
        let (_, band) = rest.rsplit_once('.').ok_or_else(malformed)?;

        if observatory.is_empty() || instrument.is_empty() || band.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(observatory, instrument, band))
    }
}

impl fmt::Display for FilterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.observatory, self.instrument, self.band)
    }
}

/// A tabulated transmission curve as delivered by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCurve {
    /// Wavelengths in Å, ascending
    pub lam: Vec<f64>,
    /// Transmission at each wavelength
    pub t: Vec<f64>,
}

/// Something that can deliver transmission curves by filter code.
pub trait FilterCurveSource {
    fn fetch(&self, code: &FilterCode) -> Result<FilterCurve, FilterError>;
}

/// Two-column `wavelength transmission` text, `#` comments and blank lines skipped.
pub fn parse_filter_curve(code: &str, text: &str) -> Result<FilterCurve, FilterError> {
    let mut lam = Vec::new();
    let mut t = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_error = || FilterError::Parse {
            code: code.to_string(),
            line: i + 1,
        };

        let mut columns = line.split_whitespace();
        let l: f64 = columns
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(parse_error)?;
        let v: f64 = columns
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(parse_error)?;

        lam.push(l);
        t.push(v);
    }

    Ok(FilterCurve { lam, t })
}

/// Filter curves retrieved from the SVO Filter Profile Service.
#[derive(Debug, Clone)]
pub struct SvoFilterSource {
    base_url: Url,
}

impl SvoFilterSource {
    pub fn new() -> Result<Self, url::ParseError> {
        Self::with_base_url(SVO_FPS_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
        })
    }

    /// Query URL for one filter
    pub fn url_for(&self, code: &FilterCode) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("format", "ascii")
            .append_pair("id", &code.to_string());
        url
    }
}

impl FilterCurveSource for SvoFilterSource {
    fn fetch(&self, code: &FilterCode) -> Result<FilterCurve, FilterError> {
        let url = self.url_for(code);
        log::debug!("Fetching filter curve {code} from {url}");

        let fetch_error = |e: ureq::Error| FilterError::Fetch {
            code: code.to_string(),
            reason: e.to_string(),
        };

        let mut response = ureq::get(url.as_str()).call().map_err(fetch_error)?;
        let body = response.body_mut().read_to_string().map_err(fetch_error)?;

        parse_filter_curve(&code.to_string(), &body)
    }
}

/// Filter curves stored on disk as `{root}/{observatory}/{instrument}.{band}.dat`.
#[derive(Debug, Clone)]
pub struct LocalFilterStore {
    root: PathBuf,
}

impl LocalFilterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, code: &FilterCode) -> PathBuf {
        self.root
            .join(&code.observatory)
            .join(format!("{}.{}.dat", code.instrument, code.band))
    }
}

impl FilterCurveSource for LocalFilterStore {
    fn fetch(&self, code: &FilterCode) -> Result<FilterCurve, FilterError> {
        let path = self.path_for(code);
        log::debug!("Reading filter curve {code} from {}", path.display());
        let text = std::fs::read_to_string(&path)?;
        parse_filter_curve(&code.to_string(), &text)
    }
}

/// How a filter's transmission was defined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterShape {
    /// Unit transmission for `lam_min < λ <= lam_max`
    TopHat { lam_min: f64, lam_max: f64 },
    /// Sampled curve, linearly interpolated
    Tabulated,
}

impl FilterShape {
    fn evaluate(&self, grid: &[f64], original_lam: &[f64], original_t: &[f64]) -> Result<Vec<f64>, InterpError> {
        match *self {
            FilterShape::TopHat { lam_min, lam_max } => Ok(grid
                .iter()
                .map(|&l| if l > lam_min && l <= lam_max { 1.0 } else { 0.0 })
                .collect()),
            FilterShape::Tabulated => interp_zero_outside(grid, original_lam, original_t),
        }
    }
}

#[derive(Debug, Clone)]
struct Resampled {
    grid: WavelengthGrid,
    t: Vec<f64>,
}

/// One transmission curve
#[derive(Debug, Clone)]
pub struct Filter {
    code: String,
    shape: FilterShape,
    original_lam: Vec<f64>,
    original_t: Vec<f64>,
    resampled: Option<Resampled>,
}

impl Filter {
    /// Tabulated filter from wavelength (Å, ascending) and transmission vectors
    pub fn from_table(code: &str, lam: Vec<f64>, t: Vec<f64>) -> Result<Self, FilterError> {
        if lam.len() != t.len() {
            return Err(FilterError::LengthMismatch(lam.len(), t.len()));
        }

        if lam.len() < 2 {
            return Err(FilterError::TooShort);
        }

        if lam.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FilterError::NotAscending);
        }

        Ok(Self {
            code: code.to_string(),
            shape: FilterShape::Tabulated,
            original_lam: lam,
            original_t: t,
            resampled: None,
        })
    }

    /// Tophat filter centred on `lam_eff` with full width `lam_fwhm` (Å)
    pub fn top_hat(code: &str, lam_eff: f64, lam_fwhm: f64) -> Result<Self, FilterError> {
        Self::top_hat_from_bounds(code, lam_eff - lam_fwhm / 2.0, lam_eff + lam_fwhm / 2.0)
    }

    /// Tophat filter transmitting over `(lam_min, lam_max]` (Å).
    ///
    /// The stored curve is sampled at 1 Å from 1000 Å below `lam_min` up to
    /// (excluding) 1000 Å above `lam_max`. The grid never starts below 1 Å.
    pub fn top_hat_from_bounds(code: &str, lam_min: f64, lam_max: f64) -> Result<Self, FilterError> {
        if !lam_min.is_finite() || !lam_max.is_finite() || lam_min >= lam_max || lam_max <= 0.0 {
            return Err(FilterError::InvalidBand { lam_min, lam_max });
        }

        let start = (lam_min - 1000.0).max(1.0);
        let stop = lam_max + 1000.0;
        let n = (stop - start).ceil() as usize;
        let original_lam: Vec<f64> = (0..n).map(|i| start + i as f64).collect();

        let shape = FilterShape::TopHat { lam_min, lam_max };
        let original_t = shape.evaluate(&original_lam, &[], &[])?;

        Ok(Self {
            code: code.to_string(),
            shape,
            original_lam,
            original_t,
            resampled: None,
        })
    }

    /// Filter retrieved from a curve source
    pub fn from_source(source: &dyn FilterCurveSource, code: &FilterCode) -> Result<Self, FilterError> {
        let curve = source.fetch(code)?;
        Self::from_table(&code.to_string(), curve.lam, curve.t)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn shape(&self) -> FilterShape {
        self.shape
    }

    pub fn original_lam(&self) -> &[f64] {
        &self.original_lam
    }

    pub fn original_t(&self) -> &[f64] {
        &self.original_t
    }

    /// Grid the filter has been resampled onto, if any
    pub fn grid(&self) -> Option<&WavelengthGrid> {
        self.resampled.as_ref().map(|r| &r.grid)
    }

    /// Working wavelengths: the resampled grid, or the original samples
    pub fn lam(&self) -> &[f64] {
        match &self.resampled {
            Some(r) => r.grid.as_slice(),
            None => &self.original_lam,
        }
    }

    /// Working transmission matching [`Filter::lam`]
    pub fn t(&self) -> &[f64] {
        match &self.resampled {
            Some(r) => &r.t,
            None => &self.original_t,
        }
    }

    /// Transmission evaluated on `grid` from the original definition.
    ///
    /// Zero wherever `grid` lies outside the original support.
    pub fn transmission_on(&self, grid: &WavelengthGrid) -> Result<Vec<f64>, FilterError> {
        Ok(self
            .shape
            .evaluate(grid.as_slice(), &self.original_lam, &self.original_t)?)
    }

    /// Copy of this filter resampled onto `grid`.
    ///
    /// Always derived from the original curve, never from an earlier
    /// resampling.
    pub fn resampled(&self, grid: &WavelengthGrid) -> Result<Self, FilterError> {
        let t = self.transmission_on(grid)?;
        Ok(Self {
            resampled: Some(Resampled {
                grid: grid.clone(),
                t,
            }),
            ..self.clone()
        })
    }

    /// Transmission aligned sample-for-sample with `grid`, if this filter is
    /// known to live on it.
    pub fn transmission_for(&self, grid: &WavelengthGrid) -> Option<&[f64]> {
        match &self.resampled {
            Some(r) if r.grid.same_as(grid) => Some(&r.t),
            Some(_) => None,
            None if grid.matches(&self.original_lam) => Some(&self.original_t),
            None => None,
        }
    }

    /// Trapezoidal integral of `f(λ, t)` over the original curve
    fn integrate<F>(&self, f: F) -> f64
    where
        F: Fn(f64, f64) -> f64,
    {
        let ys: Vec<f64> = self
            .original_lam
            .iter()
            .zip(&self.original_t)
            .map(|(&l, &t)| f(l, t))
            .collect();

        // Curves are validated at construction: equal lengths, at least 2 samples
        trapz(&ys, &self.original_lam).unwrap_or(f64::NAN)
    }

    /// Pivot wavelength, sqrt(∫λt dλ / ∫(t/λ) dλ)
    pub fn pivwv(&self) -> f64 {
        (self.integrate(|l, t| l * t) / self.integrate(|l, t| t / l)).sqrt()
    }

    /// Transmission at the pivot wavelength
    pub fn piv_t(&self) -> f64 {
        interp_zero_outside(&[self.pivwv()], &self.original_lam, &self.original_t)
            .map(|v| v[0])
            .unwrap_or(0.0)
    }

    /// Mean wavelength, exp(∫ln(λ)(t/λ) dλ / ∫(t/λ) dλ)
    pub fn meanwv(&self) -> f64 {
        (self.integrate(|l, t| l.ln() * t / l) / self.integrate(|l, t| t / l)).exp()
    }

    /// Bandwidth, meanwv · sqrt(∫ln²(λ/meanwv)(t/λ) dλ / ∫(t/λ) dλ)
    pub fn bandw(&self) -> f64 {
        let mean = self.meanwv();
        let spread = self.integrate(|l, t| (l / mean).ln().powi(2) * t / l);
        mean * (spread / self.integrate(|l, t| t / l)).sqrt()
    }

    /// Gaussian-equivalent FWHM, sqrt(8 ln 2) · bandwidth
    pub fn fwhm(&self) -> f64 {
        (8.0 * 2f64.ln()).sqrt() * self.bandw()
    }

    /// Peak transmission
    pub fn t_peak(&self) -> f64 {
        self.original_t.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Rectangular width, ∫t dλ / peak
    pub fn rectw(&self) -> f64 {
        self.integrate(|_, t| t) / self.t_peak()
    }

    /// Shortest wavelength with transmission above 0.01
    pub fn min(&self) -> Option<f64> {
        self.original_lam
            .iter()
            .zip(&self.original_t)
            .find(|(_, &t)| t > SUPPORT_THRESHOLD)
            .map(|(&l, _)| l)
    }

    /// Longest wavelength with transmission above 0.01
    pub fn max(&self) -> Option<f64> {
        self.original_lam
            .iter()
            .zip(&self.original_t)
            .rev()
            .find(|(_, &t)| t > SUPPORT_THRESHOLD)
            .map(|(&l, _)| l)
    }

    pub fn mnmx(&self) -> Option<(f64, f64)> {
        Some((self.min()?, self.max()?))
    }
}

/// Tophat pass band, either centre/width or explicit edges (Å)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopHatBand {
    Effective { lam_eff: f64, lam_fwhm: f64 },
    Bounds { lam_min: f64, lam_max: f64 },
}

/// Named tophat band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopHatSpec {
    pub code: String,
    #[serde(flatten)]
    pub band: TopHatBand,
}

impl TopHatSpec {
    pub fn effective(code: &str, lam_eff: f64, lam_fwhm: f64) -> Self {
        Self {
            code: code.to_string(),
            band: TopHatBand::Effective { lam_eff, lam_fwhm },
        }
    }

    pub fn build(&self) -> Result<Filter, FilterError> {
        match self.band {
            TopHatBand::Effective { lam_eff, lam_fwhm } => Filter::top_hat(&self.code, lam_eff, lam_fwhm),
            TopHatBand::Bounds { lam_min, lam_max } => {
                Filter::top_hat_from_bounds(&self.code, lam_min, lam_max)
            }
        }
    }
}

/// U, V and J tophats (effective wavelength, FWHM in Å)
pub const UVJ_BANDS: [(&str, f64, f64); 3] = [
    ("U", 3650.0, 660.0),
    ("V", 5510.0, 880.0),
    ("J", 12200.0, 2130.0),
];

/// Ordered set of filters keyed by filter code
#[derive(Debug, Clone, Default)]
pub struct FilterCollection {
    filters: Vec<Filter>,
    index: HashMap<String, usize>,
}

impl FilterCollection {
    /// Collect filters, preserving order.
    ///
    /// Codes must be unique and every filter must either be unresampled or
    /// resampled onto the same grid.
    pub fn from_filters(filters: Vec<Filter>) -> Result<Self, FilterError> {
        let mut index = HashMap::with_capacity(filters.len());

        for (i, filter) in filters.iter().enumerate() {
            if index.insert(filter.code.clone(), i).is_some() {
                return Err(FilterError::DuplicateCode(filter.code.clone()));
            }

            let same_grid = match (filters[0].grid(), filter.grid()) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_as(b),
                _ => false,
            };
            if !same_grid {
                return Err(FilterError::InconsistentGrids(filter.code.clone()));
            }
        }

        Ok(Self { filters, index })
    }

    /// Tophat filters, optionally resampled onto `grid`
    pub fn top_hats(specs: &[TopHatSpec], grid: Option<&WavelengthGrid>) -> Result<Self, FilterError> {
        let filters = specs
            .iter()
            .map(|spec| {
                let filter = spec.build()?;
                match grid {
                    Some(grid) => filter.resampled(grid),
                    None => Ok(filter),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_filters(filters)
    }

    /// The rest-frame U, V, J tophat set
    pub fn uvj(grid: Option<&WavelengthGrid>) -> Result<Self, FilterError> {
        let specs: Vec<TopHatSpec> = UVJ_BANDS
            .iter()
            .map(|&(code, lam_eff, lam_fwhm)| TopHatSpec::effective(code, lam_eff, lam_fwhm))
            .collect();
        Self::top_hats(&specs, grid)
    }

    /// Filters fetched from a curve source, optionally resampled onto `grid`
    pub fn from_source(
        source: &dyn FilterCurveSource,
        codes: &[&str],
        grid: Option<&WavelengthGrid>,
    ) -> Result<Self, FilterError> {
        let filters = codes
            .iter()
            .map(|code| {
                let filter = Filter::from_source(source, &code.parse()?)?;
                match grid {
                    Some(grid) => filter.resampled(grid),
                    None => Ok(filter),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_filters(filters)
    }

    /// Every filter resampled onto `grid` from its original curve
    pub fn resampled(&self, grid: &WavelengthGrid) -> Result<Self, FilterError> {
        let filters = self
            .filters
            .iter()
            .map(|f| f.resampled(grid))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            filters,
            index: self.index.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter codes in insertion order
    pub fn filter_codes(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.code()).collect()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&Filter> {
        self.index.get(code).map(|&i| &self.filters[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.filters.iter()
    }

    /// The shared grid of the collection, if it has been resampled
    pub fn grid(&self) -> Option<&WavelengthGrid> {
        self.filters.first().and_then(|f| f.grid())
    }
}

impl<'a> IntoIterator for &'a FilterCollection {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}
