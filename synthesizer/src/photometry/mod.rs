//! Spectra, filters and broadband photometry

pub mod filters;
pub mod grid;
pub mod igm;
pub mod sed;
pub mod trapezoid;
pub mod units;

pub use filters::{
    Filter, FilterCode, FilterCollection, FilterCurve, FilterCurveSource, FilterError,
    LocalFilterStore, SvoFilterSource, TopHatBand, TopHatSpec,
};
pub use grid::{GridError, WavelengthGrid};
pub use igm::{IgmTransmission, Madau96};
pub use sed::{
    calculate_q, rebin, BroadbandPhotometry, ObservedSed, Sed, SedError, SpectralUnit,
};
pub use trapezoid::{trap_integrate, trapz};
pub use units::{convert_flam_to_fnu, convert_fnu_to_flam, flux_to_luminosity, m_to_flux};
