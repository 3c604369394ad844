//! Filter property calculator
//!
//! Prints the synthetic photometry properties (pivot wavelength, mean
//! wavelength, bandwidth, FWHM, peak transmission, rectangular width and
//! support) of a set of filters. Filters come from the rest-frame UVJ set,
//! a survey configuration file, a local filter directory or the SVO filter
//! profile service.

use std::path::PathBuf;

use clap::Parser;
use synthesizer::config::SurveyConfig;
use synthesizer::photometry::filters::{FilterCollection, LocalFilterStore, SvoFilterSource};

#[derive(Parser, Debug)]
#[command(
    name = "Filter Properties",
    about = "Prints pivot wavelength, bandwidth and support of filter curves",
    long_about = None
)]
struct Args {
    /// Survey configuration; prints the filters of every instrument
    #[arg(long, conflicts_with_all = ["local_dir", "svo"])]
    config: Option<PathBuf>,

    /// Directory laid out as {dir}/{observatory}/{instrument}.{band}.dat
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Fetch the filter codes from the SVO filter profile service
    #[arg(long)]
    svo: bool,

    /// Filter codes, e.g. JWST/NIRCam.F150W
    codes: Vec<String>,
}

fn print_header() {
    println!(
        "{:<24} {:>10} {:>10} {:>10} {:>10} {:>6} {:>10} {:>10} {:>10}",
        "Filter", "Pivot", "Mean", "Bandw", "FWHM", "Peak", "RectW", "Min", "Max"
    );
    println!("{:-<110}", "");
}

fn print_filters(filters: &FilterCollection) {
    for filter in filters {
        let (min, max) = filter.mnmx().unwrap_or((f64::NAN, f64::NAN));
        println!(
            "{:<24} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>6.3} {:>10.1} {:>10.1} {:>10.1}",
            filter.code(),
            filter.pivwv(),
            filter.meanwv(),
            filter.bandw(),
            filter.fwhm(),
            filter.t_peak(),
            filter.rectw(),
            min,
            max
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Filter Properties (wavelengths in Å)");
    println!("====================================");
    println!();

    if let Some(path) = &args.config {
        let survey = SurveyConfig::load_from_file(path)?.build()?;
        for (label, instrument) in survey.instruments() {
            println!("Instrument {label} ({})", instrument.name());
            print_header();
            print_filters(instrument.filters());
            println!();
        }
        return Ok(());
    }

    let codes: Vec<&str> = args.codes.iter().map(String::as_str).collect();
    let filters = match (&args.local_dir, args.svo) {
        (Some(dir), _) => FilterCollection::from_source(&LocalFilterStore::new(dir), &codes, None)?,
        (None, true) => FilterCollection::from_source(&SvoFilterSource::new()?, &codes, None)?,
        (None, false) => {
            if !codes.is_empty() {
                log::warn!("Filter codes given without --local-dir or --svo, showing UVJ");
            }
            FilterCollection::uvj(None)?
        }
    };

    print_header();
    print_filters(&filters);

    Ok(())
}
