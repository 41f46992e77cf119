//! Documentation for the binary is with the definition of `FindFireOptionsInit` below.

use clap::Parser;
use log::{debug, info};
use satfire::{config, pipeline::PipelineConfig};
#[cfg(not(feature = "netcdf"))]
use satfire::scan_reader::FakeScanReader;
use simple_logger::SimpleLogger;
use std::{path::PathBuf, sync::Arc};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Group individual satellite pixels showing wildfire into connected clusters and add them to
/// the cluster database.
///
/// This program walks a directory tree and analyzes all the NOAA Big Data files with GOES
/// satellite Fire Detection Characteristics (FDC) data. Individual pixels with fire power greater
/// than 0.0 MW are grouped into clusters of adjacent pixels. The cluster database already knows
/// which files have been processed, so re-running this program is safe.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "findfire")]
#[clap(author, version, about)]
struct FindFireOptionsInit {
    /// The path to the cluster database file.
    ///
    /// If this is not specified, then the program will check for it in the "CLUSTER_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CLUSTER_DB")]
    cluster_store_file: PathBuf,

    /// The path to the data directory that will be walked to find new data.
    ///
    /// If this is not specified, then the program will check for it in the "SAT_ARCHIVE"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "SAT_ARCHIVE")]
    data_dir: PathBuf,

    /// The path to a KMZ file to produce from this run, showing the biggest cluster processed.
    ///
    /// If this is not specified, then the program will create one automatically by replacing
    /// the file extension on the cluster_store_file with "*.kmz".
    #[clap(short, long)]
    kmz_file: Option<PathBuf>,

    /// Only try to find data newer than what's already in the database for each satellite and
    /// sector.
    #[clap(short, long)]
    new: bool,

    /// The number of worker threads that check whether a path is already present in the
    /// database.
    #[clap(long, default_value_t = 4)]
    filter_workers: usize,

    /// The number of worker threads that read and cluster scan files.
    #[clap(long, default_value_t = 4)]
    loader_workers: usize,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct FindFireOptionsChecked {
    /// The path to the cluster database file.
    cluster_store_file: PathBuf,

    /// The path to the data directory that will be walked to find new data.
    data_dir: PathBuf,

    /// The path to a KMZ file to produce from this run.
    kmz_file: PathBuf,

    /// Only try to find data newer than what's already in the database.
    new: bool,

    /// The number of path-filter worker threads.
    filter_workers: usize,

    /// The number of scan-loader worker threads.
    loader_workers: usize,

    /// Verbose output
    verbose: bool,
}

impl std::fmt::Display for FindFireOptionsChecked {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "    Database: {}", self.cluster_store_file.display())?;
        writeln!(f, "  Output KMZ: {}", self.kmz_file.display())?;
        writeln!(f, "     Archive: {}", self.data_dir.display())?;
        writeln!(f, "    Only New: {}", self.new)?;
        writeln!(f, "Filter/Loader workers: {}/{}", self.filter_workers, self.loader_workers)?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> satfire::SatFireResult<FindFireOptionsChecked> {
    let FindFireOptionsInit {
        cluster_store_file,
        data_dir,
        kmz_file,
        new,
        filter_workers,
        loader_workers,
        verbose,
    } = FindFireOptionsInit::parse();

    let kmz_file = match kmz_file {
        Some(v) => v,
        None => {
            let mut clone = cluster_store_file.clone();
            clone.set_extension("kmz");
            clone
        }
    };

    let checked = FindFireOptionsChecked {
        cluster_store_file,
        data_dir,
        kmz_file,
        new,
        filter_workers,
        loader_workers,
        verbose,
    };

    if verbose {
        info!("{}", checked);
        debug!("Debug logging active.");
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> satfire::SatFireResult<()> {
    SimpleLogger::new().init()?;
    config::force_utc();

    let opts = parse_args()?;

    let mut pipeline_config = PipelineConfig::new(opts.data_dir, opts.cluster_store_file);
    pipeline_config.placemark_path = Some(opts.kmz_file);
    pipeline_config.only_new = opts.new;
    pipeline_config.verbose = opts.verbose;
    pipeline_config.num_filter_workers = opts.filter_workers;
    pipeline_config.num_loader_workers = opts.loader_workers;

    // The GDAL-backed reader lives behind the `netcdf` feature; without it, there is no real
    // scan source to read from, so building against the fake reader keeps this binary linkable
    // in every configuration while still exercising the whole pipeline shape.
    #[cfg(feature = "netcdf")]
    let reader = Arc::new(satfire::scan_reader::GdalScanReader);
    #[cfg(not(feature = "netcdf"))]
    let reader = Arc::new(FakeScanReader::new());

    satfire::pipeline::run(pipeline_config, reader)
}
