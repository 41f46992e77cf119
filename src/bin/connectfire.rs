//! Documentation for the binary is with the definition of `ConnectFireOptionsInit` below.

use clap::Parser;
use log::{debug, info};
use satfire::{config, linker::LinkerConfig};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Connect clusters from the cluster database to make time series of fires.
///
/// Each time series is given an ID and stored in the fires database with a start date and an end
/// date, along with the association between each cluster row and the fire it belongs to.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "connectfire")]
#[clap(author, version, about)]
struct ConnectFireOptionsInit {
    /// The path to the cluster database file to read clusters from.
    ///
    /// If this is not specified, then the program will check for it in the "CLUSTER_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CLUSTER_DB")]
    cluster_store_file: PathBuf,

    /// The path to the fires database file to write fire time series into.
    ///
    /// If this is not specified, then the program will check for it in the "FIRES_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "FIRES_DB")]
    fires_store_file: PathBuf,

    /// A directory to write a per-satellite KMZ export of the final fire list into.
    ///
    /// If this is not specified, no KMZ files are written.
    #[clap(short, long)]
    kmz_dir: Option<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct ConnectFireOptionsChecked {
    /// The path to the cluster database file.
    cluster_store_file: PathBuf,

    /// The path to the fires database file.
    fires_store_file: PathBuf,

    /// A directory to write per-satellite KMZ exports into.
    kmz_dir: Option<PathBuf>,

    /// Verbose output
    verbose: bool,
}

impl std::fmt::Display for ConnectFireOptionsChecked {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "  Cluster Database: {}", self.cluster_store_file.display())?;
        writeln!(f, "     Fires Database: {}", self.fires_store_file.display())?;
        if let Some(kmz_dir) = &self.kmz_dir {
            writeln!(f, "            KMZ Dir: {}", kmz_dir.display())?;
        }
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> satfire::SatFireResult<ConnectFireOptionsChecked> {
    let ConnectFireOptionsInit {
        cluster_store_file,
        fires_store_file,
        kmz_dir,
        verbose,
    } = ConnectFireOptionsInit::parse();

    let checked = ConnectFireOptionsChecked {
        cluster_store_file,
        fires_store_file,
        kmz_dir,
        verbose,
    };

    if verbose {
        info!("{}", checked);
        debug!("Debug logging active.");
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                             Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> satfire::SatFireResult<()> {
    SimpleLogger::new().init()?;
    config::force_utc();

    let opts = parse_args()?;

    let linker_config = LinkerConfig {
        cluster_db: opts.cluster_store_file,
        fires_db: opts.fires_store_file,
        kmz_root: opts.kmz_dir,
        verbose: opts.verbose,
    };

    satfire::linker::run(linker_config)
}
