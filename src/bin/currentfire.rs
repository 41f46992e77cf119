//! Documentation for the binary is with the definition of `CurrentFireOptionsInit` below.

use clap::Parser;
use log::info;
use satfire::{BoundingBox, ClusterDatabase, Coord, KmlFile, KmlWrite, SatFireResult, Satellite, Sector};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display, Write},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                                     Command Line Options
 *-----------------------------------------------------------------------------------------------*/

///
/// Export clusters from the most recent image into a KML file.
///
/// This program will export all the clusters from the latest scan in the database for a given
/// satellite and sector as KML, sorted by descending power.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "currentfire")]
#[clap(author, version, about)]
struct CurrentFireOptionsInit {
    /// The path to the cluster database file.
    ///
    /// If this is not specified, then the program will check for it in the "CLUSTER_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CLUSTER_DB")]
    store_file: PathBuf,

    /// The path to a KML file to produce from this run.
    ///
    /// If this is not specified, then the program will create one automatically by replacing the
    /// file extension on the store_file with "*.kml".
    #[clap(short, long)]
    kml_file: Option<PathBuf>,

    /// The satellite to select the latest data from.
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_satellite))]
    #[clap(default_value_t=Satellite::G17)]
    satellite: Satellite,

    /// The scanning sector to select the latest data from.
    #[clap(short = 'r', long)]
    #[clap(parse(try_from_str=parse_sector))]
    #[clap(default_value_t=Sector::FULL)]
    sector: Sector,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn parse_satellite(sat: &str) -> SatFireResult<Satellite> {
    Satellite::string_contains_satellite(sat)
        .ok_or_else(|| format!("Argument is not a valid satellite name: {}", sat).into())
}

fn parse_sector(sector: &str) -> SatFireResult<Sector> {
    Sector::string_contains_sector(sector)
        .ok_or_else(|| format!("Argument is not a valid sector name: {}", sector).into())
}

#[derive(Debug)]
struct CurrentFireOptionsChecked {
    /// The path to the database file.
    store_file: PathBuf,

    /// The path to a KML file to produce from this run.
    kml_file: PathBuf,

    /// The satellite.
    satellite: Satellite,

    /// The scanning sector.
    sector: Sector,

    /// Verbose output
    verbose: bool,
}

impl Display for CurrentFireOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "  Database: {}", self.store_file.display())?;
        writeln!(f, "Output KML: {}", self.kml_file.display())?;
        writeln!(f, " Satellite: {}", self.satellite.name())?;
        writeln!(f, "    Sector: {}", self.sector.name())?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> SatFireResult<CurrentFireOptionsChecked> {
    let CurrentFireOptionsInit {
        store_file,
        kml_file,
        satellite,
        sector,
        verbose,
    } = CurrentFireOptionsInit::parse();

    let kml_file = match kml_file {
        Some(v) => v,
        None => {
            let mut clone = store_file.clone();
            clone.set_extension("kml");
            clone
        }
    };

    let checked = CurrentFireOptionsChecked {
        store_file,
        kml_file,
        satellite,
        sector,
        verbose,
    };

    if checked.verbose {
        info!("{}", checked);
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> SatFireResult<()> {
    SimpleLogger::new().init()?;

    let opts = parse_args()?;

    let db = ClusterDatabase::connect(&opts.store_file)?;
    let latest = db.newest_scan_start(opts.satellite, opts.sector)?;

    // Cover the globe; the scan identity already narrows us to one satellite/sector/hour.
    let area = BoundingBox {
        ll: Coord { lat: -90.0, lon: -180.0 },
        ur: Coord { lat: 90.0, lon: 180.0 },
    };

    let mut query = db.query_clusters(
        Some(opts.satellite),
        Some(opts.sector),
        latest,
        latest + chrono::Duration::hours(1),
        area,
    )?;

    let mut rows: Vec<_> = query.rows()?.collect::<SatFireResult<Vec<_>>>()?;
    rows.sort_unstable_by(|a, b| b.power.partial_cmp(&a.power).unwrap_or(std::cmp::Ordering::Equal));

    let mut kfile = KmlFile::start_document(&opts.kml_file)?;

    kfile.start_style(Some("fire"))?;
    kfile.create_icon_style(Some("http://maps.google.com/mapfiles/kml/shapes/firedept.png"), 1.3)?;
    kfile.finish_style()?;

    kfile.start_folder(Some(opts.satellite.name()), None, false)?;

    let mut name = String::new();
    let mut description = String::new();
    for cluster in rows {
        name.clear();
        let _ = write!(&mut name, "{:.0}MW", cluster.power);

        description.clear();
        let _ = write!(
            &mut description,
            "<h3>Cluster Power: {:.0}MW</h3><h3>Max Scan Angle: {:.0}&deg;</h3>",
            cluster.power, cluster.scan_angle,
        );

        kfile.start_folder(Some(&name), None, false)?;

        kfile.start_placemark(None, Some(&description), Some("#fire"))?;
        let Coord { lat, lon } = cluster.centroid;
        kfile.create_point(lat, lon, 0.0)?;
        kfile.finish_placemark()?;

        cluster.pixels.kml_write(&mut kfile);

        kfile.finish_folder()?;
    }

    kfile.finish_folder()?;

    Ok(())
}
