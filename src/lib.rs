//! Ingest, cluster, persist, and temporally link GOES-R series Fire Detection Characteristics
//! (FDC) satellite fire pixels.

// Public API
pub use cluster::{Cluster, ClusterList};
pub use database::{
    ClusterDatabase, ClusterDatabaseAddCluster, ClusterDatabaseClusterRow,
    ClusterDatabaseQueryClusterPresent, ClusterDatabaseQueryClusters, FiresDatabase,
    FiresDatabaseAddFire, JointFiresClusterDatabases, JointQuerySingleFire,
};
pub use error::{SatFireError, SatFireResult};
pub use fire::{Fire, FireList, FireListUpdateResult};
pub use geo::{BoundingBox, Coord, Geo};
pub use kml::{KmlFile, KmlGeometrySink, KmlWrite, KmzFile};
pub use pixel::{Pixel, PixelList};
pub use satellite::{
    parse_satellite_description_from_file_name, DataQualityFlagCode, MaskCode, Satellite, Sector,
};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse the file name and find the scan start time, using the `_sYYYYDDDHHMMSS` marker used
/// throughout the archive.
pub fn start_time_from_file_name(fname: &str) -> Option<DateTime<Utc>> {
    parse_timestamp_marker(fname, "_s")
}

/// Parse the file name and find the scan end time, using the `_eYYYYDDDHHMMSS` marker.
pub fn end_time_from_file_name(fname: &str) -> Option<DateTime<Utc>> {
    parse_timestamp_marker(fname, "_e")
}

fn parse_timestamp_marker(fname: &str, marker: &str) -> Option<DateTime<Utc>> {
    let start_idx = fname.find(marker)? + marker.len();
    let slice = fname.get(start_idx..)?;
    let slice = slice.get(..13)?;

    NaiveDateTime::parse_from_str(slice, "%Y%j%H%M%S")
        .ok()
        .map(|naive| DateTime::<Utc>::from_utc(naive, Utc))
}

pub mod config;
pub mod linker;
pub mod pipeline;
pub mod scan_reader;
pub mod stats;

mod cluster;
mod database;
mod error;
mod fire;
mod geo;
mod kml;
mod pixel;
mod satellite;

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_start_time_from_file_name() {
        const CASE1: &str =
            "OR_ABI-L2-FDCF-M6_G17_s20212130100319_e20212130109386_c20212130109511.nc.zip";

        let case1_start = start_time_from_file_name(CASE1).unwrap();
        assert_eq!(
            case1_start,
            DateTime::<Utc>::from_utc(
                NaiveDate::from_yo_opt(2021, 213)
                    .and_then(|d| d.and_hms_opt(1, 0, 31))
                    .unwrap(),
                Utc
            )
        );

        let case1_end = end_time_from_file_name(CASE1).unwrap();
        assert_eq!(
            case1_end,
            DateTime::<Utc>::from_utc(
                NaiveDate::from_yo_opt(2021, 213)
                    .and_then(|d| d.and_hms_opt(1, 9, 38))
                    .unwrap(),
                Utc
            )
        );
    }

    #[test]
    fn bad_file_name_returns_none() {
        assert!(start_time_from_file_name("not_a_scan_file.txt").is_none());
        assert!(end_time_from_file_name("not_a_scan_file.txt").is_none());
    }
}
