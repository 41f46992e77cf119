//! The temporal linker (C7): replays stored clusters in scan order and assembles per-satellite
//! fire time series, mirroring `connectfire.c`'s single-pass `process_rows_for_satellite`.

use crate::database::{ClusterDatabase, ClusterDatabaseClusterRow, FiresDatabase};
use crate::fire::{FireList, FireListUpdateResult};
use crate::geo::{BoundingBox, Coord};
use crate::satellite::Satellite;
use crate::stats::FireRunStats;
use crate::{KmlWrite, KmzFile, SatFireResult};
use chrono::{DateTime, Duration, Utc};
use log::info;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// The sliding window behind which an active fire's last cluster must fall before it's
/// considered for retirement. Composes with [`crate::fire`]'s richer per-fire retirement rule;
/// this is just the baseline check against "now" in the replay stream.
pub fn delta_t_max() -> Duration {
    Duration::hours(12)
}

const WORLD: BoundingBox = BoundingBox { ll: Coord { lat: -90.0, lon: -180.0 }, ur: Coord { lat: 90.0, lon: 180.0 } };

pub struct LinkerConfig {
    pub cluster_db: std::path::PathBuf,
    pub fires_db: std::path::PathBuf,
    pub kmz_root: Option<std::path::PathBuf>,
    pub verbose: bool,
}

/// Run the linker over every satellite, persisting the resulting fires and writing a per-satellite
/// KMZ export if `kmz_root` is configured.
pub fn run(config: LinkerConfig) -> SatFireResult<()> {
    use strum::IntoEnumIterator;

    FiresDatabase::initialize(&config.fires_db)?;

    let cluster_db = ClusterDatabase::connect(&config.cluster_db)?;
    let fires_db = FiresDatabase::connect(&config.fires_db)?;

    let next_wildfire_id = AtomicU64::new(fires_db.next_wildfire_id()?);
    if config.verbose {
        info!(target: "linker", "next wildfire id: {}", next_wildfire_id.load(Ordering::SeqCst));
    }

    for sat in Satellite::iter() {
        process_satellite(&cluster_db, &fires_db, sat, &next_wildfire_id, &config)?;
    }

    Ok(())
}

fn process_satellite(
    cluster_db: &ClusterDatabase,
    fires_db: &FiresDatabase,
    sat: Satellite,
    next_wildfire_id: &AtomicU64,
    config: &LinkerConfig,
) -> SatFireResult<()> {
    let start = DateTime::<Utc>::from_utc(chrono::NaiveDateTime::from_timestamp(0, 0), Utc);
    let end = Utc::now();

    let mut query = cluster_db.query_clusters(Some(sat), None, start, end, WORLD)?;

    let mut add_fire = fires_db.prepare_to_add_fires()?;

    let mut current_fires = FireList::new();
    let mut new_fires = FireList::new();
    let mut old_fires = FireList::new();
    let mut run_stats = FireRunStats::new();

    let mut current_time_step: Option<DateTime<Utc>> = None;
    let mut num_absorbed: u64 = 0;

    for row in query.rows()? {
        let row: ClusterDatabaseClusterRow = row?;

        if current_time_step != Some(row.start) {
            let merges = current_fires.merge_fires(&mut old_fires);
            let num_merged = merges.len();
            for (losing_id, surviving_id) in merges {
                add_fire.remap_association(losing_id, surviving_id);
            }

            let retirement_time = current_time_step.unwrap_or(row.start) - delta_t_max();
            let num_aged = current_fires.drain_stale_fires(&mut old_fires, retirement_time);

            let num_new = new_fires.len();
            current_fires.extend(&mut new_fires);

            if config.verbose {
                info!(
                    target: "linker",
                    "{}: absorbed={} merged={} aged_out={} new={} at {}",
                    sat, num_absorbed, num_merged, num_aged, num_new,
                    current_time_step.map(|t| t.to_string()).unwrap_or_else(|| "start".to_owned()),
                );
            }

            current_time_step = Some(row.start);
            num_absorbed = 0;

            run_stats.update(&old_fires);
        }

        let rowid = row.rowid;
        match current_fires.update(row) {
            FireListUpdateResult::Match(id) => {
                add_fire.add_association(id, rowid);
                num_absorbed += 1;
            }
            FireListUpdateResult::NoMatch(row) => {
                let id = next_wildfire_id.fetch_add(1, Ordering::SeqCst);
                add_fire.add_association(id, row.rowid);
                new_fires.create_add_fire(id, row);
            }
        }
    }

    for (losing_id, surviving_id) in current_fires.merge_fires(&mut old_fires) {
        add_fire.remap_association(losing_id, surviving_id);
    }
    old_fires.extend(&mut current_fires);
    old_fires.extend(&mut new_fires);

    run_stats.update(&old_fires);

    if config.verbose {
        info!(
            target: "linker",
            "{}: final fire count = {}",
            sat, old_fires.len(),
        );
        info!(target: "linker", "{}", run_stats);
    }

    add_fire.add_fires(&old_fires)?;

    if let Some(root) = &config.kmz_root {
        let path = root.join(format!("{}.kmz", sat.name()));
        save_wildfire_list(&old_fires, &path)?;
    }

    Ok(())
}

/// Write every fire in `fires` to a KMZ document: one folder per fire, with a centroid placemark
/// and the fire's composite pixel footprint.
fn save_wildfire_list(fires: &FireList, path: &Path) -> SatFireResult<()> {
    let mut kmz = KmzFile::start_document(path)?;

    kmz.start_style(Some("fire"))?;
    kmz.create_poly_style(Some("880000FF"), true, false)?;
    kmz.create_icon_style(Some("http://maps.google.com/mapfiles/kml/shapes/firedept.png"), 1.3)?;
    kmz.finish_style()?;

    for fire in fires.iter() {
        let name = fire.id().to_string();

        kmz.start_folder(Some(&name), None, false)?;

        let mut duration_buf = String::new();
        fire.format_duration(&mut duration_buf);

        let description = format!(
            "ID: {}<br/>Start: {}<br/>End: {}<br/>Duration: {}<br/>Max Power: {:.0} MW<br/>Max Temperature: {:.0} Kelvin<br/>",
            fire.id(), fire.first_observed(), fire.last_observed(), duration_buf,
            fire.max_power(), fire.max_temperature(),
        );

        kmz.start_placemark(Some(&name), Some(&description), Some("#fire"))?;
        let centroid = fire.centroid();
        kmz.create_point(centroid.lat, centroid.lon, 0.0)?;
        kmz.finish_placemark()?;

        fire.pixels().kml_write(&mut kmz);
        kmz.finish_folder()?;
    }

    kmz.finish()
}
