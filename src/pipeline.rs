//! The ingest pipeline (C6): walk the archive, skip what's already stored, load and cluster the
//! rest, and commit the results. Four stages connected by bounded channels, mirroring the
//! dir-walker / filter / loader / committer split of the original tool, minus the hand-rolled
//! mailbox bookkeeping a thread pool and `crossbeam-channel` make unnecessary.

use crate::cluster::ClusterList;
use crate::database::ClusterDatabase;
use crate::satellite::{parse_satellite_description_from_file_name, MaskCode, Satellite, Sector};
use crate::scan_reader::ScanReader;
use crate::stats::{ClusterListStats, ClusterStats, MAX_SCAN_ANGLE};
use crate::{KmlWrite, KmzFile, SatFireResult};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Tunables for one ingest run. The default worker counts mirror the teacher's fixed `K_f`/`K_l`
/// of 4; a caller may size them off `num_cpus::get()` instead.
pub struct PipelineConfig {
    pub archive_root: PathBuf,
    pub cluster_db: PathBuf,
    pub placemark_path: Option<PathBuf>,
    pub only_new: bool,
    pub verbose: bool,
    pub num_filter_workers: usize,
    pub num_loader_workers: usize,
}

impl PipelineConfig {
    pub fn new(archive_root: PathBuf, cluster_db: PathBuf) -> Self {
        PipelineConfig {
            archive_root,
            cluster_db,
            placemark_path: None,
            only_new: false,
            verbose: false,
            num_filter_workers: 4,
            num_loader_workers: 4,
        }
    }
}

const CHANNEL_CAPACITY: usize = 64;

/// Run the four-stage pipeline to completion, returning once the committer has drained and
/// exited. Errors from worker threads are logged at their source; a `StoreError` from the
/// committer propagates here as the only fatal condition.
pub fn run<R>(config: PipelineConfig, reader: Arc<R>) -> SatFireResult<()>
where
    R: ScanReader + Send + Sync + 'static,
{
    ClusterDatabase::initialize(&config.cluster_db)?;

    let most_recent = if config.only_new {
        let db = ClusterDatabase::connect(&config.cluster_db)?;
        Some(newest_scan_table(&db)?)
    } else {
        None
    };

    let (to_filter_tx, to_filter_rx) = bounded::<PathBuf>(CHANNEL_CAPACITY);
    let (to_loader_tx, to_loader_rx) = bounded::<PathBuf>(CHANNEL_CAPACITY);
    let (to_committer_tx, to_committer_rx) = bounded::<ClusterList>(CHANNEL_CAPACITY);

    let mut handles = Vec::new();

    let archive_root = config.archive_root.clone();
    let verbose = config.verbose;
    handles.push(
        std::thread::Builder::new()
            .name("dir-walker".into())
            .spawn(move || directory_walker(&archive_root, most_recent, verbose, to_filter_tx))?,
    );

    for i in 0..config.num_filter_workers {
        let cluster_db = config.cluster_db.clone();
        let rx = to_filter_rx.clone();
        let tx = to_loader_tx.clone();
        let verbose = config.verbose;
        handles.push(
            std::thread::Builder::new()
                .name(format!("filter-{}", i))
                .spawn(move || path_filter(&cluster_db, rx, tx, verbose))?,
        );
    }
    drop(to_filter_rx);
    drop(to_loader_tx);

    for i in 0..config.num_loader_workers {
        let rx = to_loader_rx.clone();
        let tx = to_committer_tx.clone();
        let reader = Arc::clone(&reader);
        handles.push(
            std::thread::Builder::new()
                .name(format!("loader-{}", i))
                .spawn(move || cluster_loader(reader.as_ref(), rx, tx))?,
        );
    }
    drop(to_loader_rx);
    drop(to_committer_tx);

    let cluster_db = config.cluster_db.clone();
    let placemark_path = config.placemark_path.clone();
    let verbose = config.verbose;
    let committer = std::thread::Builder::new()
        .name("committer".into())
        .spawn(move || committer(&cluster_db, to_committer_rx, placemark_path, verbose))?;

    for h in handles {
        let _ = h.join();
    }

    committer.join().map_err(|_| "committer thread panicked")??;

    Ok(())
}

fn newest_scan_table(
    db: &ClusterDatabase,
) -> SatFireResult<HashMap<(Satellite, Sector), DateTime<Utc>>> {
    let mut table = HashMap::default();
    for sat in Satellite::iter() {
        for sector in Sector::iter() {
            let ts = db.newest_scan_start(sat, sector)?;
            debug!(target: "dir-walker", "latest {} {} => {}", sat, sector, ts);
            table.insert((sat, sector), ts);
        }
    }
    Ok(table)
}

fn directory_walker(
    root: &Path,
    most_recent: Option<HashMap<(Satellite, Sector), DateTime<Utc>>>,
    verbose: bool,
    to_filter: Sender<PathBuf>,
) {
    let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_file() {
            return true;
        }
        match &most_recent {
            Some(table) => should_descend(entry.path(), table),
            None => true,
        }
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(target: "dir-walker", "error walking archive: {}", err);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("nc") {
            continue;
        }

        if let Some(sector) = Sector::string_contains_sector(&path.to_string_lossy()) {
            if sector.is_meso() {
                continue;
            }
        }

        if verbose {
            info!(target: "dir-walker", "found: {}", path.display());
        }

        if to_filter.send(path.to_path_buf()).is_err() {
            break;
        }
    }
}

/// Mirrors the original pruning heuristic: the archive is laid out
/// `SATELLITE/SECTOR/YEAR/DAY_OF_YEAR/HOUR/...`, and a subtree can be skipped once its year, day
/// of year, and hour components are all known to be strictly before the newest scan already
/// stored for that `(satellite, sector)`.
fn should_descend(path: &Path, most_recent: &HashMap<(Satellite, Sector), DateTime<Utc>>) -> bool {
    use chrono::{Datelike, Timelike};

    let path_str = path.to_string_lossy();
    let (sat, sector) = match (
        Satellite::string_contains_satellite(&path_str),
        Sector::string_contains_sector(&path_str),
    ) {
        (Some(sat), Some(sector)) => (sat, sector),
        _ => return true,
    };

    let mr = match most_recent.get(&(sat, sector)) {
        Some(ts) => *ts,
        None => return true,
    };
    let (mr_year, mr_doy, mr_hour) = (mr.year(), mr.ordinal() as i32, mr.hour() as i32);

    let mut numbers = path.components().filter_map(|c| c.as_os_str().to_str()?.parse::<i32>().ok());

    let mut year = None;
    let mut doy = None;
    let mut hour = None;
    for n in numbers.by_ref() {
        if n > 2000 {
            year = Some(n);
        } else if doy.is_none() {
            doy = Some(n);
        } else {
            hour = Some(n);
            break;
        }
    }

    let year = match year {
        Some(y) => y,
        None => return true,
    };
    if year < mr_year {
        return false;
    }

    let doy = match doy {
        Some(d) => d,
        None => return true,
    };
    if doy < mr_doy && year <= mr_year {
        return false;
    }

    let hour = match hour {
        Some(h) => h,
        None => return true,
    };
    if hour < mr_hour && doy <= mr_doy && year <= mr_year {
        return false;
    }

    true
}

fn path_filter(
    cluster_db: &Path,
    from_walker: Receiver<PathBuf>,
    to_loader: Sender<PathBuf>,
    verbose: bool,
) {
    let db = match ClusterDatabase::connect(cluster_db) {
        Ok(db) => db,
        Err(err) => {
            warn!(target: "filter", "failed to open cluster database: {}", err);
            return;
        }
    };

    let mut present_query = match db.prepare_to_query_clusters_present() {
        Ok(q) => q,
        Err(err) => {
            warn!(target: "filter", "failed to prepare present-check query: {}", err);
            return;
        }
    };

    for path in from_walker {
        let fname = path.to_string_lossy();
        let identity = parse_satellite_description_from_file_name(&fname);

        let already_present = match identity {
            Some((sat, sector, start, end)) => {
                match present_query.present(sat, sector, start, end) {
                    Ok(present) => present,
                    Err(err) => {
                        warn!(target: "filter", "present-check failed for {}: {}", fname, err);
                        false
                    }
                }
            }
            None => false,
        };

        if already_present {
            continue;
        }

        if verbose {
            info!(target: "filter", "processing: {}", fname);
        }

        if to_loader.send(path).is_err() {
            break;
        }
    }
}

fn cluster_loader<R: ScanReader>(
    reader: &R,
    from_filter: Receiver<PathBuf>,
    to_committer: Sender<ClusterList>,
) {
    for path in from_filter {
        let result = match reader.read(&path) {
            Ok(r) => r,
            Err(err) => {
                warn!(target: "loader", "error processing file {}: {}", path.display(), err);
                continue;
            }
        };

        let kept_pixels: Vec<_> = result
            .pixels
            .iter()
            .filter(|p| MaskCode(p.mask_flag).is_fire_keeper())
            .copied()
            .collect();

        let clusters = ClusterList::from_pixels(
            result.satellite,
            result.sector,
            result.scan_start,
            result.scan_end,
            kept_pixels,
        );

        if to_committer.send(clusters).is_err() {
            break;
        }
    }
}

fn committer(
    cluster_db: &Path,
    from_loader: Receiver<ClusterList>,
    placemark_path: Option<PathBuf>,
    verbose: bool,
) -> SatFireResult<()> {
    let db = ClusterDatabase::connect(cluster_db)?;
    let mut add_cluster = db.prepare_to_add_clusters()?;

    let mut cluster_stats = ClusterStats::new();
    let mut list_stats = ClusterListStats::new();

    for clusters in from_loader {
        let clusters = clusters.retain_clusters(|c| c.max_scan_angle() < MAX_SCAN_ANGLE);

        let satellite = clusters.satellite();
        let sector = clusters.sector();
        let start = clusters.scan_start();
        let end = clusters.scan_end();

        for cluster in clusters.clusters() {
            cluster_stats.update(satellite, sector, start, end, cluster);
        }
        list_stats.update(&clusters);

        add_cluster.add(clusters)?;
    }

    if verbose {
        info!(target: "committer", "{}", cluster_stats);
        info!(target: "committer", "{}", list_stats);
    }

    if let (Some(path), Some(biggest)) = (placemark_path, cluster_stats.biggest_cluster()) {
        let mut kmz = KmzFile::start_document(&path)?;
        kmz.start_style(Some("fire"))?;
        kmz.create_icon_style(Some("http://maps.google.com/mapfiles/kml/shapes/firedept.png"), 1.3)?;
        kmz.finish_style()?;
        kmz.start_placemark(Some("Biggest Cluster"), None, Some("#fire"))?;
        biggest.pixels().kml_write(&mut kmz);
        kmz.finish_placemark()?;
        kmz.finish()?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_descend_keeps_subtrees_too_shallow_to_decide() {
        let table: HashMap<(Satellite, Sector), DateTime<Utc>> = HashMap::default();
        assert!(should_descend(Path::new("/archive/G16/FDCF"), &table));
    }

    #[test]
    fn should_descend_prunes_strictly_older_year() {
        let mut table = HashMap::default();
        table.insert((Satellite::G16, Sector::FULL), Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap());
        use chrono::TimeZone;
        assert!(!should_descend(Path::new("/archive/G16/FDCF/2020/238/15"), &table));
    }

    #[test]
    fn should_descend_keeps_newer_year() {
        use chrono::TimeZone;
        let mut table = HashMap::default();
        table.insert((Satellite::G16, Sector::FULL), Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap());
        assert!(should_descend(Path::new("/archive/G16/FDCF/2022/100/10"), &table));
    }
}
