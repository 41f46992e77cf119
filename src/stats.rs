//! Per-run cluster and scan statistics (C8), observed by the ingest committer and the temporal
//! linker.

use crate::cluster::{Cluster, ClusterList};
use crate::fire::{Fire, FireList};
use crate::geo::Geo;
use crate::satellite::{Satellite, Sector};
use chrono::{DateTime, Utc};

/// Clusters whose max scan angle is at or above this are excluded from the running stats and
/// from the commit itself; the value comes from visual inspection of cluster power vs. max scan
/// angle of the member centroids, the same QC used at commit time.
pub const MAX_SCAN_ANGLE: f64 = 8.3;

struct TrackedCluster {
    cluster: Cluster,
    satellite: Satellite,
    sector: Sector,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Running stats about individual clusters seen by the committer this run.
pub struct ClusterStats {
    biggest: Option<TrackedCluster>,
    hottest: Option<TrackedCluster>,
    num_clusters: u32,
    num_power_lt_1mw: u32,
    num_power_lt_10mw: u32,
}

impl Default for ClusterStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStats {
    pub fn new() -> Self {
        ClusterStats {
            biggest: None,
            hottest: None,
            num_clusters: 0,
            num_power_lt_1mw: 0,
            num_power_lt_10mw: 0,
        }
    }

    /// Fold a single cluster into the running stats. Ignored if its max scan angle is too oblique.
    pub fn update(
        &mut self,
        satellite: Satellite,
        sector: Sector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cluster: &Cluster,
    ) {
        if cluster.max_scan_angle() >= MAX_SCAN_ANGLE {
            return;
        }

        let power = cluster.total_power();

        if self.biggest.as_ref().map_or(true, |t| power > t.cluster.total_power()) {
            self.biggest = Some(TrackedCluster { cluster: cluster.clone(), satellite, sector, start, end });
        }

        if self
            .hottest
            .as_ref()
            .map_or(true, |t| cluster.max_temperature() > t.cluster.max_temperature())
        {
            self.hottest = Some(TrackedCluster { cluster: cluster.clone(), satellite, sector, start, end });
        }

        if power < 1.0 {
            self.num_power_lt_1mw += 1;
        }
        if power < 10.0 {
            self.num_power_lt_10mw += 1;
        }

        self.num_clusters += 1;
    }

    /// The single biggest (by total power) cluster seen, if any passed the scan-angle QC gate.
    pub fn biggest_cluster(&self) -> Option<&Cluster> {
        self.biggest.as_ref().map(|t| &t.cluster)
    }

    pub fn num_clusters(&self) -> u32 {
        self.num_clusters
    }

    fn percent(&self, n: u32) -> String {
        if self.num_clusters == 0 {
            "N/A".to_owned()
        } else {
            format!("{:.0}%", f64::from(n) * 100.0 / f64::from(self.num_clusters))
        }
    }
}

impl std::fmt::Display for ClusterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.num_clusters == 0 {
            return writeln!(f, "No new clusters added to the database.");
        }

        writeln!(f, "\nIndividual Cluster Stats\n")?;

        if let Some(t) = &self.biggest {
            let centroid = t.cluster.centroid();
            writeln!(
                f,
                " Most Powerful:\n      satellite: {}\n         sector: {}\n          start: {}\n            end: {}\n            Lat: {:.6}\n            Lon: {:.6}\n          Power: {:.0} MW\n Max Temperature: {:.0} Kelvin\n",
                t.satellite, t.sector, t.start, t.end, centroid.lat, centroid.lon,
                t.cluster.total_power(), t.cluster.max_temperature()
            )?;
        }

        if let Some(t) = &self.hottest {
            let centroid = t.cluster.centroid();
            writeln!(
                f,
                "        Hottest:\n      satellite: {}\n         sector: {}\n          start: {}\n            end: {}\n            Lat: {:.6}\n            Lon: {:.6}\n          Power: {:.0} MW\n Max Temperature: {:.0} Kelvin\n",
                t.satellite, t.sector, t.start, t.end, centroid.lat, centroid.lon,
                t.cluster.total_power(), t.cluster.max_temperature()
            )?;
        }

        writeln!(
            f,
            "        Counts:\n         Total: {:>10}\nPower <  1 MW: {:>10} ({})\nPower < 10 MW: {:>10} ({})",
            self.num_clusters,
            self.num_power_lt_1mw, self.percent(self.num_power_lt_1mw),
            self.num_power_lt_10mw, self.percent(self.num_power_lt_10mw),
        )
    }
}

struct TrackedScan {
    satellite: Satellite,
    sector: Sector,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    num_clusters: usize,
    total_power: f64,
}

/// Running stats about whole scans (one `ClusterList` per scan) seen by the committer this run.
pub struct ClusterListStats {
    min_num_clusters: Option<TrackedScan>,
    max_num_clusters: Option<TrackedScan>,
    max_total_power: Option<TrackedScan>,
    min_total_power: Option<TrackedScan>,
}

impl Default for ClusterListStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterListStats {
    pub fn new() -> Self {
        ClusterListStats {
            min_num_clusters: None,
            max_num_clusters: None,
            max_total_power: None,
            min_total_power: None,
        }
    }

    pub fn update(&mut self, clusters: &ClusterList) {
        let num_clusters = clusters.len();
        let total_power: f64 = clusters.clusters().iter().map(|c| c.total_power()).sum();

        let snap = || TrackedScan {
            satellite: clusters.satellite(),
            sector: clusters.sector(),
            start: clusters.scan_start(),
            end: clusters.scan_end(),
            num_clusters,
            total_power,
        };

        if self.max_num_clusters.as_ref().map_or(true, |t| num_clusters > t.num_clusters) {
            self.max_num_clusters = Some(snap());
        }
        if self.min_num_clusters.as_ref().map_or(true, |t| num_clusters < t.num_clusters) {
            self.min_num_clusters = Some(snap());
        }
        if self.max_total_power.as_ref().map_or(true, |t| total_power > t.total_power) {
            self.max_total_power = Some(snap());
        }
        if self.min_total_power.as_ref().map_or(true, |t| total_power < t.total_power) {
            self.min_total_power = Some(snap());
        }
    }
}

impl std::fmt::Display for ClusterListStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(t) = &self.max_total_power {
            writeln!(
                f,
                "\nMax Image Power Stats:\n            satellite: {}\n               sector: {}\n                start: {}\n                  end: {}\n      Max Total Power: {:.0} MW",
                t.satellite, t.sector, t.start, t.end, t.total_power
            )?;
        }
        if let Some(t) = &self.min_total_power {
            writeln!(
                f,
                "\nMin Image Power Stats:\n            satellite: {}\n               sector: {}\n                start: {}\n                  end: {}\n      Min Total Power: {:.0} MW",
                t.satellite, t.sector, t.start, t.end, t.total_power
            )?;
        }
        if let Some(t) = &self.max_num_clusters {
            writeln!(
                f,
                "\nMax Image Number Clusters:\n                satellite: {}\n                   sector: {}\n                    start: {}\n                      end: {}\n           Total Clusters: {}",
                t.satellite, t.sector, t.start, t.end, t.num_clusters
            )?;
        }
        if let Some(t) = &self.min_num_clusters {
            writeln!(
                f,
                "\nMin Image Number Clusters:\n                satellite: {}\n                   sector: {}\n                    start: {}\n                      end: {}\n           Total Clusters: {}",
                t.satellite, t.sector, t.start, t.end, t.num_clusters
            )?;
        }
        Ok(())
    }
}

/// Running stats about the fires retired or still open at the end of a linker run for one
/// satellite: the longest-lived, most powerful, and hottest fire seen so far.
#[derive(Default)]
pub struct FireRunStats {
    longest: Option<Fire>,
    most_powerful: Option<Fire>,
    hottest: Option<Fire>,
}

impl FireRunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every fire in `fires` into the running extremes.
    pub fn update(&mut self, fires: &FireList) {
        for fire in fires.iter() {
            if self.longest.as_ref().map_or(true, |t| fire.duration() > t.duration()) {
                self.longest = Some(fire.clone());
            }
            if self.most_powerful.as_ref().map_or(true, |t| fire.max_power() > t.max_power()) {
                self.most_powerful = Some(fire.clone());
            }
            if self.hottest.as_ref().map_or(true, |t| fire.max_temperature() > t.max_temperature()) {
                self.hottest = Some(fire.clone());
            }
        }
    }

    pub fn longest(&self) -> Option<&Fire> {
        self.longest.as_ref()
    }

    pub fn most_powerful(&self) -> Option<&Fire> {
        self.most_powerful.as_ref()
    }

    pub fn hottest(&self) -> Option<&Fire> {
        self.hottest.as_ref()
    }
}

impl std::fmt::Display for FireRunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "\nLongest duration fire:")?;
        match &self.longest {
            Some(fire) => write!(f, "{}", fire)?,
            None => writeln!(f, "  none")?,
        }

        writeln!(f, "\nMost powerful fire:")?;
        match &self.most_powerful {
            Some(fire) => write!(f, "{}", fire)?,
            None => writeln!(f, "  none")?,
        }

        writeln!(f, "\nHottest fire:")?;
        match &self.hottest {
            Some(fire) => write!(f, "{}", fire)?,
            None => writeln!(f, "  none")?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pixel::{Pixel, PixelList};
    use crate::geo::Coord;

    fn unit_square_at(lat0: f64, lon0: f64, power: f64, temperature: f64) -> Pixel {
        Pixel {
            ul: Coord { lat: lat0 + 1.0, lon: lon0 },
            ur: Coord { lat: lat0 + 1.0, lon: lon0 + 1.0 },
            lr: Coord { lat: lat0, lon: lon0 + 1.0 },
            ll: Coord { lat: lat0, lon: lon0 },
            power,
            temperature,
            area: 1.0,
            scan_angle: 1.0,
            mask_flag: 10,
            data_quality_flag: 0,
        }
    }

    #[test]
    fn zero_clusters_prints_na_percentages() {
        let stats = ClusterStats::new();
        assert_eq!(stats.percent(0), "N/A");
    }

    #[test]
    fn lt_1mw_and_lt_10mw_are_independent_buckets() {
        let mut stats = ClusterStats::new();
        let now = Utc::now();

        let low = ClusterList::from_pixels(
            Satellite::G16, Sector::FULL, now, now, vec![unit_square_at(0.0, 0.0, 0.5, 330.0)],
        );
        let mid = ClusterList::from_pixels(
            Satellite::G16, Sector::FULL, now, now, vec![unit_square_at(5.0, 5.0, 5.0, 330.0)],
        );

        stats.update(Satellite::G16, Sector::FULL, now, now, &low.clusters()[0]);
        stats.update(Satellite::G16, Sector::FULL, now, now, &mid.clusters()[0]);

        assert_eq!(stats.num_power_lt_1mw, 1);
        assert_eq!(stats.num_power_lt_10mw, 1);
        assert_eq!(stats.num_clusters, 2);
    }

    #[test]
    fn biggest_and_hottest_can_differ() {
        let mut stats = ClusterStats::new();
        let now = Utc::now();

        let big_cold = ClusterList::from_pixels(
            Satellite::G16, Sector::FULL, now, now, vec![unit_square_at(0.0, 0.0, 100.0, 310.0)],
        );
        let small_hot = ClusterList::from_pixels(
            Satellite::G16, Sector::FULL, now, now, vec![unit_square_at(5.0, 5.0, 1.0, 400.0)],
        );

        stats.update(Satellite::G16, Sector::FULL, now, now, &big_cold.clusters()[0]);
        stats.update(Satellite::G16, Sector::FULL, now, now, &small_hot.clusters()[0]);

        assert_eq!(stats.biggest_cluster().unwrap().total_power(), 100.0);
        assert_eq!(stats.hottest.as_ref().unwrap().cluster.max_temperature(), 400.0);
    }

    #[test]
    fn scan_angle_gate_excludes_cluster_from_stats() {
        let mut stats = ClusterStats::new();
        let now = Utc::now();
        let mut p = unit_square_at(0.0, 0.0, 50.0, 330.0);
        p.scan_angle = 20.0;
        let list = PixelList::from(vec![p]);
        let cl = ClusterList::from_pixels(Satellite::G16, Sector::FULL, now, now, list.as_slice().to_vec());
        stats.update(Satellite::G16, Sector::FULL, now, now, &cl.clusters()[0]);
        assert_eq!(stats.num_clusters, 0);
    }

    #[test]
    fn fire_run_stats_tracks_independent_extremes() {
        let now = Utc::now();
        let short_hot = Fire::new(now, now + chrono::Duration::hours(1), 10.0, 500.0, 1,
            PixelList::from(vec![unit_square_at(0.0, 0.0, 10.0, 500.0)]), Satellite::G16, 0);
        let long_weak = Fire::new(now, now + chrono::Duration::days(5), 5.0, 320.0, 2,
            PixelList::from(vec![unit_square_at(5.0, 5.0, 5.0, 320.0)]), Satellite::G16, 0);
        let big_power = Fire::new(now, now + chrono::Duration::hours(2), 200.0, 330.0, 3,
            PixelList::from(vec![unit_square_at(10.0, 10.0, 200.0, 330.0)]), Satellite::G16, 0);

        let mut fires = FireList::new();
        fires.add_fire(short_hot);
        fires.add_fire(long_weak);
        fires.add_fire(big_power);

        let mut run_stats = FireRunStats::new();
        run_stats.update(&fires);

        assert_eq!(run_stats.longest().unwrap().id(), 2);
        assert_eq!(run_stats.most_powerful().unwrap().id(), 3);
        assert_eq!(run_stats.hottest().unwrap().id(), 1);
    }
}
