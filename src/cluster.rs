/*!
 * Grouping the flagged pixels of one scan into connected-component clusters.
 */

use crate::geo::hilbert_rtree::Hilbert2DRTreeView;
use crate::geo::{BoundingBox, Coord, Geo};
use crate::pixel::{Pixel, PixelList};
use crate::satellite::{Satellite, Sector};
use chrono::{DateTime, Utc};

/// The geometric tolerance, in degrees, used for overlap/adjacency tests during clustering.
/// Chosen below the pixel resolution.
pub const CLUSTER_EPSILON: f64 = 1.0e-6;

/// A maximal connected set of overlapping-or-adjacent flagged pixels within one scan.
///
/// Immutable once built by [`ClusterList::from_pixels`]; never empty, and always has
/// `total_power > 0`.
#[derive(Debug, Clone)]
pub struct Cluster {
    pixels: PixelList,
    centroid: Coord,
    total_power: f64,
    max_temperature: f64,
    total_area: f64,
    max_scan_angle: f64,
}

impl Cluster {
    fn seal(pixels: PixelList) -> Self {
        let centroid = pixels.centroid();
        let total_power = pixels.total_power();
        let max_temperature = pixels.max_temperature();
        let total_area = pixels.total_area();
        let max_scan_angle = pixels.max_scan_angle();

        Cluster { pixels, centroid, total_power, max_temperature, total_area, max_scan_angle }
    }

    pub fn pixels(&self) -> &PixelList {
        &self.pixels
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    pub fn total_power(&self) -> f64 {
        self.total_power
    }

    pub fn max_temperature(&self) -> f64 {
        self.max_temperature
    }

    pub fn total_area(&self) -> f64 {
        self.total_area
    }

    pub fn max_scan_angle(&self) -> f64 {
        self.max_scan_angle
    }

    /// True if this cluster's footprint overlaps or is adjacent to `other`'s, under the given
    /// tolerance. Used by the temporal linker to match a new cluster against an active fire's
    /// most recent cluster.
    pub fn overlaps_or_adjacent(&self, other: &Cluster, eps: f64) -> bool {
        for a in self.pixels.iter() {
            for b in other.pixels.iter() {
                if a.overlap(b, eps) || a.adjacent(b, eps) {
                    return true;
                }
            }
        }
        false
    }
}

impl Geo for Cluster {
    fn centroid(&self) -> Coord {
        self.centroid
    }

    fn bounding_box(&self) -> BoundingBox {
        self.pixels.bounding_box()
    }
}

/// All clusters derived from one scan, identified by `(satellite, sector, scan_start, scan_end)`.
/// Sorted order among clusters is unspecified. `error` is set when the scan reader failed and no
/// clusters could be produced.
#[derive(Debug, Clone)]
pub struct ClusterList {
    satellite: Satellite,
    sector: Sector,
    scan_start: DateTime<Utc>,
    scan_end: DateTime<Utc>,
    clusters: Vec<Cluster>,
    error: bool,
}

impl ClusterList {
    /// A ClusterList for a scan that failed to read: no clusters, `error` set.
    pub fn error(
        satellite: Satellite,
        sector: Sector,
        scan_start: DateTime<Utc>,
        scan_end: DateTime<Utc>,
    ) -> Self {
        ClusterList { satellite, sector, scan_start, scan_end, clusters: Vec::new(), error: true }
    }

    /// Partition `pixels` (the flagged pixels of one scan) into connected-component clusters and
    /// seal each one. Non-positive-power pixels are dropped before partitioning, and any cluster
    /// that still comes out with zero total power afterward is dropped too.
    pub fn from_pixels(
        satellite: Satellite,
        sector: Sector,
        scan_start: DateTime<Utc>,
        scan_end: DateTime<Utc>,
        pixels: Vec<Pixel>,
    ) -> Self {
        let pixels: Vec<Pixel> = pixels.into_iter().filter(|p| p.power > 0.0).collect();
        let groups = cluster_indices(&pixels, CLUSTER_EPSILON);

        let clusters: Vec<Cluster> = groups
            .into_iter()
            .map(|idxs| {
                let mut list = PixelList::with_capacity(idxs.len());
                for i in idxs {
                    list.append(pixels[i]);
                }
                Cluster::seal(list)
            })
            .filter(|c| c.total_power() > 0.0)
            .collect();

        ClusterList { satellite, sector, scan_start, scan_end, clusters, error: false }
    }

    pub fn satellite(&self) -> Satellite {
        self.satellite
    }

    pub fn sector(&self) -> Sector {
        self.sector
    }

    pub fn scan_start(&self) -> DateTime<Utc> {
        self.scan_start
    }

    pub fn scan_end(&self) -> DateTime<Utc> {
        self.scan_end
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }

    /// Drop clusters that fail `keep`, preserving the scan identity. Used by the committer to
    /// apply scan-angle QC before a batch is written and before it feeds the running stats.
    pub fn retain_clusters<F: FnMut(&Cluster) -> bool>(mut self, mut keep: F) -> Self {
        self.clusters.retain(|c| keep(c));
        self
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Union-find with path compression and union by rank.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        DisjointSet { parent: (0..n).collect(), rank: vec![0; n] }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
        }
    }
}

/// Group pixel indices into connected components under `overlap(a,b,eps) || adjacent(a,b,eps)`.
/// Candidate pairs are narrowed with the Hilbert R-tree spatial index when the pixel set spans a
/// non-degenerate area; a handful of pixels, or pixels that all share one point/line, fall back to
/// direct O(n^2) comparison since the R-tree requires a positive-area domain.
fn cluster_indices(pixels: &[Pixel], eps: f64) -> Vec<Vec<usize>> {
    let n = pixels.len();
    let mut dsu = DisjointSet::new(n);

    if n < 2 {
        return (0..n).map(|i| vec![i]).collect();
    }

    if use_spatial_index(pixels) {
        let rtree = Hilbert2DRTreeView::build_for(pixels, None);
        let mut candidates = Vec::new();
        for i in 0..n {
            let bbox = pixels[i].bounding_box();
            let query = BoundingBox {
                ll: Coord { lat: bbox.ll.lat - eps, lon: bbox.ll.lon - eps },
                ur: Coord { lat: bbox.ur.lat + eps, lon: bbox.ur.lon + eps },
            };
            rtree.get_indexes_of_overlapping_items(query, &mut candidates);
            for &j in &candidates {
                if j <= i {
                    continue;
                }
                if pixels[i].overlap(&pixels[j], eps) || pixels[i].adjacent(&pixels[j], eps) {
                    dsu.union(i, j);
                }
            }
        }
    } else {
        for i in 0..n {
            for j in (i + 1)..n {
                if pixels[i].overlap(&pixels[j], eps) || pixels[i].adjacent(&pixels[j], eps) {
                    dsu.union(i, j);
                }
            }
        }
    }

    let mut groups: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = dsu.find(i);
        groups.entry(root).or_default().push(i);
    }

    groups.into_values().collect()
}

fn use_spatial_index(pixels: &[Pixel]) -> bool {
    let mut bbox = BoundingBox::default();
    for p in pixels {
        bbox = bbox.union(&p.bounding_box());
    }
    bbox.ur.lon > bbox.ll.lon && bbox.ur.lat >= bbox.ll.lat
}

#[cfg(test)]
mod test {
    use super::*;

    fn unit_square_at(lat0: f64, lon0: f64, power: f64) -> Pixel {
        Pixel {
            ul: Coord { lat: lat0 + 1.0, lon: lon0 },
            ur: Coord { lat: lat0 + 1.0, lon: lon0 + 1.0 },
            lr: Coord { lat: lat0, lon: lon0 + 1.0 },
            ll: Coord { lat: lat0, lon: lon0 },
            power,
            temperature: 330.0,
            area: 1.0,
            scan_angle: 1.0,
            mask_flag: 10,
            data_quality_flag: 0,
        }
    }

    #[test]
    fn adjacent_pixels_form_one_cluster() {
        let pixels = vec![
            unit_square_at(0.0, 0.0, 10.0),
            unit_square_at(0.0, 1.0, 20.0),
            unit_square_at(10.0, 10.0, 5.0),
        ];

        let list =
            ClusterList::from_pixels(Satellite::G16, Sector::FULL, Utc::now(), Utc::now(), pixels);

        assert_eq!(list.len(), 2);
        let total: usize = list.clusters().iter().map(|c| c.pixel_count()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn clusters_have_positive_total_power() {
        let pixels = vec![unit_square_at(0.0, 0.0, 10.0)];
        let list =
            ClusterList::from_pixels(Satellite::G16, Sector::FULL, Utc::now(), Utc::now(), pixels);
        assert_eq!(list.len(), 1);
        assert!(list.clusters()[0].total_power() > 0.0);
    }

    #[test]
    fn union_of_cluster_pixels_equals_input_and_is_partitioned() {
        let pixels = vec![
            unit_square_at(0.0, 0.0, 10.0),
            unit_square_at(0.0, 1.0, 10.0),
            unit_square_at(0.0, 2.0, 10.0),
            unit_square_at(100.0, 100.0, 10.0),
        ];
        let n = pixels.len();
        let list =
            ClusterList::from_pixels(Satellite::G16, Sector::FULL, Utc::now(), Utc::now(), pixels);

        let total: usize = list.clusters().iter().map(|c| c.pixel_count()).sum();
        assert_eq!(total, n);
        assert_eq!(list.len(), 2);
    }
}
