/*!
 * A single satellite pixel flagged by the fire-detection algorithm, and a growable list of them.
 */

use crate::geo::{
    lines_intersection, quad_bounding_box, quad_centroid, quad_contains_coord, quad_edges,
    BoundingBox, Coord, Geo, Line, LineIntersection,
};
use crate::kml::{KmlGeometrySink, KmlWrite};
use crate::{SatFireError, SatFireResult};

/// A convex quadrilateral pixel in lat/lon space, with the scalar attributes carried by the FDC
/// product. Corners are ordered consistently: upper/lower, left/right as named.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub ul: Coord,
    pub ur: Coord,
    pub lr: Coord,
    pub ll: Coord,
    /// Fire radiative power, in megawatts. Must be `> 0` for a pixel to enter clustering.
    pub power: f64,
    /// Brightness temperature.
    pub temperature: f64,
    pub area: f64,
    pub scan_angle: f64,
    /// Raw mask-field QC code from the source file; only meaningful before clustering.
    pub mask_flag: i16,
    /// Raw data-quality-flag QC code from the source file; only meaningful before clustering.
    pub data_quality_flag: i16,
}

impl Pixel {
    fn edges(&self) -> [Line; 4] {
        quad_edges(self.ul, self.ur, self.lr, self.ll)
    }

    fn corners(&self) -> [Coord; 4] {
        [self.ul, self.ur, self.lr, self.ll]
    }

    /// The centroid of the quadrilateral, found by intersecting the two lines joining the
    /// centroids of the triangles formed by each diagonal. Panics (an `InvariantViolation`-class
    /// programmer error) if the pixel is so degenerate the diagonals don't cross — unreachable for
    /// a well-formed convex quadrilateral.
    pub fn centroid(&self) -> Coord {
        quad_centroid(self.ul, self.ur, self.lr, self.ll)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        quad_bounding_box(self.ul, self.ur, self.lr, self.ll)
    }

    /// Strict point-in-polygon test: reject via bounding box, then check whether any pixel edge
    /// has an interior intersection with the segment from `coord` to any pixel corner. If none do,
    /// the point is inside.
    pub fn contains_coord(&self, coord: Coord) -> bool {
        quad_contains_coord(self.bounding_box(), &self.edges(), self.corners(), coord)
    }

    pub fn approx_equal(&self, other: &Pixel, eps: f64) -> bool {
        self.ul.close(other.ul, eps)
            && self.ur.close(other.ur, eps)
            && self.lr.close(other.lr, eps)
            && self.ll.close(other.ll, eps)
    }

    /// True if the pixels are approx-equal, or any edge of one has an interior intersection with
    /// any edge of the other, or any corner of one lies inside the other. Endpoint-only touches do
    /// not count.
    pub fn overlap(&self, other: &Pixel, eps: f64) -> bool {
        if self.approx_equal(other, eps) {
            return true;
        }

        for edge in self.edges() {
            for other_edge in other.edges() {
                if let LineIntersection::Interior(_) = lines_intersection(edge, other_edge) {
                    return true;
                }
            }
        }

        for corner in self.corners() {
            if other.contains_coord(corner) {
                return true;
            }
        }

        for corner in other.corners() {
            if self.contains_coord(corner) {
                return true;
            }
        }

        false
    }

    /// True iff the pixels share a common edge or corner: a corner of one is within `eps` of a
    /// corner of the other, or a corner of one is within `eps` of an edge of the other. Symmetric,
    /// and mutually exclusive with [`Pixel::overlap`] — overlapping pixels are never adjacent.
    pub fn adjacent(&self, other: &Pixel, eps: f64) -> bool {
        if self.overlap(other, eps) {
            return false;
        }

        for c in self.corners() {
            for oc in other.corners() {
                if c.close(oc, eps) {
                    return true;
                }
            }
        }

        for c in self.corners() {
            for oe in other.edges() {
                if point_to_segment_distance(c, oe) <= eps {
                    return true;
                }
            }
        }

        for oc in other.corners() {
            for e in self.edges() {
                if point_to_segment_distance(oc, e) <= eps {
                    return true;
                }
            }
        }

        false
    }
}

impl Geo for Pixel {
    fn centroid(&self) -> Coord {
        Pixel::centroid(self)
    }

    fn bounding_box(&self) -> BoundingBox {
        Pixel::bounding_box(self)
    }
}

/// Planar distance from a point to the nearest point on a segment (lon treated as x, lat as y).
fn point_to_segment_distance(p: Coord, seg: Line) -> f64 {
    let (x, y) = (p.lon, p.lat);
    let (x1, y1) = (seg.start.lon, seg.start.lat);
    let (x2, y2) = (seg.end.lon, seg.end.lat);

    let dx = x2 - x1;
    let dy = y2 - y1;
    let len2 = dx * dx + dy * dy;

    if len2 == 0.0 {
        return ((x - x1).powi(2) + (y - y1).powi(2)).sqrt();
    }

    let t = (((x - x1) * dx + (y - y1) * dy) / len2).clamp(0.0, 1.0);
    let proj_x = x1 + t * dx;
    let proj_y = y1 + t * dy;

    ((x - proj_x).powi(2) + (y - proj_y).powi(2)).sqrt()
}

const PIXEL_LIST_MAGIC: u32 = 0x5058_4C53; // "PXLS"
const PIXEL_LIST_VERSION: u16 = 1;
/// 8 corner f64s + power + temperature + area + scan_angle.
const PIXEL_RECORD_LEN: usize = 12 * 8;

/// A growable, ordered sequence of [`Pixel`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelList(Vec<Pixel>);

impl PixelList {
    pub fn new() -> Self {
        PixelList(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PixelList(Vec::with_capacity(capacity))
    }

    pub fn append(&mut self, pixel: Pixel) {
        self.0.push(pixel);
    }

    /// Drop all pixels, retaining the allocated capacity.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pixel> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Pixel] {
        &self.0
    }

    /// Append every pixel from `other` onto `self`, without deduplication. Used when merging two
    /// clusters or extending a fire's pixel history with a newly linked cluster.
    pub fn max_merge(&mut self, other: &PixelList) {
        self.0.extend_from_slice(&other.0);
    }

    /// Power-weighted mean of the per-pixel centroids. Pixels with zero power are excluded from
    /// the weighting; if every pixel has zero power, falls back to an unweighted mean.
    pub fn centroid(&self) -> Coord {
        let total_power: f64 = self.0.iter().map(|p| p.power).sum();

        if self.0.is_empty() {
            return Coord { lat: 0.0, lon: 0.0 };
        }

        if total_power <= 0.0 {
            let n = self.0.len() as f64;
            let lat = self.0.iter().map(|p| p.centroid().lat).sum::<f64>() / n;
            let lon = self.0.iter().map(|p| p.centroid().lon).sum::<f64>() / n;
            return Coord { lat, lon };
        }

        let mut lat = 0.0;
        let mut lon = 0.0;
        for pxl in &self.0 {
            let c = pxl.centroid();
            let w = pxl.power / total_power;
            lat += c.lat * w;
            lon += c.lon * w;
        }

        Coord { lat, lon }
    }

    pub fn total_power(&self) -> f64 {
        self.0.iter().map(|p| p.power).sum()
    }

    pub fn total_area(&self) -> f64 {
        self.0.iter().map(|p| p.area).sum()
    }

    pub fn max_temperature(&self) -> f64 {
        self.0.iter().map(|p| p.temperature).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn max_scan_angle(&self) -> f64 {
        self.0.iter().map(|p| p.scan_angle).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Union of the per-pixel bounding boxes.
    pub fn bounding_box(&self) -> BoundingBox {
        self.0
            .iter()
            .map(|p| p.bounding_box())
            .fold(BoundingBox::default(), |acc, bb| acc.union(&bb))
    }

    /// True if any pixel in `self` overlaps or is adjacent to any pixel in `other`, under the
    /// given tolerance. Used to decide whether a new cluster belongs to an ongoing fire.
    pub fn adjacent_to_or_overlaps(&self, other: &PixelList, eps: f64) -> bool {
        for a in self.iter() {
            for b in other.iter() {
                if a.overlap(b, eps) || a.adjacent(b, eps) {
                    return true;
                }
            }
        }
        false
    }

    /// Exact number of bytes [`PixelList::serialize`] will write.
    pub fn serialize_size(&self) -> usize {
        4 + 2 + 4 + self.0.len() * PIXEL_RECORD_LEN
    }

    /// Encode as the little-endian `PXLS` binary format described in the module documentation.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialize_size());

        buf.extend_from_slice(&PIXEL_LIST_MAGIC.to_le_bytes());
        buf.extend_from_slice(&PIXEL_LIST_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.0.len() as u32).to_le_bytes());

        for pxl in &self.0 {
            for v in [
                pxl.ul.lat, pxl.ul.lon, pxl.ur.lat, pxl.ur.lon, pxl.lr.lat, pxl.lr.lon,
                pxl.ll.lat, pxl.ll.lon, pxl.power, pxl.temperature, pxl.area, pxl.scan_angle,
            ] {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }

        buf
    }

    /// Decode the little-endian `PXLS` binary format. Rejects with `BadFormat` on a magic,
    /// version, or length mismatch. Round-trips bit-exact with [`PixelList::serialize`]; decoded
    /// pixels carry zeroed QC codes since those are not part of the persisted format.
    pub fn deserialize(buf: &[u8]) -> SatFireResult<PixelList> {
        if buf.len() < 10 {
            return Err(SatFireError::BadFormat("pixel list buffer too short".into()));
        }

        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != PIXEL_LIST_MAGIC {
            return Err(SatFireError::BadFormat(format!("bad magic: {:#x}", magic)));
        }

        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version != PIXEL_LIST_VERSION {
            return Err(SatFireError::BadFormat(format!("unsupported version: {}", version)));
        }

        let count = u32::from_le_bytes(buf[6..10].try_into().unwrap()) as usize;
        let expected_len = 10 + count * PIXEL_RECORD_LEN;
        if buf.len() != expected_len {
            return Err(SatFireError::BadFormat(format!(
                "expected {} bytes for {} pixels, got {}",
                expected_len,
                count,
                buf.len()
            )));
        }

        let mut pixels = Vec::with_capacity(count);
        let mut off = 10;
        for _ in 0..count {
            let mut read_f64 = || {
                let v = f64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
                off += 8;
                v
            };

            let ul = Coord { lat: read_f64(), lon: read_f64() };
            let ur = Coord { lat: read_f64(), lon: read_f64() };
            let lr = Coord { lat: read_f64(), lon: read_f64() };
            let ll = Coord { lat: read_f64(), lon: read_f64() };
            let power = read_f64();
            let temperature = read_f64();
            let area = read_f64();
            let scan_angle = read_f64();

            pixels.push(Pixel {
                ul,
                ur,
                lr,
                ll,
                power,
                temperature,
                area,
                scan_angle,
                mask_flag: 0,
                data_quality_flag: 0,
            });
        }

        Ok(PixelList(pixels))
    }
}

impl Geo for PixelList {
    fn centroid(&self) -> Coord {
        PixelList::centroid(self)
    }

    fn bounding_box(&self) -> BoundingBox {
        PixelList::bounding_box(self)
    }
}

impl KmlWrite for PixelList {
    fn kml_write<W: KmlGeometrySink>(&self, kml: &mut W) {
        let _ = kml.start_multi_geometry();
        for pxl in &self.0 {
            let _ = kml.start_polygon(false, true, Some("clampToGround"));
            let _ = kml.polygon_start_outer_ring();
            let _ = kml.start_linear_ring();
            let _ = kml.linear_ring_add_vertex(pxl.ul.lat, pxl.ul.lon, 0.0);
            let _ = kml.linear_ring_add_vertex(pxl.ur.lat, pxl.ur.lon, 0.0);
            let _ = kml.linear_ring_add_vertex(pxl.lr.lat, pxl.lr.lon, 0.0);
            let _ = kml.linear_ring_add_vertex(pxl.ll.lat, pxl.ll.lon, 0.0);
            let _ = kml.linear_ring_add_vertex(pxl.ul.lat, pxl.ul.lon, 0.0);
            let _ = kml.finish_linear_ring();
            let _ = kml.polygon_finish_outer_ring();
            let _ = kml.finish_polygon();
        }
        let _ = kml.finish_multi_geometry();
    }
}

impl<'a> IntoIterator for &'a PixelList {
    type Item = &'a Pixel;
    type IntoIter = std::slice::Iter<'a, Pixel>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Pixel>> for PixelList {
    fn from(v: Vec<Pixel>) -> Self {
        PixelList(v)
    }
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
    fn centroid_of_unit_square() {
        let pxl = unit_square_at(0.0, 0.0, 10.0);
        let c = pxl.centroid();
        assert!(c.close(Coord { lat: 0.5, lon: 0.5 }, 1.0e-9));
    }

    #[test]
    fn containment_boundary_is_strict() {
        let pxl = unit_square_at(0.0, 0.0, 10.0);
        assert!(pxl.contains_coord(Coord { lat: 0.5, lon: 0.5 }));
        assert!(!pxl.contains_coord(Coord { lat: 0.0, lon: 0.0 }));
        assert!(!pxl.contains_coord(Coord { lat: 1.5, lon: 0.5 }));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = unit_square_at(0.0, 0.0, 10.0);
        let b = unit_square_at(0.5, 0.5, 10.0);
        assert!(a.overlap(&b, 1.0e-9));
        assert!(b.overlap(&a, 1.0e-9));
    }

    #[test]
    fn edge_sharing_squares_are_adjacent_not_overlapping() {
        let a = unit_square_at(0.0, 0.0, 10.0);
        let b = unit_square_at(0.0, 1.0, 10.0);
        assert!(a.adjacent(&b, 1.0e-6));
        assert!(b.adjacent(&a, 1.0e-6));
        assert!(!a.overlap(&b, 1.0e-6));
    }

    #[test]
    fn a_pixel_is_not_adjacent_to_itself() {
        let a = unit_square_at(0.0, 0.0, 10.0);
        assert!(a.overlap(&a, 1.0e-6));
        assert!(!a.adjacent(&a, 1.0e-6));
    }

    #[test]
    fn pixel_list_codec_round_trips() {
        let mut list = PixelList::new();
        list.append(unit_square_at(0.0, 0.0, 10.0));
        list.append(unit_square_at(5.0, 5.0, 20.0));

        let bytes = list.serialize();
        assert_eq!(bytes.len(), list.serialize_size());

        let decoded = PixelList::deserialize(&bytes).unwrap();
        assert_eq!(decoded.len(), list.len());
        assert_eq!(decoded.total_power(), list.total_power());
        for (a, b) in list.iter().zip(decoded.iter()) {
            assert_eq!(a.ul, b.ul);
            assert_eq!(a.power, b.power);
        }
    }

    #[test]
    fn deserialize_rejects_bad_magic() {
        let bytes = [0u8; 16];
        assert!(PixelList::deserialize(&bytes).is_err());
    }
}
