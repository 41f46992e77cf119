/*!
 * Geographic primitives: coordinates, line segments, bounding boxes, and the convex-quadrilateral
 * pixel math built on top of them.
 *
 * All of this is planar math done directly in degrees. Pixels are small enough (well under 10km
 * on a side) that the curvature error is far below the tolerances used for clustering and
 * adjacency, so there is no need for spherical trigonometry here. The one place true sphere math
 * shows up is [`great_circle_distance`], which is a standalone haversine calculation unrelated to
 * the quadrilateral intersection tests.
 */

pub mod hilbert_rtree;

use std::fmt::{self, Display};

/// A latitude/longitude pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    /// Are these two coordinates within `eps` of each other (planar, squared distance)?
    pub fn close(self, other: Coord, eps: f64) -> bool {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        dlat * dlat + dlon * dlon <= eps * eps
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A line segment between two coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub start: Coord,
    pub end: Coord,
}

/// The result of intersecting two line segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineIntersection {
    /// Both segments are parallel (including collinear and the degenerate both-vertical case).
    Parallel,
    /// The lines containing the segments intersect, but not within both segments' extents.
    Disjoint,
    /// The segments cross at a point interior to both.
    Interior(Coord),
    /// The segments touch exactly at an endpoint of both.
    EndpointTouch(Coord),
}

impl LineIntersection {
    /// True for `Interior` or `EndpointTouch`.
    pub fn does_intersect(&self) -> bool {
        matches!(self, LineIntersection::Interior(_) | LineIntersection::EndpointTouch(_))
    }

    pub fn point(&self) -> Option<Coord> {
        match self {
            LineIntersection::Interior(p) | LineIntersection::EndpointTouch(p) => Some(*p),
            _ => None,
        }
    }
}

/// Compute the intersection of two line segments.
///
/// Vertical segments (infinite slope) are handled by substituting the vertical line's x into the
/// other line's equation; if both are vertical the result is `Parallel`. Endpoint-touch equality
/// is exact (bitwise), not epsilon-tolerant: epsilon tolerance belongs at the pixel API layer, not
/// here.
pub fn lines_intersection(l1: Line, l2: Line) -> LineIntersection {
    let m1 = (l1.end.lat - l1.start.lat) / (l1.end.lon - l1.start.lon);
    let m2 = (l2.end.lat - l2.start.lat) / (l2.end.lon - l2.start.lon);

    let x1 = l1.start.lon;
    let y1 = l1.start.lat;
    let x2 = l2.start.lon;
    let y2 = l2.start.lat;

    if m1 == m2 || (m1.is_infinite() && m2.is_infinite()) {
        // This also captures collinear cases.
        return LineIntersection::Parallel;
    }

    let (x0, y0) = if m1.is_infinite() {
        let x0 = l1.start.lon;
        (x0, m2 * (x0 - x2) + y2)
    } else if m2.is_infinite() {
        let x0 = l2.start.lon;
        (x0, m1 * (x0 - x1) + y1)
    } else {
        let x0 = (y2 - y1 + m1 * x1 - m2 * x2) / (m1 - m2);
        (x0, m1 * (x0 - x1) + y1)
    };

    let in_l1 = y0 <= l1.start.lat.max(l1.end.lat)
        && y0 >= l1.start.lat.min(l1.end.lat)
        && x0 <= l1.start.lon.max(l1.end.lon)
        && x0 >= l1.start.lon.min(l1.end.lon);

    let in_l2 = y0 <= l2.start.lat.max(l2.end.lat)
        && y0 >= l2.start.lat.min(l2.end.lat)
        && x0 <= l2.start.lon.max(l2.end.lon)
        && x0 >= l2.start.lon.min(l2.end.lon);

    if !in_l1 || !in_l2 {
        return LineIntersection::Disjoint;
    }

    let intersection = Coord { lat: y0, lon: x0 };

    let is_l1_endpoint = intersection == l1.start || intersection == l1.end;
    let is_l2_endpoint = intersection == l2.start || intersection == l2.end;

    if is_l1_endpoint && is_l2_endpoint {
        LineIntersection::EndpointTouch(intersection)
    } else {
        LineIntersection::Interior(intersection)
    }
}

fn triangle_centroid(v1: Coord, v2: Coord, v3: Coord) -> Coord {
    Coord {
        lat: (v1.lat + v2.lat + v3.lat) / 3.0,
        lon: (v1.lon + v2.lon + v3.lon) / 3.0,
    }
}

/// An axis-aligned bounding box in lat/lon space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub ll: Coord,
    pub ur: Coord,
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox {
            ll: Coord { lat: f64::INFINITY, lon: f64::INFINITY },
            ur: Coord { lat: -f64::INFINITY, lon: -f64::INFINITY },
        }
    }
}

impl BoundingBox {
    /// Strict containment: points on the boundary are not contained.
    pub fn contains(&self, coord: Coord) -> bool {
        coord.lon < self.ur.lon
            && coord.lon > self.ll.lon
            && coord.lat < self.ur.lat
            && coord.lat > self.ll.lat
    }

    /// Do these two boxes overlap, expanded by `eps` on every side?
    pub fn overlap(&self, other: &BoundingBox, eps: f64) -> bool {
        self.ll.lon - eps <= other.ur.lon
            && self.ur.lon + eps >= other.ll.lon
            && self.ll.lat - eps <= other.ur.lat
            && self.ur.lat + eps >= other.ll.lat
    }

    /// The smallest box containing both inputs.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            ll: Coord {
                lat: self.ll.lat.min(other.ll.lat),
                lon: self.ll.lon.min(other.ll.lon),
            },
            ur: Coord {
                lat: self.ur.lat.max(other.ur.lat),
                lon: self.ur.lon.max(other.ur.lon),
            },
        }
    }

    /// The bounding box covering the whole globe.
    pub fn global() -> BoundingBox {
        BoundingBox {
            ll: Coord { lat: -90.0, lon: -180.0 },
            ur: Coord { lat: 90.0, lon: 180.0 },
        }
    }

    pub fn center(&self) -> Coord {
        Coord {
            lat: (self.ll.lat + self.ur.lat) / 2.0,
            lon: (self.ll.lon + self.ur.lon) / 2.0,
        }
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} <-> {}", self.ll, self.ur)
    }
}

/// Anything that can be located and spatially indexed: a centroid point and a bounding box.
///
/// Implemented by `Pixel`, `Cluster`, and `Fire` so all three can share the Hilbert R-tree spatial
/// index in [`hilbert_rtree`].
pub trait Geo {
    fn centroid(&self) -> Coord;
    fn bounding_box(&self) -> BoundingBox;
}

/// Great-circle (haversine) distance between two points, in kilometers. Inputs in degrees.
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const DEG2RAD: f64 = 2.0 * std::f64::consts::PI / 360.0;
    const EARTH_RADIUS_KM: f64 = 6371.0090;

    let lat1_r = lat1 * DEG2RAD;
    let lon1_r = lon1 * DEG2RAD;
    let lat2_r = lat2 * DEG2RAD;
    let lon2_r = lon2 * DEG2RAD;

    let dlat2 = (lat2_r - lat1_r) / 2.0;
    let dlon2 = (lon2_r - lon1_r) / 2.0;

    let sin2_dlat = dlat2.sin().powi(2);
    let sin2_dlon = dlon2.sin().powi(2);

    let arc = 2.0 * (sin2_dlat + sin2_dlon * lat1_r.cos() * lat2_r.cos()).sqrt().asin();

    arc * EARTH_RADIUS_KM
}

/// The four edges of a convex quadrilateral pixel, in winding order `ul -> ur -> lr -> ll -> ul`.
pub(crate) fn quad_edges(ul: Coord, ur: Coord, lr: Coord, ll: Coord) -> [Line; 4] {
    [
        Line { start: ul, end: ur },
        Line { start: ur, end: lr },
        Line { start: lr, end: ll },
        Line { start: ll, end: ul },
    ]
}

pub(crate) fn quad_centroid(ul: Coord, ur: Coord, lr: Coord, ll: Coord) -> Coord {
    let t1_c = triangle_centroid(ul, ll, lr);
    let t2_c = triangle_centroid(ul, ur, lr);
    let diag1 = Line { start: t1_c, end: t2_c };

    let t3_c = triangle_centroid(ul, ll, ur);
    let t4_c = triangle_centroid(lr, ur, ll);
    let diag2 = Line { start: t3_c, end: t4_c };

    match lines_intersection(diag1, diag2) {
        LineIntersection::Interior(p) | LineIntersection::EndpointTouch(p) => p,
        _ => panic!("invariant violation: pixel centroid diagonals did not intersect"),
    }
}

pub(crate) fn quad_bounding_box(ul: Coord, ur: Coord, lr: Coord, ll: Coord) -> BoundingBox {
    let xmax = ur.lon.max(lr.lon);
    let xmin = ul.lon.min(ll.lon);
    let ymax = ur.lat.max(ul.lat);
    let ymin = lr.lat.min(ll.lat);

    BoundingBox {
        ll: Coord { lat: ymin, lon: xmin },
        ur: Coord { lat: ymax, lon: xmax },
    }
}

/// Does `pxl_edges` contain `coord`, strictly?
pub(crate) fn quad_contains_coord(
    bbox: BoundingBox,
    pxl_edges: &[Line; 4],
    corners: [Coord; 4],
    coord: Coord,
) -> bool {
    if !bbox.contains(coord) {
        return false;
    }

    for edge in pxl_edges {
        for corner in corners {
            let probe = Line { start: coord, end: corner };
            if let LineIntersection::Interior(_) = lines_intersection(*edge, probe) {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parallel_lines_do_not_intersect() {
        let l1 = Line { start: Coord { lat: 0.0, lon: 0.0 }, end: Coord { lat: 1.0, lon: 0.0 } };
        let l2 = Line { start: Coord { lat: 0.0, lon: 1.0 }, end: Coord { lat: 1.0, lon: 1.0 } };
        assert_eq!(lines_intersection(l1, l2), LineIntersection::Parallel);
    }

    #[test]
    fn crossing_segments_intersect_in_interior() {
        let l1 = Line { start: Coord { lat: 0.0, lon: 0.0 }, end: Coord { lat: 1.0, lon: 1.0 } };
        let l2 = Line { start: Coord { lat: 0.0, lon: 1.0 }, end: Coord { lat: 1.0, lon: 0.0 } };
        let res = lines_intersection(l1, l2);
        assert!(matches!(res, LineIntersection::Interior(_)));
        let p = res.point().unwrap();
        assert!(p.close(Coord { lat: 0.5, lon: 0.5 }, 1.0e-9));
    }

    #[test]
    fn shared_endpoint_is_endpoint_touch() {
        let l1 = Line { start: Coord { lat: 0.0, lon: 0.0 }, end: Coord { lat: 1.0, lon: 1.0 } };
        let l2 = Line { start: Coord { lat: 1.0, lon: 1.0 }, end: Coord { lat: 2.0, lon: 0.0 } };
        assert!(matches!(lines_intersection(l1, l2), LineIntersection::EndpointTouch(_)));
    }

    #[test]
    fn bounding_box_containment_is_strict() {
        let bbox = BoundingBox { ll: Coord { lat: 0.0, lon: 0.0 }, ur: Coord { lat: 1.0, lon: 1.0 } };
        assert!(bbox.contains(Coord { lat: 0.5, lon: 0.5 }));
        assert!(!bbox.contains(Coord { lat: 0.0, lon: 0.5 }));
        assert!(!bbox.contains(Coord { lat: 1.0, lon: 0.5 }));
    }

    #[test]
    fn great_circle_self_distance_is_zero() {
        assert_eq!(great_circle_distance(45.0, -100.0, 45.0, -100.0), 0.0);
    }

    #[test]
    fn great_circle_quarter_globe() {
        let d = great_circle_distance(0.0, 0.0, 0.0, 90.0);
        assert!((d - 10007.543).abs() < 1.0);
    }

    #[test]
    fn great_circle_is_symmetric() {
        let a = great_circle_distance(12.0, 34.0, -56.0, 78.0);
        let b = great_circle_distance(-56.0, 78.0, 12.0, 34.0);
        assert!((a - b).abs() < 1.0e-9);
    }
}
