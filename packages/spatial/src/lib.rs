#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared spatial primitives for the pipeline.
//!
//! All nearest-neighbor and containment lookups go through [`GeomIndex`],
//! an R-tree over polygonal entries. Queries are deterministic: results are
//! the minimum of `(distance, insertion order)`, so ties always resolve to
//! the first entry in input order regardless of tree layout.
//!
//! Also hosts polygon repair (applied once at ingestion, never mid-stage)
//! and deterministic buffering used for service catchments and clip
//! boundaries.

use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, Distance, Euclidean, LineString,
    MultiPolygon, Point, Polygon,
};
use rstar::{AABB, PointDistance, RTree, RTreeObject};

/// Vertex count used when polygonizing a buffer disc.
const DISC_SEGMENTS: usize = 32;

// ── Distance helpers ─────────────────────────────────────────────────────

/// Euclidean distance from a point to a multipolygon (0 when inside).
/// Empty geometry yields infinity.
#[must_use]
pub fn point_to_geom(point: &Point<f64>, geom: &MultiPolygon<f64>) -> f64 {
    geom.0
        .iter()
        .map(|polygon| Euclidean.distance(point, polygon))
        .fold(f64::INFINITY, f64::min)
}

/// Euclidean distance between two multipolygons (0 when they intersect).
/// Empty geometry yields infinity.
#[must_use]
pub fn geom_to_geom(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    let mut min = f64::INFINITY;
    for left in &a.0 {
        for right in &b.0 {
            let d = Euclidean.distance(left, right);
            if d < min {
                min = d;
            }
        }
    }
    min
}

/// Centroid of a multipolygon, falling back to the envelope center for
/// degenerate geometry.
#[must_use]
pub fn centroid_of(geom: &MultiPolygon<f64>) -> Point<f64> {
    use geo::Centroid as _;

    geom.centroid().unwrap_or_else(|| {
        geom.bounding_rect()
            .map_or_else(|| Point::new(0.0, 0.0), |rect| rect.center().into())
    })
}

/// Area of intersection between two multipolygons, m².
#[must_use]
pub fn intersection_area(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    a.intersection(b).unsigned_area()
}

// ── Polygon repair ───────────────────────────────────────────────────────

/// Repairs a multipolygon: closes unclosed rings, removes consecutive
/// duplicate vertices, and drops degenerate rings (fewer than 4 coords
/// after closing). A polygon whose exterior is degenerate is dropped.
#[must_use]
pub fn repair(geom: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon(geom.0.into_iter().filter_map(repair_polygon).collect())
}

fn repair_polygon(polygon: Polygon<f64>) -> Option<Polygon<f64>> {
    let (exterior, interiors) = polygon.into_inner();
    let exterior = repair_ring(exterior)?;
    let interiors = interiors.into_iter().filter_map(repair_ring).collect();
    Some(Polygon::new(exterior, interiors))
}

fn repair_ring(ring: LineString<f64>) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len() + 1);
    for coord in ring.0 {
        if coords.last() != Some(&coord) {
            coords.push(coord);
        }
    }
    match (coords.first().copied(), coords.last().copied()) {
        (Some(first), Some(last)) if first != last => coords.push(first),
        _ => {}
    }
    (coords.len() >= 4).then(|| LineString(coords))
}

/// Converts any polygonal `geo` geometry into a repaired multipolygon.
/// Non-polygonal geometry yields `None`.
#[must_use]
pub fn to_multi_polygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let multi = match geometry {
        geo::Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
        geo::Geometry::MultiPolygon(multi) => multi,
        geo::Geometry::GeometryCollection(collection) => MultiPolygon(
            collection
                .into_iter()
                .filter_map(to_multi_polygon)
                .flat_map(|multi| multi.0)
                .collect(),
        ),
        _ => return None,
    };
    let repaired = repair(multi);
    (!repaired.0.is_empty()).then_some(repaired)
}

// ── Buffering ────────────────────────────────────────────────────────────

/// Buffers a point into a polygonized disc with a fixed vertex count.
/// Vertices are generated in a fixed angular order, so identical inputs
/// always produce identical discs.
#[must_use]
pub fn buffer_point(point: &Point<f64>, radius: f64) -> Polygon<f64> {
    let mut coords = Vec::with_capacity(DISC_SEGMENTS + 1);
    for i in 0..DISC_SEGMENTS {
        #[allow(clippy::cast_precision_loss)]
        let angle = std::f64::consts::TAU * (i as f64) / (DISC_SEGMENTS as f64);
        coords.push(Coord {
            x: point.x() + radius * angle.cos(),
            y: point.y() + radius * angle.sin(),
        });
    }
    coords.push(coords[0]);
    Polygon::new(LineString(coords), vec![])
}

/// Buffers a multipolygon outward by `radius` via a Minkowski-style sweep:
/// the union of the geometry itself, a disc at every exterior vertex, and a
/// rectangle along every exterior edge. Holes are kept as-is rather than
/// shrunk, which is sufficient for catchment and clip boundaries.
#[must_use]
pub fn buffer_geom(geom: &MultiPolygon<f64>, radius: f64) -> MultiPolygon<f64> {
    if radius <= 0.0 {
        return geom.clone();
    }

    let mut result = geom.clone();
    for polygon in &geom.0 {
        let ring = polygon.exterior();
        for coord in &ring.0 {
            let disc = buffer_point(&Point::from(*coord), radius);
            result = result.union(&MultiPolygon(vec![disc]));
        }
        for edge in ring.lines() {
            if let Some(quad) = edge_quad(edge.start, edge.end, radius) {
                result = result.union(&MultiPolygon(vec![quad]));
            }
        }
    }
    result
}

/// Rectangle covering an edge offset by `radius` on both sides.
fn edge_quad(start: Coord<f64>, end: Coord<f64>, radius: f64) -> Option<Polygon<f64>> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length = dx.hypot(dy);
    if length == 0.0 {
        return None;
    }
    let nx = -dy / length * radius;
    let ny = dx / length * radius;
    Some(Polygon::new(
        LineString(vec![
            Coord {
                x: start.x + nx,
                y: start.y + ny,
            },
            Coord {
                x: end.x + nx,
                y: end.y + ny,
            },
            Coord {
                x: end.x - nx,
                y: end.y - ny,
            },
            Coord {
                x: start.x - nx,
                y: start.y - ny,
            },
            Coord {
                x: start.x + nx,
                y: start.y + ny,
            },
        ]),
        vec![],
    ))
}

/// Union of a set of multipolygons.
#[must_use]
pub fn union_all(geoms: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    let mut result = MultiPolygon(vec![]);
    for geom in geoms {
        result = result.union(geom);
    }
    result
}

// ── R-tree index ─────────────────────────────────────────────────────────

/// A polygonal entry stored in the R-tree with its insertion ordinal.
struct IndexEntry {
    ordinal: usize,
    envelope: AABB<[f64; 2]>,
    geometry: MultiPolygon<f64>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = point_to_geom(&Point::new(point[0], point[1]), &self.geometry);
        d * d
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.geometry.contains(&Point::new(point[0], point[1]))
    }
}

fn envelope_of(geom: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    geom.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Squared lower-bound distance between two envelopes.
fn envelope_gap_2(a: &AABB<[f64; 2]>, b: &AABB<[f64; 2]>) -> f64 {
    let dx = (a.lower()[0] - b.upper()[0]).max(b.lower()[0] - a.upper()[0]).max(0.0);
    let dy = (a.lower()[1] - b.upper()[1]).max(b.lower()[1] - a.upper()[1]).max(0.0);
    dx.mul_add(dx, dy * dy)
}

/// R-tree backed index over a collection of multipolygons, preserving the
/// collection's input order for tie-breaking. Entry ordinals are the
/// indexes into the source collection.
pub struct GeomIndex {
    tree: RTree<IndexEntry>,
    len: usize,
}

impl GeomIndex {
    /// Builds an index over the geometries in input order.
    #[must_use]
    pub fn build(geoms: &[MultiPolygon<f64>]) -> Self {
        let entries = geoms
            .iter()
            .enumerate()
            .map(|(ordinal, geometry)| IndexEntry {
                ordinal,
                envelope: envelope_of(geometry),
                geometry: geometry.clone(),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            len: geoms.len(),
        }
    }

    /// Number of indexed geometries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the index is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First geometry (by input order) containing the point, if any.
    #[must_use]
    pub fn containing(&self, point: &Point<f64>) -> Option<usize> {
        let query = AABB::from_point([point.x(), point.y()]);
        self.tree
            .locate_in_envelope_intersecting(&query)
            .filter(|entry| entry.geometry.contains(point))
            .map(|entry| entry.ordinal)
            .min()
    }

    /// Nearest accepted geometry to a point, with its distance. Ties on
    /// distance resolve to the lowest ordinal.
    #[must_use]
    pub fn nearest_to_point<F>(&self, point: &Point<f64>, accept: F) -> Option<(usize, f64)>
    where
        F: Fn(usize) -> bool,
    {
        let mut best: Option<(f64, usize)> = None;
        for (entry, d2) in self
            .tree
            .nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()])
        {
            if let Some((best_d2, _)) = best {
                // The iterator yields non-decreasing distances; anything
                // past the best distance can only lose.
                if d2 > best_d2 {
                    break;
                }
            }
            if !accept(entry.ordinal) {
                continue;
            }
            match best {
                Some((best_d2, best_ordinal))
                    if d2 > best_d2 || (d2 == best_d2 && entry.ordinal > best_ordinal) => {}
                _ => best = Some((d2, entry.ordinal)),
            }
        }
        best.map(|(d2, ordinal)| (ordinal, d2.sqrt()))
    }

    /// Nearest accepted geometry to a query geometry, with its distance.
    /// Exact geometry-to-geometry distance with envelope pruning; ties on
    /// distance resolve to the lowest ordinal.
    #[must_use]
    pub fn nearest_to_geom<F>(
        &self,
        geom: &MultiPolygon<f64>,
        accept: F,
    ) -> Option<(usize, f64)>
    where
        F: Fn(usize) -> bool,
    {
        let query_env = envelope_of(geom);
        let mut best: Option<(f64, usize)> = None;
        for entry in &self.tree {
            if !accept(entry.ordinal) {
                continue;
            }
            if let Some((best_d, _)) = best {
                // Envelope gap is a lower bound on the exact distance.
                if envelope_gap_2(&query_env, &entry.envelope) > best_d * best_d {
                    continue;
                }
            }
            let d = geom_to_geom(geom, &entry.geometry);
            match best {
                Some((best_d, best_ordinal))
                    if d > best_d || (d == best_d && entry.ordinal > best_ordinal) => {}
                _ => best = Some((d, entry.ordinal)),
            }
        }
        best.map(|(d, ordinal)| (ordinal, d))
    }

    /// First accepted geometry (by input order) within `radius` of the
    /// query geometry, if any.
    #[must_use]
    pub fn first_within<F>(
        &self,
        geom: &MultiPolygon<f64>,
        radius: f64,
        accept: F,
    ) -> Option<usize>
    where
        F: Fn(usize) -> bool,
    {
        let rect = geom.bounding_rect()?;
        let query = AABB::from_corners(
            [rect.min().x - radius, rect.min().y - radius],
            [rect.max().x + radius, rect.max().y + radius],
        );
        self.tree
            .locate_in_envelope_intersecting(&query)
            .filter(|entry| accept(entry.ordinal))
            .filter(|entry| geom_to_geom(geom, &entry.geometry) <= radius)
            .map(|entry| entry.ordinal)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    #[test]
    fn containing_prefers_input_order_on_overlap() {
        let geoms = vec![square(0.0, 0.0, 10.0), square(5.0, 0.0, 10.0)];
        let index = GeomIndex::build(&geoms);
        // Inside the overlap of both squares.
        assert_eq!(index.containing(&Point::new(7.0, 5.0)), Some(0));
        assert_eq!(index.containing(&Point::new(12.0, 5.0)), Some(1));
        assert_eq!(index.containing(&Point::new(50.0, 50.0)), None);
    }

    #[test]
    fn nearest_to_point_breaks_ties_by_input_order() {
        // Two squares equidistant from the query point.
        let geoms = vec![square(10.0, 0.0, 5.0), square(-15.0, 0.0, 5.0)];
        let index = GeomIndex::build(&geoms);
        let (ordinal, distance) = index.nearest_to_point(&Point::new(0.0, 2.0), |_| true).unwrap();
        assert_eq!(ordinal, 0);
        assert!((distance - 10.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_to_point_honors_filter() {
        let geoms = vec![square(1.0, 0.0, 5.0), square(20.0, 0.0, 5.0)];
        let index = GeomIndex::build(&geoms);
        let (ordinal, _) = index
            .nearest_to_point(&Point::new(0.0, 2.0), |ordinal| ordinal != 0)
            .unwrap();
        assert_eq!(ordinal, 1);
    }

    #[test]
    fn nearest_to_geom_finds_closest_polygon() {
        let geoms = vec![
            square(100.0, 0.0, 5.0),
            square(20.0, 0.0, 5.0),
            square(200.0, 0.0, 5.0),
        ];
        let index = GeomIndex::build(&geoms);
        let query = square(0.0, 0.0, 5.0);
        let (ordinal, distance) = index.nearest_to_geom(&query, |_| true).unwrap();
        assert_eq!(ordinal, 1);
        assert!((distance - 15.0).abs() < 1e-9);
    }

    #[test]
    fn first_within_returns_lowest_ordinal() {
        let geoms = vec![square(8.0, 0.0, 5.0), square(7.0, 0.0, 5.0)];
        let index = GeomIndex::build(&geoms);
        let query = square(0.0, 0.0, 5.0);
        // The gaps are 3m to the first square and 2m to the second. Both
        // within radius: the first by input order wins, not the nearer.
        assert_eq!(index.first_within(&query, 4.0, |_| true), Some(0));
        // Only the nearer square is within 2m.
        assert_eq!(index.first_within(&query, 2.0, |_| true), Some(1));
        assert_eq!(index.first_within(&query, 0.5, |_| true), None);
    }

    #[test]
    fn repair_closes_rings_and_drops_duplicates() {
        let open = MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 4.0, y: 0.0 },
                Coord { x: 4.0, y: 4.0 },
                Coord { x: 0.0, y: 4.0 },
            ]),
            vec![],
        )]);
        let fixed = repair(open);
        assert_eq!(fixed.0.len(), 1);
        let exterior = fixed.0[0].exterior();
        assert_eq!(exterior.0.first(), exterior.0.last());
        assert!((fixed.unsigned_area() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn repair_drops_degenerate_polygons() {
        let degenerate = MultiPolygon(vec![Polygon::new(
            LineString(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]),
            vec![],
        )]);
        assert!(repair(degenerate).0.is_empty());
    }

    #[test]
    fn buffer_point_is_a_disc_of_roughly_pi_r_squared() {
        let disc = buffer_point(&Point::new(0.0, 0.0), 100.0);
        let area = disc.unsigned_area();
        let exact = std::f64::consts::PI * 100.0 * 100.0;
        // A 32-gon underestimates the disc slightly.
        assert!(area < exact);
        assert!(area > exact * 0.98);
    }

    #[test]
    fn buffer_geom_expands_in_every_direction() {
        let buffered = buffer_geom(&square(0.0, 0.0, 10.0), 5.0);
        assert!(buffered.contains(&Point::new(-4.0, 5.0)));
        assert!(buffered.contains(&Point::new(14.0, 5.0)));
        assert!(buffered.contains(&Point::new(5.0, 14.0)));
        assert!(!buffered.contains(&Point::new(-10.0, -10.0)));
    }

    #[test]
    fn intersection_area_of_half_overlapping_squares() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 0.0, 10.0);
        assert!((intersection_area(&a, &b) - 50.0).abs() < 1e-6);
    }
}
