//! Spherical-Mercator (EPSG:3857) projection.
//!
//! The pipeline works entirely in this metric frame; input WGS84 layers
//! are projected forward at load and outputs are projected back.

use geo::{Coord, MapCoords, MultiPolygon, Point};

/// WGS84 spheroid radius used by spherical Mercator, meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Projects a WGS84 lon/lat coordinate into spherical Mercator meters.
#[must_use]
pub fn forward(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord.y.clamp(-85.051_128, 85.051_128);
    Coord {
        x: EARTH_RADIUS_M * coord.x.to_radians(),
        y: EARTH_RADIUS_M
            * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                .tan()
                .ln(),
    }
}

/// Projects a spherical-Mercator coordinate back to WGS84 lon/lat.
#[must_use]
pub fn inverse(coord: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (coord.x / EARTH_RADIUS_M).to_degrees(),
        y: (2.0 * (coord.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2)
            .to_degrees(),
    }
}

/// Projects a multipolygon from the working frame back to WGS84.
#[must_use]
pub fn unproject_multi(geom: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    geom.map_coords(inverse)
}

/// Projects a point from the working frame back to WGS84.
#[must_use]
pub fn unproject_point(point: &Point<f64>) -> Point<f64> {
    Point::from(inverse(point.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_origin() {
        let projected = forward(Coord { x: 0.0, y: 0.0 });
        assert!(projected.x.abs() < 1e-9);
        assert!(projected.y.abs() < 1e-9);
    }

    #[test]
    fn round_trips_within_tolerance() {
        let original = Coord { x: 39.87, y: 57.62 };
        let back = inverse(forward(original));
        assert!((back.x - original.x).abs() < 1e-9);
        assert!((back.y - original.y).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_longitude_is_about_111_km_at_the_equator() {
        let projected = forward(Coord { x: 1.0, y: 0.0 });
        assert!((projected.x - 111_319.49).abs() < 1.0);
    }
}
