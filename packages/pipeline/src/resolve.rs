//! Zone model resolution: fills missing environment-type classification
//! from nearby donor zones.

use geo::Area as _;
use urban_potential_city_models::{EnvironmentType, Zone, ZoneId, ZoneSource};
use urban_potential_config::NormsConfig;
use urban_potential_spatial::{centroid_of, GeomIndex};

use crate::StageReport;

/// Assigns zone ids and residential flags, then resolves the environment
/// type for target-coded zones: a donor zone within the buffer radius wins
/// (first by input order), otherwise the donor with the nearest centroid.
/// With no donors at all, targets stay unresolved (counted, not fatal).
///
/// The residential flag is derived from the living-code set alone and is
/// independent of the environment type. Environment is set exactly once
/// here; later stages only read it.
#[must_use]
pub fn resolve_zones(sources: Vec<ZoneSource>, norms: &NormsConfig) -> (Vec<Zone>, StageReport) {
    let mut report = StageReport::new("zone_model_resolver");
    report.processed = sources.len();

    // Donors keep their input order; ordinal n is the n-th donor zone.
    let donors: Vec<(geo::MultiPolygon<f64>, EnvironmentType)> = sources
        .iter()
        .filter_map(|zone| {
            zone.environment
                .filter(|environment| norms.donor_environments.contains(environment))
                .map(|environment| (zone.geometry.clone(), environment))
        })
        .collect();
    let donor_geoms: Vec<_> = donors.iter().map(|(geometry, _)| geometry.clone()).collect();
    let donor_index = GeomIndex::build(&donor_geoms);
    let donor_centroids: Vec<_> = donor_geoms.iter().map(|geom| centroid_of(geom)).collect();

    let target_count = sources
        .iter()
        .filter(|zone| norms.target_codes.contains(&zone.code) && zone.environment.is_none())
        .count();
    log::info!(
        "Resolving {target_count} unclassified target zones against {} donors",
        donors.len()
    );

    let mut resolved_count = 0_usize;
    let zones = sources
        .into_iter()
        .enumerate()
        .map(|(index, source)| {
            let is_target =
                norms.target_codes.contains(&source.code) && source.environment.is_none();
            let environment = if is_target {
                let donor_ordinal = donor_index
                    .first_within(&source.geometry, norms.resolver_buffer_m, |_| true)
                    .or_else(|| nearest_donor_by_centroid(&source, &donor_centroids));
                match donor_ordinal {
                    Some(ordinal) => {
                        resolved_count += 1;
                        Some(donors[ordinal].1)
                    }
                    None => {
                        report.miss("unresolved_environment");
                        None
                    }
                }
            } else {
                if source.environment.is_none() {
                    report.miss("unclassified_non_target");
                }
                source.environment
            };

            Zone {
                id: ZoneId::from_index(index),
                area_zone: source.geometry.unsigned_area(),
                is_living: norms.living_codes.contains(&source.code),
                geometry: source.geometry,
                code: source.code,
                environment,
                aggregates: Default::default(),
                provision: Default::default(),
                density: Default::default(),
                green: Default::default(),
                projection: Default::default(),
                total_score: 0.0,
                category: None,
            }
        })
        .collect();

    log::info!("Resolved environment for {resolved_count} of {target_count} target zones");
    (zones, report)
}

/// Centroid-distance fallback; ties break on the first donor in input
/// order.
fn nearest_donor_by_centroid(
    source: &ZoneSource,
    donor_centroids: &[geo::Point<f64>],
) -> Option<usize> {
    let centroid = centroid_of(&source.geometry);
    donor_centroids
        .iter()
        .enumerate()
        .map(|(ordinal, donor)| {
            let d = (donor.x() - centroid.x()).hypot(donor.y() - centroid.y());
            (d, ordinal)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, ordinal)| ordinal)
}
