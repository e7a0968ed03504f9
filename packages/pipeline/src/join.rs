//! Zone-building join: centroid containment plus per-zone aggregation.

use std::collections::BTreeMap;

use urban_potential_city_models::{Building, Zone, ZoneAggregates};
use urban_potential_spatial::{centroid_of, GeomIndex};

use crate::StageReport;

/// Assigns each building to the first zone (input order) containing its
/// centroid, copies the zone's environment onto the building, and
/// aggregates building metrics per zone. Buildings with no containing zone
/// keep `zone_id = None` (counted, not fatal); zones with no buildings get
/// zero-filled aggregates.
#[must_use]
pub fn join_buildings_to_zones(
    mut zones: Vec<Zone>,
    mut buildings: Vec<Building>,
) -> (Vec<Zone>, Vec<Building>, StageReport) {
    let mut report = StageReport::new("zone_building_joiner");
    report.processed = buildings.len();

    let zone_geoms: Vec<_> = zones.iter().map(|zone| zone.geometry.clone()).collect();
    let zone_index = GeomIndex::build(&zone_geoms);

    // Per-zone accumulators: sums plus the floor counts for the mean.
    let mut sums: BTreeMap<usize, (ZoneAggregates, Vec<f64>)> = BTreeMap::new();

    for building in &mut buildings {
        let centroid = centroid_of(&building.geometry);
        match zone_index.containing(&centroid) {
            Some(zone_ordinal) => {
                let zone = &zones[zone_ordinal];
                building.zone_id = Some(zone.id.clone());
                building.environment = zone.environment;

                let (aggregates, floors) = sums.entry(zone_ordinal).or_default();
                aggregates.sum_footprint_area += building.footprint_area;
                aggregates.sum_build_floor_area += building.build_floor_area;
                aggregates.sum_living_area += building.living_area;
                aggregates.sum_non_living_area += building.non_living_area;
                aggregates.sum_population += building.population;
                floors.push(building.floors);
            }
            None => {
                log::debug!("Building {} has no containing zone", building.id);
                report.miss("building_without_zone");
            }
        }
    }

    for (zone_ordinal, (mut aggregates, floors)) in sums {
        if !floors.is_empty() {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            {
                let mean = floors.iter().sum::<f64>() / floors.len() as f64;
                aggregates.avg_floors = mean.round() as i64;
            }
        }
        zones[zone_ordinal].aggregates = aggregates;
    }

    (zones, buildings, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};
    use urban_potential_city_models::{
        BuildingId, BuildingSource, EnvironmentType, ZoneSource,
    };
    use urban_potential_provision::FloorAreaBalancer;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn make_zones(norms: &urban_potential_config::NormsConfig) -> Vec<Zone> {
        let sources = vec![
            ZoneSource {
                geometry: square(0.0, 0.0, 100.0),
                code: "ЖР".to_string(),
                environment: Some(EnvironmentType::Medium),
            },
            ZoneSource {
                geometry: square(200.0, 0.0, 100.0),
                code: "П.5".to_string(),
                environment: Some(EnvironmentType::Central),
            },
        ];
        crate::resolve::resolve_zones(sources, norms).0
    }

    fn make_buildings(
        norms: &urban_potential_config::NormsConfig,
        specs: &[(f64, f64, f64, bool)],
    ) -> Vec<Building> {
        let sources = specs
            .iter()
            .map(|&(x, y, floors, is_living)| BuildingSource {
                geometry: square(x, y, 10.0),
                floors: Some(floors),
                is_living,
            })
            .collect();
        crate::enrich::enrich_buildings(sources, &FloorAreaBalancer, 100.0, norms).0
    }

    #[test]
    fn buildings_join_by_centroid_and_zones_aggregate() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let zones = make_zones(&norms);
        let buildings = make_buildings(
            &norms,
            &[
                (10.0, 10.0, 2.0, true),
                (50.0, 50.0, 4.0, true),
                (210.0, 10.0, 1.0, false),
            ],
        );

        let (zones, buildings, report) = join_buildings_to_zones(zones, buildings);
        assert_eq!(report.total_misses(), 0);

        assert_eq!(buildings[0].zone_id, Some(zones[0].id.clone()));
        assert_eq!(buildings[0].environment, Some(EnvironmentType::Medium));
        assert_eq!(buildings[2].zone_id, Some(zones[1].id.clone()));

        let aggregates = &zones[0].aggregates;
        assert!((aggregates.sum_footprint_area - 200.0).abs() < 1e-9);
        assert!((aggregates.sum_build_floor_area - 600.0).abs() < 1e-9);
        assert_eq!(aggregates.avg_floors, 3);
        assert!((aggregates.sum_population - 100.0).abs() < 1e-9);
    }

    #[test]
    fn unmatched_building_keeps_null_zone() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let zones = make_zones(&norms);
        let buildings = make_buildings(&norms, &[(5000.0, 5000.0, 1.0, false)]);

        let (zones, buildings, report) = join_buildings_to_zones(zones, buildings);
        assert_eq!(buildings[0].zone_id, None);
        assert_eq!(report.misses["building_without_zone"], 1);
        // Zones with no buildings stay zero-filled, not null.
        assert_eq!(zones[0].aggregates, ZoneAggregates::default());
        assert_eq!(zones[1].aggregates, ZoneAggregates::default());
    }

    #[test]
    fn building_ids_stay_unique_through_the_join() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let zones = make_zones(&norms);
        let buildings = make_buildings(
            &norms,
            &[(10.0, 10.0, 1.0, true), (30.0, 30.0, 1.0, true), (50.0, 50.0, 1.0, true)],
        );
        let (_, buildings, _) = join_buildings_to_zones(zones, buildings);
        let mut ids: Vec<&BuildingId> = buildings.iter().map(|b| &b.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), buildings.len());
    }
}
