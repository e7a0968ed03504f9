//! Building enrichment: derived areas and population apportionment.

use geo::Area as _;
use urban_potential_city_models::{Building, BuildingId, BuildingSource};
use urban_potential_config::NormsConfig;
use urban_potential_provision::PopulationBalancer;

use crate::{StageReport, CONSERVATION_TOLERANCE};

/// Enriches raw buildings: assigns ids in input order, defaults missing
/// floor counts to 1, derives footprint/floor/living/non-living areas, and
/// delegates population apportionment to the balancer for living buildings
/// only. Non-living buildings carry population 0 until redistribution.
#[must_use]
pub fn enrich_buildings(
    sources: Vec<BuildingSource>,
    balancer: &dyn PopulationBalancer,
    living_population: f64,
    norms: &NormsConfig,
) -> (Vec<Building>, StageReport) {
    let mut report = StageReport::new("building_enricher");
    report.processed = sources.len();

    let mut buildings: Vec<Building> = sources
        .into_iter()
        .enumerate()
        .map(|(index, source)| {
            let floors = match source.floors {
                Some(floors) if floors >= 1.0 => floors,
                Some(floors) => {
                    log::warn!(
                        "Building {}: floor count {floors} below 1, clamped",
                        index + 1
                    );
                    1.0
                }
                None => 1.0,
            };
            let footprint_area = source.geometry.unsigned_area();
            let build_floor_area = footprint_area * floors;
            let living_area = if source.is_living {
                norms.living_share * build_floor_area
            } else {
                0.0
            };

            Building {
                id: BuildingId::from_index(index),
                geometry: source.geometry,
                floors,
                is_living: source.is_living,
                footprint_area,
                build_floor_area,
                living_area,
                non_living_area: build_floor_area - living_area,
                population: 0.0,
                zone_id: None,
                environment: None,
            }
        })
        .collect();

    let living_indexes: Vec<usize> = buildings
        .iter()
        .enumerate()
        .filter(|(_, building)| building.is_living)
        .map(|(index, _)| index)
        .collect();
    let weights: Vec<f64> = living_indexes
        .iter()
        .map(|&index| buildings[index].living_area)
        .collect();

    match balancer.apportion(living_population, &weights) {
        Ok(allocations) => {
            for (&index, population) in living_indexes.iter().zip(allocations) {
                buildings[index].population = population;
            }
            let placed: f64 = buildings.iter().map(|building| building.population).sum();
            let delta = (placed - living_population.round()).abs();
            report.conservation_delta = Some(delta);
            if delta > CONSERVATION_TOLERANCE {
                log::error!(
                    "Balancer drifted from target: placed {placed}, requested {living_population}"
                );
            }
        }
        Err(error) => {
            // Not fatal: the run continues with zero population, which
            // keeps later conservation checks meaningful.
            log::error!("Population balancer failed: {error}");
            report.miss("population_not_apportioned");
        }
    }

    (buildings, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};
    use urban_potential_provision::FloorAreaBalancer;

    fn footprint(size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
            (x: 0.0, y: 0.0),
        ]])
    }

    fn source(size: f64, floors: Option<f64>, is_living: bool) -> BuildingSource {
        BuildingSource {
            geometry: footprint(size),
            floors,
            is_living,
        }
    }

    #[test]
    fn derives_areas_with_floor_multiplier() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let (buildings, _) = enrich_buildings(
            vec![source(10.0, Some(5.0), true)],
            &FloorAreaBalancer,
            0.0,
            &norms,
        );
        let building = &buildings[0];
        assert!((building.footprint_area - 100.0).abs() < 1e-9);
        assert!((building.build_floor_area - 500.0).abs() < 1e-9);
        assert!((building.living_area - 400.0).abs() < 1e-9);
        assert!((building.non_living_area - 100.0).abs() < 1e-9);
        assert!(building.living_area <= building.build_floor_area);
    }

    #[test]
    fn missing_floors_default_to_one() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let (buildings, _) =
            enrich_buildings(vec![source(10.0, None, false)], &FloorAreaBalancer, 0.0, &norms);
        assert!((buildings[0].floors - 1.0).abs() < f64::EPSILON);
        assert!((buildings[0].build_floor_area - 100.0).abs() < 1e-9);
        assert!(buildings[0].living_area.abs() < f64::EPSILON);
    }

    #[test]
    fn population_goes_to_living_buildings_and_is_conserved() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let (buildings, report) = enrich_buildings(
            vec![
                source(10.0, Some(2.0), true),
                source(20.0, Some(1.0), false),
                source(10.0, Some(8.0), true),
            ],
            &FloorAreaBalancer,
            500.0,
            &norms,
        );
        assert!(buildings[1].population.abs() < f64::EPSILON);
        let total: f64 = buildings.iter().map(|b| b.population).sum();
        assert!((total - 500.0).abs() < 1e-9);
        assert!(report.conservation_delta.unwrap() < 1e-9);
        // The taller building has four times the living area.
        assert!(buildings[2].population > buildings[0].population);
    }

    #[test]
    fn ids_are_unique_and_monotone() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let sources = (0..4).map(|_| source(10.0, None, true)).collect();
        let (buildings, _) = enrich_buildings(sources, &FloorAreaBalancer, 10.0, &norms);
        let ids: Vec<_> = buildings.iter().map(|b| b.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["2.1", "2.2", "2.3", "2.4"]);
    }

    #[test]
    fn no_living_buildings_with_positive_target_is_reported() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let (buildings, report) = enrich_buildings(
            vec![source(10.0, None, false)],
            &FloorAreaBalancer,
            100.0,
            &norms,
        );
        assert!(buildings[0].population.abs() < f64::EPSILON);
        assert_eq!(report.misses["population_not_apportioned"], 1);
    }
}
