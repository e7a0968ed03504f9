//! Zone indicators: density deficit, green allocation, and the population
//! projection that feeds scoring.

use geo::Area as _;
use urban_potential_city_models::{
    GreenMetrics, GreenOrigin, GreenSource, GreenZoneId, NeedService, ServiceKind, Zone,
};
use urban_potential_config::NormsConfig;

use crate::StageReport;

/// Computes population density and its deficit against the environment
/// limit for residential zones. Non-residential zones keep zero metrics.
#[must_use]
pub fn derive_density(mut zones: Vec<Zone>, norms: &NormsConfig) -> (Vec<Zone>, StageReport) {
    let mut report = StageReport::new("density_indicator");

    for zone in zones.iter_mut().filter(|zone| zone.is_living) {
        report.processed += 1;
        if zone.area_zone > 0.0 {
            zone.density.density_population = zone.aggregates.sum_population / zone.area_zone;
        }
        let limit = zone
            .environment
            .and_then(|environment| norms.density_limits.get(&environment).copied());
        match limit {
            Some(limit) => {
                zone.density.limit_density = Some(limit);
                zone.density.deficit_density = Some(limit - zone.density.density_population);
            }
            None => report.miss("density_limit_unresolved"),
        }
    }

    (zones, report)
}

/// Distributes the total green area over residential zones proportionally
/// to population, then compares the per-capita result against the
/// environment norm. A zone's per-capita divisor is floored at one person
/// so empty zones read the full allocation instead of infinity.
#[must_use]
pub fn allocate_green(
    mut zones: Vec<Zone>,
    green: &[GreenSource],
    norms: &NormsConfig,
) -> (Vec<Zone>, StageReport) {
    let mut report = StageReport::new("green_allocator");

    let mut total_green = 0.0;
    let mut green_count = 0_usize;
    let mut park_count = 0_usize;
    for source in green {
        let id = match source.origin {
            GreenOrigin::Green => {
                green_count += 1;
                GreenZoneId::green(green_count - 1)
            }
            GreenOrigin::Park => {
                park_count += 1;
                GreenZoneId::park(park_count - 1)
            }
        };
        let area = source.geometry.unsigned_area();
        log::debug!("Green zone {id}: {area} m²");
        total_green += area;
    }
    if green.is_empty() {
        log::warn!("No green layers; green indicators stay zero");
    }

    let total_population: f64 = zones
        .iter()
        .filter(|zone| zone.is_living)
        .map(|zone| zone.aggregates.sum_population)
        .sum();

    for zone in zones.iter_mut().filter(|zone| zone.is_living) {
        report.processed += 1;
        let allocated = if total_population > 0.0 {
            total_green * zone.aggregates.sum_population / total_population
        } else {
            0.0
        };
        let per_capita = allocated / zone.aggregates.sum_population.max(1.0);
        let norm = zone
            .environment
            .and_then(|environment| norms.green_norms.get(&environment).copied());
        let difference = match norm {
            Some(norm) => per_capita - norm,
            None => {
                report.miss("green_norm_unresolved");
                0.0
            }
        };
        zone.green = GreenMetrics {
            green_allocated: allocated,
            green_per_capita: per_capita,
            difference_from_normative: difference,
        };
    }

    (zones, report)
}

/// Projects the feasible new population per residential zone from free
/// service places.
///
/// With free places in all three kinds, school and kindergarten places
/// convert to residents through the demographic multiplier and the
/// polyclinic caps the result. With exactly one kind at zero, the other
/// two still bound an "extra" projection and the zone records which
/// service it needs first. Two or more missing kinds leave no feasible
/// placement, as do projections below the respective floors.
#[must_use]
pub fn project_population(mut zones: Vec<Zone>, norms: &NormsConfig) -> (Vec<Zone>, StageReport) {
    let mut report = StageReport::new("population_projector");
    let multiplier = norms.demographic_multiplier;

    for zone in zones.iter_mut().filter(|zone| zone.is_living) {
        report.processed += 1;
        let school = zone.provision_for(ServiceKind::School).free_places;
        let kindergarten = zone.provision_for(ServiceKind::Kindergarten).free_places;
        let polyclinic = zone.provision_for(ServiceKind::Polyclinic).free_places;

        let zero_kinds = [school, kindergarten, polyclinic]
            .iter()
            .filter(|places| **places <= 0.0)
            .count();

        match zero_kinds {
            0 => {
                let projected = (school.min(kindergarten) * multiplier).min(polyclinic).round();
                if projected > norms.scoring.new_population_floor {
                    zone.projection.new_population = Some(projected);
                } else {
                    report.miss("projection_below_floor");
                }
            }
            1 => {
                let (extra, missing) = if school <= 0.0 {
                    ((kindergarten * multiplier).min(polyclinic), ServiceKind::School)
                } else if kindergarten <= 0.0 {
                    ((school * multiplier).min(polyclinic), ServiceKind::Kindergarten)
                } else {
                    (school.min(kindergarten) * multiplier, ServiceKind::Polyclinic)
                };
                let extra = extra.round();
                if extra > norms.scoring.extra_population_floor {
                    zone.projection.new_population_extra = Some(extra);
                    zone.projection.need_service = Some(NeedService::Kind(missing));
                } else {
                    zone.projection.need_service = Some(NeedService::NoFeasiblePlacement);
                    report.miss("no_feasible_placement");
                }
            }
            _ => {
                zone.projection.need_service = Some(NeedService::NoFeasiblePlacement);
                report.miss("no_feasible_placement");
            }
        }
    }

    (zones, report)
}
