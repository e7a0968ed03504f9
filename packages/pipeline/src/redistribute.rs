//! Population redistribution from non-residential onto residential zones.

use urban_potential_city_models::Zone;
use urban_potential_spatial::GeomIndex;

use crate::{StageReport, CONSERVATION_TOLERANCE};

/// Transfers the full population of every non-residential zone onto the
/// geometrically nearest residential zone (ties by input order). The
/// source zone retains 0 in the merged view. Total population over all
/// zones is conserved; the drift is asserted and recorded in the report.
///
/// With no residential zones at all, nothing moves (population stays put
/// so the conservation law still holds).
#[must_use]
pub fn redistribute_population(mut zones: Vec<Zone>) -> (Vec<Zone>, StageReport) {
    let mut report = StageReport::new("population_redistributor");
    report.processed = zones.len();

    let total_before: f64 = zones.iter().map(|zone| zone.aggregates.sum_population).sum();

    let has_residential = zones.iter().any(|zone| zone.is_living);
    if has_residential {
        let geoms: Vec<_> = zones.iter().map(|zone| zone.geometry.clone()).collect();
        let index = GeomIndex::build(&geoms);
        let is_living: Vec<bool> = zones.iter().map(|zone| zone.is_living).collect();

        let mut transfers: Vec<(usize, f64)> = Vec::new();
        for zone in &zones {
            if zone.is_living || zone.aggregates.sum_population <= 0.0 {
                continue;
            }
            if let Some((target, _)) =
                index.nearest_to_geom(&zone.geometry, |candidate| is_living[candidate])
            {
                log::debug!(
                    "Moving {} people from {} to {}",
                    zone.aggregates.sum_population,
                    zone.id,
                    zones[target].id
                );
                transfers.push((target, zone.aggregates.sum_population));
            }
        }

        for (target, population) in transfers {
            zones[target].aggregates.sum_population += population;
        }
        for zone in zones.iter_mut().filter(|zone| !zone.is_living) {
            zone.aggregates.sum_population = 0.0;
        }
    } else {
        log::warn!("No residential zones; population redistribution skipped");
        report.miss("no_residential_zones");
    }

    let total_after: f64 = zones.iter().map(|zone| zone.aggregates.sum_population).sum();
    let delta = (total_after - total_before).abs();
    report.conservation_delta = Some(delta);
    if delta > CONSERVATION_TOLERANCE {
        log::error!("Redistribution drifted population total by {delta}");
    }

    (zones, report)
}
