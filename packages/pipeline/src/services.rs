//! Service matching: hosting building, capacity bricks, catchment radii.

use std::collections::BTreeMap;

use urban_potential_city_models::{
    Building, EnvironmentType, Provenance, Service, ServiceId, ServiceKind, ServiceSource,
};
use urban_potential_config::NormsConfig;
use urban_potential_spatial::GeomIndex;

use crate::StageReport;

/// Matches every service point to a hosting building (containment first,
/// nearest-building fallback with provenance), then resolves capacity via
/// the brick tables and the catchment radius via the kind × environment
/// table. Kinds are merged in canonical order (school, kindergarten,
/// polyclinic) with per-kind id numbering.
#[must_use]
pub fn match_services(
    sources: &BTreeMap<ServiceKind, Vec<ServiceSource>>,
    buildings: &[Building],
    norms: &NormsConfig,
) -> (Vec<Service>, StageReport) {
    let mut report = StageReport::new("service_matcher");

    let building_geoms: Vec<_> = buildings
        .iter()
        .map(|building| building.geometry.clone())
        .collect();
    let building_index = GeomIndex::build(&building_geoms);

    let mut services = Vec::new();
    for kind in ServiceKind::all() {
        let Some(kind_sources) = sources.get(kind) else {
            continue;
        };
        for (index, source) in kind_sources.iter().enumerate() {
            report.processed += 1;
            let id = ServiceId::from_index(*kind, index);

            let host = building_index
                .containing(&source.point)
                .map(|ordinal| (ordinal, Provenance::Within))
                .or_else(|| {
                    building_index
                        .nearest_to_point(&source.point, |_| true)
                        .map(|(ordinal, _)| (ordinal, Provenance::Nearest))
                });
            let Some((host_ordinal, provenance)) = host else {
                log::warn!("Service {id} has no hosting building (no buildings at all)");
                report.miss("service_without_building");
                continue;
            };
            let host = &buildings[host_ordinal];

            // An unresolved host environment defaults to medium for the
            // radius lookup, matching the dominant urban form.
            let environment = host.environment.unwrap_or(EnvironmentType::Medium);
            let is_integrated = host.is_living;

            let capacity = source.capacity_hint.or_else(|| {
                norms
                    .capacity_for(*kind, is_integrated, host.build_floor_area)
                    .map(f64::from)
            });
            if capacity.is_none() {
                log::debug!(
                    "Service {id}: no capacity brick covers floor area {}",
                    host.build_floor_area
                );
                report.miss("capacity_brick");
            }

            let catchment_radius = norms.catchment_radius(*kind, environment);
            if catchment_radius.is_none() {
                report.miss("catchment_radius");
            }

            let identification = catchment_radius.map_or_else(
                || format!("{kind}_{environment}_none"),
                |radius| format!("{kind}_{environment}_{radius}"),
            );

            services.push(Service {
                id,
                kind: *kind,
                point: source.point,
                building_id: host.id.clone(),
                zone_id: host.zone_id.clone(),
                provenance,
                is_integrated,
                environment,
                floor_area: host.build_floor_area,
                non_living_area: host.non_living_area,
                capacity,
                catchment_radius,
                identification,
            });
        }
    }

    (services, report)
}
