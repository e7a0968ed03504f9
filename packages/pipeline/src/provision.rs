//! Provision aggregation: per-kind solving, clipping, and zone
//! attribution.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use urban_potential_city_models::{
    Building, ServedService, Service, ServiceKind, Zone, ZoneProvision,
};
use urban_potential_config::NormsConfig;
use urban_potential_provision::{clip_provision, DistanceMatrix, ProvisionSolver};
use urban_potential_spatial::{buffer_geom, buffer_point, centroid_of, intersection_area, union_all};

use crate::{PipelineError, StageReport};

/// Solves building demand against service capacity one kind at a time,
/// clips the resulting catchments to the buffered residential footprint,
/// and attributes each residential zone to the service whose catchment
/// overlaps it most (ties by overlap area, then service input order).
///
/// Every zone starts with zero-filled provision for every kind, so skipped
/// kinds still read as "no free places" rather than missing data. A kind
/// with no radius-resolved services is skipped entirely and stays absent
/// from the returned layer map.
///
/// # Errors
///
/// Returns an error only if the solver rejects the distance matrix shape,
/// which would be an internal defect.
pub fn aggregate_provision(
    mut zones: Vec<Zone>,
    buildings: &[Building],
    services: &[Service],
    norms: &NormsConfig,
    solver: &dyn ProvisionSolver,
) -> Result<(Vec<Zone>, BTreeMap<ServiceKind, Vec<ServedService>>, StageReport), PipelineError> {
    let mut report = StageReport::new("provision_aggregator");
    report.processed = services.len();

    for zone in &mut zones {
        for kind in ServiceKind::all() {
            zone.provision.insert(*kind, ZoneProvision::default());
        }
    }

    // Demand side is shared across kinds: living buildings carry it.
    let demand_buildings: Vec<&Building> = buildings
        .iter()
        .filter(|building| building.is_living)
        .collect();
    let demand: Vec<_> = demand_buildings
        .iter()
        .map(|building| (building.id.clone(), building.population))
        .collect();
    let demand_points: Vec<_> = demand_buildings
        .iter()
        .map(|building| centroid_of(&building.geometry))
        .collect();

    let mut layers = BTreeMap::new();
    for kind in ServiceKind::all() {
        let kind_services: Vec<&Service> = services
            .iter()
            .filter(|service| service.kind == *kind && service.catchment_radius.is_some())
            .collect();
        if kind_services.is_empty() {
            log::warn!("No usable {kind} services; provision for the kind skipped");
            report.miss("kind_without_services");
            continue;
        }

        // Catchments are inflated beyond the normative radius to absorb
        // network-distance underestimation by the euclidean matrix.
        let effective_radii: Vec<f64> = kind_services
            .iter()
            .map(|service| service.catchment_radius.unwrap_or_default() * norms.buffer_inflation)
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let mean_radius = effective_radii.iter().sum::<f64>() / effective_radii.len() as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let threshold = (mean_radius.trunc() as i64 / norms.cell_size as i64) as f64;

        let supply: Vec<_> = kind_services
            .iter()
            .map(|service| {
                let capacity = if service.non_living_area > 0.0 {
                    service.non_living_area
                } else if let Some(capacity) = service.capacity {
                    capacity
                } else {
                    report.miss("zero_capacity_service");
                    0.0
                };
                (service.id.clone(), capacity)
            })
            .collect();
        let supply_points: Vec<_> = kind_services.iter().map(|service| service.point).collect();

        let matrix = DistanceMatrix::from_points(&demand_points, &supply_points, norms.cell_size);
        let outcome = solver.solve(&demand, &supply, &matrix, threshold)?;

        let served: Vec<ServedService> = kind_services
            .iter()
            .zip(&effective_radii)
            .zip(&outcome.employed)
            .zip(&supply)
            .map(|(((service, radius), employed), (_, capacity))| ServedService {
                service_id: service.id.clone(),
                kind: *kind,
                employed_places: *employed,
                free_places: capacity - employed,
                catchment: MultiPolygon(vec![buffer_point(&service.point, *radius)]),
            })
            .collect();

        // Clip to the buffered residential footprint; catchments entirely
        // outside it serve nobody the model can see.
        let buffered: Vec<MultiPolygon<f64>> = demand_buildings
            .iter()
            .map(|building| buffer_geom(&building.geometry, mean_radius))
            .collect();
        let boundary = union_all(&buffered);
        let (served, _links) = clip_provision(served, outcome.links, &boundary);

        for zone in zones.iter_mut().filter(|zone| zone.is_living) {
            let mut best: Option<(f64, usize)> = None;
            for (ordinal, service) in served.iter().enumerate() {
                let overlap = intersection_area(&service.catchment, &zone.geometry);
                if overlap > 0.0 && best.map_or(true, |(area, _)| overlap > area) {
                    best = Some((overlap, ordinal));
                }
            }
            match best {
                Some((_, ordinal)) => {
                    let service = &served[ordinal];
                    zone.provision.insert(
                        *kind,
                        ZoneProvision {
                            free_places: service.free_places,
                            employed_places: service.employed_places,
                            service_id: Some(service.service_id.clone()),
                        },
                    );
                }
                None => report.miss("zone_without_catchment"),
            }
        }

        layers.insert(*kind, served);
    }

    Ok((zones, layers, report))
}
