//! Restricts solver results to a boundary of interest.

use std::collections::BTreeSet;

use geo::{Intersects, MultiPolygon};
use urban_potential_city_models::{ServedService, ServiceLink};

/// Drops services whose catchment does not intersect the boundary, along
/// with every link pointing at a dropped service. Matches far outside the
/// area of interest are low-confidence and discarded wholesale.
#[must_use]
pub fn clip_provision(
    services: Vec<ServedService>,
    links: Vec<ServiceLink>,
    boundary: &MultiPolygon<f64>,
) -> (Vec<ServedService>, Vec<ServiceLink>) {
    let before = services.len();
    let kept: Vec<ServedService> = services
        .into_iter()
        .filter(|service| service.catchment.intersects(boundary))
        .collect();
    if kept.len() < before {
        log::debug!("Clip dropped {} of {before} services", before - kept.len());
    }

    let kept_ids: BTreeSet<_> = kept.iter().map(|service| service.service_id.clone()).collect();
    let links = links
        .into_iter()
        .filter(|link| kept_ids.contains(&link.service_id))
        .collect();

    (kept, links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Point};
    use urban_potential_city_models::{BuildingId, ServiceId, ServiceKind};
    use urban_potential_spatial::buffer_point;

    fn served(kind: ServiceKind, index: usize, x: f64) -> ServedService {
        ServedService {
            service_id: ServiceId::from_index(kind, index),
            kind,
            employed_places: 10.0,
            free_places: 5.0,
            catchment: MultiPolygon(vec![buffer_point(&Point::new(x, 0.0), 50.0)]),
        }
    }

    #[test]
    fn drops_services_and_links_outside_the_boundary() {
        let boundary = MultiPolygon(vec![polygon![
            (x: -100.0, y: -100.0),
            (x: 100.0, y: -100.0),
            (x: 100.0, y: 100.0),
            (x: -100.0, y: 100.0),
            (x: -100.0, y: -100.0),
        ]]);
        let inside = served(ServiceKind::School, 0, 0.0);
        let outside = served(ServiceKind::School, 1, 1000.0);
        let links = vec![
            ServiceLink {
                building_id: BuildingId::from_index(0),
                service_id: inside.service_id.clone(),
                quantity: 3.0,
            },
            ServiceLink {
                building_id: BuildingId::from_index(0),
                service_id: outside.service_id.clone(),
                quantity: 4.0,
            },
        ];

        let (services, links) = clip_provision(vec![inside, outside], links, &boundary);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].service_id.as_str(), "3.1");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].service_id.as_str(), "3.1");
    }

    #[test]
    fn catchment_touching_the_boundary_is_kept() {
        let boundary = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]]);
        // Catchment centered 40m away with a 50m radius pokes into the box.
        let touching = served(ServiceKind::Polyclinic, 0, 45.0);
        let (services, _) = clip_provision(vec![touching], vec![], &boundary);
        assert_eq!(services.len(), 1);
    }
}
