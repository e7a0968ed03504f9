//! Attributed output writing: metric records → WGS84 GeoJSON files.

use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::{json, Map, Value};
use urban_potential_city_models::{Building, ServedService, ServiceKind, Zone};
use urban_potential_spatial::centroid_of;

use crate::{mercator, LayerError};

/// Writes the fully attributed zone collection to `path`.
///
/// # Errors
///
/// Returns an error if serialization or the file write fails.
pub fn write_zones(path: &Path, zones: &[Zone]) -> Result<(), LayerError> {
    let features = zones.iter().map(zone_feature).collect();
    write_collection(path, features)
}

/// Writes the enriched building collection to `path`.
///
/// # Errors
///
/// Returns an error if serialization or the file write fails.
pub fn write_buildings(path: &Path, buildings: &[Building]) -> Result<(), LayerError> {
    let features = buildings.iter().map(building_feature).collect();
    write_collection(path, features)
}

/// Writes the per-kind provision traceability layers: the clipped catchment
/// polygons and their centroids.
///
/// # Errors
///
/// Returns an error if serialization or a file write fails.
pub fn write_provision_layers(
    dir: &Path,
    kind: ServiceKind,
    services: &[ServedService],
) -> Result<(), LayerError> {
    let polygons = services
        .iter()
        .map(|service| {
            let geometry = mercator::unproject_multi(&service.catchment);
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
                id: None,
                properties: Some(provision_properties(service)),
                foreign_members: None,
            }
        })
        .collect();
    write_collection(&dir.join(format!("{kind}_provision_clipped.geojson")), polygons)?;

    let centroids = services
        .iter()
        .map(|service| {
            let centroid = mercator::unproject_point(&centroid_of(&service.catchment));
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&centroid))),
                id: None,
                properties: Some(provision_properties(service)),
                foreign_members: None,
            }
        })
        .collect();
    write_collection(&dir.join(format!("{kind}_provision_centroids.geojson")), centroids)
}

fn write_collection(path: &Path, features: Vec<Feature>) -> Result<(), LayerError> {
    let collection = GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    });
    std::fs::write(path, collection.to_string())?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn provision_properties(service: &ServedService) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("id_service".into(), json!(service.service_id.as_str()));
    props.insert("type".into(), json!(service.kind.to_string()));
    props.insert("free_places".into(), json!(service.free_places));
    props.insert("employed_places".into(), json!(service.employed_places));
    props
}

fn zone_feature(zone: &Zone) -> Feature {
    let geometry = mercator::unproject_multi(&zone.geometry);
    let mut props = Map::new();
    props.insert("id_zones".into(), json!(zone.id.as_str()));
    props.insert("code_pzz".into(), json!(zone.code));
    props.insert(
        "city_model".into(),
        zone.environment
            .map_or(Value::Null, |environment| json!(environment.to_string())),
    );
    props.insert("is_living_zones".into(), json!(zone.is_living));
    props.insert("area_zone".into(), json!(zone.area_zone));

    props.insert(
        "sum_footprint_area".into(),
        json!(zone.aggregates.sum_footprint_area),
    );
    props.insert(
        "sum_build_floor_area".into(),
        json!(zone.aggregates.sum_build_floor_area),
    );
    props.insert("sum_living_area".into(), json!(zone.aggregates.sum_living_area));
    props.insert(
        "sum_non_living_area".into(),
        json!(zone.aggregates.sum_non_living_area),
    );
    props.insert("sum_population".into(), json!(zone.aggregates.sum_population));
    props.insert(
        "avg_number_of_floors".into(),
        json!(zone.aggregates.avg_floors),
    );

    for kind in ServiceKind::all() {
        let provision = zone.provision_for(*kind);
        props.insert(format!("{kind}_free_places"), json!(provision.free_places));
        props.insert(
            format!("{kind}_employed_places"),
            json!(provision.employed_places),
        );
        props.insert(
            format!("{kind}_id_service"),
            provision
                .service_id
                .as_ref()
                .map_or(Value::Null, |id| json!(id.as_str())),
        );
    }

    props.insert(
        "limit_density".into(),
        zone.density.limit_density.map_or(Value::Null, |v| json!(v)),
    );
    props.insert(
        "density_population".into(),
        json!(zone.density.density_population),
    );
    props.insert(
        "deficit_density".into(),
        zone.density.deficit_density.map_or(Value::Null, |v| json!(v)),
    );

    props.insert("green_allocated".into(), json!(zone.green.green_allocated));
    props.insert("green_per_capita".into(), json!(zone.green.green_per_capita));
    props.insert(
        "difference_from_normative".into(),
        json!(zone.green.difference_from_normative),
    );

    props.insert(
        "new_population".into(),
        zone.projection.new_population.map_or(Value::Null, |v| json!(v)),
    );
    props.insert(
        "new_population_extra".into(),
        zone.projection
            .new_population_extra
            .map_or(Value::Null, |v| json!(v)),
    );
    props.insert(
        "need_service".into(),
        zone.projection
            .need_service
            .map_or(Value::Null, |need| json!(need.to_string())),
    );

    props.insert("total_score".into(), json!(zone.total_score));
    props.insert(
        "score_category".into(),
        zone.category
            .map_or(Value::Null, |category| json!(category.to_string())),
    );

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn building_feature(building: &Building) -> Feature {
    let geometry = mercator::unproject_multi(&building.geometry);
    let mut props = Map::new();
    props.insert("id_build".into(), json!(building.id.as_str()));
    props.insert("number_of_floors".into(), json!(building.floors));
    props.insert("is_living".into(), json!(building.is_living));
    props.insert("footprint_area".into(), json!(building.footprint_area));
    props.insert("build_floor_area".into(), json!(building.build_floor_area));
    props.insert("living_area".into(), json!(building.living_area));
    props.insert("non_living_area".into(), json!(building.non_living_area));
    props.insert("population".into(), json!(building.population));
    props.insert(
        "id_zones".into(),
        building
            .zone_id
            .as_ref()
            .map_or(Value::Null, |id| json!(id.as_str())),
    );
    props.insert(
        "city_model".into(),
        building
            .environment
            .map_or(Value::Null, |environment| json!(environment.to_string())),
    );

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}
