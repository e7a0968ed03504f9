//! Input layer loading: GeoJSON → typed source records in the metric frame.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr as _;

use geo::{MapCoords as _, MultiPolygon, Point};
use geojson::{Feature, GeoJson};
use serde_json::Map;
use urban_potential_city_models::{
    BuildingSource, EnvironmentType, GreenOrigin, GreenSource, ServiceKind, ServiceSource,
    ZoneSource,
};
use urban_potential_spatial::{centroid_of, to_multi_polygon, union_all};

use crate::schema::{load_schema, validate_layer, LayerSchema};
use crate::{mercator, LayerError};

type JsonObject = Map<String, serde_json::Value>;

/// All input layers, loaded, validated, repaired, and projected into the
/// working metric frame.
#[derive(Debug)]
pub struct InputLayers {
    pub boundary: MultiPolygon<f64>,
    pub zones: Vec<ZoneSource>,
    pub buildings: Vec<BuildingSource>,
    /// Raw service points per kind, in layer input order.
    pub services: BTreeMap<ServiceKind, Vec<ServiceSource>>,
    pub green: Vec<GreenSource>,
}

/// Coordinate frame a layer's features arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerCrs {
    /// WGS84 lon/lat; projected forward on load.
    Geographic,
    /// Already spherical-Mercator meters.
    Metric,
}

/// Loads every input layer from `<dir>/<layer>.geojson`.
///
/// # Errors
///
/// Returns an error if any layer file is absent or unparseable, a required
/// attribute is missing, a CRS is unsupported, or the boundary carries no
/// polygonal geometry. All of these abort before the first pipeline stage.
pub fn load_input_dir(dir: &Path) -> Result<InputLayers, LayerError> {
    let schema = load_schema()?;

    let boundary_features = read_layer(dir, "boundary", &schema)?;
    let boundary_polygons: Vec<MultiPolygon<f64>> = boundary_features
        .iter()
        .filter_map(|(geometry, _)| to_multi_polygon(geometry.clone()))
        .collect();
    if boundary_polygons.is_empty() {
        return Err(LayerError::EmptyLayer {
            layer: "boundary".to_string(),
        });
    }
    let boundary = union_all(&boundary_polygons);

    let zones = read_layer(dir, "zones", &schema)?
        .into_iter()
        .enumerate()
        .filter_map(|(index, (geometry, props))| {
            let Some(geometry) = to_multi_polygon(geometry) else {
                log::warn!("Skipping zones feature {index}: no polygonal geometry");
                return None;
            };
            let code = prop_string(&props, "code_pzz")
                .map(|code| code.trim().to_uppercase())
                .unwrap_or_default();
            Some(ZoneSource {
                geometry,
                code,
                environment: parse_environment(&props, index),
            })
        })
        .collect();

    let buildings = read_layer(dir, "buildings", &schema)?
        .into_iter()
        .enumerate()
        .filter_map(|(index, (geometry, props))| {
            let Some(geometry) = to_multi_polygon(geometry) else {
                log::warn!("Skipping buildings feature {index}: no polygonal geometry");
                return None;
            };
            Some(BuildingSource {
                geometry,
                floors: prop_f64(&props, "number_of_floors"),
                is_living: prop_bool(&props, "is_living").unwrap_or(false),
            })
        })
        .collect();

    let mut services = BTreeMap::new();
    for kind in ServiceKind::all() {
        let layer = kind.to_string();
        let points = read_layer(dir, &layer, &schema)?
            .into_iter()
            .enumerate()
            .filter_map(|(index, (geometry, props))| {
                let point = service_point(geometry).or_else(|| {
                    log::warn!("Skipping {layer} feature {index}: unusable geometry");
                    None
                })?;
                Some(ServiceSource {
                    kind: *kind,
                    point,
                    capacity_hint: prop_f64(&props, "capacity"),
                })
            })
            .collect::<Vec<_>>();
        log::info!("Loaded {} {layer} service points", points.len());
        services.insert(*kind, points);
    }

    let mut green = Vec::new();
    for (layer, origin) in [("green", GreenOrigin::Green), ("park", GreenOrigin::Park)] {
        for (index, (geometry, _)) in read_layer(dir, layer, &schema)?.into_iter().enumerate() {
            if let Some(geometry) = to_multi_polygon(geometry) {
                green.push(GreenSource { geometry, origin });
            } else {
                log::warn!("Skipping {layer} feature {index}: no polygonal geometry");
            }
        }
    }

    Ok(InputLayers {
        boundary,
        zones,
        buildings,
        services,
        green,
    })
}

/// Reads one layer file into (metric geometry, properties) pairs, applying
/// schema validation and CRS projection.
fn read_layer(
    dir: &Path,
    layer: &str,
    schema: &BTreeMap<String, LayerSchema>,
) -> Result<Vec<(geo::Geometry<f64>, JsonObject)>, LayerError> {
    let path = dir.join(format!("{layer}.geojson"));
    if !path.is_file() {
        return Err(LayerError::MissingLayer {
            layer: layer.to_string(),
            path: path.display().to_string(),
        });
    }

    let text = std::fs::read_to_string(&path)?;
    let geojson: GeoJson = text.parse()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(LayerError::NotACollection {
            layer: layer.to_string(),
        });
    };

    let crs = detect_crs(layer, collection.foreign_members.as_ref())?;
    if let Some(layer_schema) = schema.get(layer) {
        validate_layer(layer, layer_schema, &collection.features)?;
    }

    let mut records = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.into_iter().enumerate() {
        let Feature {
            geometry: Some(geometry),
            properties,
            ..
        } = feature
        else {
            log::warn!("Layer '{layer}' feature {index} has no geometry; skipped");
            continue;
        };
        let Ok(geo_geometry) = geo::Geometry::<f64>::try_from(geometry) else {
            log::warn!("Layer '{layer}' feature {index} has unsupported geometry; skipped");
            continue;
        };
        let geo_geometry = match crs {
            LayerCrs::Geographic => geo_geometry.map_coords(mercator::forward),
            LayerCrs::Metric => geo_geometry,
        };
        records.push((geo_geometry, properties.unwrap_or_default()));
    }

    log::debug!("Layer '{layer}': {} features read", records.len());
    Ok(records)
}

/// Inspects the legacy `crs` foreign member. Absent means WGS84.
fn detect_crs(layer: &str, foreign: Option<&JsonObject>) -> Result<LayerCrs, LayerError> {
    let Some(name) = foreign
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(serde_json::Value::as_str)
    else {
        return Ok(LayerCrs::Geographic);
    };

    if name.contains("3857") {
        Ok(LayerCrs::Metric)
    } else if name.contains("4326") || name.contains("CRS84") {
        Ok(LayerCrs::Geographic)
    } else {
        Err(LayerError::UnsupportedCrs {
            layer: layer.to_string(),
            crs: name.to_string(),
        })
    }
}

fn service_point(geometry: geo::Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        geo::Geometry::Point(point) => Some(point),
        other => to_multi_polygon(other).map(|multi| centroid_of(&multi)),
    }
}

fn parse_environment(props: &JsonObject, index: usize) -> Option<EnvironmentType> {
    let raw = prop_string(props, "city_model")?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return None;
    }
    match EnvironmentType::from_str(trimmed) {
        Ok(environment) => Some(environment),
        Err(_) => {
            log::warn!("Zone feature {index}: unknown city_model '{trimmed}', treating as unset");
            None
        }
    }
}

fn prop_string(props: &JsonObject, key: &str) -> Option<String> {
    match props.get(key)? {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn prop_f64(props: &JsonObject, key: &str) -> Option<f64> {
    match props.get(key)? {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn prop_bool(props: &JsonObject, key: &str) -> Option<bool> {
    match props.get(key)? {
        serde_json::Value::Bool(flag) => Some(*flag),
        serde_json::Value::Number(number) => number.as_f64().map(|value| value != 0.0),
        serde_json::Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
