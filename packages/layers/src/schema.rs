//! Embedded attribute schema and per-layer validation.

use std::collections::BTreeMap;

use geojson::Feature;
use serde::Deserialize;

use crate::LayerError;

/// Schema TOML embedded at compile time.
const SCHEMA_TOML: &str = include_str!("../schema/layers.toml");

/// Required and recommended attribute names for one layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerSchema {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub recommended: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    layer: BTreeMap<String, LayerSchema>,
}

/// Loads the embedded schema table.
///
/// # Errors
///
/// Returns an error if the embedded TOML fails to parse, which indicates a
/// build defect rather than bad input.
pub fn load_schema() -> Result<BTreeMap<String, LayerSchema>, LayerError> {
    let file: SchemaFile = toml::from_str(SCHEMA_TOML)?;
    Ok(file.layer)
}

/// Validates a layer's features against its schema: every required
/// attribute must be present and non-null on every feature (fatal), and a
/// recommended attribute absent from all features logs a warning.
///
/// # Errors
///
/// Returns [`LayerError::MissingRequired`] when a required attribute is
/// absent or null on any feature.
pub fn validate_layer(
    layer: &str,
    schema: &LayerSchema,
    features: &[Feature],
) -> Result<(), LayerError> {
    for attribute in &schema.required {
        let missing = features
            .iter()
            .filter(|feature| !has_attribute(feature, attribute))
            .count();
        if missing > 0 {
            return Err(LayerError::MissingRequired {
                layer: layer.to_string(),
                attribute: attribute.clone(),
                count: missing,
            });
        }
    }

    for attribute in &schema.recommended {
        if !features.iter().any(|feature| has_attribute(feature, attribute)) {
            log::warn!(
                "Layer '{layer}' has no '{attribute}' attribute on any feature; defaults apply"
            );
        }
    }

    Ok(())
}

fn has_attribute(feature: &Feature, attribute: &str) -> bool {
    feature
        .properties
        .as_ref()
        .and_then(|props| props.get(attribute))
        .is_some_and(|value| !value.is_null())
}
