#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! GeoJSON layer I/O for the pipeline.
//!
//! Reads the named input layers into typed source records (validating the
//! attribute schema and repairing geometry once, at the boundary), and
//! writes the attributed outputs back out. All geometry is reprojected to
//! the spherical-Mercator working frame on the way in and back to WGS84 on
//! the way out; the pipeline itself only ever sees metric coordinates.

pub mod mercator;
pub mod read;
pub mod schema;
pub mod write;

pub use read::{InputLayers, load_input_dir};
pub use schema::LayerSchema;
pub use write::{write_buildings, write_provision_layers, write_zones};

use thiserror::Error;

/// Errors raised while loading or validating input layers. All of these
/// are fatal: validation happens before any pipeline stage runs.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Reading or writing a layer file failed.
    #[error("Layer I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GeoJSON parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON serialization failed while writing output.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An expected layer file is absent.
    #[error("Missing layer '{layer}' (expected {path})")]
    MissingLayer {
        /// Layer name.
        layer: String,
        /// Path that was looked up.
        path: String,
    },

    /// A layer file did not contain a feature collection.
    #[error("Layer '{layer}' is not a GeoJSON FeatureCollection")]
    NotACollection {
        /// Layer name.
        layer: String,
    },

    /// A required attribute is missing or null on at least one feature.
    #[error("Layer '{layer}' is missing required attribute '{attribute}' on {count} features")]
    MissingRequired {
        layer: String,
        attribute: String,
        count: usize,
    },

    /// A layer contained no usable geometry at all.
    #[error("Layer '{layer}' contains no usable polygonal geometry")]
    EmptyLayer {
        /// Layer name.
        layer: String,
    },

    /// The layer declares a coordinate reference system we cannot handle.
    #[error("Layer '{layer}' declares unsupported CRS '{crs}'")]
    UnsupportedCrs {
        layer: String,
        crs: String,
    },

    /// The embedded schema file failed to parse. Indicates a build defect,
    /// not bad input.
    #[error("Layer schema is invalid: {0}")]
    Schema(#[from] toml::de::Error),
}
