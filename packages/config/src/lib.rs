#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Planning norms and pipeline constants.
//!
//! Defaults are baked into the binary at compile time from
//! `norms/default.toml` via [`include_str!`]; an override file merges on
//! top of them table by table. Loading validates and normalizes the raw
//! tables once (string keys parsed into typed enums, capacity bricks sorted
//! ascending by area threshold) so that no stage re-parses configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr as _;

use serde::Deserialize;
use thiserror::Error;
use urban_potential_city_models::{EnvironmentType, ServiceKind};

/// Default norms embedded at compile time.
const DEFAULT_NORMS: &str = include_str!("../norms/default.toml");

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading an override file failed.
    #[error("Failed to read norms file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing failed.
    #[error("Failed to parse norms TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A table key could not be parsed into its typed form.
    #[error("Invalid norms value: {message}")]
    Invalid {
        /// Description of the offending key or value.
        message: String,
    },
}

// ── Raw (serde) shape ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawNorms {
    living_codes: Vec<String>,
    target_codes: Vec<String>,
    donor_environments: Vec<String>,
    resolver_buffer_m: f64,
    living_share: f64,
    buffer_inflation: f64,
    cell_size: f64,
    demographic_multiplier: f64,
    eligibility: RawEligibility,
    scoring: RawScoring,
    density_limits: BTreeMap<String, f64>,
    green_norms: BTreeMap<String, f64>,
    #[serde(default)]
    catchment: Vec<RawCatchment>,
    #[serde(default)]
    brick: Vec<RawBrick>,
}

#[derive(Debug, Deserialize)]
struct RawEligibility {
    min_new_population: f64,
    min_deficit_density: f64,
    min_green_difference: f64,
}

#[derive(Debug, Deserialize)]
struct RawScoring {
    category_cut: f64,
    cluster_count: usize,
    cluster_seed: u64,
    new_population_floor: f64,
    extra_population_floor: f64,
}

#[derive(Debug, Deserialize)]
struct RawCatchment {
    kind: String,
    environment: String,
    radius: f64,
}

#[derive(Debug, Deserialize)]
struct RawBrick {
    kind: String,
    capacity: u32,
    area: f64,
    is_integrated: bool,
}

// ── Validated shape ──────────────────────────────────────────────────────

/// One capacity brick: a step in the floor-area → capacity function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brick {
    pub capacity: u32,
    /// Maximum hosting-building floor area this brick covers.
    pub area: f64,
    pub is_integrated: bool,
}

/// Positive-branch eligibility thresholds.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityThresholds {
    pub min_new_population: f64,
    pub min_deficit_density: f64,
    pub min_green_difference: f64,
}

/// Scoring and clustering constants.
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    pub category_cut: f64,
    pub cluster_count: usize,
    pub cluster_seed: u64,
    pub new_population_floor: f64,
    pub extra_population_floor: f64,
}

/// Fully validated planning norms, passed into every pipeline stage.
#[derive(Debug, Clone)]
pub struct NormsConfig {
    /// Zoning codes marking residential zones.
    pub living_codes: BTreeSet<String>,
    /// Codes whose zones need environment resolution when unclassified.
    pub target_codes: BTreeSet<String>,
    /// Environment types eligible as resolution donors.
    pub donor_environments: BTreeSet<EnvironmentType>,
    pub resolver_buffer_m: f64,
    pub living_share: f64,
    pub buffer_inflation: f64,
    pub cell_size: f64,
    pub demographic_multiplier: f64,
    pub eligibility: EligibilityThresholds,
    pub scoring: ScoringConfig,
    pub density_limits: BTreeMap<EnvironmentType, f64>,
    pub green_norms: BTreeMap<EnvironmentType, f64>,
    /// Catchment radii keyed by (kind, environment).
    pub catchment_radii: BTreeMap<(ServiceKind, EnvironmentType), f64>,
    /// Capacity bricks per kind, sorted ascending by area threshold.
    pub bricks: BTreeMap<ServiceKind, Vec<Brick>>,
    /// The TOML text this config was built from, for `norms` echo output.
    toml_text: String,
}

impl NormsConfig {
    /// Loads the embedded defaults, optionally overridden by a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the override file cannot be read or either TOML
    /// document fails to parse or validate.
    pub fn load(override_path: Option<&Path>) -> Result<Self, ConfigError> {
        match override_path {
            None => Self::from_toml(DEFAULT_NORMS),
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                log::info!("Loaded norms override from {}", path.display());
                let merged = merge_toml(DEFAULT_NORMS, &text)?;
                Self::from_toml(&merged)
            }
        }
    }

    /// Parses and validates a complete norms TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document fails to parse or any table key is
    /// not a known service kind or environment type.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawNorms = toml::from_str(text)?;

        let donor_environments = raw
            .donor_environments
            .iter()
            .map(|value| parse_environment(value))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let density_limits = parse_environment_table(&raw.density_limits)?;
        let green_norms = parse_environment_table(&raw.green_norms)?;

        let mut catchment_radii = BTreeMap::new();
        for entry in &raw.catchment {
            let kind = parse_kind(&entry.kind)?;
            let environment = parse_environment(&entry.environment)?;
            catchment_radii.insert((kind, environment), entry.radius);
        }

        let mut bricks: BTreeMap<ServiceKind, Vec<Brick>> = BTreeMap::new();
        for entry in &raw.brick {
            let kind = parse_kind(&entry.kind)?;
            bricks.entry(kind).or_default().push(Brick {
                capacity: entry.capacity,
                area: entry.area,
                is_integrated: entry.is_integrated,
            });
        }
        for kind_bricks in bricks.values_mut() {
            kind_bricks.sort_by(|a, b| a.area.total_cmp(&b.area));
        }

        Ok(Self {
            living_codes: raw.living_codes.into_iter().collect(),
            target_codes: raw.target_codes.into_iter().collect(),
            donor_environments,
            resolver_buffer_m: raw.resolver_buffer_m,
            living_share: raw.living_share,
            buffer_inflation: raw.buffer_inflation,
            cell_size: raw.cell_size,
            demographic_multiplier: raw.demographic_multiplier,
            eligibility: EligibilityThresholds {
                min_new_population: raw.eligibility.min_new_population,
                min_deficit_density: raw.eligibility.min_deficit_density,
                min_green_difference: raw.eligibility.min_green_difference,
            },
            scoring: ScoringConfig {
                category_cut: raw.scoring.category_cut,
                cluster_count: raw.scoring.cluster_count,
                cluster_seed: raw.scoring.cluster_seed,
                new_population_floor: raw.scoring.new_population_floor,
                extra_population_floor: raw.scoring.extra_population_floor,
            },
            density_limits,
            green_norms,
            catchment_radii,
            bricks,
            toml_text: text.to_string(),
        })
    }

    /// Capacity for a hosting building's floor area: the first brick
    /// (ascending by area) for `(kind, is_integrated)` whose threshold
    /// covers the area, `None` when no brick does.
    #[must_use]
    pub fn capacity_for(
        &self,
        kind: ServiceKind,
        is_integrated: bool,
        floor_area: f64,
    ) -> Option<u32> {
        self.bricks.get(&kind)?.iter().find_map(|brick| {
            (brick.is_integrated == is_integrated && floor_area <= brick.area)
                .then_some(brick.capacity)
        })
    }

    /// Catchment radius for `(kind, environment)`, `None` when absent.
    #[must_use]
    pub fn catchment_radius(
        &self,
        kind: ServiceKind,
        environment: EnvironmentType,
    ) -> Option<f64> {
        self.catchment_radii.get(&(kind, environment)).copied()
    }

    /// The TOML text backing this config.
    #[must_use]
    pub fn toml_text(&self) -> &str {
        &self.toml_text
    }
}

/// Merges an override TOML document on top of the defaults, table by table.
/// Scalar and array values in the override replace the defaults; nested
/// tables merge recursively. Array-of-table sections (`catchment`, `brick`)
/// replace wholesale so an override can shrink a table.
fn merge_toml(base: &str, over: &str) -> Result<String, ConfigError> {
    let mut base_value: toml::Value = toml::from_str(base)?;
    let over_value: toml::Value = toml::from_str(over)?;
    merge_value(&mut base_value, over_value);
    toml::to_string(&base_value).map_err(|e| ConfigError::Invalid {
        message: format!("failed to re-serialize merged norms: {e}"),
    })
}

fn merge_value(base: &mut toml::Value, over: toml::Value) {
    match (base, over) {
        (toml::Value::Table(base_table), toml::Value::Table(over_table)) => {
            for (key, over_entry) in over_table {
                match base_table.get_mut(&key) {
                    Some(base_entry) if base_entry.is_table() && over_entry.is_table() => {
                        merge_value(base_entry, over_entry);
                    }
                    _ => {
                        base_table.insert(key, over_entry);
                    }
                }
            }
        }
        (base_slot, over_value) => *base_slot = over_value,
    }
}

fn parse_kind(value: &str) -> Result<ServiceKind, ConfigError> {
    ServiceKind::from_str(value).map_err(|_| ConfigError::Invalid {
        message: format!("unknown service kind '{value}'"),
    })
}

fn parse_environment(value: &str) -> Result<EnvironmentType, ConfigError> {
    EnvironmentType::from_str(value).map_err(|_| ConfigError::Invalid {
        message: format!("unknown environment type '{value}'"),
    })
}

fn parse_environment_table(
    raw: &BTreeMap<String, f64>,
) -> Result<BTreeMap<EnvironmentType, f64>, ConfigError> {
    raw.iter()
        .map(|(key, value)| Ok((parse_environment(key)?, *value)))
        .collect()
}
