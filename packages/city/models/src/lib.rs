#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical typed entity model for the urban potential pipeline.
//!
//! Every stage of the pipeline consumes and produces collections of these
//! records. Raw layer attributes are parsed into typed fields exactly once
//! at ingestion; downstream stages never inspect dynamic attribute maps.

use std::collections::BTreeMap;

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

// ── Environment and service taxonomies ───────────────────────────────────

/// Coarse urban-form classification driving density norms and catchment
/// radii. An unresolved classification is modeled as
/// `Option<EnvironmentType>` = `None`, never as a sentinel variant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnvironmentType {
    /// Detached and low-density housing.
    LowRise,
    /// Mid-rise residential fabric.
    Medium,
    /// Dense central-city fabric.
    Central,
}

impl EnvironmentType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::LowRise, Self::Medium, Self::Central]
    }
}

/// Social-service categories handled by the provision pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceKind {
    School,
    Kindergarten,
    Polyclinic,
}

impl ServiceKind {
    /// Returns all variants in the canonical processing order
    /// (school, kindergarten, polyclinic).
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::School, Self::Kindergarten, Self::Polyclinic]
    }

    /// Numeric id prefix for services of this kind (`3.` / `4.` / `5.`).
    #[must_use]
    pub const fn id_prefix(self) -> u8 {
        match self {
            Self::School => 3,
            Self::Kindergarten => 4,
            Self::Polyclinic => 5,
        }
    }
}

// ── Identifiers ──────────────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id! {
    /// Zone identifier, assigned monotonically per processing pass
    /// (`1.1`, `1.2`, ...).
    ZoneId
}

string_id! {
    /// Building identifier (`2.1`, `2.2`, ...).
    BuildingId
}

string_id! {
    /// Service identifier, prefixed by kind (`3.n` schools, `4.n`
    /// kindergartens, `5.n` polyclinics).
    ServiceId
}

string_id! {
    /// Green-space identifier (`9.n` green layer, `6.n` parks).
    GreenZoneId
}

impl ZoneId {
    /// Builds the id for the zone at `index` (zero-based) in input order.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(format!("1.{}", index + 1))
    }
}

impl BuildingId {
    /// Builds the id for the building at `index` (zero-based) in input order.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(format!("2.{}", index + 1))
    }
}

impl ServiceId {
    /// Builds the id for the `kind` service at `index` (zero-based, counted
    /// within that kind's input layer).
    #[must_use]
    pub fn from_index(kind: ServiceKind, index: usize) -> Self {
        Self(format!("{}.{}", kind.id_prefix(), index + 1))
    }
}

impl GreenZoneId {
    /// Id for the green-layer polygon at `index` (zero-based).
    #[must_use]
    pub fn green(index: usize) -> Self {
        Self(format!("9.{}", index + 1))
    }

    /// Id for the park-layer polygon at `index` (zero-based).
    #[must_use]
    pub fn park(index: usize) -> Self {
        Self(format!("6.{}", index + 1))
    }
}

// ── Source records (output of layer ingestion, input to the pipeline) ────

/// A zone as read from the `zones` layer, before resolution.
#[derive(Debug, Clone)]
pub struct ZoneSource {
    /// Repaired polygon geometry in the working metric frame.
    pub geometry: MultiPolygon<f64>,
    /// Zoning code, already trimmed and uppercased.
    pub code: String,
    /// Environment type when the layer carried one.
    pub environment: Option<EnvironmentType>,
}

/// A building as read from the `buildings` layer, before enrichment.
#[derive(Debug, Clone)]
pub struct BuildingSource {
    pub geometry: MultiPolygon<f64>,
    /// Floor count when present; absent values default to 1 downstream.
    pub floors: Option<f64>,
    pub is_living: bool,
}

/// A raw service point as read from one of the service layers.
#[derive(Debug, Clone)]
pub struct ServiceSource {
    pub kind: ServiceKind,
    /// Footprint inputs are reduced to their centroid at load.
    pub point: Point<f64>,
    /// Source-provided capacity, used instead of the brick lookup when set.
    pub capacity_hint: Option<f64>,
}

/// Which input layer a green polygon came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreenOrigin {
    Green,
    Park,
}

/// A green-space polygon from the `green` or `park` layer.
#[derive(Debug, Clone)]
pub struct GreenSource {
    pub geometry: MultiPolygon<f64>,
    pub origin: GreenOrigin,
}

// ── Buildings ────────────────────────────────────────────────────────────

/// An enriched building with derived areas and apportioned population.
#[derive(Debug, Clone)]
pub struct Building {
    pub id: BuildingId,
    pub geometry: MultiPolygon<f64>,
    /// Floor count, at least 1.
    pub floors: f64,
    pub is_living: bool,
    pub footprint_area: f64,
    /// `footprint_area * floors`.
    pub build_floor_area: f64,
    /// Living share of floor area when the living flag is set, else 0.
    pub living_area: f64,
    /// `build_floor_area - living_area`.
    pub non_living_area: f64,
    pub population: f64,
    /// Containing zone; `None` only before the join or on a join miss.
    pub zone_id: Option<ZoneId>,
    /// Copied from the containing zone during the join.
    pub environment: Option<EnvironmentType>,
}

// ── Zones ────────────────────────────────────────────────────────────────

/// Building metrics aggregated onto a zone (sums, plus mean floors).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZoneAggregates {
    pub sum_footprint_area: f64,
    pub sum_build_floor_area: f64,
    pub sum_living_area: f64,
    pub sum_non_living_area: f64,
    pub sum_population: f64,
    /// Mean floor count over matched buildings, rounded to nearest integer.
    pub avg_floors: i64,
}

/// Per-kind service provision attributes on a zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneProvision {
    pub free_places: f64,
    pub employed_places: f64,
    pub service_id: Option<ServiceId>,
}

/// Density indicators per zone (residential zones only).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DensityMetrics {
    /// Normative density limit for the zone's environment type, people/m².
    pub limit_density: Option<f64>,
    pub density_population: f64,
    /// `limit_density - density_population`; `None` without a limit.
    pub deficit_density: Option<f64>,
}

/// Green-space indicators per zone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GreenMetrics {
    /// Green area allocated to the zone, m².
    pub green_allocated: f64,
    /// Allocated green per resident, m²/person.
    pub green_per_capita: f64,
    /// `green_per_capita` minus the environment norm.
    pub difference_from_normative: f64,
}

/// The service a zone would need before more population can be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeedService {
    Kind(ServiceKind),
    /// No feasible service placement exists for this zone.
    NoFeasiblePlacement,
}

impl std::fmt::Display for NeedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kind(kind) => write!(f, "{kind}"),
            Self::NoFeasiblePlacement => f.write_str("no feasible service placement"),
        }
    }
}

/// Projected-population indicators derived from free service places.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationProjection {
    /// Feasible new population when all three service kinds have capacity.
    pub new_population: Option<f64>,
    /// Feasible new population when exactly one kind is missing.
    pub new_population_extra: Option<f64>,
    /// The missing kind, when `new_population_extra` applies.
    pub need_service: Option<NeedService>,
}

/// Development-potential category derived from the composite score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreCategory {
    Low,
    Medium,
    High,
}

impl ScoreCategory {
    /// Categorizes a composite score against the `cut` point
    /// (`score <= -cut` low, `score > cut` high, medium between).
    #[must_use]
    pub fn from_score(score: f64, cut: f64) -> Self {
        if score <= -cut {
            Self::Low
        } else if score <= cut {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// A fully attributed zone. Fields are populated stage by stage; each stage
/// returns a fresh collection rather than mutating its input in place.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: ZoneId,
    pub geometry: MultiPolygon<f64>,
    /// Zoning code, trimmed and uppercased at ingestion.
    pub code: String,
    /// Set exactly once (direct value or resolver fallback), never
    /// overwritten afterwards.
    pub environment: Option<EnvironmentType>,
    /// Derived once from the living-code set, never recomputed.
    pub is_living: bool,
    /// Zone polygon area in the metric frame, m².
    pub area_zone: f64,
    pub aggregates: ZoneAggregates,
    pub provision: BTreeMap<ServiceKind, ZoneProvision>,
    pub density: DensityMetrics,
    pub green: GreenMetrics,
    pub projection: PopulationProjection,
    pub total_score: f64,
    pub category: Option<ScoreCategory>,
}

impl Zone {
    /// Provision attributes for `kind`, zero defaults when never aggregated.
    #[must_use]
    pub fn provision_for(&self, kind: ServiceKind) -> ZoneProvision {
        self.provision.get(&kind).cloned().unwrap_or_default()
    }
}

// ── Services ─────────────────────────────────────────────────────────────

/// How a service was matched to its hosting building.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
    /// The service point fell inside the building polygon.
    Within,
    /// No containing building; the nearest building was used.
    Nearest,
}

/// A service matched to a hosting building with capacity and catchment
/// parameters resolved.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: ServiceId,
    pub kind: ServiceKind,
    pub point: Point<f64>,
    pub building_id: BuildingId,
    pub zone_id: Option<ZoneId>,
    pub provenance: Provenance,
    /// Hosting building's living flag.
    pub is_integrated: bool,
    /// Hosting building's environment, defaulted to `Medium` when absent.
    pub environment: EnvironmentType,
    /// Hosting building's total floor area.
    pub floor_area: f64,
    /// Hosting building's non-living floor area.
    pub non_living_area: f64,
    /// Capacity from the brick lookup (or the source hint); `None` when no
    /// brick covers the hosting building's floor area.
    pub capacity: Option<f64>,
    /// Catchment radius from the kind × environment table, meters.
    pub catchment_radius: Option<f64>,
    /// Composite grouping key `"{kind}_{environment}_{radius}"`.
    pub identification: String,
}

// ── Provision solver records ─────────────────────────────────────────────

/// One building-to-service assignment produced by the provision solver.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceLink {
    pub building_id: BuildingId,
    pub service_id: ServiceId,
    /// People served by this link; never exceeds the remaining capacity of
    /// the service or the remaining demand of the building at assignment.
    pub quantity: f64,
}

/// Per-service totals after the solver run, with the catchment geometry.
#[derive(Debug, Clone)]
pub struct ServedService {
    pub service_id: ServiceId,
    pub kind: ServiceKind,
    /// Capacity consumed by assigned links.
    pub employed_places: f64,
    /// Capacity left over (`capacity - employed_places`).
    pub free_places: f64,
    pub catchment: MultiPolygon<f64>,
}

/// A per-zone scoring record (positive branch only).
#[derive(Debug, Clone)]
pub struct ScoreRecord {
    pub zone_id: ZoneId,
    /// Min-max normalized core indicators, in the order
    /// (new population, density deficit, green normative difference).
    pub normalized: [f64; 3],
    pub cluster: usize,
    pub total_score: f64,
    pub category: ScoreCategory,
}
