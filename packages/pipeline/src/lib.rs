#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! The spatial integration and scoring pipeline.
//!
//! Seven stages, each consuming the previous stage's output and producing
//! a fresh collection: zone model resolution, building enrichment, the
//! zone-building join, population redistribution, service matching,
//! provision aggregation, and potential scoring (with indicator derivation
//! and clustering in between). Stages communicate only through these
//! collections plus the norms configuration; resolution misses are
//! non-fatal and surfaced through per-stage [`StageReport`]s.

pub mod cluster;
pub mod enrich;
pub mod indicators;
pub mod join;
pub mod provision;
pub mod redistribute;
pub mod resolve;
pub mod score;
pub mod services;

use std::collections::BTreeMap;

use thiserror::Error;
use urban_potential_city_models::{
    Building, BuildingSource, GreenSource, ScoreRecord, ServedService, Service, ServiceKind,
    ServiceSource, Zone, ZoneSource,
};
use urban_potential_config::NormsConfig;
use urban_potential_provision::{FloorAreaBalancer, GreedyCapacitySolver};

/// Errors raised by the pipeline. Resolution misses never surface here;
/// these are internal defects (solver/balancer contract violations).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A provision capability violated its contract.
    #[error("Provision capability error: {0}")]
    Provision(#[from] urban_potential_provision::ProvisionError),
}

/// Per-stage counters: records processed, resolution misses by kind, and
/// the conservation delta where the stage asserts one.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: &'static str,
    pub processed: usize,
    pub misses: BTreeMap<String, usize>,
    /// Absolute drift of a conserved total across the stage, when checked.
    pub conservation_delta: Option<f64>,
}

impl StageReport {
    #[must_use]
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            processed: 0,
            misses: BTreeMap::new(),
            conservation_delta: None,
        }
    }

    /// Counts one resolution miss of the given kind.
    pub fn miss(&mut self, kind: &str) {
        *self.misses.entry(kind.to_string()).or_default() += 1;
    }

    /// Total misses across all kinds.
    #[must_use]
    pub fn total_misses(&self) -> usize {
        self.misses.values().sum()
    }

    /// Logs the stage summary; conservation drift is a defect and logs as
    /// an error.
    pub fn log_summary(&self) {
        log::info!(
            "Stage {}: {} records, {} misses",
            self.stage,
            self.processed,
            self.total_misses()
        );
        for (kind, count) in &self.misses {
            log::info!("  {kind}: {count}");
        }
        if let Some(delta) = self.conservation_delta {
            if delta > CONSERVATION_TOLERANCE {
                log::error!(
                    "Stage {}: conservation violated, total drifted by {delta}",
                    self.stage
                );
            }
        }
    }
}

/// Tolerance for population/area conservation checks.
pub const CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Typed source collections the pipeline consumes, produced by layer
/// ingestion.
#[derive(Debug)]
pub struct PipelineInputs {
    pub zones: Vec<ZoneSource>,
    pub buildings: Vec<BuildingSource>,
    pub services: BTreeMap<ServiceKind, Vec<ServiceSource>>,
    pub green: Vec<GreenSource>,
}

/// Everything the pipeline produces.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Fully attributed zones, scored and categorized.
    pub zones: Vec<Zone>,
    /// Enriched buildings with zone assignment and population.
    pub buildings: Vec<Building>,
    /// Matched services with capacity and catchment parameters.
    pub services: Vec<Service>,
    /// Clipped per-kind provision layers for traceability. Kinds skipped
    /// for lack of usable services are absent.
    pub provision_layers: BTreeMap<ServiceKind, Vec<ServedService>>,
    /// Positive-branch scoring records.
    pub score_records: Vec<ScoreRecord>,
    /// One report per stage, in execution order.
    pub reports: Vec<StageReport>,
}

/// Runs the full pipeline over typed inputs with the reference balancer
/// and solver.
///
/// # Errors
///
/// Returns an error only if a provision capability violates its contract;
/// resolution misses are reported, never raised.
pub fn run(
    inputs: PipelineInputs,
    norms: &NormsConfig,
    living_population: f64,
) -> Result<PipelineOutput, PipelineError> {
    let mut reports = Vec::new();

    let (zones, report) = resolve::resolve_zones(inputs.zones, norms);
    report.log_summary();
    reports.push(report);

    let (buildings, report) =
        enrich::enrich_buildings(inputs.buildings, &FloorAreaBalancer, living_population, norms);
    report.log_summary();
    reports.push(report);

    let (zones, buildings, report) = join::join_buildings_to_zones(zones, buildings);
    report.log_summary();
    reports.push(report);

    let (zones, report) = redistribute::redistribute_population(zones);
    report.log_summary();
    reports.push(report);

    let (services, report) = services::match_services(&inputs.services, &buildings, norms);
    report.log_summary();
    reports.push(report);

    let (zones, provision_layers, report) =
        provision::aggregate_provision(zones, &buildings, &services, norms, &GreedyCapacitySolver)?;
    report.log_summary();
    reports.push(report);

    let (zones, report) = indicators::derive_density(zones, norms);
    report.log_summary();
    reports.push(report);

    let (zones, report) = indicators::allocate_green(zones, &inputs.green, norms);
    report.log_summary();
    reports.push(report);

    let (zones, report) = indicators::project_population(zones, norms);
    report.log_summary();
    reports.push(report);

    let aggregated_kinds = provision_layers.keys().copied().collect();
    let (zones, score_records, report) = score::score_zones(zones, norms, &aggregated_kinds);
    report.log_summary();
    reports.push(report);

    Ok(PipelineOutput {
        zones,
        buildings,
        services,
        provision_layers,
        score_records,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon, Point};
    use urban_potential_city_models::EnvironmentType;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn small_city() -> PipelineInputs {
        let zones = vec![
            ZoneSource {
                geometry: square(0.0, 0.0, 500.0),
                code: "ЖР".to_string(),
                environment: Some(EnvironmentType::Medium),
            },
            ZoneSource {
                geometry: square(600.0, 0.0, 300.0),
                code: "П.5".to_string(),
                environment: Some(EnvironmentType::Medium),
            },
        ];
        let buildings = vec![
            BuildingSource {
                geometry: square(50.0, 50.0, 20.0),
                floors: Some(9.0),
                is_living: true,
            },
            BuildingSource {
                geometry: square(200.0, 200.0, 20.0),
                floors: Some(5.0),
                is_living: true,
            },
            BuildingSource {
                geometry: square(650.0, 50.0, 40.0),
                floors: Some(2.0),
                is_living: false,
            },
        ];
        let mut services = BTreeMap::new();
        for (kind, x) in [
            (ServiceKind::School, 100.0),
            (ServiceKind::Kindergarten, 150.0),
            (ServiceKind::Polyclinic, 250.0),
        ] {
            services.insert(
                kind,
                vec![ServiceSource {
                    kind,
                    point: Point::new(x, 100.0),
                    capacity_hint: Some(400.0),
                }],
            );
        }
        let green = vec![GreenSource {
            geometry: square(0.0, 600.0, 100.0),
            origin: urban_potential_city_models::GreenOrigin::Green,
        }];
        PipelineInputs {
            zones,
            buildings,
            services,
            green,
        }
    }

    #[test]
    fn full_run_attributes_every_zone() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let output = run(small_city(), &norms, 300.0).unwrap();

        assert_eq!(output.zones.len(), 2);
        assert_eq!(output.buildings.len(), 3);
        assert_eq!(output.services.len(), 3);
        assert_eq!(output.reports.len(), 10);
        for zone in &output.zones {
            assert!(zone.category.is_some());
        }
        // Population lands on the residential zone only.
        let residential = output.zones.iter().find(|zone| zone.is_living).unwrap();
        assert!((residential.aggregates.sum_population - 300.0).abs() < 1e-9);
        assert!(residential.density.deficit_density.is_some());
    }

    #[test]
    fn full_run_is_deterministic() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let first = run(small_city(), &norms, 300.0).unwrap();
        let second = run(small_city(), &norms, 300.0).unwrap();

        for (a, b) in first.zones.iter().zip(&second.zones) {
            assert_eq!(a.id, b.id);
            assert!((a.total_score - b.total_score).abs() < f64::EPSILON);
            assert_eq!(a.category, b.category);
        }
        assert_eq!(first.score_records.len(), second.score_records.len());
    }
}
