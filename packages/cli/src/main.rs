#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the development-potential pipeline.
//!
//! `run` executes the full pipeline over a directory of input layers and
//! writes the attributed outputs, `validate` loads and checks the inputs
//! without running anything, and `norms` prints the effective planning
//! norms as TOML.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use geo::Area as _;
use urban_potential_config::NormsConfig;
use urban_potential_layers::{
    load_input_dir, write_buildings, write_provision_layers, write_zones,
};
use urban_potential_pipeline::PipelineInputs;

/// Score urban zones for residential development potential.
#[derive(Parser)]
#[command(name = "urban_potential_cli")]
#[command(about = "Score urban zones for residential development potential")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over an input directory and write the outputs.
    Run {
        /// Directory holding the eight input GeoJSON layers.
        #[arg(long)]
        input_dir: PathBuf,

        /// Directory the attributed output layers are written to.
        #[arg(long)]
        output_dir: PathBuf,

        /// Total living population to apportion over residential
        /// buildings.
        #[arg(long)]
        population: f64,

        /// TOML file overriding the embedded planning norms.
        #[arg(long)]
        norms: Option<PathBuf>,
    },

    /// Load and validate the input layers without running the pipeline.
    Validate {
        /// Directory holding the eight input GeoJSON layers.
        #[arg(long)]
        input_dir: PathBuf,
    },

    /// Print the effective planning norms as TOML.
    Norms {
        /// TOML file overriding the embedded planning norms.
        #[arg(long)]
        norms: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input_dir,
            output_dir,
            population,
            norms,
        } => cmd_run(&input_dir, &output_dir, population, norms.as_deref()),
        Commands::Validate { input_dir } => cmd_validate(&input_dir),
        Commands::Norms { norms } => cmd_norms(norms.as_deref()),
    }
}

fn cmd_run(
    input_dir: &Path,
    output_dir: &Path,
    population: f64,
    norms_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let norms = NormsConfig::load(norms_path)?;
    let layers = load_input_dir(input_dir)?;
    log::info!(
        "Boundary covers {:.0} m²; {} zones, {} buildings, {} green polygons",
        layers.boundary.unsigned_area(),
        layers.zones.len(),
        layers.buildings.len(),
        layers.green.len()
    );

    let inputs = PipelineInputs {
        zones: layers.zones,
        buildings: layers.buildings,
        services: layers.services,
        green: layers.green,
    };
    let output = urban_potential_pipeline::run(inputs, &norms, population)?;

    std::fs::create_dir_all(output_dir)?;
    write_zones(&output_dir.join("zones_scored.geojson"), &output.zones)?;
    write_buildings(
        &output_dir.join("buildings_enriched.geojson"),
        &output.buildings,
    )?;
    for (kind, services) in &output.provision_layers {
        write_provision_layers(output_dir, *kind, services)?;
    }

    let positive = output
        .zones
        .iter()
        .filter(|zone| zone.total_score > 0.0)
        .count();
    let negative = output
        .zones
        .iter()
        .filter(|zone| zone.total_score < 0.0)
        .count();
    println!(
        "Scored {} zones ({} positive, {} negative, {} services matched); outputs in {}",
        output.zones.len(),
        positive,
        negative,
        output.services.len(),
        output_dir.display()
    );

    Ok(())
}

fn cmd_validate(input_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let layers = load_input_dir(input_dir)?;
    let service_count: usize = layers.services.values().map(Vec::len).sum();
    println!(
        "Input layers valid: boundary {:.0} m², {} zones, {} buildings, {} service points, {} green polygons",
        layers.boundary.unsigned_area(),
        layers.zones.len(),
        layers.buildings.len(),
        service_count,
        layers.green.len()
    );
    Ok(())
}

fn cmd_norms(norms_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let norms = NormsConfig::load(norms_path)?;
    println!("{}", norms.toml_text());
    Ok(())
}
