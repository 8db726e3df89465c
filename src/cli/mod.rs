//! Command-line interface.
//!
//! `mrv run` executes the pipeline for one (farm, season) pair against a
//! scenario fixture (seed data for the in-memory collaborators) and prints
//! the final workflow state as JSON. `mrv status` replays the season's
//! run ledger.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::collaborators::memory::{
    FactorEmissionModel, InMemoryContentStore, InMemoryFarmRepository, InMemoryReportStore,
    InMemorySeasonRepository, KeyedSigner, RecordingMinter, SeededSensingProvider,
    WeightedQaEvaluator,
};
use crate::collaborators::Collaborators;
use crate::config::WorkflowConfig;
use crate::domain::{Farm, FarmerLog, SatelliteObservation, Season};
use crate::engine::{Ledger, Orchestrator};

/// MRV pipeline orchestrator
#[derive(Debug, Parser)]
#[command(name = "mrv", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a verification run for a farm and season
    Run {
        #[arg(long)]
        farm: String,

        #[arg(long)]
        season: String,

        /// Workflow config YAML (must set max_retries)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Retry bound, if no config file is given
        #[arg(long)]
        max_retries: Option<u32>,

        /// Scenario fixture YAML seeding the in-memory collaborators;
        /// defaults to the built-in demo scenario
        #[arg(long)]
        scenario: Option<PathBuf>,
    },

    /// Replay the run ledger for a farm and season
    Status {
        #[arg(long)]
        farm: String,

        #[arg(long)]
        season: String,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Command::Run {
                farm,
                season,
                config,
                max_retries,
                scenario,
            } => {
                let config = match (config, max_retries) {
                    (Some(path), _) => WorkflowConfig::from_file(&path)?,
                    (None, Some(bound)) => WorkflowConfig::with_max_retries(bound),
                    (None, None) => {
                        anyhow::bail!("provide --config or --max-retries (the retry bound has no default)")
                    }
                };

                let scenario = match scenario {
                    Some(path) => Scenario::from_file(&path)?,
                    None => Scenario::demo()?,
                };

                let orchestrator = Orchestrator::new(scenario.collaborators(), config)?;
                let state = orchestrator.run(&farm, &season).await?;

                println!("{}", serde_json::to_string_pretty(&state)?);
                Ok(())
            }

            Command::Status { farm, season } => {
                let home = Ledger::default_home()?;
                let ledger = Ledger::open(&home, &farm, &season).await?;
                for event in ledger.replay().await? {
                    println!("{}", serde_json::to_string(&event)?);
                }
                Ok(())
            }
        }
    }
}

fn default_confidence() -> f64 {
    0.9
}

/// Seed data for the demo run, in the same format `--scenario` files use.
const DEMO_SCENARIO: &str = r#"
farm:
  id: F1
  name: Mandla Paddy 1
  area_ha: 2.0
  latitude: 22.60
  longitude: 80.37
season:
  id: S1
  farm_id: F1
  year: 2025
  declared_method: alternate_wetting_drying
  sowing_date: 2025-06-15
  transplant_date: 2025-07-05
  harvest_date: 2025-10-20
farmer_logs:
  - logged_at: 2025-07-14
    activity: drained field for first dry-down
  - logged_at: 2025-08-14
    activity: drained field for second dry-down
observations:
  - { observed_at: 2025-06-25, moisture_index: 0.85 }
  - { observed_at: 2025-07-05, moisture_index: 0.80 }
  - { observed_at: 2025-07-15, moisture_index: 0.30 }
  - { observed_at: 2025-07-25, moisture_index: 0.75 }
  - { observed_at: 2025-08-05, moisture_index: 0.82 }
  - { observed_at: 2025-08-15, moisture_index: 0.28 }
  - { observed_at: 2025-08-25, moisture_index: 0.78 }
  - { observed_at: 2025-09-10, moisture_index: 0.70 }
  - { observed_at: 2025-10-01, moisture_index: 0.40 }
sensing_confidence: 0.9
"#;

/// Seed data for the in-memory collaborators: one farm, one season, its logs
/// and satellite observations.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub farm: Farm,
    pub season: Season,
    #[serde(default)]
    pub farmer_logs: Vec<FarmerLog>,
    pub observations: Vec<SatelliteObservation>,
    #[serde(default = "default_confidence")]
    pub sensing_confidence: f64,
}

impl Scenario {
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        serde_yaml::from_str(&content).context("Failed to parse scenario YAML")
    }

    /// Built-in demo: a 2 ha AWD paddy in Mandla with two observed dry-downs.
    pub fn demo() -> Result<Self> {
        serde_yaml::from_str(DEMO_SCENARIO).context("Failed to parse built-in demo scenario")
    }

    /// Wire the scenario into the in-memory collaborator set.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            farms: Arc::new(InMemoryFarmRepository::new().with_farm(self.farm.clone())),
            seasons: Arc::new(
                InMemorySeasonRepository::new()
                    .with_season(self.season.clone())
                    .with_logs(&self.season.id, self.farmer_logs.clone()),
            ),
            sensing: Arc::new(SeededSensingProvider::new(
                self.observations.clone(),
                self.sensing_confidence,
            )),
            model: Arc::new(FactorEmissionModel::default()),
            evaluator: Arc::new(WeightedQaEvaluator::new()),
            reports: Arc::new(InMemoryReportStore::new()),
            content: Arc::new(InMemoryContentStore::new()),
            signer: Arc::new(KeyedSigner::new("mrv-demo-signer")),
            minter: Arc::new(RecordingMinter::new()),
            validator: None,
        }
    }
}
