//! Описание сценариев (RON) и сборка из них `Simulator`

mod challenge;
mod generator;
mod puzzle;
mod showdown;

pub use challenge::{builtin_challenges, Challenge, ChallengeKind, ChallengeProcess, Submission, Verdict};
pub use generator::{BankersPuzzle, PuzzleGenerator};
pub use puzzle::{PuzzleLevel, PuzzleSession, PUZZLE_LEVELS};
pub use showdown::{Contestant, Showdown, ShowdownLevel, Standing, SHOWDOWN_LEVELS};

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::core::{Duration, ResourceId};
use crate::scheduler::{Policy, SchedulerConfig};
use crate::{Result, SimError, Simulator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    #[serde(default)]
    pub arrival: f64,
    pub burst: f64,
    #[serde(default)]
    pub priority: i32,
    /// Максимум по имени ресурса
    #[serde(default)]
    pub max: BTreeMap<String, u32>,
    /// Начальное выделение по имени ресурса
    #[serde(default)]
    pub allocation: BTreeMap<String, u32>,
}

fn default_policy() -> Policy {
    Policy::Fcfs
}

fn default_quantum() -> f64 {
    2.0
}

fn default_tick() -> f64 {
    1.0
}

fn default_level() -> u32 {
    1
}

/// Сценарий: политика, ресурсы и процессы
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_policy")]
    pub policy: Policy,
    #[serde(default = "default_quantum")]
    pub quantum: f64,
    #[serde(default = "default_tick")]
    pub tick: f64,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub processes: Vec<ProcessSpec>,
}

impl Scenario {
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let scenario: Scenario = ron::from_str(source)?;
        info!(
            "Загружен сценарий '{}': {} ресурсов, {} процессов",
            scenario.name,
            scenario.resources.len(),
            scenario.processes.len()
        );
        Ok(scenario)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SimError::Simulation(format!("failed to serialize scenario: {}", e)))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            policy: self.policy,
            quantum: Duration::from_seconds(self.quantum),
            tick: Duration::from_seconds(self.tick),
        }
    }

    /// Собрать симулятор: ресурсы, затем процессы с максимумами, затем
    /// начальные выделения
    pub fn build(&self) -> Result<Simulator> {
        let mut sim = Simulator::with_config(self.scheduler_config())?;
        sim.set_level(self.level);

        let mut ids: BTreeMap<&str, ResourceId> = BTreeMap::new();
        for spec in &self.resources {
            if ids.contains_key(spec.name.as_str()) {
                return Err(SimError::Configuration(format!("duplicate resource '{}'", spec.name)));
            }
            ids.insert(&spec.name, sim.create_resource(&spec.name, spec.total)?);
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| SimError::Configuration(format!("unknown resource '{}'", name)))
        };

        for spec in &self.processes {
            let max = spec
                .max
                .iter()
                .map(|(name, &amount)| Ok((lookup(name)?, amount)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            let pid = sim.create_process(&spec.name, spec.arrival, spec.burst, spec.priority, max)?;

            for (name, &amount) in &spec.allocation {
                sim.allocate(pid, lookup(name)?, amount)?;
            }
        }

        Ok(sim)
    }
}
