//! Состязание планировщиков: каждый участник прогоняет свой набор
//! процессов своей политикой, побеждает наибольший счет

use std::cmp::Ordering;
use serde::Serialize;
use tracing::{debug, info};

use super::{ProcessSpec, Scenario};
use crate::core::SimTime;
use crate::scheduler::{Metrics, Policy};
use crate::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShowdownLevel {
    pub id: u32,
    pub name: &'static str,
    /// `None`: участники выбирают политику сами
    pub policy: Option<Policy>,
    /// Наибольшее число процессов у одного участника
    pub processes: usize,
    /// Секунды модельного времени
    pub time_limit: f64,
    pub quantum: f64,
}

pub const SHOWDOWN_LEVELS: [ShowdownLevel; 5] = [
    ShowdownLevel { id: 1, name: "FCFS Frenzy", policy: Some(Policy::Fcfs), processes: 5, time_limit: 120.0, quantum: 2.0 },
    ShowdownLevel { id: 2, name: "SJF Rush", policy: Some(Policy::Sjf), processes: 6, time_limit: 180.0, quantum: 2.0 },
    ShowdownLevel { id: 3, name: "Priority Planner", policy: Some(Policy::Priority), processes: 6, time_limit: 240.0, quantum: 2.0 },
    ShowdownLevel { id: 4, name: "RR Challenge", policy: Some(Policy::RoundRobin), processes: 7, time_limit: 300.0, quantum: 2.0 },
    ShowdownLevel { id: 5, name: "Hybrid Mode", policy: None, processes: 8, time_limit: 360.0, quantum: 2.0 },
];

#[derive(Debug, Clone, PartialEq)]
pub struct Contestant {
    pub name: String,
    pub policy: Policy,
    pub processes: Vec<ProcessSpec>,
}

/// Результат участника. Не уложившийся в лимит получает 0 очков
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub name: String,
    pub policy: Policy,
    pub metrics: Option<Metrics>,
    pub score: f64,
}

impl Standing {
    pub fn finished(&self) -> bool {
        self.metrics.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Showdown {
    level: ShowdownLevel,
}

impl Showdown {
    pub fn new(level: ShowdownLevel) -> Self {
        Self { level }
    }

    /// Уровень по номеру (с единицы)
    pub fn level(id: u32) -> Result<Self> {
        SHOWDOWN_LEVELS
            .iter()
            .find(|level| level.id == id)
            .map(|&level| Self::new(level))
            .ok_or_else(|| SimError::Configuration(format!("unknown showdown level {}", id)))
    }

    fn check(&self, contestant: &Contestant) -> Result<()> {
        if let Some(required) = self.level.policy {
            if contestant.policy != required {
                return Err(SimError::Configuration(format!(
                    "{} uses {} but level '{}' requires {}",
                    contestant.name, contestant.policy, self.level.name, required
                )));
            }
        }
        if contestant.processes.is_empty() || contestant.processes.len() > self.level.processes {
            return Err(SimError::Configuration(format!(
                "{} brings {} processes, level '{}' allows 1..={}",
                contestant.name,
                contestant.processes.len(),
                self.level.name,
                self.level.processes
            )));
        }
        Ok(())
    }

    fn play(&self, contestant: &Contestant) -> Result<Standing> {
        let scenario = Scenario {
            name: contestant.name.clone(),
            level: self.level.id,
            policy: contestant.policy,
            quantum: self.level.quantum,
            tick: 1.0,
            resources: Vec::new(),
            processes: contestant.processes.clone(),
        };
        let mut sim = scenario.build()?;
        let metrics = sim.run_to_completion(SimTime::new(self.level.time_limit))?;
        let score = metrics.as_ref().map_or(0.0, Metrics::scheduling_score);
        debug!("{} ({}): {:.1} очков", contestant.name, contestant.policy, score);

        Ok(Standing { name: contestant.name.clone(), policy: contestant.policy, metrics, score })
    }

    /// Прогнать всех участников. Таблица отсортирована: сначала
    /// завершившие по убыванию счета, при равенстве в порядке заявки
    pub fn run(&self, contestants: &[Contestant]) -> Result<Vec<Standing>> {
        for contestant in contestants {
            self.check(contestant)?;
        }

        let mut standings = contestants.iter().map(|c| self.play(c)).collect::<Result<Vec<_>>>()?;
        standings.sort_by(|a, b| {
            b.finished()
                .cmp(&a.finished())
                .then(b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        });

        if let Some(winner) = standings.first().filter(|s| s.finished()) {
            info!(
                "Уровень '{}': побеждает {} ({}) с {:.1} очками",
                self.level.name, winner.name, winner.policy, winner.score
            );
        }
        Ok(standings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn job(name: &str, arrival: f64, burst: f64) -> ProcessSpec {
        ProcessSpec {
            name: name.into(),
            arrival,
            burst,
            priority: 0,
            max: BTreeMap::new(),
            allocation: BTreeMap::new(),
        }
    }

    fn contestant(name: &str, policy: Policy) -> Contestant {
        Contestant {
            name: name.into(),
            policy,
            processes: vec![job("P1", 0.0, 8.0), job("P2", 0.0, 1.0), job("P3", 0.0, 1.0)],
        }
    }

    #[test]
    fn shortest_job_first_beats_fcfs_on_a_long_head() {
        let showdown = Showdown::level(5).unwrap();
        let standings = showdown
            .run(&[contestant("alice", Policy::Fcfs), contestant("bob", Policy::Sjf)])
            .unwrap();

        assert_eq!(standings[0].name, "bob");
        assert!(standings[0].score > standings[1].score);
        let sjf = standings[0].metrics.unwrap();
        assert!((sjf.avg_waiting - 1.0).abs() < 1e-9);
        let fcfs = standings[1].metrics.unwrap();
        assert!((fcfs.avg_waiting - 17.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_policy_levels_reject_other_policies() {
        let showdown = Showdown::level(1).unwrap();
        let err = showdown.run(&[contestant("carol", Policy::RoundRobin)]).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
        assert!(Showdown::level(6).is_err());
    }

    #[test]
    fn process_count_is_bounded_by_level() {
        let showdown = Showdown::new(SHOWDOWN_LEVELS[0]);
        let mut crowded = contestant("dave", Policy::Fcfs);
        crowded.processes = (0..6).map(|i| job(&format!("P{}", i), 0.0, 1.0)).collect();
        assert!(showdown.run(&[crowded]).is_err());

        let mut empty = contestant("erin", Policy::Fcfs);
        empty.processes.clear();
        assert!(showdown.run(&[empty]).is_err());
    }

    #[test]
    fn unfinished_contestant_ranks_last() {
        let level = ShowdownLevel { time_limit: 5.0, ..SHOWDOWN_LEVELS[4] };
        let mut slow = contestant("frank", Policy::Fcfs);
        slow.processes = vec![job("P1", 0.0, 20.0)];
        let quick = Contestant { name: "grace".into(), policy: Policy::Fcfs, processes: vec![job("P1", 0.0, 2.0)] };

        let standings = Showdown::new(level).run(&[slow, quick]).unwrap();
        assert_eq!(standings[0].name, "grace");
        assert!(standings[0].finished());
        assert!(!standings[1].finished());
        assert_eq!(standings[1].score, 0.0);
    }
}
