//! Каталог заданий и проверка ответов

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use super::{ProcessSpec, ResourceSpec, Scenario};
use crate::core::{ProcessId, ResourceId};
use crate::safety::{self, SafetySnapshot, SequenceError};
use crate::scheduler::Policy;
use crate::{Result, SimError};

const CATALOGUE: &str = include_str!("../../scenarios/challenges.ron");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeProcess {
    pub name: String,
    pub arrival: f64,
    pub burst: f64,
    pub priority: i32,
}

/// Содержимое задания по типу
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChallengeKind {
    /// Выбрать политику (и, возможно, порядок выполнения)
    Scheduling {
        processes: Vec<ChallengeProcess>,
        algorithm: Policy,
        #[serde(default)]
        order: Option<Vec<String>>,
    },
    /// Распределить ресурсы между процессами
    Resource {
        resources: Vec<ResourceSpec>,
        needs: BTreeMap<String, Vec<String>>,
        solution: BTreeMap<String, Vec<String>>,
        #[serde(default)]
        deadlock_scenarios: Vec<BTreeMap<String, Vec<String>>>,
    },
    /// Найти безопасную последовательность; строки матриц идут
    /// в порядке `processes`, столбцы в порядке `resources`
    Deadlock {
        processes: Vec<String>,
        resources: Vec<String>,
        allocation: Vec<Vec<u32>>,
        request: Vec<Vec<u32>>,
        available: Vec<u32>,
        solution: Vec<String>,
    },
}

impl ChallengeKind {
    fn name(&self) -> &'static str {
        match self {
            ChallengeKind::Scheduling { .. } => "scheduling",
            ChallengeKind::Resource { .. } => "resource",
            ChallengeKind::Deadlock { .. } => "deadlock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub level: u32,
    pub description: String,
    pub hint: String,
    pub kind: ChallengeKind,
}

/// Ответ игрока
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Submission {
    Scheduling { algorithm: Policy, order: Vec<String> },
    Resource { allocation: BTreeMap<String, Vec<String>> },
    Deadlock { sequence: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Correct,
    /// Ответ допустим, но не совпадает с эталоном
    ValidButSuboptimal,
    WouldDeadlock,
    Incorrect,
}

impl Verdict {
    pub fn is_correct(self) -> bool {
        self == Verdict::Correct
    }

    pub fn message(self) -> &'static str {
        match self {
            Verdict::Correct => "Correct!",
            Verdict::ValidButSuboptimal => "This works but isn't the optimal solution. Try again!",
            Verdict::WouldDeadlock => "This would result in a deadlock. Check your work.",
            Verdict::Incorrect => "Not quite. Try again!",
        }
    }
}

/// Сравнение распределений без учета порядка внутри списков
fn normalized(allocation: &BTreeMap<String, Vec<String>>) -> BTreeMap<&str, Vec<&str>> {
    allocation
        .iter()
        .map(|(process, held)| {
            let mut held: Vec<&str> = held.iter().map(String::as_str).collect();
            held.sort_unstable();
            (process.as_str(), held)
        })
        .collect()
}

impl Challenge {
    pub fn evaluate(&self, submission: &Submission) -> Result<Verdict> {
        let verdict = match (&self.kind, submission) {
            (
                ChallengeKind::Scheduling { algorithm, order: expected, .. },
                Submission::Scheduling { algorithm: chosen, order },
            ) => {
                let order_ok = expected.as_ref().map_or(true, |expected| expected == order);
                if algorithm == chosen && order_ok {
                    Verdict::Correct
                } else {
                    Verdict::Incorrect
                }
            }
            (
                ChallengeKind::Resource { solution, deadlock_scenarios, .. },
                Submission::Resource { allocation },
            ) => {
                let submitted = normalized(allocation);
                if submitted == normalized(solution) {
                    Verdict::Correct
                } else if deadlock_scenarios.iter().any(|s| normalized(s) == submitted) {
                    Verdict::WouldDeadlock
                } else {
                    Verdict::Incorrect
                }
            }
            (ChallengeKind::Deadlock { processes, solution, .. }, Submission::Deadlock { sequence }) => {
                if sequence == solution {
                    Verdict::Correct
                } else {
                    let snapshot = self.snapshot()?.ok_or(SimError::SubmissionMismatch("deadlock"))?;
                    let ids: Option<Vec<ProcessId>> = sequence
                        .iter()
                        .map(|name| processes.iter().position(|p| p == name).map(|i| ProcessId(i as u32)))
                        .collect();
                    match ids {
                        None => Verdict::Incorrect,
                        Some(ids) => match safety::verify_sequence(&snapshot, &ids)? {
                            Ok(()) => Verdict::ValidButSuboptimal,
                            Err(SequenceError::Blocked { .. }) => Verdict::WouldDeadlock,
                            Err(e) => {
                                debug!("Последовательность отклонена: {:?}", e);
                                Verdict::Incorrect
                            }
                        },
                    }
                }
            }
            (kind, _) => return Err(SimError::SubmissionMismatch(kind.name())),
        };

        info!("Задание {}: {:?}", self.id, verdict);
        Ok(verdict)
    }

    /// Снимок для заданий на безопасную последовательность
    pub fn snapshot(&self) -> Result<Option<SafetySnapshot>> {
        let ChallengeKind::Deadlock { processes, resources, allocation, request, available, .. } = &self.kind else {
            return Ok(None);
        };
        let snapshot = SafetySnapshot {
            processes: (0..processes.len() as u32).map(ProcessId).collect(),
            resources: (0..resources.len() as u32).map(ResourceId).collect(),
            available: available.clone(),
            allocation: allocation.clone(),
            need: request.clone(),
        };
        snapshot.validate()?;
        Ok(Some(snapshot))
    }

    /// Сценарий для прогона задания на планирование выбранной политикой
    pub fn scenario(&self, policy: Policy) -> Option<Scenario> {
        let ChallengeKind::Scheduling { processes, .. } = &self.kind else {
            return None;
        };
        Some(Scenario {
            name: self.title.clone(),
            level: self.level,
            policy,
            quantum: 2.0,
            tick: 1.0,
            resources: Vec::new(),
            processes: processes
                .iter()
                .map(|p| ProcessSpec {
                    name: p.name.clone(),
                    arrival: p.arrival,
                    burst: p.burst,
                    priority: p.priority,
                    max: BTreeMap::new(),
                    allocation: BTreeMap::new(),
                })
                .collect(),
        })
    }
}

/// Встроенный каталог заданий
pub fn builtin_challenges() -> Result<Vec<Challenge>> {
    let challenges: Vec<Challenge> = ron::from_str(CATALOGUE)?;
    info!("Загружено заданий: {}", challenges.len());
    Ok(challenges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(id: &str) -> Challenge {
        builtin_challenges()
            .unwrap()
            .into_iter()
            .find(|c| c.id == id)
            .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn catalogue_parses() {
        let all = builtin_challenges().unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.windows(2).all(|w| w[0].level < w[1].level));
    }

    #[test]
    fn scheduling_checks_policy_and_order() {
        let c = find("level1");
        let right = Submission::Scheduling { algorithm: Policy::Sjf, order: names(&["p4", "p2", "p1", "p3"]) };
        let wrong_order = Submission::Scheduling { algorithm: Policy::Sjf, order: names(&["p1", "p2", "p3", "p4"]) };
        let wrong_policy = Submission::Scheduling { algorithm: Policy::Fcfs, order: names(&["p4", "p2", "p1", "p3"]) };
        assert_eq!(c.evaluate(&right).unwrap(), Verdict::Correct);
        assert_eq!(c.evaluate(&wrong_order).unwrap(), Verdict::Incorrect);
        assert_eq!(c.evaluate(&wrong_policy).unwrap(), Verdict::Incorrect);

        // Порядок здесь не проверяется
        let rr = find("level7");
        let any = Submission::Scheduling { algorithm: Policy::RoundRobin, order: vec![] };
        assert_eq!(rr.evaluate(&any).unwrap(), Verdict::Correct);
    }

    #[test]
    fn resource_allocation_verdicts() {
        let c = find("level2");
        let solution = BTreeMap::from([
            ("p1".to_string(), names(&["r2", "r1"])),
            ("p2".to_string(), names(&["r2", "r3"])),
            ("p3".to_string(), names(&["r1", "r3"])),
        ]);
        assert_eq!(c.evaluate(&Submission::Resource { allocation: solution }).unwrap(), Verdict::Correct);

        let circular = BTreeMap::from([
            ("p1".to_string(), names(&["r1"])),
            ("p2".to_string(), names(&["r2"])),
            ("p3".to_string(), names(&["r3"])),
        ]);
        assert_eq!(
            c.evaluate(&Submission::Resource { allocation: circular }).unwrap(),
            Verdict::WouldDeadlock
        );
        assert_eq!(
            c.evaluate(&Submission::Resource { allocation: BTreeMap::new() }).unwrap(),
            Verdict::Incorrect
        );
    }

    #[test]
    fn deadlock_sequences_are_replayed() {
        let c = find("level3");
        let seq = |s: &[&str]| Submission::Deadlock { sequence: names(s) };
        assert_eq!(c.evaluate(&seq(&["p1", "p3", "p4", "p2"])).unwrap(), Verdict::Correct);
        assert_eq!(c.evaluate(&seq(&["p1", "p2", "p3", "p4"])).unwrap(), Verdict::ValidButSuboptimal);
        assert_eq!(c.evaluate(&seq(&["p2", "p1", "p3", "p4"])).unwrap(), Verdict::ValidButSuboptimal);
        assert_eq!(c.evaluate(&seq(&["p1", "p3"])).unwrap(), Verdict::Incorrect);
        assert_eq!(c.evaluate(&seq(&["p9"])).unwrap(), Verdict::Incorrect);

        let analyzed = safety::analyze(&c.snapshot().unwrap().unwrap()).unwrap();
        assert!(analyzed.safe);
    }

    #[test]
    fn blocked_sequence_would_deadlock() {
        let c = Challenge {
            id: "tight".into(),
            title: "Tight".into(),
            level: 1,
            description: String::new(),
            hint: String::new(),
            kind: ChallengeKind::Deadlock {
                processes: names(&["a", "b"]),
                resources: names(&["r"]),
                allocation: vec![vec![1], vec![0]],
                request: vec![vec![1], vec![2]],
                available: vec![1],
                solution: names(&["a", "b"]),
            },
        };
        let verdict = c.evaluate(&Submission::Deadlock { sequence: names(&["b", "a"]) }).unwrap();
        assert_eq!(verdict, Verdict::WouldDeadlock);
    }

    #[test]
    fn mismatched_submission_is_an_error() {
        let c = find("level3");
        let err = c.evaluate(&Submission::Resource { allocation: BTreeMap::new() }).unwrap_err();
        assert!(matches!(err, SimError::SubmissionMismatch("deadlock")));
    }

    #[test]
    fn scheduling_challenge_runs_through_the_simulator() {
        let c = find("level4");
        let mut sim = c.scenario(Policy::Priority).unwrap().build().unwrap();
        let metrics = sim.run_to_completion(crate::core::SimTime::new(100.0)).unwrap().unwrap();
        assert_eq!(metrics.completed, 4);
        assert!(find("level3").scenario(Policy::Fcfs).is_none());
    }
}
