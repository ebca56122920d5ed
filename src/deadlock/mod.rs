//! Быстрая проверка на взаимоблокировку во время интерактивной игры
//!
//! Это эвристика, а не поиск цикла в графе ожидания: тупик объявляется,
//! если хотя бы один процесс в состоянии `Waiting` удерживает исчерпанный
//! ресурс или заблокирован на нем. Возможны ложные срабатывания.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::{ProcessId, ResourceId};
use crate::process::{ProcessRegistry, ProcessState};
use crate::resources::ResourceLedger;

/// Исчерпанный ресурс и его держатели
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustedResource {
    pub id: ResourceId,
    pub name: String,
    pub holders: Vec<(ProcessId, u32)>,
}

/// Ожидающий процесс, попавший под подозрение
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingProcess {
    pub id: ProcessId,
    pub name: String,
    /// Исчерпанные ресурсы, которые процесс держит или ждет
    pub on: Vec<ResourceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadlockReport {
    pub deadlocked: bool,
    pub waiting: Vec<WaitingProcess>,
    pub exhausted: Vec<ExhaustedResource>,
}

impl DeadlockReport {
    /// Человекочитаемое объяснение; пустая строка, если тупика нет
    pub fn explanation(&self) -> String {
        if self.deadlocked {
            self.to_string()
        } else {
            String::new()
        }
    }
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.deadlocked {
            return f.write_str("no deadlock");
        }

        let waiting: Vec<String> = self
            .waiting
            .iter()
            .map(|w| format!("{} ({})", w.id, w.name))
            .collect();
        write!(f, "potential deadlock: waiting processes [{}]", waiting.join(", "))?;

        let exhausted: Vec<String> = self
            .exhausted
            .iter()
            .map(|r| {
                let holders: Vec<String> = r.holders.iter().map(|(p, n)| format!("{} x{}", p, n)).collect();
                format!("{} ({}) held by [{}]", r.id, r.name, holders.join(", "))
            })
            .collect();
        write!(f, "; exhausted resources [{}]", exhausted.join("; "))
    }
}

/// Пересчитать флаг взаимоблокировки по текущему состоянию
pub fn detect(ledger: &ResourceLedger, registry: &ProcessRegistry) -> DeadlockReport {
    let mut waiting = Vec::new();
    let mut implicated: Vec<ResourceId> = Vec::new();

    for process in registry.iter().filter(|p| p.state() == ProcessState::Waiting) {
        let on: Vec<ResourceId> = ledger
            .iter()
            .filter(|r| r.is_exhausted())
            .filter(|r| process.allocation_of(r.id()) > 0 || process.pending().contains_key(&r.id()))
            .map(|r| r.id())
            .collect();

        if on.is_empty() {
            continue;
        }
        for &r in &on {
            if !implicated.contains(&r) {
                implicated.push(r);
            }
        }
        waiting.push(WaitingProcess {
            id: process.id(),
            name: process.name().to_string(),
            on,
        });
    }

    implicated.sort();
    let exhausted = ledger
        .iter()
        .filter(|r| implicated.contains(&r.id()))
        .map(|r| ExhaustedResource {
            id: r.id(),
            name: r.name().to_string(),
            holders: r.holders(),
        })
        .collect();

    DeadlockReport {
        deadlocked: !waiting.is_empty(),
        waiting,
        exhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SimTime;
    use std::collections::BTreeMap;

    fn setup() -> (ResourceLedger, ProcessRegistry, ResourceId, ProcessId) {
        let mut ledger = ResourceLedger::new();
        let r = ledger.create("Printer", 1).unwrap();
        let mut registry = ProcessRegistry::new();
        let p = registry.add("Spooler", SimTime::ZERO, 2.0, 1, BTreeMap::new()).unwrap();
        ledger.allocate(r, p, 1).unwrap();
        registry.set_allocation(p, r, 1).unwrap();
        (ledger, registry, r, p)
    }

    fn make_waiting(registry: &mut ProcessRegistry, p: ProcessId) {
        registry.transition(p, ProcessState::Ready, SimTime::ZERO).unwrap();
        registry.transition(p, ProcessState::Running, SimTime::ZERO).unwrap();
        registry.transition(p, ProcessState::Waiting, SimTime::ZERO).unwrap();
    }

    #[test]
    fn holding_exhausted_resource_without_waiting_is_fine() {
        let (ledger, registry, _, _) = setup();
        let report = detect(&ledger, &registry);
        assert!(!report.deadlocked);
        assert_eq!(report.explanation(), "");
    }

    #[test]
    fn waiting_holder_of_exhausted_resource_is_flagged() {
        let (ledger, mut registry, r, p) = setup();
        make_waiting(&mut registry, p);

        let report = detect(&ledger, &registry);
        assert!(report.deadlocked);
        assert_eq!(report.waiting[0].id, p);
        assert_eq!(report.exhausted[0].id, r);
        assert_eq!(report.exhausted[0].holders, vec![(p, 1)]);

        let text = report.explanation();
        assert!(text.contains("P0"));
        assert!(text.contains("R0"));
        assert!(text.contains("Printer"));
    }

    #[test]
    fn blocked_on_exhausted_resource_counts_too() {
        let (mut ledger, mut registry, r, p) = setup();
        ledger.release(r, p, 1).unwrap();
        registry.set_allocation(p, r, 0).unwrap();

        let q = registry.add("Other", SimTime::ZERO, 1.0, 1, BTreeMap::new()).unwrap();
        ledger.allocate(r, q, 1).unwrap();
        registry.set_allocation(q, r, 1).unwrap();

        make_waiting(&mut registry, p);
        registry.add_pending(p, r, 1).unwrap();

        let report = detect(&ledger, &registry);
        assert!(report.deadlocked);
        assert_eq!(report.exhausted[0].holders, vec![(q, 1)]);
    }
}
