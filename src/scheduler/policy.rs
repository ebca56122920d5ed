//! Политики выбора процесса

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::{ProcessId, SimTime};
use crate::process::{Process, ProcessRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Policy {
    /// First-Come, First-Served: без вытеснения
    #[serde(rename = "FCFS")]
    Fcfs,
    /// Кратчайший остаток; пересчитывается каждый тик (по сути SRTF)
    #[serde(rename = "SJF")]
    Sjf,
    /// Меньшее значение приоритета важнее; с вытеснением
    Priority,
    /// Фиксированный квант, очередь ротации
    #[serde(rename = "RR")]
    RoundRobin,
}

impl Policy {
    pub fn is_preemptive(self) -> bool {
        !matches!(self, Policy::Fcfs)
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::Fcfs => "First-Come, First-Served",
            Policy::Sjf => "Shortest Job First",
            Policy::Priority => "Priority Scheduling",
            Policy::RoundRobin => "Round Robin",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let short = match self {
            Policy::Fcfs => "FCFS",
            Policy::Sjf => "SJF",
            Policy::Priority => "Priority",
            Policy::RoundRobin => "RR",
        };
        f.write_str(short)
    }
}

fn by_arrival(a: &Process, b: &Process) -> Ordering {
    a.arrival_time()
        .as_seconds()
        .total_cmp(&b.arrival_time().as_seconds())
        .then(a.id().cmp(&b.id()))
}

/// Выбрать процесс на текущий тик среди очереди ротации.
/// В очереди только прибывшие и незавершенные процессы.
pub fn select(
    policy: Policy,
    registry: &ProcessRegistry,
    rotation: &VecDeque<ProcessId>,
    current: Option<ProcessId>,
    now: SimTime,
) -> Option<ProcessId> {
    let mut candidates = rotation.iter().filter_map(|&id| registry.get(id).ok());

    match policy {
        Policy::Fcfs => {
            // Запущенный процесс работает до конца
            if let Some(running) = current.and_then(|id| registry.get(id).ok()) {
                if running.is_schedulable(now) {
                    return Some(running.id());
                }
            }
            candidates.min_by(|a, b| by_arrival(a, b)).map(Process::id)
        }
        Policy::Sjf => candidates
            .min_by(|a, b| {
                a.remaining_time()
                    .total_cmp(&b.remaining_time())
                    .then_with(|| by_arrival(a, b))
            })
            .map(Process::id),
        Policy::Priority => candidates
            .min_by(|a, b| a.priority().cmp(&b.priority()).then_with(|| by_arrival(a, b)))
            .map(Process::id),
        Policy::RoundRobin => candidates.next().map(Process::id),
    }
}
