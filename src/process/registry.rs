//! Реестр процессов

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use tracing::debug;

use super::state::ProcessState;
use crate::core::{ProcessId, ResourceId, SimTime, EPSILON};
use crate::{Result, SimError};

/// Процесс симуляции
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    id: ProcessId,
    name: String,
    state: ProcessState,
    /// Меньше = важнее
    priority: i32,
    arrival_time: SimTime,
    burst_time: f64,
    remaining_time: f64,
    allocation: BTreeMap<ResourceId, u32>,
    max: BTreeMap<ResourceId, u32>,
    /// `max - allocation`, не меньше нуля; нулевые записи не хранятся
    need: BTreeMap<ResourceId, u32>,
    /// Неудовлетворенные запросы, на которых процесс заблокирован
    pending: BTreeMap<ResourceId, u32>,
    start_time: Option<SimTime>,
    finish_time: Option<SimTime>,
    waiting_time: Option<f64>,
    turnaround_time: Option<f64>,
    response_time: Option<f64>,
}

impl Process {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn arrival_time(&self) -> SimTime {
        self.arrival_time
    }

    pub fn burst_time(&self) -> f64 {
        self.burst_time
    }

    pub fn remaining_time(&self) -> f64 {
        self.remaining_time
    }

    pub fn allocation(&self) -> &BTreeMap<ResourceId, u32> {
        &self.allocation
    }

    pub fn allocation_of(&self, resource: ResourceId) -> u32 {
        self.allocation.get(&resource).copied().unwrap_or(0)
    }

    pub fn max(&self) -> &BTreeMap<ResourceId, u32> {
        &self.max
    }

    pub fn need(&self) -> &BTreeMap<ResourceId, u32> {
        &self.need
    }

    pub fn need_of(&self, resource: ResourceId) -> u32 {
        self.need.get(&resource).copied().unwrap_or(0)
    }

    pub fn pending(&self) -> &BTreeMap<ResourceId, u32> {
        &self.pending
    }

    pub fn start_time(&self) -> Option<SimTime> {
        self.start_time
    }

    pub fn finish_time(&self) -> Option<SimTime> {
        self.finish_time
    }

    pub fn waiting_time(&self) -> Option<f64> {
        self.waiting_time
    }

    pub fn turnaround_time(&self) -> Option<f64> {
        self.turnaround_time
    }

    pub fn response_time(&self) -> Option<f64> {
        self.response_time
    }

    pub fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }

    /// Прибыл ли процесс к моменту `now`
    pub fn has_arrived(&self, now: SimTime) -> bool {
        now.reached(self.arrival_time)
    }

    /// Может ли планировщик выбрать процесс
    pub fn is_schedulable(&self, now: SimTime) -> bool {
        self.has_arrived(now)
            && !self.is_finished()
            && matches!(self.state, ProcessState::New | ProcessState::Ready | ProcessState::Running)
    }

    fn recompute_need(&mut self) {
        let keys: BTreeSet<ResourceId> = self.max.keys().chain(self.allocation.keys()).copied().collect();
        self.need = keys
            .into_iter()
            .filter_map(|r| {
                let need = self
                    .max
                    .get(&r)
                    .copied()
                    .unwrap_or(0)
                    .saturating_sub(self.allocation_of(r));
                (need > 0).then_some((r, need))
            })
            .collect();
    }

    fn validate(&self) -> Result<()> {
        for (r, &max) in &self.max {
            let expected = max.saturating_sub(self.allocation_of(*r));
            if self.need_of(*r) != expected {
                return Err(SimError::InvariantViolation(format!(
                    "{}: need[{}] = {}, expected {}",
                    self.id, r, self.need_of(*r), expected
                )));
            }
        }
        if self.need.keys().any(|r| !self.max.contains_key(r)) {
            return Err(SimError::InvariantViolation(format!("{}: need without declared max", self.id)));
        }
        if self.remaining_time < -EPSILON || self.remaining_time > self.burst_time + EPSILON {
            return Err(SimError::InvariantViolation(format!(
                "{}: remaining {} outside [0, {}]",
                self.id, self.remaining_time, self.burst_time
            )));
        }
        Ok(())
    }

    /// Списать до `amount` процессорного времени. Возвращает списанное.
    pub(crate) fn consume(&mut self, amount: f64) -> f64 {
        let used = amount.min(self.remaining_time).max(0.0);
        self.remaining_time -= used;
        if self.remaining_time <= EPSILON {
            self.remaining_time = 0.0;
        }
        used
    }

    fn stamp_finish(&mut self, now: SimTime) {
        let turnaround = now.since(self.arrival_time);
        let executed = self.burst_time - self.remaining_time;
        self.finish_time = Some(now);
        self.turnaround_time = Some(turnaround);
        self.waiting_time = Some((turnaround - executed).max(0.0));
    }
}

/// Реестр процессов: идентичность, состояние, векторы выделения и потребности
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRegistry {
    processes: BTreeMap<ProcessId, Process>,
    next_id: u32,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить процесс в состоянии `New` с нулевым выделением
    pub fn add(
        &mut self,
        name: &str,
        arrival_time: SimTime,
        burst_time: f64,
        priority: i32,
        max: BTreeMap<ResourceId, u32>,
    ) -> Result<ProcessId> {
        if !burst_time.is_finite() || burst_time <= 0.0 {
            return Err(SimError::Configuration(format!(
                "process '{}' must have a positive burst time, got {}",
                name, burst_time
            )));
        }

        let id = ProcessId(self.next_id);
        self.next_id += 1;

        let mut process = Process {
            id,
            name: name.to_string(),
            state: ProcessState::New,
            priority,
            arrival_time,
            burst_time,
            remaining_time: burst_time,
            allocation: BTreeMap::new(),
            max: max.into_iter().filter(|&(_, n)| n > 0).collect(),
            need: BTreeMap::new(),
            pending: BTreeMap::new(),
            start_time: None,
            finish_time: None,
            waiting_time: None,
            turnaround_time: None,
            response_time: None,
        };
        process.recompute_need();

        debug!("Создан процесс {} '{}' (прибытие: {}, работа: {})", id, name, arrival_time, burst_time);
        self.processes.insert(id, process);
        Ok(id)
    }

    pub fn remove(&mut self, id: ProcessId) -> Result<Process> {
        self.processes.remove(&id).ok_or(SimError::UnknownProcess(id))
    }

    pub fn get(&self, id: ProcessId) -> Result<&Process> {
        self.processes.get(&id).ok_or(SimError::UnknownProcess(id))
    }

    pub(crate) fn get_mut(&mut self, id: ProcessId) -> Result<&mut Process> {
        self.processes.get_mut(&id).ok_or(SimError::UnknownProcess(id))
    }

    pub fn contains(&self, id: ProcessId) -> bool {
        self.processes.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn ids(&self) -> Vec<ProcessId> {
        self.processes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Все ли процессы получили `finish_time`
    pub fn all_finished(&self) -> bool {
        self.processes.values().all(Process::is_finished)
    }

    /// Сменить состояние с проверкой по автомату. Первый вход в `Running`
    /// фиксирует время старта и отклика, вход в `Terminated` фиксирует время
    /// завершения и производные метрики.
    pub fn transition(&mut self, id: ProcessId, next: ProcessState, now: SimTime) -> Result<ProcessState> {
        let process = self.get_mut(id)?;
        let from = process.state;
        if !from.can_transition_to(next) {
            return Err(SimError::InvalidTransition { process: id, from, to: next });
        }

        process.state = next;
        match next {
            ProcessState::Running if process.start_time.is_none() => {
                process.start_time = Some(now);
                process.response_time = Some(now.since(process.arrival_time));
            }
            ProcessState::Terminated => process.stamp_finish(now),
            _ => {}
        }

        debug!("Процесс {}: {} -> {} в {}", id, from, next, now);
        Ok(from)
    }

    /// Записать текущее выделение процессу по ресурсу и пересчитать `need`
    pub fn set_allocation(&mut self, id: ProcessId, resource: ResourceId, amount: u32) -> Result<()> {
        let process = self.get_mut(id)?;
        if amount == 0 {
            process.allocation.remove(&resource);
        } else {
            process.allocation.insert(resource, amount);
        }
        process.recompute_need();
        Ok(())
    }

    /// Задать максимум по ресурсу и пересчитать `need`
    pub fn set_max(&mut self, id: ProcessId, resource: ResourceId, amount: u32) -> Result<()> {
        let process = self.get_mut(id)?;
        if amount == 0 {
            process.max.remove(&resource);
        } else {
            process.max.insert(resource, amount);
        }
        process.recompute_need();
        Ok(())
    }

    pub fn add_pending(&mut self, id: ProcessId, resource: ResourceId, amount: u32) -> Result<()> {
        let process = self.get_mut(id)?;
        *process.pending.entry(resource).or_insert(0) += amount;
        Ok(())
    }

    pub fn clear_pending(&mut self, id: ProcessId, resource: ResourceId) -> Result<()> {
        self.get_mut(id)?.pending.remove(&resource);
        Ok(())
    }

    /// Сбросить прогон: вернуть остаток к полному времени работы и очистить
    /// временные метки. Процессы возвращаются в `New`.
    pub fn reset_run(&mut self) {
        for process in self.processes.values_mut() {
            process.state = ProcessState::New;
            process.remaining_time = process.burst_time;
            process.pending.clear();
            process.start_time = None;
            process.finish_time = None;
            process.waiting_time = None;
            process.turnaround_time = None;
            process.response_time = None;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.processes.values().try_for_each(Process::validate)
    }
}
