//! Состояние симуляции и его операции
//!
//! `Simulator` владеет учетом ресурсов, реестром процессов, планировщиком и
//! журналом. Менять их можно только через методы ниже: каждая операция
//! либо применяется целиком вместе с пересчетом производных данных
//! (потребности, флага тупика, безопасности, счета), либо откатывается.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::{Duration, EventKind, ProcessId, ResourceId, SimTime, Timeline};
use crate::deadlock::{self, DeadlockReport};
use crate::process::{Process, ProcessRegistry, ProcessState};
use crate::resources::{Resource, ResourceLedger};
use crate::safety::{self, SafetyReport, SafetySnapshot};
use crate::scheduler::{Metrics, Policy, Scheduler, SchedulerConfig, TickOutcome};
use crate::score::{self, ScoreInputs};
use crate::{Result, SimError};

/// Снимок состояния для отрисовки или сохранения
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub time: SimTime,
    pub policy: Policy,
    pub running: Option<ProcessId>,
    pub processes: Vec<Process>,
    pub resources: Vec<Resource>,
    pub safety: SafetyReport,
    pub deadlock: DeadlockReport,
    pub score: u64,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    ledger: ResourceLedger,
    registry: ProcessRegistry,
    scheduler: Scheduler,
    timeline: Timeline,
    safety: SafetyReport,
    deadlock: DeadlockReport,
    level: u32,
    score: u64,
    /// Сколько раз флаг взаимоблокировки поднимался
    deadlocks_occurred: u32,
}

struct Checkpoint {
    ledger: ResourceLedger,
    registry: ProcessRegistry,
    scheduler: Scheduler,
    timeline_len: usize,
}

impl Simulator {
    pub fn new() -> Self {
        Self::from_scheduler(Scheduler::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        Ok(Self::from_scheduler(Scheduler::new(config)?))
    }

    fn from_scheduler(scheduler: Scheduler) -> Self {
        Self {
            ledger: ResourceLedger::new(),
            registry: ProcessRegistry::new(),
            scheduler,
            timeline: Timeline::new(),
            safety: SafetyReport { safe: true, progress: Vec::new(), stuck: Vec::new() },
            deadlock: DeadlockReport::default(),
            level: 1,
            score: 0,
            deadlocks_occurred: 0,
        }
    }

    // ---- построение сценария ----

    pub fn create_resource(&mut self, name: &str, total: u32) -> Result<ResourceId> {
        self.apply(|sim| sim.ledger.create(name, total))
    }

    /// Создать процесс с нулевым выделением. Максимум по ресурсу не может
    /// превышать его общий объем.
    pub fn create_process(
        &mut self,
        name: &str,
        arrival_time: f64,
        burst_time: f64,
        priority: i32,
        max_demand: BTreeMap<ResourceId, u32>,
    ) -> Result<ProcessId> {
        if !arrival_time.is_finite() || arrival_time < 0.0 {
            return Err(SimError::Configuration(format!(
                "process '{}' has invalid arrival time {}",
                name, arrival_time
            )));
        }
        for (&resource, &amount) in &max_demand {
            let total = self.ledger.get(resource)?.total();
            if amount > total {
                return Err(SimError::Configuration(format!(
                    "process '{}' declares max {} of {} but total is {}",
                    name, amount, resource, total
                )));
            }
        }

        self.apply(|sim| {
            let id = sim.registry.add(name, SimTime::new(arrival_time), burst_time, priority, max_demand.clone())?;
            for (&resource, &amount) in &max_demand {
                sim.ledger.set_maximum(resource, id, amount)?;
            }
            Ok(id)
        })
    }

    /// Удалить процесс, вернув все его ресурсы
    pub fn remove_process(&mut self, process: ProcessId) -> Result<Process> {
        self.apply(|sim| {
            sim.registry.get(process)?;
            sim.release_holdings(process)?;
            sim.ledger.forget(process);
            sim.scheduler.forget(process);
            let removed = sim.registry.remove(process)?;
            info!("Процесс {} удален", process);
            Ok(removed)
        })
    }

    // ---- мутации ----

    pub fn allocate(&mut self, process: ProcessId, resource: ResourceId, amount: u32) -> Result<()> {
        self.apply(|sim| sim.grant(process, resource, amount))
    }

    /// Освободить до `amount` единиц; возвращает фактически освобожденное
    pub fn release(&mut self, process: ProcessId, resource: ResourceId, amount: u32) -> Result<u32> {
        self.apply(|sim| {
            sim.registry.get(process)?;
            let released = sim.ledger.release(resource, process, amount)?;
            if released > 0 {
                sim.sync_allocation(process, resource)?;
                sim.timeline
                    .record(sim.now(), EventKind::Released { process, resource, amount: released });
                sim.retry_pending()?;
            }
            Ok(released)
        })
    }

    /// Запросить ресурс. Если хватает, выделяется сразу (`true`), иначе
    /// запрос запоминается, работающий процесс переходит в `Waiting`, а
    /// выдача повторяется при каждом освобождении (`false`).
    pub fn request(&mut self, process: ProcessId, resource: ResourceId, amount: u32) -> Result<bool> {
        self.apply(|sim| {
            let total = sim.ledger.get(resource)?.total();
            if amount > total {
                return Err(SimError::Configuration(format!(
                    "{} requests {} of {} but total is {}",
                    process, amount, resource, total
                )));
            }

            match sim.grant(process, resource, amount) {
                Ok(()) => Ok(true),
                Err(SimError::InsufficientResource { .. }) => {
                    sim.registry.add_pending(process, resource, amount)?;
                    let now = sim.now();
                    if sim.registry.get(process)?.state() == ProcessState::Running {
                        sim.change_state(process, ProcessState::Waiting)?;
                    }
                    sim.timeline.record(now, EventKind::Blocked { process, resource, amount });
                    debug!("{} ждет {} ед. {}", process, amount, resource);
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
    }

    pub fn set_maximum(&mut self, process: ProcessId, resource: ResourceId, amount: u32) -> Result<()> {
        self.apply(|sim| {
            sim.registry.get(process)?;
            sim.ledger.set_maximum(resource, process, amount)?;
            sim.registry.set_max(process, resource, amount)
        })
    }

    pub fn transition_state(&mut self, process: ProcessId, state: ProcessState) -> Result<()> {
        self.apply(|sim| sim.change_state(process, state))
    }

    /// Один тик планировщика
    pub fn run_tick(&mut self, delta: Duration) -> Result<TickOutcome> {
        self.apply(|sim| {
            let outcome = sim.scheduler.run_tick(&mut sim.registry, &mut sim.timeline, delta)?;
            if let Some(done) = outcome.completed {
                sim.release_holdings(done)?;
                sim.retry_pending()?;
            }
            Ok(outcome)
        })
    }

    /// Тик размером из настроек
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let delta = self.scheduler.config().tick;
        self.run_tick(delta)
    }

    /// Крутить тики, пока все не завершатся или часы не дойдут до `limit`
    pub fn run_to_completion(&mut self, limit: SimTime) -> Result<Option<Metrics>> {
        while !self.registry.all_finished() && self.now() < limit {
            self.tick()?;
        }
        Ok(self.compute_metrics())
    }

    // ---- запросы ----

    pub fn is_safe_state(&self) -> bool {
        self.safety.safe
    }

    pub fn compute_safe_sequence(&self) -> Vec<ProcessId> {
        self.safety.safe_sequence()
    }

    pub fn safety_report(&self) -> &SafetyReport {
        &self.safety
    }

    pub fn safety_snapshot(&self) -> SafetySnapshot {
        SafetySnapshot::capture(&self.ledger, &self.registry)
    }

    pub fn detect_deadlock(&self) -> &DeadlockReport {
        &self.deadlock
    }

    pub fn compute_metrics(&self) -> Option<Metrics> {
        Metrics::compute(&self.registry)
    }

    /// Проверка запроса по алгоритму банкира: останется ли система
    /// в безопасном состоянии, если выдать `amount` единиц сейчас.
    /// Запрос сверх остатка заявленного максимума считается ошибкой.
    pub fn check_request(&self, process: ProcessId, resource: ResourceId, amount: u32) -> Result<bool> {
        self.ledger.get(resource)?;
        let need = self.registry.get(process)?.need_of(resource);
        if amount > need {
            return Err(SimError::Configuration(format!(
                "{} requests {} of {} but its remaining claim is {}",
                process, amount, resource, need
            )));
        }

        let mut scratch = self.clone();
        match scratch.grant(process, resource, amount) {
            Ok(()) => {}
            Err(SimError::InsufficientResource { .. }) => return Ok(false),
            Err(e) => return Err(e),
        }
        let report = safety::analyze(&scratch.safety_snapshot())?;
        Ok(report.safe)
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn process(&self, id: ProcessId) -> Result<&Process> {
        self.registry.get(id)
    }

    pub fn resource(&self, id: ResourceId) -> Result<&Resource> {
        self.ledger.get(id)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn clear_timeline(&mut self) {
        self.timeline.clear();
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn deadlocks_occurred(&self) -> u32 {
        self.deadlocks_occurred
    }

    // ---- настройки и сброс ----

    pub fn set_policy(&mut self, policy: Policy) {
        self.scheduler.set_policy(policy);
    }

    pub fn set_quantum(&mut self, quantum: Duration) -> Result<()> {
        self.scheduler.set_quantum(quantum)
    }

    pub fn set_tick(&mut self, tick: Duration) -> Result<()> {
        self.scheduler.set_tick(tick)
    }

    pub fn set_level(&mut self, level: u32) {
        self.level = level.max(1);
        self.refresh_score();
    }

    /// Повторить прогон с теми же процессами: остатки и метки времени
    /// сбрасываются, выделения ресурсов сохраняются
    pub fn reset_run(&mut self) -> Result<()> {
        self.apply(|sim| {
            sim.registry.reset_run();
            sim.scheduler.reset();
            sim.timeline.clear();
            Ok(())
        })
    }

    /// Новая головоломка: все процессы и ресурсы удаляются
    pub fn reset(&mut self) {
        let config = *self.scheduler.config();
        let level = self.level;
        let deadlocks = self.deadlocks_occurred;
        *self = Self::from_scheduler(Scheduler::new(config).unwrap_or_default());
        self.level = level;
        self.deadlocks_occurred = deadlocks;
        info!("Симуляция сброшена");
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            time: self.now(),
            policy: self.scheduler.policy(),
            running: self.scheduler.current(),
            processes: self.registry.iter().cloned().collect(),
            resources: self.ledger.iter().cloned().collect(),
            safety: self.safety.clone(),
            deadlock: self.deadlock.clone(),
            score: self.score,
        }
    }

    /// Сводная статистика
    pub fn stats(&self) -> serde_json::Value {
        let metrics = self.compute_metrics();
        json!({
            "time": self.now().as_seconds(),
            "policy": self.scheduler.policy().to_string(),
            "processes": self.registry.len(),
            "finished": self.registry.iter().filter(|p| p.is_finished()).count(),
            "resources": self.ledger.get_stats(),
            "safe": self.safety.safe,
            "safe_sequence": self.compute_safe_sequence().iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            "deadlocked": self.deadlock.deadlocked,
            "deadlocks_occurred": self.deadlocks_occurred,
            "metrics": metrics,
            "score": self.score,
        })
    }

    // ---- внутреннее ----

    /// Применить операцию целиком или откатить ее
    fn apply<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = Checkpoint {
            ledger: self.ledger.clone(),
            registry: self.registry.clone(),
            scheduler: self.scheduler.clone(),
            timeline_len: self.timeline.len(),
        };

        let result = op(self).and_then(|value| self.settle().map(|()| value));
        if let Err(e) = &result {
            debug!("Операция отклонена: {}", e);
            self.ledger = checkpoint.ledger;
            self.registry = checkpoint.registry;
            self.scheduler = checkpoint.scheduler;
            self.timeline.truncate(checkpoint.timeline_len);
        }
        result
    }

    /// Проверка инвариантов и пересчет производных данных
    fn settle(&mut self) -> Result<()> {
        self.ledger.validate()?;
        self.registry.validate()?;
        self.check_consistency()?;

        let safety = safety::analyze(&self.safety_snapshot())?;
        if safety.safe != self.safety.safe {
            info!("Состояние стало {}", if safety.safe { "безопасным" } else { "небезопасным" });
        }
        self.safety = safety;

        let report = deadlock::detect(&self.ledger, &self.registry);
        if report.deadlocked && !self.deadlock.deadlocked {
            self.deadlocks_occurred += 1;
            warn!("Обнаружена возможная взаимоблокировка: {}", report);
        }
        self.deadlock = report;

        self.refresh_score();
        Ok(())
    }

    /// Учет ресурсов и реестр процессов должны описывать одни и те же выделения
    fn check_consistency(&self) -> Result<()> {
        for resource in self.ledger.iter() {
            for (&process, &held) in resource.allocated() {
                let recorded = self.registry.get(process).map(|p| p.allocation_of(resource.id()));
                if recorded.ok() != Some(held) {
                    return Err(SimError::InvariantViolation(format!(
                        "{} holds {} of {} in the ledger but the registry disagrees",
                        process,
                        held,
                        resource.id()
                    )));
                }
            }
        }
        for process in self.registry.iter() {
            for (&resource, &held) in process.allocation() {
                if self.ledger.get(resource)?.allocated_to(process.id()) != held {
                    return Err(SimError::InvariantViolation(format!(
                        "{} records {} of {} missing from the ledger",
                        process.id(),
                        held,
                        resource
                    )));
                }
            }
        }
        Ok(())
    }

    fn refresh_score(&mut self) {
        let metrics = self.compute_metrics();
        let input = ScoreInputs {
            level: self.level,
            cpu_utilization: metrics.map(|m| m.cpu_utilization).unwrap_or(0.0),
            deadlocked: self.deadlock.deadlocked,
            safe: self.safety.safe,
            avg_waiting: metrics.map(|m| m.avg_waiting),
            avg_turnaround: metrics.map(|m| m.avg_turnaround),
            processes: self.registry.len(),
            resources: self.ledger.len(),
            terminated: self
                .registry
                .iter()
                .filter(|p| p.state() == ProcessState::Terminated)
                .count(),
        };
        self.score = score::system_score(&input);
    }

    fn grant(&mut self, process: ProcessId, resource: ResourceId, amount: u32) -> Result<()> {
        if self.registry.get(process)?.state().is_terminal() {
            return Err(SimError::Configuration(format!("{} is terminated", process)));
        }
        self.ledger.allocate(resource, process, amount)?;
        if amount > 0 {
            self.sync_allocation(process, resource)?;
            self.timeline
                .record(self.now(), EventKind::Allocated { process, resource, amount });
        }
        Ok(())
    }

    fn sync_allocation(&mut self, process: ProcessId, resource: ResourceId) -> Result<()> {
        let held = self.ledger.get(resource)?.allocated_to(process);
        self.registry.set_allocation(process, resource, held)
    }

    /// Процессор один: в `Running` можно перевести процесс, только если
    /// никто другой сейчас не работает
    fn change_state(&mut self, process: ProcessId, state: ProcessState) -> Result<()> {
        let now = self.now();
        if state == ProcessState::Running {
            let busy = self
                .registry
                .iter()
                .find(|p| p.id() != process && p.state() == ProcessState::Running)
                .map(|p| p.id());
            if let Some(running) = busy {
                debug!("{} не может занять процессор: работает {}", process, running);
                return Err(SimError::InvalidTransition {
                    process,
                    from: self.registry.get(process)?.state(),
                    to: state,
                });
            }
        }

        let from = self.registry.transition(process, state, now)?;
        self.timeline
            .record(now, EventKind::StateChanged { process, from, to: state });
        if state == ProcessState::Running {
            self.scheduler.adopt(process);
        }
        if state == ProcessState::Terminated {
            self.release_holdings(process)?;
            self.retry_pending()?;
        }
        Ok(())
    }

    /// Вернуть в пул все, что держит процесс, и забыть его запросы
    fn release_holdings(&mut self, process: ProcessId) -> Result<()> {
        let now = self.now();
        for (resource, amount) in self.ledger.release_all(process)? {
            self.registry.set_allocation(process, resource, 0)?;
            self.timeline
                .record(now, EventKind::Released { process, resource, amount });
        }
        let pending: Vec<ResourceId> = self.registry.get(process)?.pending().keys().copied().collect();
        for resource in pending {
            self.registry.clear_pending(process, resource)?;
        }
        Ok(())
    }

    /// Повторить отложенные запросы в порядке процессов; процесс, получивший
    /// все, возвращается из `Waiting` в `Ready`
    fn retry_pending(&mut self) -> Result<()> {
        let waiting: Vec<(ProcessId, Vec<(ResourceId, u32)>)> = self
            .registry
            .iter()
            .filter(|p| !p.pending().is_empty() && !p.state().is_terminal())
            .map(|p| (p.id(), p.pending().iter().map(|(&r, &n)| (r, n)).collect()))
            .collect();

        for (process, requests) in waiting {
            for (resource, amount) in requests {
                if self.ledger.get(resource)?.available() >= amount {
                    self.grant(process, resource, amount)?;
                    self.registry.clear_pending(process, resource)?;
                    debug!("{} получил отложенные {} ед. {}", process, amount, resource);
                }
            }

            let unblocked = {
                let p = self.registry.get(process)?;
                p.pending().is_empty() && p.state() == ProcessState::Waiting
            };
            if unblocked {
                self.change_state(process, ProcessState::Ready)?;
            }
        }
        Ok(())
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
