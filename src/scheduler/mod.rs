//! Движок планирования процессора
//!
//! Однопоточное пошаговое моделирование: каждый вызов `run_tick` целиком
//! применяет один тик. Между тиками состояние всегда согласовано, поэтому
//! остановка источника тиков в любой момент безопасна.

mod metrics;
mod policy;

pub use metrics::Metrics;
pub use policy::{select, Policy};

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::{Duration, EventKind, ProcessId, SimTime, Timeline};
use crate::process::{ProcessRegistry, ProcessState};
use crate::{Result, SimError};

/// Настройки планировщика
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub policy: Policy,
    /// Квант Round Robin
    pub quantum: Duration,
    /// Размер тика по умолчанию
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Fcfs,
            quantum: Duration::from_seconds(2.0),
            tick: Duration::from_seconds(1.0),
        }
    }
}

/// Что произошло за тик
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// Начало тика
    pub time: SimTime,
    /// Кто работал (None при простое)
    pub ran: Option<ProcessId>,
    /// Кто завершился в этом тике
    pub completed: Option<ProcessId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scheduler {
    config: SchedulerConfig,
    clock: SimTime,
    /// Очередь ротации: прибывшие незавершенные процессы в порядке постановки
    rotation: VecDeque<ProcessId>,
    current: Option<ProcessId>,
    /// Сколько текущий процесс отработал с последней постановки на процессор
    slice: f64,
    busy_time: f64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        validate_duration("quantum", config.quantum)?;
        validate_duration("tick", config.tick)?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn policy(&self) -> Policy {
        self.config.policy
    }

    pub fn now(&self) -> SimTime {
        self.clock
    }

    pub fn current(&self) -> Option<ProcessId> {
        self.current
    }

    pub fn rotation(&self) -> &VecDeque<ProcessId> {
        &self.rotation
    }

    /// Время, когда процессор был занят
    pub fn busy_time(&self) -> f64 {
        self.busy_time
    }

    pub fn set_policy(&mut self, policy: Policy) {
        if policy != self.config.policy {
            info!("Смена политики планирования: {} -> {}", self.config.policy, policy);
            self.config.policy = policy;
        }
    }

    pub fn set_quantum(&mut self, quantum: Duration) -> Result<()> {
        validate_duration("quantum", quantum)?;
        self.config.quantum = quantum;
        Ok(())
    }

    pub fn set_tick(&mut self, tick: Duration) -> Result<()> {
        validate_duration("tick", tick)?;
        self.config.tick = tick;
        Ok(())
    }

    /// Вернуть часы к нулю и забыть очередь; настройки сохраняются
    pub fn reset(&mut self) {
        self.clock = SimTime::ZERO;
        self.rotation.clear();
        self.current = None;
        self.slice = 0.0;
        self.busy_time = 0.0;
    }

    /// Процесс поставлен на процессор вручную: дальше планировщик считает
    /// его текущим и при необходимости вытеснит на следующем тике
    pub fn adopt(&mut self, process: ProcessId) {
        if self.current != Some(process) {
            self.current = Some(process);
            self.slice = 0.0;
        }
    }

    /// Забыть процесс (удален из реестра)
    pub fn forget(&mut self, process: ProcessId) {
        self.rotation.retain(|&p| p != process);
        if self.current == Some(process) {
            self.current = None;
            self.slice = 0.0;
        }
    }

    /// Выполнить один тик длиной `delta`
    pub fn run_tick(
        &mut self,
        registry: &mut ProcessRegistry,
        timeline: &mut Timeline,
        delta: Duration,
    ) -> Result<TickOutcome> {
        validate_duration("tick", delta)?;
        let now = self.clock;

        self.admit_arrivals(registry, timeline, now)?;
        self.sync_rotation(registry, now);
        if self.config.policy == Policy::RoundRobin {
            self.rotate_expired(registry);
        }

        let selected = select(self.config.policy, registry, &self.rotation, self.current, now);

        if let Some(previous) = self.current.take() {
            if Some(previous) != selected {
                self.slice = 0.0;
                let still_running = registry
                    .get(previous)
                    .map(|p| p.state() == ProcessState::Running)
                    .unwrap_or(false);
                if still_running {
                    registry.transition(previous, ProcessState::Ready, now)?;
                    timeline.record(now, EventKind::Preempted(previous));
                    debug!("{} вытеснен в {}", previous, now);
                }
            }
        }

        let Some(pid) = selected else {
            timeline.record(now, EventKind::Idle { length: delta });
            self.clock += delta;
            return Ok(TickOutcome { time: now, ran: None, completed: None });
        };

        if registry.get(pid)?.state() != ProcessState::Running {
            registry.transition(pid, ProcessState::Running, now)?;
            self.slice = 0.0;
        }
        self.current = Some(pid);
        timeline.record(now, EventKind::Dispatched { process: pid, length: delta });

        let process = registry.get_mut(pid)?;
        let used = process.consume(delta.as_seconds());
        let finished = process.remaining_time() <= 0.0;
        self.slice += used;
        self.busy_time += used;

        let mut completed = None;
        if finished {
            let finish_at = now + SimTime::new(used);
            registry.transition(pid, ProcessState::Terminated, finish_at)?;
            timeline.record(finish_at, EventKind::Completed(pid));
            self.rotation.retain(|&p| p != pid);
            self.current = None;
            self.slice = 0.0;
            completed = Some(pid);
            info!("{} завершен в {}", pid, finish_at);
        }

        self.clock += delta;
        Ok(TickOutcome { time: now, ran: Some(pid), completed })
    }

    /// `New -> Ready` для всех прибывших
    fn admit_arrivals(&mut self, registry: &mut ProcessRegistry, timeline: &mut Timeline, now: SimTime) -> Result<()> {
        let arrived: Vec<ProcessId> = registry
            .iter()
            .filter(|p| p.state() == ProcessState::New && p.has_arrived(now))
            .map(|p| p.id())
            .collect();

        for pid in arrived {
            registry.transition(pid, ProcessState::Ready, now)?;
            timeline.record(
                now,
                EventKind::StateChanged { process: pid, from: ProcessState::New, to: ProcessState::Ready },
            );
        }
        Ok(())
    }

    /// Убрать из очереди неготовых, добавить в хвост новых (по времени прибытия)
    fn sync_rotation(&mut self, registry: &ProcessRegistry, now: SimTime) {
        self.rotation
            .retain(|&pid| registry.get(pid).map(|p| p.is_schedulable(now)).unwrap_or(false));

        let mut fresh: Vec<_> = registry
            .iter()
            .filter(|p| p.is_schedulable(now) && !self.rotation.contains(&p.id()))
            .collect();
        fresh.sort_by(|a, b| {
            a.arrival_time()
                .as_seconds()
                .total_cmp(&b.arrival_time().as_seconds())
                .then(a.id().cmp(&b.id()))
        });
        let fresh: Vec<ProcessId> = fresh.into_iter().map(|p| p.id()).collect();
        self.rotation.extend(fresh);
    }

    /// Процесс, исчерпавший квант и не завершившийся, уходит в хвост
    fn rotate_expired(&mut self, registry: &ProcessRegistry) {
        let Some(pid) = self.current else { return };
        if self.slice + crate::core::EPSILON < self.config.quantum.as_seconds() {
            return;
        }
        let unfinished = registry.get(pid).map(|p| !p.is_finished()).unwrap_or(false);
        if unfinished && self.rotation.front() == Some(&pid) {
            self.rotation.pop_front();
            self.rotation.push_back(pid);
            self.slice = 0.0;
            debug!("{} исчерпал квант, в хвост очереди", pid);
        }
    }
}

fn validate_duration(what: &str, value: Duration) -> Result<()> {
    if value.is_zero() || !value.as_seconds().is_finite() {
        return Err(SimError::Configuration(format!("{} must be positive, got {}", what, value)));
    }
    Ok(())
}
