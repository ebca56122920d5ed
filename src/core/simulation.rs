//! Источник тиков в реальном времени
//!
//! Разделяемый `Simulator` продвигается на один тик за период таймера.
//! Отмена проверяется только между тиками, так что остановленная
//! симуляция всегда остается в согласованном состоянии.

use std::sync::Arc;
use serde::{Serialize, Deserialize};
use tokio::sync::{watch, Mutex};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, debug};

use super::time::{SimTime, Duration};
use crate::scheduler::{Metrics, TickOutcome};
use crate::{SimError, Simulator};

/// Почему прогон остановился
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Все процессы завершены
    Completed,
    /// Часы дошли до конечного времени
    TimeLimit,
    /// Источник тиков остановлен извне
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub reason: StopReason,
    pub ticks: u64,
    pub time: SimTime,
    pub metrics: Option<Metrics>,
}

/// Драйвер симуляции поверх таймера tokio
pub struct Simulation {
    simulator: Arc<Mutex<Simulator>>,
    period: std::time::Duration,
}

impl Simulation {
    pub fn new(simulator: Simulator) -> Self {
        Self {
            simulator: Arc::new(Mutex::new(simulator)),
            period: std::time::Duration::from_millis(100),
        }
    }

    /// Реальное время между тиками (скорость анимации)
    pub fn with_period(mut self, period: std::time::Duration) -> Self {
        self.period = period;
        self
    }

    /// Общий доступ к состоянию (например, для отрисовки между тиками)
    pub fn handle(&self) -> Arc<Mutex<Simulator>> {
        self.simulator.clone()
    }

    pub async fn now(&self) -> SimTime {
        self.simulator.lock().await.now()
    }

    /// Один явный шаг
    pub async fn step(&self) -> Result<TickOutcome, SimError> {
        self.simulator.lock().await.tick()
    }

    /// Крутить тики до `end_time`, полного завершения или отмены.
    /// Для отмены в канал `cancel` отправляется `true`.
    pub async fn run_until(
        &self,
        end_time: SimTime,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, SimError> {
        info!("Запуск симуляции до времени {}", end_time);

        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancellable = true;
        let mut ticks = 0u64;

        let reason = loop {
            {
                let sim = self.simulator.lock().await;
                if sim.registry().all_finished() {
                    break StopReason::Completed;
                }
                if sim.now() >= end_time {
                    break StopReason::TimeLimit;
                }
            }
            if *cancel.borrow() {
                break StopReason::Cancelled;
            }

            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.simulator.lock().await.tick()?;
                    ticks += 1;
                    debug!("Тик {} в {}: {:?}", ticks, outcome.time, outcome.ran);
                }
                changed = cancel.changed(), if cancellable => {
                    // Отправитель исчез: отменять больше некому
                    if changed.is_err() {
                        cancellable = false;
                    }
                }
            }
        };

        let sim = self.simulator.lock().await;
        info!("Симуляция остановлена ({:?}). Время: {}", reason, sim.now());
        Ok(RunSummary {
            reason,
            ticks,
            time: sim.now(),
            metrics: sim.compute_metrics(),
        })
    }

    pub async fn run_for(
        &self,
        duration: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, SimError> {
        let end = self.now().await + duration;
        self.run_until(end, cancel).await
    }
}
