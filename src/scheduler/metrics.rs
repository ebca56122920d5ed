//! Итоговые метрики прогона

use serde::{Serialize, Deserialize};

use crate::process::ProcessRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub avg_waiting: f64,
    pub avg_turnaround: f64,
    pub avg_response: f64,
    /// Суммарное время работы / время последнего завершения (0..=1)
    pub cpu_utilization: f64,
    pub makespan: f64,
    pub completed: usize,
}

impl Metrics {
    /// Считаются только когда у каждого процесса есть `finish_time`
    pub fn compute(registry: &ProcessRegistry) -> Option<Metrics> {
        if registry.is_empty() || !registry.all_finished() {
            return None;
        }

        let n = registry.len() as f64;
        let mut waiting = 0.0;
        let mut turnaround = 0.0;
        let mut response = 0.0;
        let mut burst = 0.0;
        let mut makespan: f64 = 0.0;

        for p in registry.iter() {
            waiting += p.waiting_time().unwrap_or(0.0);
            turnaround += p.turnaround_time().unwrap_or(0.0);
            response += p.response_time().unwrap_or(0.0);
            burst += p.burst_time();
            if let Some(finish) = p.finish_time() {
                makespan = makespan.max(finish.as_seconds());
            }
        }

        Some(Metrics {
            avg_waiting: waiting / n,
            avg_turnaround: turnaround / n,
            avg_response: response / n,
            cpu_utilization: if makespan > 0.0 { burst / makespan } else { 0.0 },
            makespan,
            completed: registry.len(),
        })
    }

    /// Очки за прогон: чем меньше ожидание, оборот и отклик и чем выше
    /// загрузка процессора, тем больше
    pub fn scheduling_score(&self) -> f64 {
        let waiting = 100.0 - self.avg_waiting * 10.0;
        let turnaround = 100.0 - self.avg_turnaround * 5.0;
        let response = 100.0 - self.avg_response * 10.0;
        waiting + turnaround + response + self.cpu_utilization * 100.0
    }
}
