//! Подсчет очков и прогресс игрока

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use tracing::info;

/// Опыт за первое прохождение испытания
pub const CHALLENGE_EXPERIENCE: u64 = 100;
/// Опыта на уровень
pub const EXPERIENCE_PER_LEVEL: u64 = 500;

/// Входные данные для общего счета системы
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub level: u32,
    /// Загрузка процессора, 0..=1 (0, пока метрики не посчитаны)
    pub cpu_utilization: f64,
    pub deadlocked: bool,
    pub safe: bool,
    pub avg_waiting: Option<f64>,
    pub avg_turnaround: Option<f64>,
    pub processes: usize,
    pub resources: usize,
    pub terminated: usize,
}

fn inverse_bonus(numerator: f64, average: Option<f64>) -> i64 {
    match average {
        Some(avg) if avg > 0.0 => (numerator / avg).round() as i64,
        _ => 0,
    }
}

/// Общий счет системы, пересчитывается после каждой мутации
pub fn system_score(input: &ScoreInputs) -> u64 {
    let level = input.level as i64;

    let utilization = (input.cpu_utilization * 100.0 * (level * 10) as f64).round() as i64;
    let deadlock_penalty = if input.deadlocked { -100 * level } else { 0 };
    let waiting_bonus = inverse_bonus(100.0, input.avg_waiting);
    let turnaround_bonus = inverse_bonus(200.0, input.avg_turnaround);
    let complexity = input.processes as i64 * 5 + input.resources as i64 * 10;
    let safe_bonus = if input.safe { 50 * level } else { 0 };
    let completed = input.terminated as i64 * 25;

    let total = utilization
        + deadlock_penalty
        + waiting_bonus
        + turnaround_bonus
        + complexity
        + safe_bonus
        + completed;
    total.max(0) as u64
}

/// Очки за решенное испытание: бонус уровня и времени минус штраф за попытки
pub fn challenge_score(level: u32, elapsed_secs: u64, previous_attempts: u32) -> u64 {
    let time_bonus = 300i64.saturating_sub(elapsed_secs as i64).max(0);
    let attempt_penalty = previous_attempts as i64 * 20;
    let score = level as i64 * 50 + time_bonus - attempt_penalty;
    score.max(50) as u64
}

/// Прогресс игрока: опыт, уровень, пройденные испытания
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    experience: u64,
    level: u32,
    score: u64,
    completed: BTreeSet<String>,
    deadlocks_occurred: u32,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            experience: 0,
            level: 1,
            score: 0,
            completed: BTreeSet::new(),
            deadlocks_occurred: 0,
        }
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn experience(&self) -> u64 {
        self.experience
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn deadlocks_occurred(&self) -> u32 {
        self.deadlocks_occurred
    }

    pub fn is_completed(&self, challenge: &str) -> bool {
        self.completed.contains(challenge)
    }

    /// Уровень растет каждые 500 очков опыта
    pub fn add_experience(&mut self, amount: u64) {
        self.experience += amount;
        let level = (self.experience / EXPERIENCE_PER_LEVEL) as u32 + 1;
        if level > self.level {
            info!("Новый уровень: {} (опыт: {})", level, self.experience);
        }
        self.level = level;
    }

    /// Засчитать испытание. Повторное прохождение ничего не дает.
    /// Возвращает начисленные очки.
    pub fn complete_challenge(&mut self, id: &str, level: u32, elapsed_secs: u64, previous_attempts: u32) -> u64 {
        if !self.completed.insert(id.to_string()) {
            return 0;
        }

        let score = challenge_score(level, elapsed_secs, previous_attempts);
        self.score += score;
        self.add_experience(CHALLENGE_EXPERIENCE + score / 10);
        info!("Испытание {} пройдено: +{} очков", id, score);
        score
    }

    pub fn record_deadlock(&mut self) {
        self.deadlocks_occurred += 1;
    }
}
