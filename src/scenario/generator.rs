//! Случайная генерация головоломок в три фазы: сгенерировать,
//! классифицировать, при необходимости подправить

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use super::ProcessSpec;
use super::puzzle::PuzzleLevel;
use crate::core::{ProcessId, ResourceId};
use crate::safety::{self, SafetyReport, SafetySnapshot};
use crate::Result;

const RESOURCE_NAMES: [&str; 4] = ["A", "B", "C", "D"];

/// Головоломка алгоритма банкира: снимок плюс общие объемы и максимумы
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankersPuzzle {
    pub resource_names: Vec<String>,
    pub totals: Vec<u32>,
    pub max: Vec<Vec<u32>>,
    pub snapshot: SafetySnapshot,
}

impl BankersPuzzle {
    pub fn process_count(&self) -> usize {
        self.snapshot.processes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.snapshot.resources.len()
    }

    /// Задать потребность процесса `row` по ресурсу `col`; максимум
    /// пересчитывается как выделение + потребность
    pub fn set_need(&mut self, row: usize, col: usize, need: u32) {
        self.snapshot.need[row][col] = need;
        self.max[row][col] = self.snapshot.allocation[row][col] + need;
    }
}

pub struct PuzzleGenerator {
    rng: StdRng,
}

impl PuzzleGenerator {
    /// Воспроизводимый генератор
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Фаза 1: случайные объемы (5..=9), максимумы (1..объем) и выделения
    /// (меньше максимума и не больше того, что осталось в пуле)
    pub fn generate(&mut self, processes: usize, resources: usize) -> BankersPuzzle {
        let totals: Vec<u32> = (0..resources).map(|_| self.rng.gen_range(5..=9)).collect();
        let mut pool = totals.clone();
        let mut max = Vec::with_capacity(processes);
        let mut allocation = Vec::with_capacity(processes);

        for _ in 0..processes {
            let mut max_row = Vec::with_capacity(resources);
            let mut alloc_row = Vec::with_capacity(resources);
            for (col, &total) in totals.iter().enumerate() {
                let m = self.rng.gen_range(1..total);
                let a = self.rng.gen_range(0..m).min(pool[col]);
                pool[col] -= a;
                max_row.push(m);
                alloc_row.push(a);
            }
            max.push(max_row);
            allocation.push(alloc_row);
        }

        let need = max
            .iter()
            .zip(&allocation)
            .map(|(m, a)| m.iter().zip(a).map(|(&m, &a)| m - a).collect())
            .collect();

        let resource_names = (0..resources)
            .map(|i| RESOURCE_NAMES.get(i).map(|s| s.to_string()).unwrap_or_else(|| format!("R{}", i)))
            .collect();

        debug!("Сгенерирована головоломка {}x{}", processes, resources);
        BankersPuzzle {
            resource_names,
            totals,
            max,
            snapshot: SafetySnapshot {
                processes: (0..processes as u32).map(ProcessId).collect(),
                resources: (0..resources as u32).map(ResourceId).collect(),
                available: pool,
                allocation,
                need,
            },
        }
    }

    /// Фаза 2: безопасно ли состояние
    pub fn classify(puzzle: &BankersPuzzle) -> Result<SafetyReport> {
        safety::analyze(&puzzle.snapshot)
    }

    /// Фаза 3: сделать состояние небезопасным. Сначала первому процессу
    /// по первому ресурсу нужно на единицу больше свободного; если другие
    /// процессы все равно успевают вернуть достаточно, потребность
    /// поднимается выше всего, что пул способен вернуть.
    /// Возвращает `true`, если головоломка изменилась.
    pub fn adjust(puzzle: &mut BankersPuzzle) -> Result<bool> {
        if puzzle.process_count() == 0 || puzzle.resource_count() == 0 {
            return Ok(false);
        }
        if !Self::classify(puzzle)?.safe {
            return Ok(false);
        }

        let available = puzzle.snapshot.available[0];
        puzzle.set_need(0, 0, available + 1);
        if Self::classify(puzzle)?.safe {
            let unreachable = puzzle.totals[0] - puzzle.snapshot.allocation[0][0] + 1;
            puzzle.set_need(0, 0, unreachable);
        }
        Ok(true)
    }

    /// Все три фазы для уровня: выше первого уровня состояние
    /// гарантированно небезопасно
    pub fn generate_for(&mut self, level: &PuzzleLevel) -> Result<BankersPuzzle> {
        let mut puzzle = self.generate(level.processes, level.resources);
        let report = Self::classify(&puzzle)?;
        if level.id > 1 && Self::adjust(&mut puzzle)? {
            info!("Уровень {}: состояние было безопасным ({:?}), подправлено", level.id, report.progress);
        }
        Ok(puzzle)
    }

    /// Случайная нагрузка для планировщика: приоритет 1..=10, работа 5..=14
    pub fn workload(&mut self, count: usize) -> Vec<ProcessSpec> {
        let mut arrival = 0.0;
        (0..count)
            .map(|i| {
                let spec = ProcessSpec {
                    name: format!("P{}", i + 1),
                    arrival,
                    burst: self.rng.gen_range(5..=14) as f64,
                    priority: self.rng.gen_range(1..=10),
                    max: Default::default(),
                    allocation: Default::default(),
                };
                arrival += self.rng.gen_range(0..=3) as f64;
                spec
            })
            .collect()
    }
}
