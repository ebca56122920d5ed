//! Анализ безопасности состояния (алгоритм банкира)
//!
//! Анализатор работает на матричном снимке и ничего не меняет в живом
//! состоянии. Порядок обхода процессов фиксирован (порядок строк снимка),
//! поэтому для одинаковых входов последовательность всегда одна и та же.

use serde::{Serialize, Deserialize};

use crate::core::ProcessId;
use crate::core::ResourceId;
use crate::process::ProcessRegistry;
use crate::resources::ResourceLedger;
use crate::{Result, SimError};

/// Матричный снимок: вектор свободных ресурсов, матрицы выделения и потребности.
/// Строки соответствуют `processes`, столбцы соответствуют `resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySnapshot {
    pub processes: Vec<ProcessId>,
    pub resources: Vec<ResourceId>,
    pub available: Vec<u32>,
    pub allocation: Vec<Vec<u32>>,
    pub need: Vec<Vec<u32>>,
}

impl SafetySnapshot {
    /// Снять снимок живого состояния. Завершенные процессы в анализ не входят.
    pub fn capture(ledger: &ResourceLedger, registry: &ProcessRegistry) -> Self {
        let resources = ledger.ids();
        let live: Vec<_> = registry.iter().filter(|p| !p.state().is_terminal()).collect();

        Self {
            processes: live.iter().map(|p| p.id()).collect(),
            available: ledger.available_vector(),
            allocation: live
                .iter()
                .map(|p| resources.iter().map(|&r| p.allocation_of(r)).collect())
                .collect(),
            need: live
                .iter()
                .map(|p| resources.iter().map(|&r| p.need_of(r)).collect())
                .collect(),
            resources,
        }
    }

    /// Проверить согласованность размеров матриц
    pub fn validate(&self) -> Result<()> {
        let n = self.processes.len();
        let m = self.resources.len();
        if self.available.len() != m
            || self.allocation.len() != n
            || self.need.len() != n
            || self.allocation.iter().chain(self.need.iter()).any(|row| row.len() != m)
        {
            return Err(SimError::InvariantViolation(format!(
                "safety snapshot dimensions do not match {} processes x {} resources",
                n, m
            )));
        }
        Ok(())
    }

    fn row_of(&self, process: ProcessId) -> Option<usize> {
        self.processes.iter().position(|&p| p == process)
    }

    fn fits(&self, row: usize, work: &[u32]) -> bool {
        self.need[row].iter().zip(work).all(|(&need, &free)| need <= free)
    }

    fn release_into(&self, row: usize, work: &mut [u32]) {
        for (free, &held) in work.iter_mut().zip(&self.allocation[row]) {
            *free += held;
        }
    }
}

/// Результат анализа
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub safe: bool,
    /// Процессы в порядке завершения. Если состояние небезопасно, здесь те, что
    /// успели завершиться до остановки.
    pub progress: Vec<ProcessId>,
    /// Процессы, которым ресурсов так и не хватило
    pub stuck: Vec<ProcessId>,
}

impl SafetyReport {
    /// Безопасная последовательность; пустая, если состояние небезопасно
    pub fn safe_sequence(&self) -> Vec<ProcessId> {
        if self.safe {
            self.progress.clone()
        } else {
            Vec::new()
        }
    }
}

/// Выполнить алгоритм банкира.
///
/// После каждого найденного процесса просмотр начинается заново с первой
/// строки: выбирается первый подходящий процесс в порядке снимка.
pub fn analyze(snapshot: &SafetySnapshot) -> Result<SafetyReport> {
    snapshot.validate()?;

    let mut work = snapshot.available.clone();
    let mut finish = vec![false; snapshot.processes.len()];
    let mut progress = Vec::with_capacity(finish.len());

    while let Some(row) = (0..finish.len()).find(|&i| !finish[i] && snapshot.fits(i, &work)) {
        finish[row] = true;
        snapshot.release_into(row, &mut work);
        progress.push(snapshot.processes[row]);
    }

    let stuck: Vec<ProcessId> = finish
        .iter()
        .zip(&snapshot.processes)
        .filter(|(&done, _)| !done)
        .map(|(_, &p)| p)
        .collect();

    Ok(SafetyReport {
        safe: stuck.is_empty(),
        progress,
        stuck,
    })
}

/// Почему предложенная последовательность не проходит
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceError {
    /// Процесс не входит в снимок
    UnknownProcess(ProcessId),
    /// Процесс встречается повторно
    Duplicate(ProcessId),
    /// На своем шаге процессу не хватило ресурса
    Blocked {
        step: usize,
        process: ProcessId,
        resource: ResourceId,
        need: u32,
        available: u32,
    },
    /// Последовательность закончилась, а эти процессы не завершены
    Incomplete(Vec<ProcessId>),
}

/// Проиграть последовательность: каждый процесс получает полную потребность
/// из текущего пула и затем возвращает все, что удерживал.
pub fn verify_sequence(snapshot: &SafetySnapshot, sequence: &[ProcessId]) -> Result<std::result::Result<(), SequenceError>> {
    snapshot.validate()?;

    let mut work = snapshot.available.clone();
    let mut finish = vec![false; snapshot.processes.len()];

    for (step, &process) in sequence.iter().enumerate() {
        let Some(row) = snapshot.row_of(process) else {
            return Ok(Err(SequenceError::UnknownProcess(process)));
        };
        if finish[row] {
            return Ok(Err(SequenceError::Duplicate(process)));
        }
        if let Some(col) = (0..work.len()).find(|&c| snapshot.need[row][c] > work[c]) {
            return Ok(Err(SequenceError::Blocked {
                step,
                process,
                resource: snapshot.resources[col],
                need: snapshot.need[row][col],
                available: work[col],
            }));
        }
        finish[row] = true;
        snapshot.release_into(row, &mut work);
    }

    let missing: Vec<ProcessId> = finish
        .iter()
        .zip(&snapshot.processes)
        .filter(|(&done, _)| !done)
        .map(|(_, &p)| p)
        .collect();

    if missing.is_empty() {
        Ok(Ok(()))
    } else {
        Ok(Err(SequenceError::Incomplete(missing)))
    }
}
