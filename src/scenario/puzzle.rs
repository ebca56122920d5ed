//! Игровая сессия над головоломкой банкира: игрок сам выбирает,
//! какой процесс выполнить следующим

use serde::Serialize;
use tracing::{debug, info};

use super::generator::BankersPuzzle;
use crate::core::ProcessId;
use crate::safety;
use crate::{Result, SimError};

const HINTS_PER_SESSION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PuzzleLevel {
    pub id: u32,
    pub name: &'static str,
    pub processes: usize,
    pub resources: usize,
    /// Секунды
    pub time_limit: f64,
    pub min_moves: u32,
}

pub const PUZZLE_LEVELS: [PuzzleLevel; 5] = [
    PuzzleLevel { id: 1, name: "Safe Escape", processes: 3, resources: 2, time_limit: 120.0, min_moves: 3 },
    PuzzleLevel { id: 2, name: "Double Trouble", processes: 4, resources: 2, time_limit: 180.0, min_moves: 4 },
    PuzzleLevel { id: 3, name: "Hidden Trap", processes: 4, resources: 3, time_limit: 240.0, min_moves: 4 },
    PuzzleLevel { id: 4, name: "Chain Reaction", processes: 5, resources: 3, time_limit: 300.0, min_moves: 5 },
    PuzzleLevel { id: 5, name: "Minimal Moves", processes: 5, resources: 4, time_limit: 360.0, min_moves: 5 },
];

#[derive(Debug, Clone)]
pub struct PuzzleSession {
    level: PuzzleLevel,
    puzzle: BankersPuzzle,
    work: Vec<u32>,
    finished: Vec<bool>,
    sequence: Vec<ProcessId>,
    moves: u32,
    hints_used: u32,
    elapsed: f64,
}

impl PuzzleSession {
    /// Размеры матриц головоломки проверяются заранее
    pub fn new(level: PuzzleLevel, puzzle: BankersPuzzle) -> Result<Self> {
        puzzle.snapshot.validate()?;
        let (n, m) = (puzzle.process_count(), puzzle.resource_count());
        if puzzle.totals.len() != m || puzzle.max.len() != n || puzzle.max.iter().any(|row| row.len() != m) {
            return Err(SimError::Configuration(format!(
                "puzzle totals and max do not match {} processes x {} resources",
                n, m
            )));
        }

        let work = puzzle.snapshot.available.clone();
        let finished = vec![false; n];
        Ok(Self {
            level,
            puzzle,
            work,
            finished,
            sequence: Vec::new(),
            moves: 0,
            hints_used: 0,
            elapsed: 0.0,
        })
    }

    pub fn puzzle(&self) -> &BankersPuzzle {
        &self.puzzle
    }

    pub fn available(&self) -> &[u32] {
        &self.work
    }

    pub fn sequence(&self) -> &[ProcessId] {
        &self.sequence
    }

    pub fn moves(&self) -> u32 {
        self.moves
    }

    pub fn hints_left(&self) -> u32 {
        HINTS_PER_SESSION - self.hints_used
    }

    pub fn is_won(&self) -> bool {
        self.finished.iter().all(|&f| f)
    }

    pub fn is_timed_out(&self) -> bool {
        self.elapsed >= self.level.time_limit
    }

    pub fn advance(&mut self, seconds: f64) {
        self.elapsed += seconds.max(0.0);
    }

    /// Выполнить процесс: его потребность должна уместиться в текущий пул,
    /// после чего все его выделение возвращается. Повторный вызов для
    /// завершенного процесса ничего не делает и возвращает `false`.
    pub fn execute(&mut self, process: ProcessId) -> Result<bool> {
        let row = self
            .puzzle
            .snapshot
            .processes
            .iter()
            .position(|&p| p == process)
            .ok_or(SimError::UnknownProcess(process))?;
        if self.finished[row] {
            return Ok(false);
        }

        let snapshot = &self.puzzle.snapshot;
        if let Some(col) = (0..self.work.len()).find(|&c| snapshot.need[row][c] > self.work[c]) {
            return Err(SimError::InsufficientResource {
                resource: snapshot.resources[col],
                requested: snapshot.need[row][col],
                available: self.work[col],
            });
        }

        for (free, &held) in self.work.iter_mut().zip(&snapshot.allocation[row]) {
            *free += held;
        }
        self.finished[row] = true;
        self.sequence.push(process);
        self.moves += 1;
        debug!("Выполнен {} (ход {})", process, self.moves);

        if self.is_won() {
            info!("Головоломка решена за {} ходов: {:?}", self.moves, self.sequence);
        }
        Ok(true)
    }

    /// Вернуть головоломку в исходное состояние; считается ходом
    pub fn reset(&mut self) {
        self.work = self.puzzle.snapshot.available.clone();
        self.finished.iter_mut().for_each(|f| *f = false);
        self.sequence.clear();
        self.moves += 1;
    }

    /// Подсказка из текущего состояния; `None`, если подсказки кончились
    pub fn hint(&mut self) -> Result<Option<String>> {
        if self.hints_used >= HINTS_PER_SESSION {
            return Ok(None);
        }
        self.hints_used += 1;

        let mut remaining = self.puzzle.snapshot.clone();
        remaining.available = self.work.clone();
        let keep: Vec<usize> = (0..self.finished.len()).filter(|&i| !self.finished[i]).collect();
        remaining.processes = keep.iter().map(|&i| remaining.processes[i]).collect();
        remaining.allocation = keep.iter().map(|&i| remaining.allocation[i].clone()).collect();
        remaining.need = keep.iter().map(|&i| remaining.need[i].clone()).collect();

        let report = safety::analyze(&remaining)?;
        let text = match report.progress.first() {
            Some(next) if report.safe => format!("Try executing {} next.", next),
            _ => "Look for processes that need more resources than available. \
                  Try executing processes in a different order."
                .to_string(),
        };
        Ok(Some(text))
    }

    /// Итоговый счет; `None`, пока головоломка не решена
    pub fn final_score(&self) -> Option<u64> {
        if !self.is_won() {
            return None;
        }
        let time_bonus = (self.level.time_limit - self.elapsed).max(0.0) as i64;
        let move_bonus = (self.level.min_moves as i64 * 20 - self.moves as i64 * 10).max(0);
        let hint_penalty = self.hints_used as i64 * 50;
        Some((1000 + time_bonus + move_bonus - hint_penalty).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceId;
    use crate::safety::SafetySnapshot;

    fn puzzle() -> BankersPuzzle {
        BankersPuzzle {
            resource_names: vec!["A".into()],
            totals: vec![3],
            max: vec![vec![3], vec![2]],
            snapshot: SafetySnapshot {
                processes: vec![ProcessId(0), ProcessId(1)],
                resources: vec![ResourceId(0)],
                available: vec![1],
                allocation: vec![vec![0], vec![2]],
                need: vec![vec![3], vec![0]],
            },
        }
    }

    #[test]
    fn execute_rejects_unaffordable_process_without_change() {
        let mut session = PuzzleSession::new(PUZZLE_LEVELS[0], puzzle()).unwrap();
        let err = session.execute(ProcessId(0)).unwrap_err();
        assert!(matches!(err, SimError::InsufficientResource { requested: 3, available: 1, .. }));
        assert_eq!(session.moves(), 0);
        assert_eq!(session.available(), &[1]);
    }

    #[test]
    fn winning_order_scores() {
        let mut session = PuzzleSession::new(PUZZLE_LEVELS[0], puzzle()).unwrap();
        assert_eq!(session.hint().unwrap().unwrap(), "Try executing P1 next.");

        session.advance(20.0);
        assert!(session.execute(ProcessId(1)).unwrap());
        assert!(!session.execute(ProcessId(1)).unwrap());
        assert!(session.execute(ProcessId(0)).unwrap());

        assert!(session.is_won());
        assert_eq!(session.sequence(), &[ProcessId(1), ProcessId(0)]);
        // 1000 + (120 - 20) + (60 - 20) - 50
        assert_eq!(session.final_score(), Some(1090));
    }

    #[test]
    fn hints_run_out_and_reset_restores_pool() {
        let mut session = PuzzleSession::new(PUZZLE_LEVELS[0], puzzle()).unwrap();
        session.execute(ProcessId(1)).unwrap();
        session.reset();
        assert_eq!(session.available(), &[1]);
        assert!(session.sequence().is_empty());
        assert_eq!(session.moves(), 2);

        for _ in 0..3 {
            assert!(session.hint().unwrap().is_some());
        }
        assert_eq!(session.hint().unwrap(), None);
        assert_eq!(session.hints_left(), 0);
        assert_eq!(session.final_score(), None);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mut broken = puzzle();
        broken.snapshot.need = vec![vec![3]];
        assert!(matches!(
            PuzzleSession::new(PUZZLE_LEVELS[0], broken),
            Err(SimError::InvariantViolation(_))
        ));

        let mut broken = puzzle();
        broken.totals.clear();
        assert!(matches!(
            PuzzleSession::new(PUZZLE_LEVELS[0], broken),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn session_times_out_at_the_level_limit() {
        let mut session = PuzzleSession::new(PUZZLE_LEVELS[0], puzzle()).unwrap();
        session.advance(119.0);
        assert!(!session.is_timed_out());
        session.advance(-5.0);
        session.advance(1.0);
        assert!(session.is_timed_out());

        // Время вышло: бонуса за время нет
        session.execute(ProcessId(1)).unwrap();
        session.execute(ProcessId(0)).unwrap();
        assert_eq!(session.final_score(), Some(1000 + 40));
    }
}
