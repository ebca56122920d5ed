//! Жизненный цикл процесса

use std::fmt;
use serde::{Serialize, Deserialize};

/// Состояние процесса:
/// `New -> Ready -> Running -> {Waiting, Terminated}`, `Waiting -> Ready`,
/// плюс вытеснение `Running -> Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Waiting,
    Terminated,
}

impl ProcessState {
    /// Допустим ли переход `self -> next`
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (New, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Running, Waiting)
                | (Running, Terminated)
                | (Waiting, Ready)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ProcessState::Terminated
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ProcessState::New => "new",
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Waiting => "waiting",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessState::{self, *};

    const ALL: [ProcessState; 5] = [New, Ready, Running, Waiting, Terminated];

    #[test]
    fn nothing_re_enters_new_and_terminated_is_absorbing() {
        for s in ALL {
            assert!(!s.can_transition_to(New));
            assert!(!Terminated.can_transition_to(s));
        }
    }

    #[test]
    fn only_listed_edges_are_allowed() {
        let allowed: Vec<(ProcessState, ProcessState)> = ALL
            .iter()
            .flat_map(|&a| ALL.iter().map(move |&b| (a, b)))
            .filter(|&(a, b)| a.can_transition_to(b))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (New, Ready),
                (Ready, Running),
                (Running, Ready),
                (Running, Waiting),
                (Running, Terminated),
                (Waiting, Ready),
            ]
        );
    }
}
