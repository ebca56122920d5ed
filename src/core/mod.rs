//! Ядро симуляции

mod simulation;
mod event;
mod id;
mod time;

pub use simulation::{Simulation, RunSummary, StopReason};
pub use event::{Event, EventKind, GanttSlice, Timeline};
pub use id::{ProcessId, ResourceId};
pub use time::{SimTime, Duration, EPSILON};
