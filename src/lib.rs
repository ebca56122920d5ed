//! OSSim-rs - Учебная модель ОС: ресурсы, алгоритм банкира, обнаружение
//! тупиков и планирование процессора

pub mod core;
pub mod error;
pub mod process;
pub mod resources;
pub mod safety;
pub mod deadlock;
pub mod scheduler;
pub mod scenario;
pub mod score;

mod simulator;
pub use simulator::{Simulator, SystemSnapshot};
pub use error::{Result, SimError};

pub mod prelude {
    pub use crate::core::{Duration, ProcessId, ResourceId, SimTime, Simulation};
    pub use crate::process::ProcessState;
    pub use crate::scenario::Scenario;
    pub use crate::scheduler::{Metrics, Policy, SchedulerConfig};
    pub use crate::Simulator;
    pub use crate::SimError;
}
