//! Процессы: автомат состояний и реестр

mod registry;
mod state;

pub use registry::{Process, ProcessRegistry};
pub use state::ProcessState;
