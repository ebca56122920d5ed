//! Типы ошибок для симуляции

use thiserror::Error;

use crate::core::{ProcessId, ResourceId};
use crate::process::ProcessState;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Insufficient resource {resource}: requested {requested}, available {available}")]
    InsufficientResource {
        resource: ResourceId,
        requested: u32,
        available: u32,
    },

    #[error("Invalid transition for {process}: {from} -> {to}")]
    InvalidTransition {
        process: ProcessId,
        from: ProcessState,
        to: ProcessState,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown process: {0}")]
    UnknownProcess(ProcessId),

    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceId),

    #[error("Scenario error: {0}")]
    Scenario(#[from] ron::error::SpannedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Submission does not match challenge kind {0}")]
    SubmissionMismatch(&'static str),

    #[error("Simulation error: {0}")]
    Simulation(String),
}

impl From<String> for SimError {
    fn from(s: String) -> Self {
        SimError::Simulation(s)
    }
}

impl From<&str> for SimError {
    fn from(s: &str) -> Self {
        SimError::Simulation(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
