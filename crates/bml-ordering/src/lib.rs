use bml_core::{ItemId, StoreError, WorkflowStage};
use std::time::Duration;
use thiserror::Error;

pub mod commands;
pub mod engine;
pub mod moves;
pub mod propagation;
pub mod reconcile;

pub use commands::{execute, Command, CommandResult};
pub use engine::{OrderingEngine, PrioritizedItem, StageOutcome};
pub use moves::{MoveOutcome, Placement};
pub use propagation::{PropagationOutcome, SyncReport};
pub use reconcile::{plan_slot_map, Phase, PhaseReport, PlannedEntry, ReconcileReport};

#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("item #{0} has no priority")]
    NoPriority(ItemId),
    #[error("{role} item #{item} not found")]
    NotFound { role: &'static str, item: ItemId },
    #[error("item #{above} must be ordered before item #{below}")]
    InvalidOrdering { above: ItemId, below: ItemId },
    #[error("item #{item} is {stage} and has no next status")]
    NoNextStage { item: ItemId, stage: WorkflowStage },
    #[error("invalid slot map: {0}")]
    InvalidSlotMap(String),
    #[error("phase {phase} failed: {succeeded} of {attempted} writes succeeded")]
    PhaseFailure {
        phase: Phase,
        attempted: usize,
        succeeded: usize,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub call_timeout: Duration,
    pub max_in_flight: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            max_in_flight: 8,
        }
    }
}
