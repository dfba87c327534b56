//! Wizard Core Library
//!
//! Conversation orchestration and prompt improvement for the Wizard.
//!
//! - conversation: turns, judge results and finished logs
//! - session: one bounded Wizard/persona dialogue
//! - history: fixed-capacity ring of recent logs
//! - schedule: when an improvement cycle runs
//! - optimizer: dataset building, candidate scoring and prompt extraction
//! - controller: active prompt, cadence and population runs
//! - logs: run artifacts on disk

pub mod collaborators;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod history;
pub mod logs;
pub mod optimizer;
pub mod schedule;
pub mod session;
pub mod templates;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use config::{Config, ConfigError, OptimizerKind};
pub use controller::{
    ControllerSettings, ConversationReport, ImprovementRecord, ImprovementStatus, WizardController,
};
pub use conversation::{ConversationLog, JudgeResult, SessionOutcome, Speaker, Turn};
pub use history::{HistoryBuffer, HistorySnapshot};
pub use logs::{JsonFileSink, LogRecord, LogSink, MemorySink, NullSink, RunCounter};
pub use optimizer::{
    DatasetBuilder, DspyBackend, OptimizationMetrics, OptimizationOutcome, OptimizerBackend,
    PromptMetric, PromptOptimizer, TrainingExample, UnavailableBackend,
};
pub use schedule::ImprovementSchedule;
pub use session::{CompletionService, ConversationSession, JudgeService, Persona};
