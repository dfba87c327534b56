//! Wizard Agents - the LLM-backed roles of a simulation run
//!
//! Roles are organized by module:
//! - lm: global language model configuration for DSRs
//! - message: role-ordered chat messages shared by every role
//! - wizard: the Wizard's next utterance under a given system prompt
//! - persona: one scripted member of the population
//! - judge: scores a finished dialogue
//! - population: generates persona specifications

pub mod judge;
pub mod lm;
pub mod message;
pub mod persona;
pub mod population;
pub mod wizard;

pub use judge::{parse_verdict, JudgeVerdict, LlmJudge};
pub use lm::{configure_lm, with_judge_lm, with_program_lm, LmSettings};
pub use message::{format_conversation, Message, Role};
pub use persona::{LlmPersona, PersonaSpec};
pub use population::PopulationGenerator;
pub use wizard::WizardModel;

use thiserror::Error;

/// Errors raised by the LLM-backed roles
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    Predict(String),
    #[error("LLM returned an empty {0}")]
    Empty(&'static str),
    #[error("Failed to parse judge verdict: {0}")]
    Verdict(String),
}

/// Build an `AgentError::Predict` from any displayable DSRs error
pub(crate) fn predict_error(e: impl std::fmt::Display) -> AgentError {
    AgentError::Predict(e.to_string())
}
