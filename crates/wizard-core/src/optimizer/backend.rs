//! Optimizer backend capability
//!
//! The optimizer never assumes a training library is present. It is handed an
//! `OptimizerBackend` at construction; `UnavailableBackend` stands in when
//! none is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::candidate::Program;
use super::dataset::TrainingExample;
use super::metric::PromptMetric;

/// Training strategy, chosen from dataset size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// No data: propose a prompt from the goal alone
    ZeroShot,
    /// A handful of examples used directly as exemplars
    Bootstrap,
    /// Reflect-and-propose rounds over minibatches
    IterativeSearch,
}

impl Strategy {
    pub fn select(dataset_size: usize, minibatch_threshold: usize) -> Self {
        if dataset_size == 0 {
            Strategy::ZeroShot
        } else if dataset_size < minibatch_threshold {
            Strategy::Bootstrap
        } else {
            Strategy::IterativeSearch
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::ZeroShot => "zero_shot",
            Strategy::Bootstrap => "bootstrap",
            Strategy::IterativeSearch => "iterative_search",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("no optimizer backend available")]
    Unavailable,
    #[error("optimizer backend failed: {0}")]
    Backend(String),
}

/// Everything a backend needs for one training run
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub strategy: Strategy,
    pub current_prompt: &'a str,
    pub goal: &'a str,
    pub dataset: &'a [TrainingExample],
    pub metric: &'a PromptMetric,
    /// Rounds for iterative search
    pub rounds: usize,
    pub minibatch_size: usize,
}

/// A candidate program, optionally tied to the example it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub program: Program,
    /// Index into the request's dataset
    pub example: Option<usize>,
}

/// What a training run hands back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainedProgram {
    /// Candidates in the order the backend produced them
    pub proposals: Vec<Proposal>,
    /// The backend's own final program
    pub artifact: Program,
}

#[async_trait]
pub trait OptimizerBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Instruction text the backend uses when it has nothing better
    fn placeholder(&self) -> &str {
        ""
    }

    async fn compile(&self, request: CompileRequest<'_>) -> Result<TrainedProgram, OptimizerError>;
}

/// Null backend: every compile reports `Unavailable`
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

#[async_trait]
impl OptimizerBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn compile(&self, _request: CompileRequest<'_>) -> Result<TrainedProgram, OptimizerError> {
        Err(OptimizerError::Unavailable)
    }
}
