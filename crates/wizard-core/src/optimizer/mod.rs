//! Prompt optimization for the Wizard
//!
//! ## Overview
//!
//! 1. The controller hands over a dataset built from recent conversations
//! 2. A strategy is picked from the dataset size (`Strategy::select`)
//! 3. The injected backend trains and returns candidate programs
//! 4. Candidates are scored with `PromptMetric`, the best one wins
//! 5. The prompt text is extracted from the winner (structured field first,
//!    legacy text scan second)
//!
//! With `UnavailableBackend` nothing is trained and the current prompt is
//! returned untouched.

pub mod backend;
pub mod candidate;
pub mod dataset;
pub mod dspy_backend;
pub mod metric;

pub use backend::{
    CompileRequest, OptimizerBackend, OptimizerError, Proposal, Strategy, TrainedProgram,
    UnavailableBackend,
};
pub use candidate::{extract_prompt, select_best, Candidate, Program};
pub use dataset::{DatasetBuilder, TrainingExample, TrainingSet};
pub use dspy_backend::DspyBackend;
pub use metric::PromptMetric;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of one optimization run
///
/// `Default` is the empty record used when nothing was trained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    pub strategy: Option<Strategy>,
    pub dataset_size: usize,
    pub best_score: Option<f64>,
    /// Per-candidate scores in backend order; empty for zero-shot
    pub candidate_scores: Vec<f64>,
    /// Extracted prompt, empty when extraction failed
    pub best_prompt: String,
    pub rounds: usize,
}

impl OptimizationMetrics {
    pub fn is_empty(&self) -> bool {
        self.strategy.is_none()
    }
}

/// What `optimize` produced
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationOutcome {
    /// Backend unavailable; the current prompt is handed back as-is
    Skipped { prompt: String },
    /// Backend ran. `best_prompt` may be empty if nothing usable came out.
    Trained {
        best_prompt: String,
        metrics: OptimizationMetrics,
    },
}

pub struct PromptOptimizer {
    backend: Arc<dyn OptimizerBackend>,
    goal: String,
    metric: PromptMetric,
}

impl PromptOptimizer {
    pub fn new(backend: Arc<dyn OptimizerBackend>, goal: impl Into<String>, metric: PromptMetric) -> Self {
        Self {
            backend,
            goal: goal.into(),
            metric,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn optimize(
        &self,
        dataset: &[TrainingExample],
        current_prompt: &str,
        training_iterations: usize,
        minibatch_threshold: usize,
    ) -> Result<OptimizationOutcome, OptimizerError> {
        let strategy = Strategy::select(dataset.len(), minibatch_threshold);
        info!(
            "Optimizing prompt with {} backend: strategy={}, examples={}",
            self.backend.name(),
            strategy,
            dataset.len()
        );

        let request = CompileRequest {
            strategy,
            current_prompt,
            goal: &self.goal,
            dataset,
            metric: &self.metric,
            rounds: training_iterations,
            minibatch_size: minibatch_threshold,
        };

        let trained = match self.backend.compile(request).await {
            Ok(trained) => trained,
            Err(OptimizerError::Unavailable) => {
                warn!("Optimizer backend unavailable, keeping current prompt");
                return Ok(OptimizationOutcome::Skipped {
                    prompt: current_prompt.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let candidates: Vec<Candidate> = trained
            .proposals
            .iter()
            .map(|proposal| {
                let text = extract_prompt(&proposal.program, self.backend.placeholder()).unwrap_or_default();
                let example = proposal.example.and_then(|i| dataset.get(i));
                Candidate {
                    program: proposal.program.clone(),
                    score: self.metric.score(example, &text),
                }
            })
            .collect();

        let (program, best_score) = match select_best(&candidates) {
            Some(best) => (&best.program, Some(best.score)),
            None => (&trained.artifact, None),
        };
        let best_prompt = extract_prompt(program, self.backend.placeholder()).unwrap_or_default();

        if best_prompt.is_empty() {
            warn!("Optimizer produced no usable prompt");
        } else {
            info!("Optimizer best score: {:?}", best_score);
        }

        let rounds = match strategy {
            Strategy::IterativeSearch => training_iterations.max(1),
            _ => 1,
        };

        Ok(OptimizationOutcome::Trained {
            best_prompt: best_prompt.clone(),
            metrics: OptimizationMetrics {
                strategy: Some(strategy),
                dataset_size: dataset.len(),
                best_score,
                candidate_scores: candidates.iter().map(|c| c.score).collect(),
                best_prompt,
                rounds,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{example, ScriptedBackend};

    fn optimizer(backend: ScriptedBackend) -> PromptOptimizer {
        PromptOptimizer::new(Arc::new(backend), "Convince population to buy", PromptMetric::new("buy", 1.0))
    }

    #[tokio::test]
    async fn test_unavailable_returns_current_prompt() {
        let opt = PromptOptimizer::new(
            Arc::new(UnavailableBackend),
            "Convince population to buy",
            PromptMetric::new("buy", 1.0),
        );
        let outcome = opt.optimize(&[example(0.5)], "Sell", 1, 3).await.unwrap();
        assert_eq!(outcome, OptimizationOutcome::Skipped { prompt: "Sell".to_string() });
    }

    #[tokio::test]
    async fn test_keyword_bonus_decides_winner() {
        let backend = ScriptedBackend::proposing(vec![
            ("Be warm and patient", Some(0)),
            ("Ask them to buy today", Some(1)),
        ]);
        let opt = optimizer(backend);
        let dataset = vec![example(0.75), example(0.25)];

        let outcome = opt.optimize(&dataset, "Sell", 1, 3).await.unwrap();

        match outcome {
            OptimizationOutcome::Trained { best_prompt, metrics } => {
                assert_eq!(best_prompt, "Ask them to buy today");
                assert_eq!(metrics.strategy, Some(Strategy::Bootstrap));
                assert_eq!(metrics.candidate_scores, vec![0.75, 1.25]);
                assert_eq!(metrics.best_score, Some(1.25));
                assert_eq!(metrics.dataset_size, 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_strategy_passed_to_backend() {
        let backend = ScriptedBackend::proposing(vec![("Offer to buy", None)]);
        let seen = backend.requests();
        let opt = optimizer(backend);
        let dataset: Vec<TrainingExample> = (0..4).map(|_| example(0.1)).collect();

        opt.optimize(&dataset, "Sell", 2, 3).await.unwrap();
        opt.optimize(&[], "Sell", 2, 3).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (Strategy::IterativeSearch, 4, 2, 3));
        assert_eq!(seen[1], (Strategy::ZeroShot, 0, 2, 3));
    }

    #[tokio::test]
    async fn test_zero_shot_uses_artifact_and_has_no_scores() {
        let backend = ScriptedBackend::artifact_only(Program::rendered_only(
            r#"Predict(sig, instructions="Greet, then pitch")"#,
        ));
        let opt = optimizer(backend);

        match opt.optimize(&[], "Sell", 1, 3).await.unwrap() {
            OptimizationOutcome::Trained { best_prompt, metrics } => {
                assert_eq!(best_prompt, "Greet, then pitch");
                assert_eq!(metrics.strategy, Some(Strategy::ZeroShot));
                assert!(metrics.candidate_scores.is_empty());
                assert_eq!(metrics.best_score, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unusable_output_yields_empty_prompt() {
        let backend = ScriptedBackend::artifact_only(Program::with_instructions(
            ScriptedBackend::PLACEHOLDER,
            "no markers",
        ));
        let opt = optimizer(backend);

        match opt.optimize(&[], "Sell", 1, 3).await.unwrap() {
            OptimizationOutcome::Trained { best_prompt, metrics } => {
                assert!(best_prompt.is_empty());
                assert!(metrics.best_prompt.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let opt = optimizer(ScriptedBackend::failing("rate limited"));
        let err = opt.optimize(&[example(0.1)], "Sell", 1, 3).await.unwrap_err();
        assert_eq!(err, OptimizerError::Backend("rate limited".to_string()));
    }
}
