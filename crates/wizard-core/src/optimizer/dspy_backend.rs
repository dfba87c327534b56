//! LLM-backed optimizer built on dspy-rs predictors
//!
//! Every strategy ends in the same two steps: reflect on transcripts, then
//! propose a full replacement instruction. The globally configured LM is
//! used, so `configure_lm` must have run first.

use async_trait::async_trait;
use dspy_rs::{Predict, Signature};
use tracing::{debug, info, warn};
use wizard_agents::with_program_lm;

#[allow(unused_imports)]
use baml_bridge;

use super::backend::{CompileRequest, OptimizerBackend, OptimizerError, Proposal, Strategy, TrainedProgram};
use super::candidate::Program;
use super::dataset::TrainingExample;

/// Instruction a fresh program carries before training touches it
pub const GENERIC_INSTRUCTION: &str = "Given the fields, produce the outputs.";

const REFLECT_INSTRUCTION: &str = "You review sales conversations between a Wizard and members of a \
population. Each transcript ends with a RESULT line holding the judge's verdict. Identify what \
the Wizard's instruction made it do well or badly with respect to the goal, and give concrete \
suggestions for a better instruction.";

const PROPOSE_INSTRUCTION: &str = "You are an expert prompt engineer. Given the current instruction \
for the Wizard and an analysis of its conversations, output an IMPROVED instruction that keeps \
what works and fixes what does not. Output ONLY the complete instruction text.";

#[derive(Signature, Clone, Debug)]
struct ReflectOnTranscripts {
    #[input(desc = "The Wizard's current instruction")]
    current_instruction: String,

    #[input(desc = "Conversation transcripts, each ending in a RESULT line")]
    transcripts: String,

    #[input(desc = "What the Wizard is trying to achieve")]
    goal: String,

    #[output(desc = "Analysis of weaknesses and concrete improvement suggestions")]
    analysis: String,
}

#[derive(Signature, Clone, Debug)]
struct ProposeInstruction {
    #[input(desc = "The current instruction")]
    current_instruction: String,

    #[input(desc = "Analysis of weaknesses and improvement suggestions")]
    analysis: String,

    #[output(desc = "The complete improved instruction")]
    improved_instruction: String,
}

/// Render a program the way a printed predictor looks
pub fn render_program(instruction: &str) -> String {
    format!("Predict(WizardUtterance, instructions=\"\"\"{}\"\"\")", instruction)
}

fn format_transcripts(examples: &[&TrainingExample]) -> String {
    examples
        .iter()
        .enumerate()
        .map(|(i, ex)| format!("--- Conversation {} (score {:.2}) ---\n{}", i + 1, ex.score, ex.transcript))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Default)]
pub struct DspyBackend;

impl DspyBackend {
    pub fn new() -> Self {
        Self
    }

    async fn reflect(
        &self,
        current_instruction: &str,
        goal: &str,
        examples: &[&TrainingExample],
    ) -> Result<String, OptimizerError> {
        let predictor = Predict::<ReflectOnTranscripts>::builder()
            .instruction(REFLECT_INSTRUCTION)
            .build();

        let input = ReflectOnTranscriptsInput {
            current_instruction: current_instruction.to_string(),
            transcripts: format_transcripts(examples),
            goal: goal.to_string(),
        };
        let result = with_program_lm(predictor.call(input))
            .await
            .map_err(|e| OptimizerError::Backend(e.to_string()))?;
        Ok(result.analysis)
    }

    async fn propose(&self, current_instruction: &str, analysis: &str) -> Result<String, OptimizerError> {
        let predictor = Predict::<ProposeInstruction>::builder()
            .instruction(PROPOSE_INSTRUCTION)
            .build();

        let input = ProposeInstructionInput {
            current_instruction: current_instruction.to_string(),
            analysis: analysis.to_string(),
        };
        let result = with_program_lm(predictor.call(input))
            .await
            .map_err(|e| OptimizerError::Backend(e.to_string()))?;
        Ok(result.improved_instruction.trim().to_string())
    }

    async fn reflect_and_propose(
        &self,
        current_instruction: &str,
        goal: &str,
        examples: &[&TrainingExample],
    ) -> Result<String, OptimizerError> {
        let analysis = self.reflect(current_instruction, goal, examples).await?;
        debug!("Reflection: {}", analysis);
        self.propose(current_instruction, &analysis).await
    }

    async fn zero_shot(&self, request: &CompileRequest<'_>) -> Result<TrainedProgram, OptimizerError> {
        let analysis = format!(
            "No conversations have happened yet. Write an instruction that helps the Wizard reach this goal: {}",
            request.goal
        );
        let instruction = self.propose(request.current_prompt, &analysis).await?;
        Ok(TrainedProgram {
            proposals: Vec::new(),
            artifact: Program::with_instructions(instruction.clone(), render_program(&instruction)),
        })
    }

    /// One proposal per example, each drafted from that example alone
    async fn bootstrap(&self, request: &CompileRequest<'_>) -> Result<TrainedProgram, OptimizerError> {
        let mut proposals = Vec::with_capacity(request.dataset.len());
        let mut last_error = None;

        for (idx, example) in request.dataset.iter().enumerate() {
            match self
                .reflect_and_propose(request.current_prompt, request.goal, &[example])
                .await
            {
                Ok(instruction) => proposals.push(Proposal {
                    program: Program::with_instructions(instruction.clone(), render_program(&instruction)),
                    example: Some(idx),
                }),
                Err(e) => {
                    warn!("Bootstrap proposal for example {} failed: {}", idx, e);
                    last_error = Some(e);
                }
            }
        }

        finish(proposals, last_error, request)
    }

    /// Rounds of reflect-and-propose over round-robin minibatches
    ///
    /// Each round starts from the best instruction seen so far.
    async fn iterative(&self, request: &CompileRequest<'_>) -> Result<TrainedProgram, OptimizerError> {
        let batches = minibatches(request.rounds, request.minibatch_size, request.dataset.len());
        let total = batches.len();
        let mut proposals = Vec::with_capacity(total);
        let mut last_error = None;
        let mut best_instruction = request.current_prompt.to_string();
        let mut best_score = f64::NEG_INFINITY;

        for (round, batch) in batches.iter().enumerate() {
            let examples: Vec<&TrainingExample> = batch.iter().map(|&i| &request.dataset[i]).collect();
            info!("Search round {}/{}: {} examples", round + 1, total, examples.len());

            let instruction = match self
                .reflect_and_propose(&best_instruction, request.goal, &examples)
                .await
            {
                Ok(instruction) => instruction,
                Err(e) => {
                    warn!("Search round {} failed: {}", round + 1, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let anchor = strongest_example(request.dataset, batch);
            let score = request
                .metric
                .score(anchor.map(|i| &request.dataset[i]), &instruction);
            if score > best_score {
                best_score = score;
                best_instruction = instruction.clone();
            }

            proposals.push(Proposal {
                program: Program::with_instructions(instruction.clone(), render_program(&instruction)),
                example: anchor,
            });
        }

        finish(proposals, last_error, request)
    }
}

/// Dataset indices for each search round
///
/// At least one round runs. Batches walk the dataset round-robin and wrap
/// around its end; a batch never repeats an index.
fn minibatches(rounds: usize, size: usize, len: usize) -> Vec<Vec<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let size = size.clamp(1, len);
    (0..rounds.max(1))
        .map(|round| {
            let start = (round * size) % len;
            (0..size).map(|i| (start + i) % len).collect()
        })
        .collect()
}

/// Highest-scoring example in `batch`; the earliest wins ties
fn strongest_example(dataset: &[TrainingExample], batch: &[usize]) -> Option<usize> {
    batch
        .iter()
        .fold(None::<(usize, f64)>, |acc, &idx| match acc {
            Some((_, best)) if dataset[idx].score <= best => acc,
            _ => Some((idx, dataset[idx].score)),
        })
        .map(|(idx, _)| idx)
}

fn finish(
    proposals: Vec<Proposal>,
    last_error: Option<OptimizerError>,
    request: &CompileRequest<'_>,
) -> Result<TrainedProgram, OptimizerError> {
    if proposals.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    let artifact = proposals
        .last()
        .map(|p| p.program.clone())
        .unwrap_or_else(|| Program::with_instructions(GENERIC_INSTRUCTION, render_program(request.current_prompt)));

    Ok(TrainedProgram { proposals, artifact })
}

#[async_trait]
impl OptimizerBackend for DspyBackend {
    fn name(&self) -> &str {
        "dspy"
    }

    fn placeholder(&self) -> &str {
        GENERIC_INSTRUCTION
    }

    async fn compile(&self, request: CompileRequest<'_>) -> Result<TrainedProgram, OptimizerError> {
        match request.strategy {
            Strategy::ZeroShot => self.zero_shot(&request).await,
            Strategy::Bootstrap if request.dataset.is_empty() => self.zero_shot(&request).await,
            Strategy::Bootstrap => self.bootstrap(&request).await,
            Strategy::IterativeSearch if request.dataset.is_empty() => self.zero_shot(&request).await,
            Strategy::IterativeSearch => self.iterative(&request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::candidate::extract_prompt;
    use crate::optimizer::metric::PromptMetric;
    use crate::testing::example;

    fn request<'a>(dataset: &'a [TrainingExample], metric: &'a PromptMetric) -> CompileRequest<'a> {
        CompileRequest {
            strategy: Strategy::IterativeSearch,
            current_prompt: "Sell politely",
            goal: "Convince population to buy",
            dataset,
            metric,
            rounds: 2,
            minibatch_size: 3,
        }
    }

    fn proposal(text: &str, example: Option<usize>) -> Proposal {
        Proposal {
            program: Program::with_instructions(text, render_program(text)),
            example,
        }
    }

    #[test]
    fn test_minibatches_wrap_round_robin() {
        assert_eq!(minibatches(2, 3, 4), vec![vec![0, 1, 2], vec![3, 0, 1]]);
        assert_eq!(minibatches(3, 2, 5), vec![vec![0, 1], vec![2, 3], vec![4, 0]]);
    }

    #[test]
    fn test_minibatches_run_at_least_one_round() {
        assert_eq!(minibatches(0, 3, 4), vec![vec![0, 1, 2]]);
        assert_eq!(minibatches(5, 3, 4).len(), 5);
    }

    #[test]
    fn test_minibatch_size_is_clamped_to_dataset() {
        assert_eq!(minibatches(2, 10, 3), vec![vec![0, 1, 2], vec![0, 1, 2]]);
        assert_eq!(minibatches(1, 0, 3), vec![vec![0]]);
        assert!(minibatches(3, 3, 0).is_empty());
    }

    #[test]
    fn test_strongest_example_prefers_first_on_ties() {
        let dataset = vec![example(0.25), example(0.75), example(0.75), example(0.5)];
        assert_eq!(strongest_example(&dataset, &[0, 1, 2]), Some(1));
        assert_eq!(strongest_example(&dataset, &[3, 0]), Some(3));
        assert_eq!(strongest_example(&dataset, &[2, 1]), Some(2));
        assert_eq!(strongest_example(&dataset, &[]), None);
    }

    #[test]
    fn test_finish_fails_when_every_round_failed() {
        let dataset = vec![example(0.5)];
        let metric = PromptMetric::new("buy", 1.0);
        let result = finish(
            Vec::new(),
            Some(OptimizerError::Backend("rate limited".to_string())),
            &request(&dataset, &metric),
        );
        assert_eq!(result.unwrap_err(), OptimizerError::Backend("rate limited".to_string()));
    }

    #[test]
    fn test_finish_keeps_surviving_proposals() {
        let dataset = vec![example(0.5), example(0.25)];
        let metric = PromptMetric::new("buy", 1.0);
        let trained = finish(
            vec![proposal("Ask them to buy", Some(0))],
            Some(OptimizerError::Backend("timeout".to_string())),
            &request(&dataset, &metric),
        )
        .unwrap();

        assert_eq!(trained.proposals.len(), 1);
        assert_eq!(trained.artifact.instructions.as_deref(), Some("Ask them to buy"));
    }

    #[test]
    fn test_finish_without_proposals_yields_generic_artifact() {
        let metric = PromptMetric::new("buy", 1.0);
        let trained = finish(Vec::new(), None, &request(&[], &metric)).unwrap();

        assert!(trained.proposals.is_empty());
        assert_eq!(trained.artifact.instructions.as_deref(), Some(GENERIC_INSTRUCTION));
        assert_eq!(
            extract_prompt(&trained.artifact, GENERIC_INSTRUCTION).as_deref(),
            Some("Sell politely")
        );
    }

    #[test]
    fn test_rendered_program_round_trips_through_legacy_scan() {
        let program = Program::with_instructions(GENERIC_INSTRUCTION, render_program("Ask about budget first"));
        assert_eq!(
            extract_prompt(&program, GENERIC_INSTRUCTION).as_deref(),
            Some("Ask about budget first")
        );
    }

    #[test]
    fn test_transcripts_are_numbered_with_scores() {
        let ex = TrainingExample {
            instruction: "Sell".to_string(),
            transcript: "wizard: hi\nRESULT: none".to_string(),
            goal: "Convince population to buy".to_string(),
            score: 0.5,
            judged: true,
        };
        let text = format_transcripts(&[&ex, &ex]);
        assert!(text.starts_with("--- Conversation 1 (score 0.50) ---\nwizard: hi"));
        assert!(text.contains("--- Conversation 2 (score 0.50) ---"));
    }
}
