// Test doubles for the collaborator seams.
//
// - ScriptedCompletion (CompletionService): canned Wizard lines, records calls
// - GatedCompletion (CompletionService): echoes the prompt, first call blocks
// - ScriptedPersona (Persona): canned replies, optionally fails when out of lines
// - FixedJudge (JudgeService): constant score or constant failure
// - ScriptedBackend (OptimizerBackend): canned proposals, records requests
//
// Plus builders for logs and training examples.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{oneshot, Notify};
use wizard_agents::Message;

use crate::conversation::{ConversationLog, JudgeResult, SessionOutcome, Speaker, Turn};
use crate::optimizer::{
    CompileRequest, OptimizerBackend, OptimizerError, Program, Proposal, Strategy, TrainedProgram,
    TrainingExample,
};
use crate::session::{CompletionService, JudgeService, Persona};

pub type CallLog = Arc<Mutex<Vec<(String, Vec<Message>)>>>;

// ---------------------------------------------------------------------------
// ScriptedCompletion
// ---------------------------------------------------------------------------

pub struct ScriptedCompletion {
    lines: Mutex<VecDeque<String>>,
    /// Returned forever once `lines` runs out; `None` means fail instead
    fallback: Option<String>,
    calls: CallLog,
}

impl ScriptedCompletion {
    pub fn repeating(line: &str) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            fallback: Some(line.to_string()),
            calls: Arc::default(),
        }
    }

    /// Plays `lines` in order, then every call fails
    pub fn failing_after(lines: Vec<&str>) -> Self {
        Self {
            lines: Mutex::new(lines.into_iter().map(String::from).collect()),
            fallback: None,
            calls: Arc::default(),
        }
    }

    /// Shared handle to every `(system_prompt, prior_turns)` seen
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn invoke(&self, system_prompt: &str, prior_turns: &[Message]) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), prior_turns.to_vec()));

        if let Some(line) = self.lines.lock().unwrap().pop_front() {
            return Ok(line);
        }
        match &self.fallback {
            Some(line) => Ok(line.clone()),
            None => bail!("ScriptedCompletion: script exhausted"),
        }
    }
}

// ---------------------------------------------------------------------------
// GatedCompletion
// ---------------------------------------------------------------------------

/// Answers `[{system_prompt}] Want it?`; the first call waits for the
/// release sender returned by `new`
pub struct GatedCompletion {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    entered: Arc<Notify>,
}

impl GatedCompletion {
    pub fn new() -> (Self, oneshot::Sender<()>) {
        let (release, gate) = oneshot::channel();
        let completion = Self {
            gate: Mutex::new(Some(gate)),
            entered: Arc::new(Notify::new()),
        };
        (completion, release)
    }

    /// Notified once the first call is parked on the gate
    pub fn entered(&self) -> Arc<Notify> {
        Arc::clone(&self.entered)
    }
}

#[async_trait]
impl CompletionService for GatedCompletion {
    async fn invoke(&self, system_prompt: &str, _prior_turns: &[Message]) -> Result<String> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            gate.await.ok();
        }
        Ok(format!("[{}] Want it?", system_prompt))
    }
}

// ---------------------------------------------------------------------------
// ScriptedPersona
// ---------------------------------------------------------------------------

pub struct ScriptedPersona {
    id: String,
    replies: VecDeque<String>,
    last: Option<String>,
    fail_when_exhausted: bool,
}

impl ScriptedPersona {
    /// Plays `replies` in order, then repeats the last one
    pub fn new(id: &str, replies: Vec<&str>) -> Self {
        Self {
            id: id.to_string(),
            replies: replies.into_iter().map(String::from).collect(),
            last: None,
            fail_when_exhausted: false,
        }
    }

    pub fn repeating(id: &str, reply: &str) -> Self {
        Self::new(id, vec![reply])
    }

    pub fn failing_when_exhausted(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }
}

#[async_trait]
impl Persona for ScriptedPersona {
    fn id(&self) -> &str {
        &self.id
    }

    async fn respond(&mut self, _message: &str) -> Result<String> {
        if let Some(reply) = self.replies.pop_front() {
            self.last = Some(reply.clone());
            return Ok(reply);
        }
        match (&self.last, self.fail_when_exhausted) {
            (Some(last), false) => Ok(last.clone()),
            _ => bail!("ScriptedPersona {}: out of replies", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// FixedJudge
// ---------------------------------------------------------------------------

pub struct FixedJudge {
    score: Option<f64>,
}

impl FixedJudge {
    pub fn scoring(score: f64) -> Self {
        Self { score: Some(score) }
    }

    pub fn failing() -> Self {
        Self { score: None }
    }
}

#[async_trait]
impl JudgeService for FixedJudge {
    async fn assess(&self, _log: &ConversationLog) -> Result<JudgeResult> {
        match self.score {
            Some(score) => Ok(verdict(score)),
            None => bail!("FixedJudge: judge offline"),
        }
    }
}

fn verdict(score: f64) -> JudgeResult {
    JudgeResult {
        success: score >= 1.0,
        score,
        rationale: "scripted".to_string(),
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// `(strategy, dataset size, rounds, minibatch size)` per compile call
pub type RequestLog = Arc<Mutex<Vec<(Strategy, usize, usize, usize)>>>;

pub struct ScriptedBackend {
    result: Result<TrainedProgram, OptimizerError>,
    requests: RequestLog,
}

impl ScriptedBackend {
    pub const PLACEHOLDER: &'static str = "Given the fields, produce the outputs.";

    /// Each `(instructions, example index)` becomes one proposal
    pub fn proposing(proposals: Vec<(&str, Option<usize>)>) -> Self {
        let proposals = proposals
            .into_iter()
            .map(|(text, example)| Proposal {
                program: Program::with_instructions(text, ""),
                example,
            })
            .collect();
        Self::returning(Ok(TrainedProgram {
            proposals,
            artifact: Program::default(),
        }))
    }

    pub fn artifact_only(artifact: Program) -> Self {
        Self::returning(Ok(TrainedProgram {
            proposals: Vec::new(),
            artifact,
        }))
    }

    pub fn failing(message: &str) -> Self {
        Self::returning(Err(OptimizerError::Backend(message.to_string())))
    }

    fn returning(result: Result<TrainedProgram, OptimizerError>) -> Self {
        Self {
            result,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> RequestLog {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl OptimizerBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn placeholder(&self) -> &str {
        Self::PLACEHOLDER
    }

    async fn compile(&self, request: CompileRequest<'_>) -> Result<TrainedProgram, OptimizerError> {
        self.requests.lock().unwrap().push((
            request.strategy,
            request.dataset.len(),
            request.rounds,
            request.minibatch_size,
        ));
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn log_with(persona_id: &str, judge_result: Option<JudgeResult>) -> ConversationLog {
    ConversationLog {
        wizard_id: "Wizard_001".to_string(),
        persona_id: persona_id.to_string(),
        goal: "Convince population to buy".to_string(),
        prompt_snapshot: "Sell politely".to_string(),
        turns: vec![
            Turn::new(Speaker::Wizard, "Would you like one?"),
            Turn::new(Speaker::Persona, "Not sure yet."),
        ],
        judge_result,
        outcome: SessionOutcome::TurnLimitReached,
        timestamp: Utc::now(),
    }
}

/// Two-turn log with a judge verdict of `score`
pub fn judged_log(persona_id: &str, score: f64) -> ConversationLog {
    log_with(persona_id, Some(verdict(score)))
}

/// Two-turn log the judge never scored
pub fn unjudged_log(persona_id: &str) -> ConversationLog {
    log_with(persona_id, None)
}

pub fn example(score: f64) -> TrainingExample {
    TrainingExample {
        instruction: "Sell politely".to_string(),
        transcript: format!("wizard: Hi\npersona: Hello\nRESULT: {{\"score\":{}}}", score),
        goal: "Convince population to buy".to_string(),
        score,
        judged: true,
    }
}
