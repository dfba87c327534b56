//! Wizard controller - owns the active prompt and the improvement cadence
//!
//! Per conversation:
//! 1. Snapshot the active prompt (read lock)
//! 2. Run the session against the persona
//! 3. Under the cycle lock: append the log, bump the count, check the schedule
//! 4. If due: optimize over the history, swap the prompt if a usable one came
//!    back, record the attempt, clear the history
//!
//! Step 3 and 4 share one lock so no log can land between the snapshot the
//! optimizer trains on and the clear that follows it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::conversation::ConversationLog;
use crate::history::HistoryBuffer;
use crate::logs::{emit, LogRecord, LogSink};
use crate::optimizer::{DatasetBuilder, OptimizationMetrics, OptimizationOutcome, PromptOptimizer};
use crate::schedule::ImprovementSchedule;
use crate::session::{ConversationSession, Persona};

/// Knobs the controller needs at runtime
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub wizard_id: String,
    pub goal: String,
    pub goal_keyword: String,
    pub max_turns: usize,
    pub history_capacity: NonZeroUsize,
    pub schedule: ImprovementSchedule,
    pub training_iterations: usize,
    pub minibatch_threshold: usize,
    pub show_live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementStatus {
    /// A new prompt replaced the old one
    Improved,
    /// The optimizer ran but nothing usable came out
    NoUsablePrompt,
    /// The optimizer backend ran and failed
    Failed(String),
}

/// One improvement attempt, as written to the log sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementRecord {
    pub timestamp: DateTime<Utc>,
    pub old_prompt: String,
    pub new_prompt: String,
    pub metrics: OptimizationMetrics,
    pub conversation_count: usize,
    pub status: ImprovementStatus,
}

/// Result of one `run_conversation`
#[derive(Debug, Clone)]
pub struct ConversationReport {
    pub log: Arc<ConversationLog>,
    /// Present when this conversation triggered an improvement attempt
    pub improvement: Option<ImprovementRecord>,
}

struct CycleState {
    history: HistoryBuffer,
    conversation_count: usize,
}

pub struct WizardController {
    settings: ControllerSettings,
    session: ConversationSession,
    optimizer: PromptOptimizer,
    sink: Arc<dyn LogSink>,
    prompt: RwLock<String>,
    cycle: Mutex<CycleState>,
}

impl WizardController {
    pub fn new(
        settings: ControllerSettings,
        session: ConversationSession,
        optimizer: PromptOptimizer,
        sink: Arc<dyn LogSink>,
        initial_prompt: impl Into<String>,
    ) -> Self {
        let history = HistoryBuffer::with_capacity(settings.history_capacity);
        Self {
            settings,
            session,
            optimizer,
            sink,
            prompt: RwLock::new(initial_prompt.into()),
            cycle: Mutex::new(CycleState {
                history,
                conversation_count: 0,
            }),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub async fn active_prompt(&self) -> String {
        self.prompt.read().await.clone()
    }

    pub async fn conversation_count(&self) -> usize {
        self.cycle.lock().await.conversation_count
    }

    pub async fn history_len(&self) -> usize {
        self.cycle.lock().await.history.len()
    }

    /// Run one dialogue and, if the schedule says so, an improvement cycle
    pub async fn run_conversation(&self, persona: &mut dyn Persona) -> ConversationReport {
        let prompt = self.active_prompt().await;
        let log = self
            .session
            .run(&prompt, persona, &self.settings.goal_keyword, self.settings.max_turns)
            .await;
        let log = Arc::new(log);
        emit(self.sink.as_ref(), LogRecord::Conversation(&log));

        let mut cycle = self.cycle.lock().await;
        cycle.history.append(Arc::clone(&log));
        cycle.conversation_count += 1;
        let count = cycle.conversation_count;

        let improvement = if self.settings.schedule.should_improve(count) {
            info!("Conversation {} triggers an improvement cycle", count);
            self.improve(&mut cycle).await
        } else {
            None
        };

        ConversationReport { log, improvement }
    }

    /// Returns `None` when nothing was attempted (backend unavailable)
    async fn improve(&self, cycle: &mut CycleState) -> Option<ImprovementRecord> {
        let snapshot = cycle.history.snapshot();
        let dataset = DatasetBuilder::build(snapshot.logs());
        let old_prompt = self.active_prompt().await;

        let outcome = self
            .optimizer
            .optimize(
                &dataset,
                &old_prompt,
                self.settings.training_iterations,
                self.settings.minibatch_threshold,
            )
            .await;

        let (new_prompt, metrics, status) = match outcome {
            Ok(OptimizationOutcome::Skipped { .. }) => {
                info!("No optimizer backend, history kept ({} logs)", cycle.history.len());
                return None;
            }
            Ok(OptimizationOutcome::Trained { best_prompt, metrics }) if best_prompt.trim().is_empty() => {
                warn!("Optimizer returned an empty prompt, keeping the current one");
                (old_prompt.clone(), metrics, ImprovementStatus::NoUsablePrompt)
            }
            Ok(OptimizationOutcome::Trained { best_prompt, metrics }) => {
                *self.prompt.write().await = best_prompt.clone();
                info!("Wizard prompt updated after {} conversations", cycle.conversation_count);
                (best_prompt, metrics, ImprovementStatus::Improved)
            }
            Err(e) => {
                error!("Optimizer failed: {}", e);
                (
                    old_prompt.clone(),
                    OptimizationMetrics::default(),
                    ImprovementStatus::Failed(e.to_string()),
                )
            }
        };

        let record = ImprovementRecord {
            timestamp: Utc::now(),
            old_prompt,
            new_prompt,
            metrics,
            conversation_count: cycle.conversation_count,
            status,
        };
        emit(self.sink.as_ref(), LogRecord::Improvement(&record));
        cycle.history.clear();
        Some(record)
    }

    /// Run every persona through the controller with at most `workers`
    /// dialogues in flight. Reports come back in persona order.
    pub async fn run_population(
        self: &Arc<Self>,
        personas: Vec<Box<dyn Persona>>,
        workers: usize,
    ) -> Vec<ConversationReport> {
        let total = personas.len();
        if workers <= 1 {
            let mut reports = Vec::with_capacity(total);
            for (idx, mut persona) in personas.into_iter().enumerate() {
                info!("Conversation {}/{} with {}", idx + 1, total, persona.id());
                reports.push(self.run_conversation(persona.as_mut()).await);
            }
            return reports;
        }

        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, mut persona) in personas.into_iter().enumerate() {
            let controller = Arc::clone(self);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                info!("Conversation {}/{} with {}", idx + 1, total, persona.id());
                let report = controller.run_conversation(persona.as_mut()).await;
                (idx, report)
            });
        }

        let mut reports: Vec<Option<ConversationReport>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, report)) => reports[idx] = Some(report),
                Err(e) => error!("Conversation task failed: {}", e),
            }
        }
        reports.into_iter().flatten().collect()
    }
}
