//! Conversation session - drives one bounded Wizard/persona dialogue
//!
//! State machine:
//!
//! ```text
//! ACTIVE --goal keyword seen--> GOAL_REACHED -------+
//!    |                                              +--> JUDGED --> DONE
//!    +----max turns exhausted--> TURN_LIMIT_REACHED-+
//!    |
//!    +----collaborator error---> ABORTED ---------------------------> DONE
//! ```
//!
//! The session only talks to its collaborators. Buffering the finished log is
//! the caller's job.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wizard_agents::Message;

use crate::conversation::{AbortStage, ConversationLog, JudgeResult, SessionOutcome, Speaker, Turn};

/// Produces the Wizard's next utterance
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn invoke(&self, system_prompt: &str, prior_turns: &[Message]) -> Result<String>;
}

/// Scores a finished dialogue
#[async_trait]
pub trait JudgeService: Send + Sync {
    async fn assess(&self, log: &ConversationLog) -> Result<JudgeResult>;
}

/// One member of the population, stateful across a session's turns
#[async_trait]
pub trait Persona: Send {
    fn id(&self) -> &str;
    async fn respond(&mut self, message: &str) -> Result<String>;
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    GoalReached,
    TurnLimitReached,
    Aborted,
    Judged,
    Done,
}

impl SessionState {
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Active, GoalReached)
                | (Active, TurnLimitReached)
                | (Active, Aborted)
                | (GoalReached, Judged)
                | (TurnLimitReached, Judged)
                | (Judged, Done)
                | (Aborted, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Done
    }
}

/// Case-insensitive containment of the goal keyword
pub fn goal_reached(reply: &str, goal_keyword: &str) -> bool {
    reply.to_lowercase().contains(&goal_keyword.to_lowercase())
}

/// Runs dialogues for one Wizard against its collaborators
pub struct ConversationSession {
    wizard_id: String,
    goal: String,
    completion: Arc<dyn CompletionService>,
    judge: Arc<dyn JudgeService>,
    show_live: bool,
}

impl ConversationSession {
    pub fn new(
        wizard_id: impl Into<String>,
        goal: impl Into<String>,
        completion: Arc<dyn CompletionService>,
        judge: Arc<dyn JudgeService>,
    ) -> Self {
        Self {
            wizard_id: wizard_id.into(),
            goal: goal.into(),
            completion,
            judge,
            show_live: false,
        }
    }

    /// Echo every turn at `info` level while it happens
    pub fn with_live_output(mut self, show_live: bool) -> Self {
        self.show_live = show_live;
        self
    }

    fn advance(&self, state: &mut SessionState, next: SessionState, persona_id: &str) {
        debug_assert!(
            state.can_advance_to(next),
            "illegal session transition {:?} -> {:?}",
            state,
            next
        );
        debug!("Session {} -> {}: {:?} -> {:?}", self.wizard_id, persona_id, state, next);
        *state = next;
    }

    fn echo(&self, persona_id: &str, turn: &Turn) {
        if self.show_live {
            info!("[{} | {}] {}: {}", self.wizard_id, persona_id, turn.speaker, turn.text);
        }
    }

    /// Drive one dialogue to completion
    ///
    /// Never fails: collaborator errors end the dialogue early and are recorded
    /// in the returned log's outcome.
    pub async fn run(
        &self,
        active_prompt: &str,
        persona: &mut dyn Persona,
        goal_keyword: &str,
        max_turns: usize,
    ) -> ConversationLog {
        let persona_id = persona.id().to_string();
        let started_at = Utc::now();
        let mut state = SessionState::Active;
        let mut turns: Vec<Turn> = Vec::with_capacity(max_turns * 2);
        let mut outcome = SessionOutcome::TurnLimitReached;

        for round in 1..=max_turns {
            let context: Vec<Message> = turns.iter().map(Turn::to_wizard_message).collect();

            let utterance = match self.completion.invoke(active_prompt, &context).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Completion failed in round {} with {}: {}", round, persona_id, e);
                    outcome = SessionOutcome::Aborted {
                        stage: AbortStage::Completion,
                        error: e.to_string(),
                    };
                    self.advance(&mut state, SessionState::Aborted, &persona_id);
                    break;
                }
            };
            let wizard_turn = Turn::new(Speaker::Wizard, utterance);
            self.echo(&persona_id, &wizard_turn);
            turns.push(wizard_turn);

            let last_utterance = &turns[turns.len() - 1].text;
            let reply = match persona.respond(last_utterance).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Persona {} failed in round {}: {}", persona_id, round, e);
                    outcome = SessionOutcome::Aborted {
                        stage: AbortStage::Persona,
                        error: e.to_string(),
                    };
                    self.advance(&mut state, SessionState::Aborted, &persona_id);
                    break;
                }
            };
            let reached = goal_reached(&reply, goal_keyword);
            let persona_turn = Turn::new(Speaker::Persona, reply);
            self.echo(&persona_id, &persona_turn);
            turns.push(persona_turn);

            if reached {
                info!("Goal keyword reached with {} in round {}", persona_id, round);
                outcome = SessionOutcome::GoalReached;
                self.advance(&mut state, SessionState::GoalReached, &persona_id);
                break;
            }
        }

        if state == SessionState::Active {
            self.advance(&mut state, SessionState::TurnLimitReached, &persona_id);
        }

        let mut log = ConversationLog {
            wizard_id: self.wizard_id.clone(),
            persona_id: persona_id.clone(),
            goal: self.goal.clone(),
            prompt_snapshot: active_prompt.to_string(),
            turns,
            judge_result: None,
            outcome,
            timestamp: started_at,
        };

        if state != SessionState::Aborted {
            match self.judge.assess(&log).await {
                Ok(result) => log.judge_result = Some(result),
                Err(e) => warn!("Judge unavailable for {}: {}", persona_id, e),
            }
            self.advance(&mut state, SessionState::Judged, &persona_id);
        }

        self.advance(&mut state, SessionState::Done, &persona_id);
        debug_assert!(state.is_terminal());
        log
    }
}
