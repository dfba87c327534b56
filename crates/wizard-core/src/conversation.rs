//! Dialogue records: turns, judge results and the finished conversation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use wizard_agents::Message;

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Wizard,
    Persona,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Wizard => "wizard",
            Speaker::Persona => "persona",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One utterance in a dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Map this turn onto the Wizard model's message roles
    ///
    /// Wizard turns are the model's own (`assistant`), persona turns are the
    /// other party (`user`).
    pub fn to_wizard_message(&self) -> Message {
        match self.speaker {
            Speaker::Wizard => Message::assistant(self.text.clone()),
            Speaker::Persona => Message::user(self.text.clone()),
        }
    }
}

/// Judge's assessment of a finished dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub success: bool,
    pub score: f64,
    pub rationale: String,
}

/// Where an aborted session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortStage {
    Completion,
    Persona,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    GoalReached,
    TurnLimitReached,
    Aborted { stage: AbortStage, error: String },
}

/// A complete record of one Wizard/persona dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationLog {
    pub wizard_id: String,
    pub persona_id: String,
    pub goal: String,
    /// Prompt that was active when the session started
    pub prompt_snapshot: String,
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub judge_result: Option<JudgeResult>,
    pub outcome: SessionOutcome,
    pub timestamp: DateTime<Utc>,
}

impl ConversationLog {
    /// True when the dialogue was cut short by a collaborator failure
    pub fn is_incomplete(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Aborted { .. })
    }

    /// Judge score, if the judge produced one
    pub fn score(&self) -> Option<f64> {
        self.judge_result.as_ref().map(|j| j.score)
    }

    /// `speaker: text` lines, oldest first
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
