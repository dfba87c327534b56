//! LLM-as-Judge for finished dialogues
//!
//! The judge answers with a JSON verdict inside free text. Anything that does
//! not parse into a verdict is an error; callers treat it as "no result".

use dspy_rs::Predict;
use serde::{Deserialize, Serialize};

use crate::lm::with_judge_lm;
use crate::{predict_error, AgentError};

#[allow(unused_imports)]
use baml_bridge;

/// Instruction for the judge predictor
pub const JUDGE_INSTRUCTION: &str = r#"You are judging a conversation between a Wizard and one member of a population. The Wizard was trying to reach the stated goal.

Evaluation criteria:
1. Did the other person end up agreeing to the goal?
2. How close did they come, if not?
3. Was the Wizard persuasive without being pushy or dishonest?

Return JSON only:
{"success": <true|false>, "score": <0.0-1.0>, "rationale": "<short explanation>"}

A score of 1.0 means the goal was clearly reached. 0.5 means the person was open but undecided. Below 0.2 means they refused."#;

/// Signature for judging a transcript
#[derive(dspy_rs::Signature, Clone, Debug)]
pub struct AssessConversation {
    #[input(desc = "What the Wizard was trying to achieve")]
    pub goal: String,

    #[input(desc = "The full transcript as `speaker: text` lines")]
    pub transcript: String,

    #[output(desc = "JSON object with success, score and rationale")]
    pub verdict: String,
}

/// Structured judge output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub success: bool,
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Scores dialogues through the globally configured LM
#[derive(Debug, Clone, Default)]
pub struct LlmJudge;

impl LlmJudge {
    pub fn new() -> Self {
        Self
    }

    pub async fn assess(&self, goal: &str, transcript: &str) -> Result<JudgeVerdict, AgentError> {
        let predictor = Predict::<AssessConversation>::builder()
            .instruction(JUDGE_INSTRUCTION)
            .build();

        let input = AssessConversationInput {
            goal: goal.to_string(),
            transcript: transcript.to_string(),
        };

        let response = with_judge_lm(predictor.call(input)).await.map_err(predict_error)?;
        parse_verdict(&response.verdict)
    }
}

/// Parse a judge verdict, tolerating prose around the JSON object
pub fn parse_verdict(response: &str) -> Result<JudgeVerdict, AgentError> {
    let json_str = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response,
    };

    let verdict: JudgeVerdict =
        serde_json::from_str(json_str).map_err(|e| AgentError::Verdict(e.to_string()))?;

    if !verdict.score.is_finite() {
        return Err(AgentError::Verdict(format!("score is not finite: {}", verdict.score)));
    }

    Ok(JudgeVerdict {
        score: verdict.score.clamp(0.0, 1.0),
        ..verdict
    })
}
