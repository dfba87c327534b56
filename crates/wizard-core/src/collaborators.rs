//! Session collaborator traits implemented by the LLM-backed roles

use anyhow::Result;
use async_trait::async_trait;
use wizard_agents::{LlmJudge, LlmPersona, Message, WizardModel};

use crate::conversation::{ConversationLog, JudgeResult};
use crate::session::{CompletionService, JudgeService, Persona};

#[async_trait]
impl CompletionService for WizardModel {
    async fn invoke(&self, system_prompt: &str, prior_turns: &[Message]) -> Result<String> {
        Ok(self.next_utterance(system_prompt, prior_turns).await?)
    }
}

#[async_trait]
impl JudgeService for LlmJudge {
    async fn assess(&self, log: &ConversationLog) -> Result<JudgeResult> {
        let verdict = LlmJudge::assess(self, &log.goal, &log.transcript()).await?;
        Ok(JudgeResult {
            success: verdict.success,
            score: verdict.score,
            rationale: verdict.rationale,
        })
    }
}

#[async_trait]
impl Persona for LlmPersona {
    fn id(&self) -> &str {
        LlmPersona::id(self)
    }

    async fn respond(&mut self, message: &str) -> Result<String> {
        Ok(LlmPersona::respond(self, message).await?)
    }
}
