//! Persona role - one member of the simulated population
//!
//! A persona remembers its own side of the dialogue across turns, so the
//! same instance must be used for a whole conversation.

use dspy_rs::Predict;
use serde::{Deserialize, Serialize};

use crate::message::{format_conversation, Message};
use crate::lm::with_program_lm;
use crate::{predict_error, AgentError};

#[allow(unused_imports)]
use baml_bridge;

/// Name and personality a persona is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaSpec {
    pub name: String,
    pub personality: String,
}

/// Signature for a persona's reply
#[derive(dspy_rs::Signature, Clone, Debug)]
pub struct PersonaReply {
    #[input(desc = "Earlier messages in this conversation. Your own replies are marked [assistant]")]
    pub conversation: String,

    #[input(desc = "The newest message you are replying to")]
    pub message: String,

    #[output(desc = "Your reply, in character")]
    pub reply: String,
}

/// LLM-backed persona with bounded per-conversation memory
pub struct LlmPersona {
    id: String,
    spec: PersonaSpec,
    history: Vec<Message>,
    history_limit: usize,
}

impl LlmPersona {
    pub fn new(id: impl Into<String>, spec: PersonaSpec, history_limit: usize) -> Self {
        Self {
            id: id.into(),
            spec,
            history: Vec::new(),
            history_limit,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn spec(&self) -> &PersonaSpec {
        &self.spec
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    fn instruction(&self) -> String {
        format!(
            "You are {}. {}. Respond accordingly.",
            self.spec.name, self.spec.personality
        )
    }

    /// Reply to the Wizard's message and remember the exchange
    pub async fn respond(&mut self, message: &str) -> Result<String, AgentError> {
        let instruction = self.instruction();
        let predictor = Predict::<PersonaReply>::builder()
            .instruction(&instruction)
            .build();

        let input = PersonaReplyInput {
            conversation: format_conversation(&self.history),
            message: message.to_string(),
        };

        let response = with_program_lm(predictor.call(input))
            .await
            .map_err(predict_error)?;
        let reply = response.reply.trim().to_string();
        if reply.is_empty() {
            return Err(AgentError::Empty("persona reply"));
        }

        self.remember(message, &reply);
        Ok(reply)
    }

    fn remember(&mut self, incoming: &str, reply: &str) {
        // From the persona's side the Wizard is the user
        self.history.push(Message::user(incoming));
        self.history.push(Message::assistant(reply));

        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(..excess);
        }
    }
}
