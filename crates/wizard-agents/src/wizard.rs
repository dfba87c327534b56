//! The Wizard's completion role
//!
//! The system prompt is passed as the predictor instruction, so every call
//! sees exactly the prompt the caller snapshotted.

use dspy_rs::Predict;

use crate::message::{format_conversation, Message};
use crate::lm::with_program_lm;
use crate::{predict_error, AgentError};

// baml_bridge is needed for the Signature derive macro expansion
#[allow(unused_imports)]
use baml_bridge;

/// Signature for producing the Wizard's next message
#[derive(dspy_rs::Signature, Clone, Debug)]
pub struct WizardUtterance {
    #[input(desc = "The dialogue so far, oldest first. Your own earlier messages are marked [assistant], the other person's replies are marked [user]")]
    pub conversation: String,

    #[output(desc = "Your next message to the person you are talking with")]
    pub message: String,
}

/// Produces Wizard utterances through the globally configured LM
#[derive(Debug, Clone, Default)]
pub struct WizardModel;

impl WizardModel {
    pub fn new() -> Self {
        Self
    }

    /// Ask the model for the next Wizard message
    pub async fn next_utterance(
        &self,
        system_prompt: &str,
        history: &[Message],
    ) -> Result<String, AgentError> {
        let predictor = Predict::<WizardUtterance>::builder()
            .instruction(system_prompt)
            .build();

        let input = WizardUtteranceInput {
            conversation: format_conversation(history),
        };

        let response = with_program_lm(predictor.call(input))
            .await
            .map_err(predict_error)?;
        let message = response.message.trim().to_string();
        if message.is_empty() {
            return Err(AgentError::Empty("wizard message"));
        }

        tracing::debug!("Wizard utterance: {} chars", message.len());
        Ok(message)
    }
}
