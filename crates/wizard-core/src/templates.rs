//! Prompt templates with `{{key}}` placeholders

use anyhow::{Context, Result};
use std::path::Path;

/// Initial Wizard system prompt; `{{goal}}` is filled in at startup
pub const WIZARD_PROMPT_TEMPLATE: &str = "You are the Wizard, a persuasive but honest salesperson. \
Your goal: {{goal}}. Talk to one person at a time. Keep each message short, listen to what they \
say, answer their objections, and steer the conversation toward the goal without being pushy.";

/// Default brief for the population generator
pub const DEFAULT_POPULATION_INSTRUCTION: &str = "Generate a diverse population of potential \
customers. Vary age, income, temperament and how skeptical they are of sales pitches.";

/// Replace every `{{key}}` with its value; unknown placeholders are left alone
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{{{}}}}}", key), value)
    })
}

pub fn load_template(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).with_context(|| format!("reading template {}", path.display()))
}
