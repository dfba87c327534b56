use anyhow::{Context, Result};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use thiserror::Error;
use wizard_agents::LmSettings;

use crate::controller::ControllerSettings;
use crate::schedule::ImprovementSchedule;
use crate::templates::DEFAULT_POPULATION_INSTRUCTION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Dspy,
    None,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("population size ({size}) must be at least the last improvement point ({last_point})")]
    PopulationTooSmall { size: usize, last_point: usize },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("goal keyword must not be empty")]
    EmptyKeyword,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub wizard_id: String,
    pub max_turns: usize,
    pub goal: String,
    /// Word whose appearance in a persona reply ends the dialogue
    pub goal_keyword: String,
    pub history_capacity: usize,
    pub improve_after: ImprovementSchedule,
    pub minibatch_threshold: usize,
    pub training_iterations: usize,
    pub keyword_bonus: f64,

    pub population_size: usize,
    pub population_instruction: String,
    pub persona_history_limit: usize,

    /// Optional file replacing the built-in Wizard prompt template
    pub prompt_template: Option<PathBuf>,
    /// Optional file holding a ready prompt (e.g. from `wizard-improve`)
    pub prompt_file: Option<PathBuf>,
    pub logs_dir: PathBuf,
    pub show_live: bool,
    pub workers: usize,
    pub optimizer: OptimizerKind,

    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_judge_temperature: f32,
    pub llm_max_tokens: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            wizard_id: get("WIZARD_ID", "Wizard_001"),
            max_turns: get("WIZARD_MAX_TURNS", "20")
                .parse()
                .context("WIZARD_MAX_TURNS must be a number")?,
            goal: get("WIZARD_GOAL", "Convince population to buy"),
            goal_keyword: get("WIZARD_GOAL_KEYWORD", "buy").trim().to_string(),
            history_capacity: get("WIZARD_HISTORY_CAPACITY", "50")
                .parse()
                .context("WIZARD_HISTORY_CAPACITY must be a number")?,
            improve_after: get("WIZARD_IMPROVE_AFTER", "1;5;36")
                .parse()
                .context("WIZARD_IMPROVE_AFTER must be a number or a ';' separated list")?,
            minibatch_threshold: get("WIZARD_MINIBATCH_THRESHOLD", "3")
                .parse()
                .context("WIZARD_MINIBATCH_THRESHOLD must be a number")?,
            training_iterations: get("WIZARD_TRAINING_ITERATIONS", "1")
                .parse()
                .context("WIZARD_TRAINING_ITERATIONS must be a number")?,
            keyword_bonus: get("WIZARD_KEYWORD_BONUS", "1.0")
                .parse()
                .context("WIZARD_KEYWORD_BONUS must be a number")?,

            population_size: get("WIZARD_POPULATION_SIZE", "36")
                .parse()
                .context("WIZARD_POPULATION_SIZE must be a number")?,
            population_instruction: get("WIZARD_POPULATION_INSTRUCTION", DEFAULT_POPULATION_INSTRUCTION),
            persona_history_limit: get("PERSONA_HISTORY_LIMIT", "50")
                .parse()
                .context("PERSONA_HISTORY_LIMIT must be a number")?,

            prompt_template: var("WIZARD_PROMPT_TEMPLATE").map(PathBuf::from),
            prompt_file: var("WIZARD_PROMPT_FILE").map(PathBuf::from),
            logs_dir: PathBuf::from(get("WIZARD_LOGS_DIR", "logs")),
            show_live: var("WIZARD_SHOW_LIVE")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(true),
            workers: get("WIZARD_WORKERS", "1")
                .parse()
                .context("WIZARD_WORKERS must be a number")?,
            optimizer: match get("WIZARD_OPTIMIZER", "dspy").to_lowercase().as_str() {
                "none" | "off" => OptimizerKind::None,
                _ => OptimizerKind::Dspy,
            },

            llm_api_url: get("LLM_API_URL", "https://api.openai.com/v1"),
            llm_api_key: var("LLM_API_KEY"),
            llm_model: get("LLM_MODEL", "gpt-4.1-nano"),
            llm_temperature: get("LLM_TEMPERATURE", "0.7")
                .parse()
                .context("LLM_TEMPERATURE must be a number")?,
            llm_judge_temperature: get("LLM_JUDGE_TEMPERATURE", "0.3")
                .parse()
                .context("LLM_JUDGE_TEMPERATURE must be a number")?,
            llm_max_tokens: get("LLM_MAX_TOKENS", "512")
                .parse()
                .context("LLM_MAX_TOKENS must be a number")?,
        })
    }

    /// Reject settings the run cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::Zero("WIZARD_MAX_TURNS"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Zero("WIZARD_HISTORY_CAPACITY"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Zero("WIZARD_WORKERS"));
        }
        if self.minibatch_threshold == 0 {
            return Err(ConfigError::Zero("WIZARD_MINIBATCH_THRESHOLD"));
        }
        if self.goal_keyword.is_empty() {
            return Err(ConfigError::EmptyKeyword);
        }
        let last_point = self.improve_after.last_point();
        if self.population_size < last_point {
            return Err(ConfigError::PopulationTooSmall {
                size: self.population_size,
                last_point,
            });
        }
        Ok(())
    }

    /// False when the goal text never mentions the keyword (worth a warning)
    pub fn keyword_in_goal(&self) -> bool {
        self.goal
            .to_lowercase()
            .contains(&self.goal_keyword.to_lowercase())
    }

    pub fn controller_settings(&self) -> Result<ControllerSettings, ConfigError> {
        let history_capacity = NonZeroUsize::new(self.history_capacity)
            .ok_or(ConfigError::Zero("WIZARD_HISTORY_CAPACITY"))?;
        Ok(ControllerSettings {
            wizard_id: self.wizard_id.clone(),
            goal: self.goal.clone(),
            goal_keyword: self.goal_keyword.clone(),
            max_turns: self.max_turns,
            history_capacity,
            schedule: self.improve_after.clone(),
            training_iterations: self.training_iterations,
            minibatch_threshold: self.minibatch_threshold,
            show_live: self.show_live,
        })
    }

    pub fn lm_settings(&self) -> LmSettings {
        LmSettings {
            api_url: self.llm_api_url.clone(),
            api_key: self.llm_api_key.clone().unwrap_or_default(),
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            judge_temperature: self.llm_judge_temperature,
            max_tokens: self.llm_max_tokens,
        }
    }
}
