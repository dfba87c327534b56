//! Training examples built from conversation history

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::conversation::ConversationLog;

/// One conversation, reshaped for prompt optimization
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Prompt that was active when the conversation started
    pub instruction: String,
    /// `speaker: text` lines followed by a `RESULT:` line
    pub transcript: String,
    /// What the Wizard was trying to achieve
    pub goal: String,
    /// Judge score, 0 when the judge gave none
    pub score: f64,
    /// Whether `score` came from the judge (false means "missing", not "zero")
    pub judged: bool,
}

/// Maps a history snapshot onto training examples
pub struct DatasetBuilder;

impl DatasetBuilder {
    /// One example per log, in the same order. Pure: same logs, same output.
    pub fn build<'a>(logs: impl IntoIterator<Item = &'a ConversationLog>) -> Vec<TrainingExample> {
        logs.into_iter().map(Self::example).collect()
    }

    fn example(log: &ConversationLog) -> TrainingExample {
        let result_line = match &log.judge_result {
            Some(result) => match serde_json::to_string(result) {
                Ok(json) => format!("RESULT: {}", json),
                Err(_) => "RESULT: none".to_string(),
            },
            None => "RESULT: none".to_string(),
        };

        let transcript = if log.turns.is_empty() {
            result_line
        } else {
            format!("{}\n{}", log.transcript(), result_line)
        };

        TrainingExample {
            instruction: log.prompt_snapshot.clone(),
            transcript,
            goal: log.goal.clone(),
            score: log.score().unwrap_or(0.0),
            judged: log.judge_result.is_some(),
        }
    }
}

/// A dataset written to disk for inspection or offline runs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSet {
    /// Description of the dataset
    pub description: String,
    pub examples: Vec<TrainingExample>,
}

impl TrainingSet {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let set: TrainingSet = serde_json::from_str(&content)?;
        Ok(set)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Mean judge score over judged examples only
    pub fn mean_judged_score(&self) -> Option<f64> {
        let judged: Vec<f64> = self
            .examples
            .iter()
            .filter(|e| e.judged)
            .map(|e| e.score)
            .collect();
        if judged.is_empty() {
            return None;
        }
        Some(judged.iter().sum::<f64>() / judged.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{judged_log, unjudged_log};

    #[test]
    fn test_empty_snapshot_gives_empty_dataset() {
        let logs: Vec<ConversationLog> = vec![];
        assert!(DatasetBuilder::build(&logs).is_empty());
    }

    #[test]
    fn test_example_fields() {
        let log = judged_log("p1", 0.75);
        let examples = DatasetBuilder::build([&log]);

        assert_eq!(examples.len(), 1);
        let ex = &examples[0];
        assert_eq!(ex.instruction, log.prompt_snapshot);
        assert_eq!(ex.goal, log.goal);
        assert_eq!(ex.score, 0.75);
        assert!(ex.judged);
        assert!(ex.transcript.starts_with("wizard: "));
        assert!(ex.transcript.contains("\npersona: "));
        assert!(ex.transcript.ends_with(
            r#"RESULT: {"success":false,"score":0.75,"rationale":"scripted"}"#
        ));
    }

    #[test]
    fn test_missing_judge_defaults_score_to_zero() {
        let log = unjudged_log("p2");
        let ex = &DatasetBuilder::build([&log])[0];
        assert_eq!(ex.score, 0.0);
        assert!(!ex.judged);
        assert!(ex.transcript.ends_with("RESULT: none"));
    }

    #[test]
    fn test_order_preserved_and_idempotent() {
        let logs = vec![judged_log("a", 0.1), unjudged_log("b"), judged_log("a", 0.1)];
        let first = DatasetBuilder::build(&logs);
        let second = DatasetBuilder::build(&logs);

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0], first[2]);
        assert!(!first[1].judged);
    }

    #[test]
    fn test_mean_ignores_unjudged() {
        let logs = vec![judged_log("a", 0.2), unjudged_log("b"), judged_log("c", 0.6)];
        let set = TrainingSet {
            description: "test".to_string(),
            examples: DatasetBuilder::build(&logs),
        };
        let mean = set.mean_judged_score().unwrap();
        assert!((mean - 0.4).abs() < 1e-9);
    }
}
