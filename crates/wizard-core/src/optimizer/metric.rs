//! Candidate scoring

use super::dataset::TrainingExample;

/// Scores a candidate prompt against the example it was derived from
///
/// `score = example.score (0 when none) + keyword_bonus if the prompt mentions
/// the goal keyword`. Matching is case-insensitive.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptMetric {
    pub goal_keyword: String,
    pub keyword_bonus: f64,
}

impl PromptMetric {
    pub fn new(goal_keyword: impl Into<String>, keyword_bonus: f64) -> Self {
        Self {
            goal_keyword: goal_keyword.into(),
            keyword_bonus,
        }
    }

    pub fn score(&self, example: Option<&TrainingExample>, prompt: &str) -> f64 {
        let baseline = example.map(|e| e.score).unwrap_or(0.0);
        if self.mentions_keyword(prompt) {
            baseline + self.keyword_bonus
        } else {
            baseline
        }
    }

    fn mentions_keyword(&self, prompt: &str) -> bool {
        !self.goal_keyword.is_empty()
            && prompt
                .to_lowercase()
                .contains(&self.goal_keyword.to_lowercase())
    }
}
