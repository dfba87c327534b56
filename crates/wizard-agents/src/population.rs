//! Population generation
//!
//! Turns a free-text description of a market into concrete persona specs.

use dspy_rs::{BamlType, Predict};

use crate::persona::PersonaSpec;
use crate::lm::with_program_lm;
use crate::{predict_error, AgentError};

#[allow(unused_imports)]
use baml_bridge;

/// Instruction for the population generator
pub const POPULATION_INSTRUCTION: &str = r#"You create realistic, varied people for a conversation simulation.

Each person needs a first name and a personality description of one or two sentences covering their temperament, budget and attitude towards being sold to. Make the group diverse: some receptive, some sceptical, some hostile.

Return exactly the requested number of people."#;

/// One generated person, as parsed from the LM
#[derive(Clone, Debug, Default, BamlType)]
pub struct GeneratedPersona {
    /// First name
    pub name: String,
    /// Personality description
    pub personality: String,
}

impl From<GeneratedPersona> for PersonaSpec {
    fn from(p: GeneratedPersona) -> Self {
        PersonaSpec {
            name: p.name,
            personality: p.personality,
        }
    }
}

/// Signature for generating a population
#[derive(dspy_rs::Signature, Clone, Debug)]
pub struct GeneratePopulation {
    #[input(desc = "Description of the population to generate")]
    pub instruction: String,

    #[input(desc = "How many people to generate")]
    pub count: String,

    #[output(desc = "Array of people, each with a name and a personality")]
    pub personas: Vec<GeneratedPersona>,
}

/// Generates persona specifications through the globally configured LM
#[derive(Debug, Clone, Default)]
pub struct PopulationGenerator;

impl PopulationGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate up to `n` persona specs from a population description
    pub async fn spawn(&self, instruction: &str, n: usize) -> Result<Vec<PersonaSpec>, AgentError> {
        let predictor = Predict::<GeneratePopulation>::builder()
            .instruction(POPULATION_INSTRUCTION)
            .build();

        let input = GeneratePopulationInput {
            instruction: instruction.to_string(),
            count: n.to_string(),
        };

        let response = with_program_lm(predictor.call(input))
            .await
            .map_err(predict_error)?;
        let specs = keep_valid(response.personas, n);
        if specs.is_empty() {
            return Err(AgentError::Empty("population"));
        }

        if specs.len() < n {
            tracing::warn!("Requested {} personas, generator returned {}", n, specs.len());
        }
        Ok(specs)
    }
}

/// Drop nameless entries and cap the population at `n`
fn keep_valid(generated: Vec<GeneratedPersona>, n: usize) -> Vec<PersonaSpec> {
    generated
        .into_iter()
        .filter(|p| !p.name.trim().is_empty())
        .take(n)
        .map(PersonaSpec::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(name: &str) -> GeneratedPersona {
        GeneratedPersona {
            name: name.to_string(),
            personality: "curious".to_string(),
        }
    }

    #[test]
    fn test_keep_valid_caps_and_filters() {
        let specs = keep_valid(
            vec![generated("Ana"), generated("  "), generated("Ben"), generated("Cy")],
            2,
        );
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "Ana");
        assert_eq!(specs[1].name, "Ben");
    }
}
