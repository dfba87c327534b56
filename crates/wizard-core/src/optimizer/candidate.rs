//! Candidate programs, selection and prompt extraction

use serde::{Deserialize, Serialize};

/// A trained program as produced by an optimizer backend
///
/// `instructions` is the structured field; `rendered` is the program's
/// human-readable form and is only consulted when the structured field is
/// missing or unusable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Option<String>,
    pub rendered: String,
}

impl Program {
    pub fn with_instructions(instructions: impl Into<String>, rendered: impl Into<String>) -> Self {
        Self {
            instructions: Some(instructions.into()),
            rendered: rendered.into(),
        }
    }

    pub fn rendered_only(rendered: impl Into<String>) -> Self {
        Self {
            instructions: None,
            rendered: rendered.into(),
        }
    }
}

/// A scored program
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub program: Program,
    pub score: f64,
}

/// Highest score wins; on a tie the earliest candidate is kept
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut best: Option<&Candidate> = None;
    for candidate in candidates {
        match best {
            Some(b) if candidate.score <= b.score => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Pull the prompt text out of a program
///
/// Structured `instructions` first, skipping blank values and the backend's
/// generic placeholder. Falls back to scanning the rendered text.
pub fn extract_prompt(program: &Program, placeholder: &str) -> Option<String> {
    if let Some(instructions) = &program.instructions {
        let trimmed = instructions.trim();
        if !trimmed.is_empty() && trimmed != placeholder.trim() {
            return Some(trimmed.to_string());
        }
    }
    legacy::scan_instructions(&program.rendered)
}

pub mod legacy {
    //! Textual extraction for programs that only expose a rendered form

    use once_cell::sync::Lazy;
    use regex::Regex;

    static INSTRUCTIONS_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?s)instructions=(?:"""(.*?)"""|"(.*?)"|'(.*?)')"#)
            .expect("invalid instructions regex")
    });

    /// First `instructions="""..."""`, `"..."` or `'...'` value, trimmed
    pub fn scan_instructions(rendered: &str) -> Option<String> {
        let caps = INSTRUCTIONS_RE.captures(rendered)?;
        let value = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
        let trimmed = value.as_str().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
