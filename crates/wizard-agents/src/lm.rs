//! Global language model configuration
//!
//! DSRs predictors read one process-wide LM. Two profiles are built up front:
//! the program LM every role samples from, and a cooler judge LM. Calls run
//! through `with_program_lm` (shared) or `with_judge_lm` (exclusive); the
//! judge swaps its LM in, runs, and swaps the program LM back before any
//! other call can start.

use anyhow::Result;
use dspy_rs::{configure, ChatAdapter, LM};
use once_cell::sync::Lazy;
use std::future::Future;
use tokio::sync::RwLock;

/// Connection and sampling settings for the shared LM
#[derive(Debug, Clone)]
pub struct LmSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    /// Sampling temperature for judge calls
    pub judge_temperature: f32,
    pub max_tokens: u32,
}

struct Profiles {
    program: LM,
    judge: LM,
}

static PROFILES: Lazy<RwLock<Option<Profiles>>> = Lazy::new(|| RwLock::new(None));

async fn build_lm(settings: &LmSettings, temperature: f32) -> Result<LM> {
    let lm = LM::builder()
        .base_url(settings.api_url.clone())
        .api_key(settings.api_key.clone())
        .model(settings.model.clone())
        .temperature(temperature)
        .max_tokens(settings.max_tokens)
        .build()
        .await?;
    Ok(lm)
}

/// Configure the global LM used by every `Predict` call in this process
///
/// Must run before any role makes its first call.
pub async fn configure_lm(settings: &LmSettings) -> Result<()> {
    let program = build_lm(settings, settings.temperature).await?;
    let judge = build_lm(settings, settings.judge_temperature).await?;

    let mut profiles = PROFILES.write().await;
    configure(program.clone(), ChatAdapter);
    *profiles = Some(Profiles { program, judge });

    tracing::info!(
        "LM configured: {} @ {} (temperature {}, judge {})",
        settings.model,
        settings.api_url,
        settings.temperature,
        settings.judge_temperature
    );
    Ok(())
}

/// Run `call` against the program LM
///
/// Any number of these may be in flight together.
pub async fn with_program_lm<F: Future>(call: F) -> F::Output {
    let _shared = PROFILES.read().await;
    call.await
}

/// Run `call` against the judge LM, excluding every other call meanwhile
pub async fn with_judge_lm<F: Future>(call: F) -> F::Output {
    let profiles = PROFILES.write().await;
    let Some(profiles) = profiles.as_ref() else {
        return call.await;
    };

    configure(profiles.judge.clone(), ChatAdapter);
    let output = call.await;
    configure(profiles.program.clone(), ChatAdapter);
    output
}
