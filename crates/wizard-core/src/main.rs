use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wizard_agents::{configure_lm, LlmJudge, LlmPersona, PersonaSpec, PopulationGenerator, WizardModel};
use wizard_core::logs::{compact_timestamp, format_agent_id, save_json};
use wizard_core::templates::{load_template, render_template, WIZARD_PROMPT_TEMPLATE};
use wizard_core::{
    Config, ConversationSession, DspyBackend, JsonFileSink, OptimizerBackend, OptimizerKind,
    Persona, PromptMetric, PromptOptimizer, RunCounter, SessionOutcome, UnavailableBackend,
    WizardController,
};

/// One line of `summary.json`
#[derive(Serialize)]
struct SummaryEntry {
    persona_id: String,
    name: String,
    personality: String,
    outcome: SessionOutcome,
    turns: usize,
    success: Option<bool>,
    score: Option<f64>,
}

#[derive(Serialize)]
struct RunSummary {
    run_id: Uuid,
    run_no: u64,
    final_prompt: String,
    conversations: Vec<SummaryEntry>,
}

fn initial_prompt(config: &Config) -> Result<String> {
    if let Some(path) = &config.prompt_file {
        let prompt = load_template(path)?;
        info!("Using prompt from {}", path.display());
        return Ok(prompt.trim().to_string());
    }
    let template = match &config.prompt_template {
        Some(path) => load_template(path)?,
        None => WIZARD_PROMPT_TEMPLATE.to_string(),
    };
    Ok(render_template(&template, &[("goal", &config.goal)]))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "wizard=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🧙 Wizard starting up...");

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    config.validate()?;
    if !config.keyword_in_goal() {
        warn!(
            "Goal keyword '{}' does not appear in goal '{}'",
            config.goal_keyword, config.goal
        );
    }

    info!("Configuration loaded");
    info!("  LLM API: {}", config.llm_api_url);
    info!("  Model: {}", config.llm_model);
    info!("  Improvement schedule: {}", config.improve_after);

    if config.llm_api_key.is_none() {
        anyhow::bail!("LLM_API_KEY not set");
    }

    // Configure DSRs LM globally (required before any role runs)
    configure_lm(&config.lm_settings()).await?;
    info!("DSRs LM configured");

    let run_no = RunCounter::new(&config.logs_dir).increment()?;
    let run_id = Uuid::new_v4();
    info!("Run {} ({})", run_no, run_id);

    // Spawn the population and save each spec before any dialogue starts
    let specs = PopulationGenerator::new()
        .spawn(&config.population_instruction, config.population_size)
        .await
        .context("population generation failed")?;
    if specs.is_empty() {
        anyhow::bail!("population generator returned no personas");
    }
    if specs.len() < config.population_size {
        warn!(
            "Population generator returned {} of {} personas",
            specs.len(),
            config.population_size
        );
    }

    let mut personas = Vec::with_capacity(specs.len());
    let mut roster: HashMap<String, PersonaSpec> = HashMap::new();
    for (idx, spec) in specs.into_iter().enumerate() {
        let persona = LlmPersona::new(
            format_agent_id(run_no, idx + 1),
            spec,
            config.persona_history_limit,
        );
        let spec_path = config.logs_dir.join(format!(
            "{}_spec_{}.json",
            persona.id(),
            compact_timestamp(chrono::Utc::now())
        ));
        save_json(&spec_path, persona.spec())?;
        info!("Created {} -> {}", persona.id(), spec_path.display());
        roster.insert(persona.id().to_string(), persona.spec().clone());
        personas.push(persona);
    }

    let backend: Arc<dyn OptimizerBackend> = match config.optimizer {
        OptimizerKind::Dspy => Arc::new(DspyBackend::new()),
        OptimizerKind::None => Arc::new(UnavailableBackend),
    };
    info!("Optimizer backend: {}", backend.name());

    let settings = config.controller_settings()?;
    let session = ConversationSession::new(
        settings.wizard_id.clone(),
        settings.goal.clone(),
        Arc::new(WizardModel::new()),
        Arc::new(LlmJudge::new()),
    )
    .with_live_output(settings.show_live);
    let optimizer = PromptOptimizer::new(
        backend,
        settings.goal.clone(),
        PromptMetric::new(settings.goal_keyword.clone(), config.keyword_bonus),
    );
    let sink = Arc::new(JsonFileSink::new(&config.logs_dir, run_no)?);
    let controller = Arc::new(WizardController::new(
        settings,
        session,
        optimizer,
        sink,
        initial_prompt(&config)?,
    ));

    let boxed: Vec<Box<dyn Persona>> = personas
        .into_iter()
        .map(|p| Box::new(p) as Box<dyn Persona>)
        .collect();
    let reports = controller.run_population(boxed, config.workers).await;

    let conversations: Vec<SummaryEntry> = reports
        .iter()
        .map(|report| {
            let spec = roster.get(&report.log.persona_id);
            SummaryEntry {
                persona_id: report.log.persona_id.clone(),
                name: spec.map(|s| s.name.clone()).unwrap_or_default(),
                personality: spec.map(|s| s.personality.clone()).unwrap_or_default(),
                outcome: report.log.outcome.clone(),
                turns: report.log.turns.len(),
                success: report.log.judge_result.as_ref().map(|j| j.success),
                score: report.log.score(),
            }
        })
        .collect();

    let improved = reports.iter().filter(|r| r.improvement.is_some()).count();
    let summary = RunSummary {
        run_id,
        run_no,
        final_prompt: controller.active_prompt().await,
        conversations,
    };
    save_json(&config.logs_dir.join("summary.json"), &summary)?;

    info!(
        "Completed {} conversations, {} improvement cycles",
        summary.conversations.len(),
        improved
    );
    Ok(())
}
