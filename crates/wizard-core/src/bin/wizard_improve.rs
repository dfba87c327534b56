//! Offline prompt improvement over saved conversation logs
//!
//! Reads the conversation JSON files a `wizard` run left in the logs
//! directory, rebuilds the training dataset and runs one optimization pass.
//!
//! Usage:
//!   cargo run --bin wizard-improve -- --dry-run   (build and save the dataset only)
//!   cargo run --bin wizard-improve                (optimize and save the prompt)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wizard_agents::configure_lm;
use wizard_core::optimizer::TrainingSet;
use wizard_core::templates::{load_template, render_template, WIZARD_PROMPT_TEMPLATE};
use wizard_core::{
    Config, ConversationLog, DatasetBuilder, DspyBackend, HistoryBuffer, OptimizationOutcome,
    OptimizerBackend, OptimizerKind, PromptMetric, PromptOptimizer, UnavailableBackend,
};

const OUTPUT_DIR: &str = "optimized_prompts";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let dry_run = args.contains(&"--dry-run".to_string());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(dry_run))
}

/// Every file in `dir` that parses as a conversation log, oldest first
fn load_logs(dir: &Path) -> Result<Vec<ConversationLog>> {
    let mut logs = Vec::new();
    let entries = std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        // Persona spec and summary files share the directory
        if let Ok(log) = serde_json::from_str::<ConversationLog>(&content) {
            logs.push(log);
        }
    }
    logs.sort_by_key(|l| l.timestamp);
    Ok(logs)
}

fn current_prompt(config: &Config) -> Result<String> {
    let latest = PathBuf::from(OUTPUT_DIR).join("latest.txt");
    let path = config.prompt_file.clone().or_else(|| latest.exists().then_some(latest));
    if let Some(path) = path {
        return Ok(load_template(path)?.trim().to_string());
    }
    let template = match &config.prompt_template {
        Some(path) => load_template(path)?,
        None => WIZARD_PROMPT_TEMPLATE.to_string(),
    };
    Ok(render_template(&template, &[("goal", &config.goal)]))
}

async fn run(dry_run: bool) -> Result<()> {
    println!("=== Wizard Prompt Improvement ===\n");

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    config.validate()?;

    let logs = load_logs(&config.logs_dir)?;
    println!("Found {} conversation logs in {}", logs.len(), config.logs_dir.display());

    // Only the most recent logs count, exactly as in a live run
    let mut history = HistoryBuffer::new(config.history_capacity);
    for log in logs {
        history.append(log);
    }
    let snapshot = history.snapshot();
    let examples = DatasetBuilder::build(snapshot.logs());

    let set = TrainingSet {
        description: format!("{} most recent conversations", examples.len()),
        examples,
    };
    let dataset_path = config.logs_dir.join("dataset.json");
    set.save_to_file(&dataset_path)?;
    println!("Dataset: {} examples -> {}", set.examples.len(), dataset_path.display());
    match set.mean_judged_score() {
        Some(mean) => println!("Mean judge score: {:.3}", mean),
        None => println!("Mean judge score: n/a (no judged conversations)"),
    }

    if dry_run {
        return Ok(());
    }

    let backend: Arc<dyn OptimizerBackend> = match config.optimizer {
        OptimizerKind::Dspy => {
            configure_lm(&config.lm_settings()).await?;
            Arc::new(DspyBackend::new())
        }
        OptimizerKind::None => Arc::new(UnavailableBackend),
    };

    let prompt = current_prompt(&config)?;
    println!("Current prompt: {} chars\n", prompt.len());

    let optimizer = PromptOptimizer::new(
        backend,
        config.goal.clone(),
        PromptMetric::new(config.goal_keyword.clone(), config.keyword_bonus),
    );
    let outcome = optimizer
        .optimize(&set.examples, &prompt, config.training_iterations, config.minibatch_threshold)
        .await?;

    let (best_prompt, metrics) = match outcome {
        OptimizationOutcome::Skipped { .. } => {
            println!("No optimizer backend configured, nothing to do.");
            return Ok(());
        }
        OptimizationOutcome::Trained { best_prompt, metrics } => (best_prompt, metrics),
    };

    println!("Strategy: {:?}", metrics.strategy);
    println!("Candidate scores: {:?}", metrics.candidate_scores);
    if let Some(score) = metrics.best_score {
        println!("Best score: {:.3}", score);
    }

    if best_prompt.is_empty() {
        println!("\nNo usable prompt came out of training; keeping the current one.");
        return Ok(());
    }

    let output_path = PathBuf::from(OUTPUT_DIR).join("latest.txt");
    std::fs::create_dir_all(OUTPUT_DIR)?;
    std::fs::write(&output_path, &best_prompt)?;
    println!("\nSaved to: {}", output_path.display());
    println!("Set WIZARD_PROMPT_FILE={} to use it in the next run", output_path.display());

    println!("\n=== Improved Prompt ===\n");
    println!("{}", best_prompt);

    Ok(())
}
