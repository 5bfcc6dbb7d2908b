//! Command-line interface for posterloom.
//!
//! Provides commands for generating posters, checking run status,
//! listing runs, and showing the resolved configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config;
use crate::core::{export_bundle, Orchestrator, PipelineOutcome, PosterRequest};
use crate::domain::{BrandInput, Stage, Termination};

/// posterloom - Multi-agent poster generation orchestrator
#[derive(Parser, Debug)]
#[command(name = "posterloom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a poster from keywords
    Generate {
        /// Keywords describing the poster (2-5)
        #[arg(short, long = "keyword", required = true, num_args = 1..)]
        keywords: Vec<String>,

        /// Brand logo image
        #[arg(long)]
        logo: Option<PathBuf>,

        /// Marketing material to ground the style in (repeatable)
        #[arg(long)]
        marketing: Vec<PathBuf>,

        /// Override the configured revision budget
        #[arg(long)]
        max_revisions: Option<u32>,

        /// Also write a layout wireframe
        #[arg(long)]
        wireframe: bool,

        /// Copy the poster and its bundle into this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Generate {
                keywords,
                logo,
                marketing,
                max_revisions,
                wireframe,
                out,
            } => {
                let mut request = PosterRequest::new(keywords)
                    .with_brand(BrandInput { logo, marketing })
                    .with_wireframe(wireframe);
                if let Some(max) = max_revisions {
                    request = request.with_max_revisions(max);
                }
                generate(request, out).await
            }
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Build an orchestrator from the resolved configuration
fn orchestrator() -> Result<Orchestrator> {
    let cfg = config::config()?;
    let registry = cfg.registry().context("Failed to bind model services")?;
    Ok(Orchestrator::new(registry, cfg.settings.clone(), cfg.runs_dir()))
}

/// Run the pipeline and report where the outputs went
async fn generate(request: PosterRequest, out: Option<PathBuf>) -> Result<()> {
    let orchestrator = orchestrator()?;
    let outcome = orchestrator.run(request).await?;

    let outputs = match (&outcome.outputs, out) {
        (Some(paths), Some(dir)) => Some(export_bundle(paths, &dir).await?),
        (paths, _) => paths.clone(),
    };

    print_outcome(&outcome);
    match outputs {
        Some(paths) => {
            println!("\nOutputs:");
            for path in paths.all() {
                println!("  {}", path.display());
            }
        }
        None => println!("\nNo candidate poster was produced"),
    }

    match &outcome.termination {
        Termination::AllChecksPassed => {
            eprintln!("\n[Run {} completed: all hard checks passed]", outcome.run_id);
        }
        Termination::BudgetExhausted { detail } => {
            eprintln!(
                "\n[Run {} returned best candidate, quality not guaranteed: {}]",
                outcome.run_id, detail
            );
        }
        Termination::Error { message } => {
            eprintln!("\n[Run {} failed: {}]", outcome.run_id, message);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome) {
    println!("Run ID:      {}", outcome.run_id);
    println!("Stage:       {}", outcome.stage);
    println!("Iterations:  {}", outcome.iterations);
    println!("Revisions:   {}", outcome.revisions_used);
    println!("Run dir:     {}", outcome.run_dir.display());

    let latest = outcome
        .spec
        .validation_history()
        .iter()
        .map(|r| r.iteration())
        .max();
    if let Some(iteration) = latest {
        println!("\nChecks (iteration {}):", iteration);
        for result in outcome.spec.results_for_iteration(iteration) {
            let mark = if result.passed() { "ok  " } else { "FAIL" };
            println!("  [{}] {:<22} {:?}", mark, result.check().to_string(), result.severity());
            if !result.passed() {
                println!("         {}", result.feedback());
            }
        }
    }
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let run = orchestrator()?.get_run_status(run_id).await?;

    println!("Run ID: {}", run.id);
    println!("Keywords: {}", run.keywords);
    println!("Stage: {}", run.stage);
    println!("Iteration: {}", run.iteration);
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("Elements generated: {}", run.elements_generated);
    println!("Failed checks: {}", run.checks_failed);
    match &run.termination {
        Some(Termination::AllChecksPassed) => println!("Result: all hard checks passed"),
        Some(Termination::BudgetExhausted { detail }) => {
            println!("Result: best candidate, quality not guaranteed ({})", detail)
        }
        Some(Termination::Error { message }) => println!("Result: failed ({})", message),
        None => println!("Result: (running)"),
    }

    Ok(())
}

/// List recent runs
async fn list_runs(limit: usize) -> Result<()> {
    let runs = orchestrator()?.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<30} {:<10} {:<6}", "RUN ID", "KEYWORDS", "STAGE", "ITER");
    println!("{}", "-".repeat(86));

    for run in runs {
        let stage = match (&run.termination, run.stage) {
            (None, _) => "running".to_string(),
            (Some(Termination::BudgetExhausted { .. }), Stage::Failed) => "best-effort".to_string(),
            (_, stage) => stage.to_string(),
        };
        let mut keywords = run.keywords.clone();
        if keywords.chars().count() > 28 {
            keywords = keywords.chars().take(27).collect::<String>() + "…";
        }
        println!("{:<38} {:<30} {:<10} {:<6}", run.id, keywords, stage, run.iteration);
    }

    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let settings = &cfg.settings;

    println!("posterloom configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home: {}", cfg.home.display());
    println!("  Runs: {}", cfg.runs_dir().display());
    println!();
    println!("Pipeline:");
    println!("  Max revisions:     {}", settings.pipeline.max_revisions);
    println!("  Max in flight:     {}", settings.pipeline.max_in_flight);
    println!(
        "  Keywords:          {}..={}",
        settings.pipeline.min_keywords, settings.pipeline.max_keywords
    );
    println!("  Run timeout:       {}s", settings.pipeline.run_timeout_seconds);
    println!("  Call timeout:      {}s", settings.pipeline.call_timeout_seconds);
    println!(
        "  Canvas:            {}x{} (margin {}px)",
        settings.pipeline.canvas.width, settings.pipeline.canvas.height, settings.pipeline.margin_px
    );
    println!();
    println!("Retry:");
    println!("  Max attempts:      {}", settings.retry.max_attempts);
    println!("  Initial delay:     {}ms", settings.retry.initial_delay_ms);
    println!();
    println!("Validation:");
    println!("  Min contrast:      {}:1", settings.validation.min_contrast_ratio);
    println!("  Max colors:        {}", settings.validation.max_colors);
    println!("  Max font families: {}", settings.validation.max_font_families);
    println!("  Aesthetic floor:   {}", settings.validation.aesthetic_threshold);
    println!();
    println!("Services:");
    println!("  Backend:           {:?}", cfg.services.backend);
    if let Some(url) = &cfg.services.base_url {
        println!("  Base URL:          {}", url);
    }
    for (capability, backend) in &cfg.services.overrides {
        println!("  {:<18} {:?}", format!("{}:", capability), backend);
    }

    Ok(())
}
