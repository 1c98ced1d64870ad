//! Plan Pipeline CLI
//!
//! Starts a plan-generation run against the configured endpoint and follows
//! its event stream until the run ends. Ctrl-C cancels the run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use plan_pipeline::{logging, ConfigService, PipelineConsumer, SettingsUpdate};
use plan_pipeline_core::{GenerationRequest, RunState, StageId};
use plan_pipeline_transport::HttpTransport;

/// Exit code for a run the user cancelled
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "plan-pipeline",
    version,
    about = "Follow a streamed plan-generation run"
)]
struct Cli {
    /// Debug logging for this tool's own targets.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a generation run and follow it to the end.
    Run(RunArgs),
    /// Show the settings, applying any given changes first.
    Config(ConfigArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    grade: String,
    #[arg(long)]
    subject: String,
    #[arg(long)]
    accessibility_profile: Option<String>,
    /// Overrides the configured locale.
    #[arg(long)]
    locale: Option<String>,
    /// Overrides the configured endpoint and PLAN_PIPELINE_ENDPOINT.
    #[arg(long)]
    endpoint: Option<String>,
    /// Settings file to use instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the final snapshot as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    connect_timeout_secs: Option<u64>,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    retry_delay_ms: Option<u64>,
    #[arg(long)]
    locale: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let code = match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Config(args) => cmd_config(args).map(|_| 0),
    };

    match code {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}

fn open_config(path: Option<PathBuf>) -> Result<ConfigService> {
    let service = match path {
        Some(path) => ConfigService::open(path),
        None => ConfigService::new(),
    };
    service.context("load settings")
}

async fn cmd_run(args: RunArgs) -> Result<i32> {
    let service = open_config(args.config)?;
    let mut settings = service.effective_config()?;
    if let Some(endpoint) = args.endpoint {
        settings.endpoint = endpoint;
        settings
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid --endpoint")?;
    }

    let locale = args.locale.unwrap_or_else(|| settings.locale.clone());
    let mut request =
        GenerationRequest::new(args.prompt, args.grade, args.subject).with_locale(locale);
    if let Some(profile) = args.accessibility_profile {
        request = request.with_accessibility_profile(profile);
    }

    let transport = HttpTransport::new(settings.endpoint.clone(), settings.transport_config())
        .context("create HTTP transport")?;
    let consumer = PipelineConsumer::new(Arc::new(transport), settings.retry_policy());
    let mut stage = consumer.select(|state| state.current_stage);

    consumer.start(request)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let idle = consumer.wait_until_idle();
    tokio::pin!(idle);

    let state = loop {
        tokio::select! {
            biased;
            changed = stage.changed() => {
                if let Some(Some(current)) = changed {
                    if !args.json {
                        print_stage(current, &consumer.snapshot());
                    }
                }
            }
            _ = &mut ctrl_c => {
                consumer.cancel();
                break consumer.snapshot();
            }
            state = &mut idle => break state,
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state).context("serialize snapshot")?);
    } else {
        print_summary(&state);
    }

    Ok(exit_code(&state))
}

fn cmd_config(args: ConfigArgs) -> Result<()> {
    let mut service = open_config(args.config)?;
    let update = SettingsUpdate {
        endpoint: args.endpoint,
        auth_token: None,
        connect_timeout_secs: args.connect_timeout_secs,
        max_retries: args.max_retries,
        retry_delay_ms: args.retry_delay_ms,
        locale: args.locale,
    };

    let changed = update.endpoint.is_some()
        || update.connect_timeout_secs.is_some()
        || update.max_retries.is_some()
        || update.retry_delay_ms.is_some()
        || update.locale.is_some();
    if changed {
        service.update_config(update).context("update settings")?;
        eprintln!("saved {}", service.path().display());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&service.get_config().redacted())
            .context("serialize settings")?
    );
    Ok(())
}

fn print_stage(stage: StageId, state: &RunState) {
    if stage == StageId::Refinement && state.refinement_cycles > 1 {
        println!("▸ {} (cycle {})", stage, state.refinement_cycles);
    } else {
        println!("▸ {}", stage);
    }
}

fn print_summary(state: &RunState) {
    if let Some(score) = state.score {
        println!("score: {:.1}", score);
    }
    if let Some(decision) = state.decision {
        println!("decision: {}", decision);
    }
    if let Some(report) = &state.quality_report {
        println!(
            "checks: {}/{} passed",
            report.passed_checks().count(),
            report.checks.len()
        );
    }
    match &state.error {
        Some(error) => eprintln!("error: {}", error),
        None if state.plan.is_some() => println!("plan ready"),
        None => {}
    }
}

fn exit_code(state: &RunState) -> i32 {
    if state.is_cancelled() {
        EXIT_CANCELLED
    } else if state.error.is_some() {
        1
    } else {
        0
    }
}
