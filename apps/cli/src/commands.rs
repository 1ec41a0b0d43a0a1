//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use mvpfactory_analysis::StaticValidator;
use mvpfactory_artifacts::ArtifactStore;
use mvpfactory_core::{PipelineController, PipelineSettings, RunOutcome};
use mvpfactory_generation::{GeminiClient, ModelRoster};
use mvpfactory_shared::{AppConfig, BuildMode, init_config, load_config, resolve_api_key};
use mvpfactory_storage::{ActiveCheckpoint, CheckpointManager};

use crate::menu;
use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MVP Factory: turn an idea into a runnable MVP project.
#[derive(Parser)]
#[command(
    name = "mvpfactory",
    version,
    about = "Plan, generate, and repair MVP projects from a one-line idea.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Root directory for generated projects (overrides config).
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Reviewer pass budget for the repair loop (overrides config).
    #[arg(long, global = true)]
    pub max_fix_iterations: Option<usize>,

    /// Model used for frontend files.
    #[arg(long, env = "FE_MODEL", global = true)]
    pub frontend_model: Option<String>,

    /// Model used for backend files.
    #[arg(long, env = "BE_MODEL", global = true)]
    pub backend_model: Option<String>,

    /// Without a subcommand an interactive menu is shown.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build a new project from an idea.
    New {
        /// The idea to build. Prompted for when omitted.
        idea: Option<String>,
    },

    /// Upgrade an existing project under the output directory.
    Upgrade {
        /// Project directory name (its identity).
        project: String,

        /// What to add or change. Prompted for when omitted.
        request: Option<String>,
    },

    /// Resume an interrupted run from its checkpoint.
    Resume {
        /// Project identity; defaults to the most recent active checkpoint.
        #[arg(long)]
        project: Option<String>,
    },

    /// Manage checkpoints of unfinished runs.
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Checkpoint subcommands.
#[derive(Subcommand)]
pub(crate) enum CheckpointAction {
    /// List active checkpoints, newest first.
    List,
    /// Delete the active checkpoint of a project.
    Delete {
        /// Project identity.
        project: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "warn,mvpfactory=info",
        1 => "info,mvpfactory=debug",
        _ => "debug,mvpfactory=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolved_config(&cli)?;

    match cli.command {
        None => menu::run(&config).await,
        Some(Command::New { idea }) => {
            let idea = match idea {
                Some(idea) => idea,
                None => menu::ask("Idea to build")?,
            };
            cmd_new(&config, &idea).await
        }
        Some(Command::Upgrade { project, request }) => {
            let request = match request {
                Some(request) => request,
                None => menu::ask("What should be added or changed")?,
            };
            cmd_upgrade(&config, &project, &request).await
        }
        Some(Command::Resume { project }) => cmd_resume(&config, project.as_deref()).await,
        Some(Command::Checkpoints { action }) => match action {
            CheckpointAction::List => cmd_checkpoints_list(&config),
            CheckpointAction::Delete { project } => cmd_checkpoints_delete(&config, &project),
        },
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// Config file merged with CLI and environment overrides.
fn resolved_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(out) = &cli.out {
        config.defaults.output_dir = out.to_string_lossy().into_owned();
    }
    if let Some(max) = cli.max_fix_iterations {
        config.defaults.max_fix_iterations = max;
    }
    if let Some(model) = &cli.frontend_model {
        config.gemini.frontend_model = model.clone();
    }
    if let Some(model) = &cli.backend_model {
        config.gemini.backend_model = model.clone();
    }
    Ok(config)
}

pub(crate) fn checkpoint_manager(config: &AppConfig) -> CheckpointManager {
    CheckpointManager::new(&config.defaults.checkpoint_dir)
}

/// Assemble a controller backed by the Gemini API.
pub(crate) fn build_controller(config: &AppConfig) -> Result<PipelineController<GeminiClient>> {
    let api_key = resolve_api_key(config)?;
    let generator = GeminiClient::new(
        config.gemini.base_url.clone(),
        api_key,
        ModelRoster::from(&config.gemini),
    )?;

    Ok(PipelineController::new(
        generator,
        checkpoint_manager(config),
        ArtifactStore::new(config.validation.extra_skip_dirs.iter().cloned()),
        StaticValidator::from_config(&config.validation),
        PipelineSettings {
            output_root: PathBuf::from(&config.defaults.output_dir),
            max_fix_iterations: config.defaults.max_fix_iterations,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    ))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

pub(crate) async fn cmd_new(config: &AppConfig, idea: &str) -> Result<()> {
    let idea = idea.trim();
    if idea.is_empty() {
        return Err(eyre!("the idea must not be empty"));
    }
    let controller = build_controller(config)?;
    info!(idea_len = idea.len(), "starting new build");

    let reporter = CliProgress::new();
    let outcome = controller.run_new(idea, &reporter).await?;
    print_outcome(&outcome)
}

pub(crate) async fn cmd_upgrade(config: &AppConfig, project: &str, request: &str) -> Result<()> {
    let request = request.trim();
    if request.is_empty() {
        return Err(eyre!("the upgrade request must not be empty"));
    }
    let controller = build_controller(config)?;
    info!(project, "starting upgrade");

    let reporter = CliProgress::new();
    let outcome = controller.run_upgrade(project, request, &reporter).await?;
    print_outcome(&outcome)
}

async fn cmd_resume(config: &AppConfig, project: Option<&str>) -> Result<()> {
    let checkpoints = checkpoint_manager(config);
    let checkpoint = match project {
        Some(project) => checkpoints
            .find_active(project)?
            .ok_or_else(|| eyre!("no active checkpoint for '{project}'"))?,
        None => checkpoints
            .list_active()?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("no active checkpoints to resume"))?,
    };
    resume_checkpoint(config, checkpoint).await
}

pub(crate) async fn resume_checkpoint(
    config: &AppConfig,
    checkpoint: ActiveCheckpoint,
) -> Result<()> {
    let controller = build_controller(config)?;
    let completed = checkpoint.record.phase_completed;
    println!(
        "Resuming '{}' ({})",
        checkpoint.handle.identity(),
        completed.resume_hint()
    );

    let reporter = CliProgress::new();
    let outcome = controller.resume(checkpoint, &reporter).await?;
    print_outcome(&outcome)
}

/// Delete a checkpoint and run its build again from the start.
///
/// The checkpoint is only deleted once a controller could be built.
pub(crate) async fn restart_checkpoint(config: &AppConfig, checkpoint: ActiveCheckpoint) -> Result<()> {
    let controller = build_controller(config)?;
    controller.checkpoints().delete(&checkpoint.handle)?;
    let identity = checkpoint.handle.identity().to_string();
    let state = checkpoint.record.state;
    println!("Deleted checkpoint for '{identity}', starting over");

    let reporter = CliProgress::new();
    let outcome = match state.mode {
        BuildMode::New => controller.run_new(&state.idea, &reporter).await?,
        BuildMode::Upgrade { request } => {
            controller.run_upgrade(&identity, &request, &reporter).await?
        }
    };
    print_outcome(&outcome)
}

fn cmd_checkpoints_list(config: &AppConfig) -> Result<()> {
    let active = checkpoint_manager(config).list_active()?;
    if active.is_empty() {
        println!("No active checkpoints.");
        return Ok(());
    }
    for line in menu::checkpoint_lines(&active) {
        println!("{line}");
    }
    Ok(())
}

fn cmd_checkpoints_delete(config: &AppConfig, project: &str) -> Result<()> {
    let checkpoints = checkpoint_manager(config);
    let found = checkpoints
        .find_active(project)?
        .ok_or_else(|| eyre!("no active checkpoint for '{project}'"))?;
    checkpoints.delete(&found.handle)?;
    println!("Deleted checkpoint for '{project}'.");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_outcome(outcome: &RunOutcome) -> Result<()> {
    let identity = outcome.state.identity().unwrap_or("(unnamed)");

    if !outcome.succeeded() {
        return Err(eyre!(
            "run for '{identity}' stopped at {}: {}",
            outcome.state.phase,
            outcome.state.diagnostics
        ));
    }

    println!();
    println!("{}", outcome.state.diagnostics);
    println!();
    println!("  MVP ready: {identity}");
    if let Some(dir) = &outcome.project_dir {
        println!("  Path:      {}", dir.display());
    }
    println!("  Files:     {}", outcome.state.artifacts.len());
    match &outcome.archived {
        Some(archive) => println!("  Log:       {}", archive.display()),
        None => println!(
            "  Problems remain; checkpoint kept. Re-run with: mvpfactory resume --project {identity}"
        ),
    }
    println!();
    Ok(())
}
