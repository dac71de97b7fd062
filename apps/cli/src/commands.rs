//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use skillsync_core::{ProgressReporter, RunSummary, SyncRunConfig, run_sync};
use skillsync_fetcher::GitHubClient;
use skillsync_shared::{
    AppConfig, DataPaths, init_config, load_config, load_config_from, read_secret,
    require_github_token,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SkillSync: keep the skills catalog in step with its source repositories.
#[derive(Parser)]
#[command(
    name = "skillsync",
    version,
    about = "Incrementally sync the skills catalog from GitHub seed repositories.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.skillsync/skillsync.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
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
    /// Run a full sync: discover, fetch changes, enrich, save.
    Run(RunArgs),

    /// Show the current GitHub API quota.
    Rate,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-run overrides of config file values.
#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Data directory holding seeds.json and skills.json.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Discover, fetch and enrich without writing anything.
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Cap on discovered entries per seed (for test runs; 0 = no limit).
    #[arg(long, env = "DEBUG_LIMIT")]
    pub limit: Option<usize>,

    /// Concurrent generation calls.
    #[arg(long, env = "LLM_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Maximum long-description length in characters (0 = unlimited).
    #[arg(long, env = "LONG_DESC_MAX")]
    pub long_desc_max: Option<usize>,
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
        0 => "warn,skillsync=info",
        1 => "warn,skillsync=debug",
        _ => "info,skillsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(cli.config.as_deref(), args).await,
        Command::Rate => cmd_rate(cli.config.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut app = resolve_config(config_path)?;
    if let Some(n) = args.concurrency {
        app.generation.concurrency = n;
    }
    if let Some(n) = args.long_desc_max {
        app.catalog.long_desc_max = n;
    }

    let github_token = require_github_token(&app)?;
    let data_dir = args
        .data_dir
        .unwrap_or_else(|| PathBuf::from(&app.paths.data_dir));

    let config = SyncRunConfig {
        data: DataPaths::new(data_dir),
        github_token,
        llm_api_key: read_secret(&app.generation.api_key_env),
        sync_api_key: read_secret(&app.sync.api_key_env),
        dry_run: args.dry_run,
        limit: args.limit.filter(|n| *n > 0),
        app,
    };

    info!(
        data_dir = %config.data.root.display(),
        dry_run = config.dry_run,
        limit = ?config.limit,
        "starting skillsync run"
    );

    let reporter = CliProgress::new();
    let summary = run_sync(&config, &reporter).await?;
    print_summary(&summary);

    Ok(())
}

async fn cmd_rate(config_path: Option<&Path>) -> Result<()> {
    let app = resolve_config(config_path)?;
    let token = require_github_token(&app)?;
    let client = GitHubClient::new(&app.github, token)?;
    let status = client.rate_status().await?;

    println!();
    println!("  Limit:     {}", status.limit);
    println!("  Remaining: {}", status.remaining);
    println!("  Resets at: {}", status.reset_at.with_timezone(&chrono::Local));
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_summary(s: &RunSummary) {
    println!();
    if s.dry_run {
        println!("  Dry run: nothing was written.");
    } else {
        println!("  Catalog synced!");
    }
    println!(
        "  Seeds:      {} processed, {} failed, {} truncated",
        s.seeds_processed, s.seeds_failed, s.seeds_truncated
    );
    println!("  Entries:    {} discovered, {} unique", s.discovered, s.unique);
    println!(
        "  Reused:     {} from snapshot, {} from catalog",
        s.reused_from_snapshot, s.reused_from_catalog
    );
    println!("  Fetched:    {} ({} skipped)", s.fetched, s.skipped);
    println!(
        "  Enriched:   {} ok, {} failed, {} skipped",
        s.enrichment_succeeded, s.enrichment_failed, s.enrichment_skipped
    );
    println!(
        "  Records:    {} total, {} with SEO, {} with tags",
        s.total_records, s.with_payload, s.with_tags
    );
    if !s.top_tags.is_empty() {
        let tags: Vec<String> = s.top_tags.iter().map(|(t, n)| format!("{t} ({n})")).collect();
        println!("  Top tags:   {}", tags.join(", "));
    }
    match s.quota_remaining {
        Some(left) => println!("  API calls:  {} ({left} remaining)", s.api_calls),
        None => println!("  API calls:  {}", s.api_calls),
    }
    if let Some(sync) = &s.sync {
        println!(
            "  Sync:       {} created, {} updated, {} failed",
            sync.created, sync.updated, sync.failed
        );
    }
    if let Some(backup) = &s.backup {
        println!("  Backup:     {}", backup.display());
    }
    println!("  Time:       {:.1}s", s.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner.set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
