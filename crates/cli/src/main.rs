//! editmerge command-line tool.
//!
//! Provides subcommands for three-way merging files, asking the session
//! state machine what to do with an edit or save round-trip, running the
//! full conflict resolver on files, and generating / validating
//! configuration files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use editmerge_core::config::{AppConfig, MergeBackendKind};
use editmerge_core::conflict::{ConflictResolver, ConflictSession, MergeEngine, MergeOutcome, Response};
use editmerge_core::models::{parse_timestamp, Action, EditRequest, SessionState};
use editmerge_core::store::MemoryRevisionStore;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// editmerge command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "editmerge",
    version,
    about = "Merge concurrent edits of a text page"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when it is missing.
    #[arg(short, long, global = true, default_value = "./editmerge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Three-way merge two derivatives of a base file.
    ///
    /// Exits 0 on a clean merge, 1 when conflict blocks were written and 2
    /// when no merge could be computed.
    Merge {
        /// Common ancestor.
        #[arg(long)]
        base: PathBuf,

        /// The editor's version.
        #[arg(long)]
        mine: PathBuf,

        /// The latest saved version.
        #[arg(long)]
        yours: PathBuf,

        /// Override the configured backend: builtin or diff3.
        #[arg(long)]
        backend: Option<MergeBackendKind>,
    },

    /// Show the session decision for an edit or save round-trip.
    Session {
        /// Requested action: edit or save.
        #[arg(long)]
        action: String,

        /// Base revision the editor started from.
        #[arg(long)]
        date: String,

        /// Latest saved revision of the page.
        #[arg(long)]
        latest: String,

        /// Acknowledged conflict revision carried by the request.
        #[arg(long, default_value = "0")]
        conflict_date: String,
    },

    /// Run the conflict resolver on a page with a base and a latest revision.
    Resolve {
        /// Requested action: edit or save.
        #[arg(long)]
        action: String,

        /// Base revision the editor started from.
        #[arg(long)]
        date: String,

        /// Latest saved revision of the page.
        #[arg(long)]
        latest: String,

        /// Acknowledged conflict revision carried by the request.
        #[arg(long, default_value = "0")]
        conflict_date: String,

        /// Text of the base revision.
        #[arg(long)]
        base: PathBuf,

        /// Text of the latest revision.
        #[arg(long)]
        latest_file: PathBuf,

        /// The editor's buffer.
        #[arg(long)]
        buffer: PathBuf,

        /// Edit summary.
        #[arg(long, default_value = "")]
        summary: String,

        /// Page identifier.
        #[arg(long, default_value = "start")]
        page: String,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./editmerge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) if !matches!(cli.command, Commands::Init { .. } | Commands::Validate) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
        Err(_) => AppConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli, config: &AppConfig) -> Result<ExitCode> {
    match cli.command {
        Commands::Merge {
            base,
            mine,
            yours,
            backend,
        } => cmd_merge(config, &base, &mine, &yours, backend),
        Commands::Session {
            action,
            date,
            latest,
            conflict_date,
        } => cmd_session(&action, &date, &latest, &conflict_date).map(|()| ExitCode::SUCCESS),
        Commands::Resolve {
            action,
            date,
            latest,
            conflict_date,
            base,
            latest_file,
            buffer,
            summary,
            page,
        } => {
            let request = ResolveArgs {
                page,
                action,
                date,
                latest,
                conflict_date,
                summary,
            };
            cmd_resolve(config, request, &base, &latest_file, &buffer).map(|()| ExitCode::SUCCESS)
        }
        Commands::Init { output } => cmd_init(&output).map(|()| ExitCode::SUCCESS),
        Commands::Validate => cmd_validate(&cli.config).map(|()| ExitCode::SUCCESS),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load the configuration, falling back to defaults when the file is absent.
fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    AppConfig::load_and_validate(path).context("failed to load configuration file")
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn parse_action(raw: &str) -> Result<Action> {
    Action::parse(raw).with_context(|| format!("unknown action '{}', expected edit or save", raw))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_merge(
    config: &AppConfig,
    base: &Path,
    mine: &Path,
    yours: &Path,
    backend: Option<MergeBackendKind>,
) -> Result<ExitCode> {
    let base = read_text(base)?;
    let mine = read_text(mine)?;
    let yours = read_text(yours)?;

    let mut config = config.clone();
    if let Some(backend) = backend {
        config.merge.backend = backend;
    }
    let engine = MergeEngine::from_config(&config);
    debug!(backend = engine.backend_name(), "merge engine ready");

    match engine.merge(&base, &mine, &yours) {
        MergeOutcome::Clean(text) => {
            print!("{}", text);
            Ok(ExitCode::SUCCESS)
        }
        MergeOutcome::Conflicting(text) => {
            print!("{}", text);
            Ok(ExitCode::from(1))
        }
        MergeOutcome::Failed => {
            eprintln!("Error: merge could not be computed (backend: {})", engine.backend_name());
            Ok(ExitCode::from(2))
        }
    }
}

fn cmd_session(action: &str, date: &str, latest: &str, conflict_date: &str) -> Result<()> {
    let action = parse_action(action)?;
    let prior = SessionState::new("start", parse_timestamp(date), "");
    let decision = ConflictSession::transition(
        action,
        parse_timestamp(conflict_date),
        &prior,
        parse_timestamp(latest),
    );
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

struct ResolveArgs {
    page: String,
    action: String,
    date: String,
    latest: String,
    conflict_date: String,
    summary: String,
}

fn cmd_resolve(
    config: &AppConfig,
    args: ResolveArgs,
    base: &Path,
    latest_file: &Path,
    buffer: &Path,
) -> Result<()> {
    let buffer = read_text(buffer)?;
    let request = EditRequest::from_params(
        &args.page,
        &args.action,
        &args.date,
        &args.conflict_date,
        &buffer,
        &args.summary,
    )
    .with_context(|| format!("unknown action '{}', expected edit or save", args.action))?;

    let latest = parse_timestamp(&args.latest);
    let mut store = MemoryRevisionStore::new();
    if request.date > 0 {
        store.save(&args.page, request.date, read_text(base)?);
    }
    if latest > request.date {
        store.save(&args.page, latest, read_text(latest_file)?);
    }

    let resolver = ConflictResolver::new(store, MergeEngine::from_config(config));
    let response = resolver
        .handle(&request)
        .context("failed to read page revisions")?;

    if let Response::ConflictSolving(page) = &response {
        eprintln!("{}", page.notice());
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    let rendered = AppConfig::default()
        .to_toml_string()
        .context("failed to render default configuration")?;
    let contents = format!(
        "# editmerge configuration\n# backend = \"builtin\" or \"diff3\"\n\n{}",
        rendered
    );
    std::fs::write(output, contents).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Pick a merge backend and conflict labels");
    println!(
        "  2. Validate with: editmerge validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    if config.merge.backend == MergeBackendKind::Diff3 && !config.diff3.path.exists() {
        println!(
            "  [WARN] diff3 not found at {}; merges will be reported as failed",
            config.diff3.path.display()
        );
    }

    println!();
    println!("Configuration summary:");
    println!("  Backend       : {}", config.merge.backend);
    println!("  Mine label    : {}", config.merge.mine_label);
    println!("  Yours label   : {}", config.merge.yours_label);
    println!("  diff3 path    : {}", config.diff3.path.display());
    println!("  diff3 timeout : {}s", config.diff3.timeout_secs);
    println!("  Log level     : {}", config.logging.level);
    println!();
    println!("Configuration is valid.");

    Ok(())
}
