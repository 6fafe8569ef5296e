//! courier: inspect and maintain a delivery storage directory.
//!
//! The commands operate on the on-disk state only (no network). Run them
//! while no host process is using the same storage directory: opening the
//! ledger reconciles it, which removes unreferenced payloads.

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use courier_common::{DeliveryError, EndpointKind, OutputFormat, SCHEMA_VERSION};
use courier_config::{load_config, ConfigError, LoadedConfig, ValidationError};
use courier_core::exit_codes::ExitCode;
use courier_core::logging::{event_names, init_logging, LogConfig, LogFormat, LogLevel};
use courier_core::{PendingCallLedger, PendingSummary};
use courier_store::DeliveryCache;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about = "Inspect the courier telemetry delivery store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the configuration file (else COURIER_CONFIG, XDG, /etc/courier)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage directory
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format on stderr: human or jsonl (else COURIER_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pending counts per endpoint kind, cached sessions and crash slot
    Status,
    /// List pending calls in retrieval order
    Pending(KindArgs),
    /// Remove pending calls and their payloads
    Purge(KindArgs),
    /// Configuration commands
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct KindArgs {
    /// Restrict to one endpoint kind
    #[arg(long, value_enum)]
    kind: Option<EndpointKind>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Validate the configuration
    Check,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(ExitCode::ArgsError.as_i32());
        }
    };

    let level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        LogLevel::from_verbosity(cli.global.verbose)
    };
    init_logging(&LogConfig::from_env(level, cli.global.log_format));

    let exit_code = match &cli.command {
        Commands::Status => run_status(&cli.global),
        Commands::Pending(args) => run_pending(&cli.global, args),
        Commands::Purge(args) => run_purge(&cli.global, args),
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
            ConfigCommands::Check => run_config_check(&cli.global),
        },
    };
    std::process::exit(exit_code.as_i32());
}

fn run_status(global: &GlobalOpts) -> ExitCode {
    let (loaded, ledger) = match open_store(global) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let summary = match PendingSummary::collect(&ledger) {
        Ok(summary) => summary,
        Err(e) => return output_error(global, &e),
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "storage_dir": loaded.storage_dir.display().to_string(),
            "pending": summary,
        })),
        OutputFormat::Human => {
            println!("storage: {}", loaded.storage_dir.display());
            println!("pending: {}", summary.total);
            for (kind, count) in &summary.counts {
                println!("  {:<10}{:>6}", kind.path(), count);
            }
            println!("cached sessions: {}", summary.cached_sessions.len());
            println!(
                "crash pending: {}",
                if summary.crash_pending { "yes" } else { "no" }
            );
        }
    }
    ExitCode::Clean
}

fn run_pending(global: &GlobalOpts, args: &KindArgs) -> ExitCode {
    let (_, ledger) = match open_store(global) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let calls: Vec<_> = match ledger.snapshot() {
        Ok(calls) => calls
            .into_iter()
            .filter(|c| args.kind.map_or(true, |k| c.kind == k))
            .collect(),
        Err(e) => return output_error(global, &e),
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "count": calls.len(),
            "calls": calls,
        })),
        OutputFormat::Human => {
            if calls.is_empty() {
                println!("no pending calls");
            }
            for call in &calls {
                println!(
                    "{}  {:<9} {}  {}",
                    call.queued_at.format("%Y-%m-%dT%H:%M:%SZ"),
                    call.kind.path(),
                    call.request_id,
                    call.destination
                );
            }
        }
    }
    ExitCode::Clean
}

fn run_purge(global: &GlobalOpts, args: &KindArgs) -> ExitCode {
    let (_, ledger) = match open_store(global) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let removed = match ledger.purge(args.kind) {
        Ok(removed) => removed,
        Err(e) => return output_error(global, &e),
    };
    tracing::info!(
        event = event_names::LEDGER_PURGED,
        removed,
        kind = args.kind.map(|k| k.path()).unwrap_or("all"),
        "purged pending calls"
    );

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "kind": args.kind,
            "removed": removed,
        })),
        OutputFormat::Human => println!("removed {} pending call(s)", removed),
    }
    ExitCode::Clean
}

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let path = loaded.resolved.path.as_ref().map(|p| p.display().to_string());

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "source": {
                "path": path,
                "kind": loaded.resolved.source.to_string(),
            },
            "storage_dir": loaded.storage_dir.display().to_string(),
            "config": loaded.config,
        })),
        OutputFormat::Human => {
            println!(
                "source: {} ({})",
                path.as_deref().unwrap_or("built-in defaults"),
                loaded.resolved.source
            );
            println!("storage: {}", loaded.storage_dir.display());
            println!("base url: {}", loaded.config.base_url);
            for kind in EndpointKind::PRIORITY {
                println!(
                    "  limit {:<10}{:>6}",
                    kind.path(),
                    loaded.config.queue_limits.limit_for(kind)
                );
            }
            println!(
                "retry: initial {}s, max {}s",
                loaded.config.retry.initial_delay_secs, loaded.config.retry.max_delay_secs
            );
        }
    }
    ExitCode::Clean
}

fn run_config_check(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "status": "valid",
            "path": loaded.resolved.path.as_ref().map(|p| p.display().to_string()),
        })),
        OutputFormat::Human => println!("configuration is valid"),
    }
    ExitCode::Clean
}

fn load(global: &GlobalOpts) -> Result<LoadedConfig, ExitCode> {
    match load_config(global.config.as_deref(), global.storage_dir.as_deref()) {
        Ok(loaded) => {
            tracing::debug!(
                event = event_names::CONFIG_LOADED,
                source = %loaded.resolved.source,
                "configuration loaded"
            );
            Ok(loaded)
        }
        Err(e) => Err(output_config_error(global, &e)),
    }
}

fn open_store(global: &GlobalOpts) -> Result<(LoadedConfig, PendingCallLedger), ExitCode> {
    let loaded = load(global)?;
    let cache = DeliveryCache::open(&loaded.storage_dir)
        .map_err(|e| output_error(global, &DeliveryError::from(e)))?;
    let ledger = PendingCallLedger::open(cache, loaded.config.queue_limits)
        .map_err(|e| output_error(global, &e))?;
    Ok((loaded, ledger))
}

fn output_config_error(global: &GlobalOpts, error: &ConfigError) -> ExitCode {
    let (code, exit_code) = match error {
        ConfigError::Validation(ValidationError::IoError(_)) => (10, ExitCode::IoError),
        ConfigError::Validation(v) => (v.code(), ExitCode::ConfigError),
        ConfigError::NoStorageDir => (14, ExitCode::ConfigError),
    };
    tracing::error!(event = event_names::CONFIG_ERROR, error = %error, "configuration error");
    emit_error(global, code, &error.to_string(), exit_code)
}

fn output_error(global: &GlobalOpts, error: &DeliveryError) -> ExitCode {
    tracing::error!(event = event_names::INTERNAL_ERROR, error = %error, "command failed");
    emit_error(global, error.code(), &error.to_string(), ExitCode::from(error))
}

fn emit_error(global: &GlobalOpts, code: u32, message: &str, exit_code: ExitCode) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "error",
                "error": {
                    "code": code,
                    "exit_code": exit_code.code_name(),
                    "message": message,
                }
            });
            match serde_json::to_string_pretty(&response) {
                Ok(text) => eprintln!("{}", text),
                Err(_) => eprintln!("error: {}", message),
            }
        }
        OutputFormat::Human => eprintln!("error: {}", message),
    }
    exit_code
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to render output: {}", e),
    }
}
