//! CLI entry point for onchange.
//!
//! Watches glob patterns and runs a command for every debounced change.
//!
//! # Usage
//!
//! ```bash
//! onchange [OPTIONS] <PATTERN>...
//!
//! # Run every changed Ruby test file, at most 30s each
//! onchange -c 'ruby -Itest {{file}}' -t 30000 'test/**/*_test.rb'
//!
//! # Just log what changes
//! onchange -v 'src/**/*'
//!
//! # Show the effective configuration
//! onchange --print-config '*.go'
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod dispatch;
mod template;

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use oc_core::{Config, ExecConfig, WatchConfig};
use oc_exec::{Interrupt, TimeoutArbiter};
use oc_watch::Notify;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::dispatch::Dispatcher;
use crate::template::Template;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Run a command whenever files matching the given patterns change.
///
/// Rapid bursts of changes to one file are coalesced, and atomic saves
/// (remove followed by re-create) are reported as a single modification.
#[derive(Parser)]
#[command(name = "onchange", version, about, long_about = None)]
struct Cli {
    /// Glob patterns to watch, e.g. `src/**/*.rb`.
    #[arg(required = true, value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Command to run for each change.
    ///
    /// Placeholders: {{file}}, {{ext}}, {{base}}, {{base0}}, {{dir}},
    /// {{abs}}. Without a command, changes are only logged.
    #[arg(short = 'c', long = "cmd", env = "ONCHANGE_CMD", value_name = "TEMPLATE")]
    cmd: Option<String>,

    /// Interrupt the command after this many milliseconds (0 = never).
    #[arg(
        short,
        long,
        env = "ONCHANGE_TIMEOUT",
        value_name = "MS",
        default_value_t = ExecConfig::default().timeout_ms,
        allow_negative_numbers = true
    )]
    timeout: i64,

    /// Quiet period before a change is reported, in milliseconds.
    #[arg(
        long,
        env = "ONCHANGE_DEBOUNCE",
        value_name = "MS",
        default_value_t = WatchConfig::default().pending_period_ms
    )]
    debounce: u64,

    /// How long a removed file may take to reappear and still count as
    /// modified, in milliseconds.
    #[arg(
        long,
        env = "ONCHANGE_RENAME_WINDOW",
        value_name = "MS",
        default_value_t = WatchConfig::default().regard_rename_as_mod_period_ms
    )]
    rename_window: u64,

    /// Report newly created files, not only modified ones.
    #[arg(long, env = "ONCHANGE_DETECT_CREATE")]
    detect_create: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Noisy crates like `notify` and `mio` are filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn,globset=warn,ignore=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`Config`] from CLI arguments.
///
/// # Errors
///
/// Returns an error if any option is out of range or the command template
/// is blank.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    if cli.cmd.as_deref().is_some_and(|cmd| cmd.trim().is_empty()) {
        return Err(color_eyre::eyre::eyre!("Command template is empty"));
    }

    let config = Config {
        watch: WatchConfig {
            pending_period_ms: cli.debounce,
            detect_create: cli.detect_create,
            regard_rename_as_mod_period_ms: cli.rename_window,
            ..WatchConfig::default()
        },
        exec: ExecConfig {
            timeout_ms: cli.timeout,
            ..ExecConfig::default()
        },
    };
    config.validate()?;

    Ok(config)
}

fn current_dir() -> color_eyre::Result<Utf8PathBuf> {
    let cwd = std::env::current_dir()?;
    Utf8PathBuf::try_from(cwd)
        .map_err(|e| color_eyre::eyre::eyre!("Working directory is not valid UTF-8: {}", e))
}

fn print_config(config: &Config) -> color_eyre::Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize config: {}", e))?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Watches and dispatches until interrupted.
async fn run_watch(cli: &Cli, config: &Config) -> color_eyre::Result<()> {
    let mut interrupt = Interrupt::install()?;

    let notify = Notify::new(&cli.patterns, &config.watch).await?;
    info!(
        patterns = ?cli.patterns,
        dirs = notify.watched_dirs().len(),
        timeout_ms = config.exec.timeout_ms,
        "Watching for changes"
    );

    let template = cli.cmd.as_deref().map(Template::new);
    if let Some(template) = &template {
        info!(template = template.as_str(), "Command template");
    }

    let arbiter = TimeoutArbiter::new(&config.exec).with_interrupt(interrupt.token());
    let dispatcher = Dispatcher::new(template, arbiter, current_dir()?);

    // Handle SIGTERM like Ctrl-C on Unix
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let token = interrupt.token();
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM, shutting down");
                token.cancel();
            }
        });
    }

    dispatcher.run(notify, interrupt.token()).await;
    interrupt.teardown();

    Ok(())
}

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Build and validate configuration
    let config = build_config(&cli)?;

    if cli.print_config {
        return print_config(&config);
    }

    run_watch(&cli, &config).await
}
