//! CLI entry point for the hot-reload engine.
//!
//! This binary watches a bot's extension sources and drives reloads through
//! a shell command, and offers the engine's analysis passes as one-shot
//! commands.
//!
//! # Usage
//!
//! ```bash
//! hot-reload [OPTIONS] <COMMAND>
//!
//! # Reload changed extensions through the bot's control script
//! hot-reload watch --dir cogs --command 'bot-ctl {action} {ext}'
//!
//! # Print the import graph and the order a batch would reload in
//! hot-reload graph --dir cogs cogs.levels utils.db
//!
//! # Syntax-check files and print class fingerprints
//! hot-reload check cogs/levels.py cogs/tickets.py
//!
//! # Show which extension a file change would reload
//! hot-reload resolve cogs/fun/dice.py
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod host;

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use hr_core::{ExtensionId, HotReloadSettings, LogLevel};
use hr_py_parser::PyParser;
use hr_service::HotReloadService;
use hr_tracker::{DependencyGraph, ExtensionResolver, FileHashTracker, FileWalker, ModuleAnalyzer};
use hr_watcher::{FileFilter, GlobFilter};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::host::CommandHost;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Hot reloading for bot extensions.
///
/// Watches extension sources, tracks their import graph, and reloads changed
/// extensions and their dependents in a safe order.
#[derive(Parser)]
#[command(name = "hot-reload", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file. Missing fields use defaults.
    #[arg(short, long, global = true, env = "HOT_RELOAD_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Directory that dotted extension identifiers are relative to.
    #[arg(short, long, global = true, env = "HOT_RELOAD_BASE_DIR")]
    base_dir: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch for changes and reload affected extensions.
    Watch {
        /// Directory to watch. Repeat for several; overrides the config.
        #[arg(short, long = "dir", value_name = "DIR")]
        dirs: Vec<Utf8PathBuf>,

        /// Command run for every load, reload, and unload.
        ///
        /// `{ext}` becomes the extension and `{action}` the action.
        #[arg(long, value_name = "TEMPLATE", env = "HOT_RELOAD_COMMAND")]
        command: String,

        /// Extension the bot has already loaded. Repeatable.
        #[arg(long = "loaded", value_name = "EXT")]
        loaded: Vec<String>,

        /// Seconds to wait after the last change before reloading.
        #[arg(long, value_name = "SECS")]
        debounce: Option<f64>,

        /// Stop on the first reload failure instead of logging it.
        #[arg(long)]
        strict: bool,
    },

    /// Print the dependency graph of a directory.
    Graph {
        /// Directory to analyze (defaults to the base directory).
        #[arg(short, long)]
        dir: Option<Utf8PathBuf>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Modules to order for reloading (defaults to every module).
        modules: Vec<String>,
    },

    /// Syntax-check files and print their class fingerprints.
    Check {
        /// Files to check.
        #[arg(required = true)]
        files: Vec<Utf8PathBuf>,
    },

    /// Print the extension each file resolves to.
    Resolve {
        /// Files to resolve.
        #[arg(required = true)]
        files: Vec<Utf8PathBuf>,
    },
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or the configured level. `notify`
/// is filtered to `warn`.
fn init_tracing(verbose: bool, no_color: bool, level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { level.as_str() };
        EnvFilter::new(format!("{level},notify=warn"))
    });

    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads settings from `--config` (or defaults) and applies `--base-dir`.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be read or parsed.
fn load_settings(cli: &Cli) -> color_eyre::Result<HotReloadSettings> {
    let mut settings = match &cli.config {
        Some(path) => HotReloadSettings::from_json_file(path)
            .wrap_err_with(|| format!("Failed to load configuration from {path}"))?,
        None => HotReloadSettings::default(),
    };
    if let Some(base_dir) = &cli.base_dir {
        settings.base_dir.clone_from(base_dir);
    }
    Ok(settings)
}

fn canonical_dir(path: &Utf8Path, label: &str) -> color_eyre::Result<Utf8PathBuf> {
    let canonical = path
        .canonicalize_utf8()
        .wrap_err_with(|| format!("{label} does not exist: {path}"))?;
    if !canonical.is_dir() {
        return Err(eyre!("{label} is not a directory: {path}"));
    }
    Ok(canonical)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Options of the `watch` command.
struct WatchArgs {
    dirs: Vec<Utf8PathBuf>,
    command: String,
    loaded: Vec<String>,
    debounce: Option<f64>,
    strict: bool,
}

/// Runs the service until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or watching fails.
async fn run_watch(mut settings: HotReloadSettings, args: WatchArgs) -> color_eyre::Result<()> {
    if !args.dirs.is_empty() {
        settings.watch_directories = args.dirs;
    }
    if let Some(debounce) = args.debounce {
        settings.debounce_delay = debounce;
    }
    if args.strict {
        settings.continue_on_error = false;
    }

    let config = settings.validate()?;
    for missing in config.missing_watch_directories() {
        warn!(path = %missing, "watch directory does not exist");
    }

    let host = CommandHost::new(args.command)
        .with_loaded(args.loaded.into_iter().map(ExtensionId::new));
    let service = HotReloadService::new(config, Arc::new(host));

    service.start().await?;
    info!("Watching for changes, press Ctrl-C to stop");

    wait_for_shutdown().await?;
    service.stop().await?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", service.stats())?;
    Ok(())
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// The `graph` command's output.
#[derive(Debug, serde::Serialize)]
struct GraphReport {
    modules: BTreeMap<String, BTreeSet<String>>,
    reload_order: Vec<String>,
}

/// Analyzes every matching file under `dir` and prints the graph.
///
/// # Errors
///
/// Returns an error if the directory cannot be walked or a pattern is
/// invalid.
fn run_graph(
    settings: &HotReloadSettings,
    dir: Option<&Utf8Path>,
    json: bool,
    modules: &[String],
) -> color_eyre::Result<()> {
    let base_dir = canonical_dir(&settings.base_dir, "Base directory")?;
    let root = match dir {
        Some(dir) => canonical_dir(dir, "Directory")?,
        None => base_dir.clone(),
    };
    info!(root = %root, "Building dependency graph");

    let filter = GlobFilter::new(
        settings.file_patterns.as_slice(),
        settings.ignore_patterns.as_slice(),
    )?
        .with_roots([root.clone()]);
    let files: Vec<Utf8PathBuf> = FileWalker::new(&root)?
        .collect_paths()?
        .into_iter()
        .filter(|path| filter.should_process(path))
        .collect();

    let mut graph = DependencyGraph::new(base_dir.clone());
    let mut hashes = FileHashTracker::new();
    let results = ModuleAnalyzer::new(base_dir).analyze_files(&files);
    let summary = ModuleAnalyzer::apply(results, &mut graph, &mut hashes, None);
    if summary.errors > 0 {
        warn!(errors = summary.errors, "Some files could not be analyzed");
    }

    let snapshot = graph.snapshot();
    let reload_order = if modules.is_empty() {
        graph.reload_order(snapshot.dependencies.keys())
    } else {
        graph.reload_order(modules)
    };
    let report = GraphReport {
        modules: snapshot.dependencies,
        reload_order,
    };

    let content = if json {
        serde_json::to_string_pretty(&report)
            .map_err(|e| eyre!("Failed to serialize JSON: {}", e))?
    } else {
        render_graph(&report)
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{content}")?;
    Ok(())
}

fn render_graph(report: &GraphReport) -> String {
    use std::fmt::Write;

    let edges: usize = report.modules.values().map(BTreeSet::len).sum();
    let mut output = format!(
        "Dependency graph ({} modules, {edges} edges)\n",
        report.modules.len()
    );
    for (module, dependencies) in &report.modules {
        let _ = writeln!(output, "  {module}");
        for dependency in dependencies {
            let _ = writeln!(output, "    -> {dependency}");
        }
    }
    let _ = write!(output, "\nReload order: {}", report.reload_order.join(", "));
    output
}

/// Parses each file and prints its syntax status and class fingerprints.
///
/// # Errors
///
/// Returns an error if a file cannot be read or any file has a syntax error.
fn run_check(files: &[Utf8PathBuf]) -> color_eyre::Result<()> {
    let mut parser = PyParser::new()?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let mut invalid = 0usize;

    for path in files {
        let source =
            std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {path}"))?;
        let result = parser.parse(&source)?;

        match result.syntax_issue {
            Some(issue) => {
                invalid += 1;
                writeln!(handle, "{path}: {issue}")?;
            }
            None => writeln!(handle, "{path}: ok")?,
        }
        if result.defines_setup {
            writeln!(handle, "  defines setup")?;
        }

        let classes: BTreeMap<&String, &String> = result.classes.iter().collect();
        for (name, signature) in classes {
            writeln!(handle, "  class {name}: {signature}")?;
        }
    }

    if invalid > 0 {
        return Err(eyre!(
            "{invalid} of {} files have syntax errors",
            files.len()
        ));
    }
    Ok(())
}

/// Prints the extension each file would reload.
///
/// # Errors
///
/// Returns an error if the base directory does not exist.
fn run_resolve(settings: &HotReloadSettings, files: &[Utf8PathBuf]) -> color_eyre::Result<()> {
    let base_dir = canonical_dir(&settings.base_dir, "Base directory")?;
    let resolver = ExtensionResolver::new(base_dir);
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    for path in files {
        let absolute = path.canonicalize_utf8().unwrap_or_else(|_| path.clone());
        match resolver.to_extension(&absolute) {
            Some(extension) => writeln!(handle, "{path} -> {extension}")?,
            None => writeln!(handle, "{path} -> (not reloadable)")?,
        }
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Install color-eyre before anything can fail
    color_eyre::install()?;

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_tracing(cli.verbose, cli.no_color, settings.log_level);

    match cli.command {
        Commands::Watch {
            dirs,
            command,
            loaded,
            debounce,
            strict,
        } => {
            let args = WatchArgs {
                dirs,
                command,
                loaded,
                debounce,
                strict,
            };
            run_watch(settings, args).await
        }
        Commands::Graph { dir, json, modules } => {
            run_graph(&settings, dir.as_deref(), json, &modules)
        }
        Commands::Check { files } => run_check(&files),
        Commands::Resolve { files } => run_resolve(&settings, &files),
    }
}
