//! envstack - typed, validated, layered application configuration.
//!
//! A [`schema::ConfigSchema`] declares fields; raw values are merged from ordered
//! [`source::SourceSet`]s (files, then the process environment), cast, validated and
//! assembled into an immutable [`config::ConfigInstance`]. [`config::LiveConfig`] keeps
//! an instance current as file-backed sources change, swapping only complete, valid
//! rebuilds into place.

pub mod cast;
pub mod cli;
pub mod config;
pub mod docs;
pub mod error;
pub mod redact;
pub mod schema;
pub mod source;
pub mod validation;
pub mod value;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{CheckArgs, Cli, Commands, OutputFormat, ShowArgs, SourceArgs, WatchArgs};
use crate::config::{build_initial, LiveConfig, WatchOptions};
use crate::redact::{RedactingMakeWriter, Redactor};
use crate::schema::{load_schema, ConfigSchema};
use crate::source::SourceSet;

pub use crate::config::{ConfigInstance, Mapping};
pub use crate::error::{AggregateBuildError, BuildError, FieldError, SchemaError};
pub use crate::schema::{Field, FieldType};
pub use crate::value::Value;

/// Runs the envstack CLI with the provided arguments.
pub async fn run(cli: Cli) -> Result<()> {
    let writer = setup_logging(cli.log_level())?;
    let schema = read_schema(&cli.schema)?;

    match cli.command {
        Commands::Check(args) => check_config(&schema, args),
        Commands::Example => {
            print!("{}", docs::example(&schema));
            Ok(())
        }
        Commands::Docs => {
            print!("{}", docs::markdown(&schema));
            Ok(())
        }
        Commands::Show(args) => show_config(&schema, args),
        Commands::Watch(args) => watch_config(schema, args, writer).await,
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// Log lines go to stderr through a writer that redacts known secrets.
fn setup_logging(level: &str) -> Result<RedactingMakeWriter> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = RedactingMakeWriter::new();

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer.clone())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(writer)
}

fn read_schema(path: &Path) -> Result<Arc<ConfigSchema>> {
    load_schema(path).with_context(|| format!("Failed to load schema {}", path.display()))
}

/// Builds the source set described by the command-line flags.
pub fn source_set(args: &SourceArgs) -> SourceSet {
    let mut set = if args.no_env {
        SourceSet::empty()
    } else {
        SourceSet::new()
    };

    if let Some(dir) = &args.profile_dir {
        set = set.profile(dir);
    }
    // Files named explicitly on the command line must exist.
    for path in &args.env_files {
        set = set.required_file(path);
    }
    set
}

/// Builds the configuration once and prints the loaded values.
fn check_config(schema: &Arc<ConfigSchema>, args: CheckArgs) -> Result<()> {
    let instance = build_initial(schema, &source_set(&args.sources))
        .context("Configuration check failed")?;

    println!("Configuration loaded successfully!");
    println!("\nLoaded Values:");
    print!("{}", serde_yaml::to_string(&instance.to_mapping(args.reveal))?);
    Ok(())
}

/// Displays the built configuration.
fn show_config(schema: &Arc<ConfigSchema>, args: ShowArgs) -> Result<()> {
    let instance = build_initial(schema, &source_set(&args.sources))
        .context("Failed to build configuration")?;
    let mapping = instance.to_mapping(args.reveal);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&mapping)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&mapping)?),
    }
    Ok(())
}

/// Keeps the configuration live until Ctrl+C, printing each reload.
async fn watch_config(
    schema: Arc<ConfigSchema>,
    args: WatchArgs,
    writer: RedactingMakeWriter,
) -> Result<()> {
    let live = LiveConfig::load(schema, source_set(&args.sources))
        .context("Failed to build configuration")?;

    let current = live.current();
    writer.update(Redactor::from_instance(&current)?);
    println!("{}", current.to_mapping(false));

    let options = WatchOptions {
        interval: Duration::from_millis(args.interval_ms),
    };
    let handle = live.watch_with(options, move |instance| {
        writer.update(Redactor::from_instance(instance)?);
        println!("{}", instance.to_mapping(false));
        Ok(())
    });

    info!(
        watcher = %handle.id(),
        paths = ?live.watched_paths(),
        "Watching configuration sources. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.stop().await;

    Ok(())
}
