//! MiniThumb administration binary
//!
//! Inspect and edit thumbnail cache files from the command line:
//! - Store and fetch thumbnails by table and record id
//! - Query tags, erase records
//! - Show file statistics and metrics
//!
//! # Examples
//!
//! ```bash
//! # Cache a thumbnail
//! minithumb --base-dir /sdcard/DCIM/.thumbnails put --table images --id 42 --tag 7 thumb.jpg
//!
//! # Fetch it back
//! minithumb get --table images --id 42 --output out.jpg
//!
//! # Show statistics
//! minithumb stats --table images
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use minithumb::storage::minithumb::table_id_from_uri;
use minithumb::{StoreConfig, StoreRegistry};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// MiniThumb - fixed-slot thumbnail cache tool
#[derive(Parser, Debug)]
#[command(name = "minithumb")]
#[command(version = minithumb::VERSION)]
#[command(about = "Inspect and edit mini-thumbnail cache files", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Thumbnail cache directory (overrides the config file)
    #[arg(long, global = true, env = "MINITHUMB_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true, env = "MINITHUMB_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "MINITHUMB_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a thumbnail
    Put(PutArgs),

    /// Fetch a thumbnail
    Get(GetArgs),

    /// Print the tag stored for a record
    Tag(RecordArgs),

    /// Mark a record empty
    Erase(RecordArgs),

    /// Show file statistics
    Stats {
        /// Table identifier or content URI (default: images and video)
        #[arg(short, long)]
        table: Vec<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print metrics in Prometheus text format
    Metrics,
}

/// Addresses one record
#[derive(Args, Debug)]
struct RecordArgs {
    /// Table identifier or content URI
    #[arg(short, long)]
    table: String,

    /// Record id
    #[arg(short, long)]
    id: u64,
}

#[derive(Args, Debug)]
struct PutArgs {
    #[command(flatten)]
    record: RecordArgs,

    /// Consistency tag of the source media
    #[arg(long)]
    tag: u64,

    /// File holding the encoded thumbnail
    input: PathBuf,
}

#[derive(Args, Debug)]
struct GetArgs {
    #[command(flatten)]
    record: RecordArgs,

    /// Write the payload here instead of printing a summary
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let _guard = setup_logging(&cli)?;

    let config = load_config(&cli)?;
    let registry = StoreRegistry::new(config)?;

    let result = match cli.command {
        Commands::Put(args) => put_command(&registry, args),
        Commands::Get(args) => get_command(&registry, args),
        Commands::Tag(args) => tag_command(&registry, args),
        Commands::Erase(args) => erase_command(&registry, args),
        Commands::Stats { table, json } => stats_command(&registry, table, json),
        Commands::Metrics => {
            print!("{}", minithumb::metrics::export_metrics());
            Ok(())
        }
    };

    registry.reset();
    result
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(&cli.log_dir)
        .with_context(|| format!("creating log directory {}", cli.log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "minithumb.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(guard)
}

/// Config file, then environment, then command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::from_env(),
    };
    if let Some(dir) = &cli.base_dir {
        config.base_dir = dir.clone();
    }
    info!(base_dir = %config.base_dir.display(), "Using thumbnail cache directory");
    Ok(config)
}

/// Accept either a bare table identifier or a content URI
fn resolve_table(table: &str) -> String {
    if table.contains('/') {
        if let Some(id) = table_id_from_uri(table) {
            return id.to_string();
        }
        warn!(uri = table, "No table identifier in URI, using it verbatim");
    }
    table.to_string()
}

fn put_command(registry: &StoreRegistry, args: PutArgs) -> anyhow::Result<()> {
    let payload = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let table = resolve_table(&args.record.table);

    let store = registry.instance(&table);
    store.put(args.record.id, &payload, args.tag)?;
    store.sync()?;

    println!(
        "✅ Stored {} bytes for {}/{} (tag {})",
        payload.len(),
        table,
        args.record.id,
        args.tag
    );
    Ok(())
}

fn get_command(registry: &StoreRegistry, args: GetArgs) -> anyhow::Result<()> {
    let table = resolve_table(&args.record.table);
    let store = registry.instance(&table);

    match store.get(args.record.id) {
        Some(thumbnail) => {
            if let Some(path) = &args.output {
                std::fs::write(path, &thumbnail.payload)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            println!(
                "{}/{}: tag {}, {} bytes",
                table,
                args.record.id,
                thumbnail.tag,
                thumbnail.payload.len()
            );
        }
        None => println!("{}/{}: not cached", table, args.record.id),
    }
    Ok(())
}

fn tag_command(registry: &StoreRegistry, args: RecordArgs) -> anyhow::Result<()> {
    let table = resolve_table(&args.table);
    match registry.instance(&table).get_tag(args.id) {
        Some(tag) => println!("{}", tag),
        None => println!("not cached"),
    }
    Ok(())
}

fn erase_command(registry: &StoreRegistry, args: RecordArgs) -> anyhow::Result<()> {
    let table = resolve_table(&args.table);
    let store = registry.instance(&table);
    if store.erase(args.id)? {
        store.sync()?;
        println!("✅ Erased {}/{}", table, args.id);
    } else {
        println!("{}/{}: nothing to erase", table, args.id);
    }
    Ok(())
}

fn stats_command(registry: &StoreRegistry, tables: Vec<String>, json: bool) -> anyhow::Result<()> {
    let tables = if tables.is_empty() {
        vec!["images".to_string(), "video".to_string()]
    } else {
        tables
    };
    for table in &tables {
        registry.instance(&resolve_table(table));
    }

    let stats = registry.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    for s in stats {
        println!("Table: {}", s.table);
        println!("───────────────────────────────");
        println!("  Active:      {}", s.active);
        println!("  Writable:    {}", s.writable);
        println!("  Data file:   {} bytes ({} blocks)", s.data_len, s.data_blocks);
        println!("  Index file:  {} bytes ({} slots)", s.index_len, s.index_slots);
    }
    Ok(())
}
