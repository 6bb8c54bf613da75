/// Version injected at compile time via RACKSCAN_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("RACKSCAN_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rackscan::resource::{all_tables, get_table};
use rackscan::{ConnectionConfig, Plugin, Query, QueryContext, Row, RowSink};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Rows buffered between the lister and the printer
const ROW_BUFFER: usize = 256;

/// Query Rackspace Cloud resources as tables
#[derive(Parser, Debug)]
#[command(name = "rackscan", version, about, long_about = None)]
struct Args {
    /// Table to query, e.g. rackspace_compute
    #[arg(short, long, required_unless_present = "list_tables")]
    table: Option<String>,

    /// Look up a single row by the table's key column instead of listing
    #[arg(short, long)]
    key: Option<String>,

    /// Equality qualifier, as column=value (repeatable)
    #[arg(short, long = "qual", value_parser = parse_qual)]
    quals: Vec<(String, String)>,

    /// Only fetch and print these columns (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Print the available tables and exit
    #[arg(long)]
    list_tables: bool,

    /// Connection configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn parse_qual(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected column=value, got '{raw}'")),
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("rackscan {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("rackscan").join("rackscan.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".rackscan").join("rackscan.log");
    }
    PathBuf::from("rackscan.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    if args.list_tables {
        return print_tables();
    }
    let Some(table) = args.table.as_deref() else {
        bail!("--table is required");
    };

    let config = ConnectionConfig::load(args.config.as_deref())
        .context("Failed to load connection configuration")?;
    let plugin = Plugin::new(config).context("Failed to create Rackspace connection")?;

    let (cancel, mut ctx) = QueryContext::new();
    if let Some(secs) = args.timeout {
        ctx = ctx.with_deadline(tokio::time::Instant::now() + Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling query");
            cancel.cancel();
        }
    });

    let mut query = Query::new(ctx);
    for (column, value) in &args.quals {
        query = query.with_qual(column, value);
    }
    if let Some(columns) = &args.columns {
        query = query.with_columns(columns);
    }

    match &args.key {
        Some(key) => get_row(&plugin, table, query, key).await,
        None => list_rows(&plugin, table, &query).await,
    }
}

fn print_tables() -> Result<()> {
    let mut out = std::io::stdout().lock();
    for table in all_tables() {
        writeln!(out, "{:<36} {}", table.name, table.description)?;
    }
    Ok(())
}

async fn get_row(plugin: &Plugin, table: &str, query: Query, key: &str) -> Result<()> {
    let Some(key_column) = get_table(table)
        .and_then(|t| t.get.as_ref())
        .map(|g| g.key_column.as_str())
    else {
        bail!("Table {} has no lookup by key", table);
    };

    let query = query.with_qual(key_column, key);
    let row = plugin
        .get(table, &query)
        .await
        .with_context(|| format!("Failed to get {} {}={}", table, key_column, key))?;

    match row {
        Some(row) => print_row(&mut std::io::stdout(), &row, query.columns.as_deref()),
        None => {
            eprintln!("No {} row with {} = {}", table, key_column, key);
            Ok(())
        }
    }
}

async fn list_rows(plugin: &Plugin, table: &str, query: &Query) -> Result<()> {
    let (sink, rows) = RowSink::channel(ROW_BUFFER);

    let lister = async move {
        let result = plugin.list(table, query, &sink).await;
        drop(sink);
        result
    };
    let printer = print_rows(rows, std::io::stdout(), query.columns.as_deref());

    let (listed, printed) = tokio::join!(lister, printer);
    listed.with_context(|| format!("Failed to list {}", table))?;
    let count = printed?;

    tracing::info!("Listed {} rows from {}", count, table);
    Ok(())
}

/// Print rows until the lister is done. Owns the receiver so a failed write
/// closes it and the lister stops instead of blocking on a full buffer.
async fn print_rows<W: Write>(
    mut rows: mpsc::Receiver<Row>,
    mut out: W,
    columns: Option<&[String]>,
) -> Result<usize> {
    let mut count = 0usize;
    while let Some(row) = rows.recv().await {
        print_row(&mut out, &row, columns)?;
        count += 1;
    }
    Ok(count)
}

/// Print a row as one line of JSON, limited to `columns` when given
fn print_row<W: Write>(out: &mut W, row: &Row, columns: Option<&[String]>) -> Result<()> {
    let line = match columns {
        Some(columns) => {
            let selected: serde_json::Map<String, serde_json::Value> = row
                .cells()
                .iter()
                .filter(|(name, _)| columns.iter().any(|c| c == name))
                .map(|(name, cell)| serde_json::to_value(cell).map(|v| (name.to_string(), v)))
                .collect::<Result<_, serde_json::Error>>()?;
            serde_json::to_string(&selected)?
        }
        None => serde_json::to_string(row)?,
    };

    writeln!(out, "{}", line)?;
    Ok(())
}
