//! Command-line exporter
//!
//! ```text
//! rowseed-export users 42 -o seed.sql
//! rowseed-export billing.invoices 9f1c --strict --database-url postgres://...
//! ```
//!
//! The database URL comes from `--database-url`/`DATABASE_URL`, falling back
//! to `database.main_url` in the project file.

use anyhow::{anyhow, Context};
use clap::Parser;
use rowseed::config::{ProjectConfig, PROJECT_FILE};
use rowseed::connection::{create_pool, ConnectionParams};
use rowseed::export::{ExportOptions, Exporter, RowId, ScriptGenerator, DEFAULT_MAX_DEPTH};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rowseed-export")]
#[command(about = "Export a row and everything it references as a replayable SQL script")]
#[command(version)]
struct Cli {
    /// Table of the root row, optionally schema-qualified
    table: String,

    /// Primary-key value of the root row
    id: String,

    /// Write the script here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Source database
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Project file consulted when no database URL is given
    #[arg(long, default_value = PROJECT_FILE)]
    config: PathBuf,

    /// Abort on the first dependency that cannot be exported
    #[arg(long)]
    strict: bool,

    /// Deepest dependency chain followed before giving up on a branch
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Overall export deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing();

    if cli.max_depth == 0 {
        return Err(anyhow!("--max-depth must be at least 1"));
    }

    let url = resolve_database_url(cli.database_url.as_deref(), &cli.config)?;
    let params = ConnectionParams::from_connection_string(&url)?;
    debug!("Connecting to {}", params.to_display_string());
    let pool = create_pool(&params)?;

    let options = ExportOptions {
        max_depth: cli.max_depth,
        strict: cli.strict,
        timeout: cli.timeout.map(Duration::from_secs),
    };
    let id = RowId::parse(&cli.id);

    let result = Exporter::new(pool, options)
        .export(&cli.table, &id)
        .await
        .with_context(|| format!("failed to export {} = {}", cli.table, id))?;

    eprintln!(
        "Exported {} record(s) (including dependencies):",
        result.len()
    );
    for (table, count) in result.table_counts() {
        eprintln!("  {:<40} {}", table, count);
    }
    if !result.warnings.is_empty() {
        eprintln!("{} warning(s):", result.warnings.len());
        for warning in &result.warnings {
            eprintln!("  {}", warning);
        }
    }

    let generator = ScriptGenerator::new();
    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            generator.write_script(&result.records, &mut writer)?;
            writer.flush()?;

            info!("Wrote {}", path.display());
            eprintln!();
            eprintln!("Import with:");
            eprintln!(
                "  psql -h {} -p {} -U {} -d <target database> -f {}",
                params.host,
                params.port,
                params.user,
                path.display()
            );
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            generator.write_script(&result.records, &mut writer)?;
            writer.flush()?;
        }
    }

    Ok(())
}

fn resolve_database_url(flag: Option<&str>, project_file: &Path) -> anyhow::Result<String> {
    if let Some(url) = flag.filter(|url| !url.trim().is_empty()) {
        return Ok(url.to_string());
    }

    if project_file.exists() {
        let project = ProjectConfig::load(project_file)
            .with_context(|| format!("failed to load {}", project_file.display()))?;
        if let Some(url) = project.main_url() {
            debug!("Using database.main_url from {}", project_file.display());
            return Ok(url.to_string());
        }
    }

    Err(anyhow!(
        "no database URL: pass --database-url, set DATABASE_URL or add database.main_url to {}",
        project_file.display()
    ))
}

/// Logs go to stderr so stdout carries only the script
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,rowseed=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
