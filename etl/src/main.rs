//! Stockmart CLI - load the daily stock snapshot into the data mart
//!
//! # Main Commands
//!
//! ```bash
//! stockmart run                      # Extract, transform and load once
//! stockmart run --dry-run            # Same, but load into memory only
//! stockmart step extract             # One step, hand-off through files
//! stockmart serve                    # HTTP trigger for the scheduler (port 3000)
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! stockmart query                    # Print the source join
//! stockmart schema                   # Print the expected mart DDL
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use stockmart::api::start_server;
use stockmart::{
    ddl, redact_uri, run_step, ConfigOverrides, HandoffStore, MemoryTarget, Pipeline,
    PipelineConfig, RunReport, Step, SOURCE_QUERY,
};

#[derive(Parser)]
#[command(name = "stockmart")]
#[command(about = "Load operational stock data into the star-schema data mart", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Source MySQL URI (overrides REC_DEV_MYSQL_CONN)
    #[arg(long)]
    source_uri: Option<String>,

    /// Target PostgreSQL URI (overrides PG_CONN_STRING)
    #[arg(long)]
    target_uri: Option<String>,

    /// Target schema (overrides DATA_MART_NAMESPACE)
    #[arg(long)]
    namespace: Option<String>,

    /// Load all tables in one transaction
    #[arg(long)]
    atomic: bool,
}

impl ConnectionArgs {
    fn into_overrides(self, handoff_dir: Option<PathBuf>) -> ConfigOverrides {
        ConfigOverrides {
            source_uri: self.source_uri,
            target_uri: self.target_uri,
            namespace: self.namespace,
            handoff_dir,
            atomic_load: self.atomic,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run extract, transform and load once
    Run {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Load into an in-memory mart instead of PostgreSQL
        #[arg(long)]
        dry_run: bool,

        /// Write the run report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Run a single step, reading and writing hand-off payloads
    Step {
        /// extract, transform or load
        step: Step,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Hand-off directory (overrides STOCKMART_HANDOFF_DIR)
        #[arg(long)]
        handoff_dir: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Print the source query
    Query,

    /// Print the DDL the loader expects
    Schema {
        /// Target schema (overrides DATA_MART_NAMESPACE)
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            connection,
            dry_run,
            report,
        } => cmd_run(connection, dry_run, report.as_deref()).await,

        Commands::Step {
            step,
            connection,
            handoff_dir,
        } => cmd_step(step, connection, handoff_dir).await,

        Commands::Serve { port, connection } => cmd_serve(port, connection).await,

        Commands::Query => {
            println!("{}", SOURCE_QUERY.trim());
            Ok(())
        }

        Commands::Schema { namespace } => cmd_schema(namespace),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(
    connection: ConnectionArgs,
    dry_run: bool,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env(connection.into_overrides(None))?;
    let source = config.source()?;
    eprintln!("📄 Source: {}", redact_uri(config.source_uri()?));

    let report = if dry_run {
        eprintln!("🧪 Dry run: loading into memory");
        Pipeline::new(source, MemoryTarget::new())
            .with_options(config.load_options())
            .run()
            .await?
    } else {
        Pipeline::new(source, config.target()?)
            .with_options(config.load_options())
            .run()
            .await?
    };

    print_summary(&report);

    if let Some(path) = report_path {
        tokio::fs::write(path, serde_json::to_string_pretty(&report)?).await?;
        eprintln!("💾 Report written to: {}", path.display());
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn print_summary(report: &RunReport) {
    eprintln!("\n📊 Run {}", report.run_id);
    eprintln!("   Extracted rows: {}", report.extracted_rows);
    eprintln!(
        "   Projections:    {} entities, {} materials, {} activities, {} facts",
        report.projections.dim_entity,
        report.projections.dim_material,
        report.projections.dim_activity,
        report.projections.fact_stock
    );
    if report.conflicts.total() > 0 {
        eprintln!(
            "   ⚠️  Conflicts:   {} entity, {} material, {} activity (first row kept)",
            report.conflicts.entity, report.conflicts.material, report.conflicts.activity
        );
    }
    for table in &report.load.tables {
        eprintln!(
            "   {:<15} {} inserted, {} skipped",
            table.table, table.inserted, table.skipped
        );
    }
}

async fn cmd_step(
    step: Step,
    connection: ConnectionArgs,
    handoff_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env(connection.into_overrides(handoff_dir))?;
    let handoff = HandoffStore::with_dir(&config.handoff_dir);

    eprintln!("⚙️  Step: {}", step);
    let output = run_step(step, &config, &handoff).await?;
    eprintln!("✅ {} items, payload at {}", output.items, output.path.display());
    Ok(())
}

async fn cmd_serve(
    port: u16,
    connection: ConnectionArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env(connection.into_overrides(None))?;
    start_server(port, config).await?;
    Ok(())
}

fn cmd_schema(namespace: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let overrides = ConfigOverrides {
        namespace,
        ..Default::default()
    };
    let config = PipelineConfig::from_env(overrides)?;
    println!("{}", ddl(&config.target_namespace));
    Ok(())
}
