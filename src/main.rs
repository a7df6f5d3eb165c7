use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parliament_graph::{
    import_legislators, import_snapshot, snapshot, CypherScript, PartyAliases, Pipeline, PipelineConfig,
    ReqwestFetcher, SqliteGraphStore, StatKind, Throttled,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parliament-graph")]
#[command(author, version, about = "Legislator ingestion into a property graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Graph database path (overrides config and environment)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every source, reconcile and upsert into the graph
    Run {
        /// Reconciliation worker threads
        #[arg(short, long)]
        workers: Option<usize>,
        /// Also write the reconciled legislators as a snapshot file
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
        /// Also write every upsert as a Cypher script
        #[arg(long)]
        cypher_out: Option<PathBuf>,
    },

    /// Upsert legislators from a snapshot file
    Import {
        snapshot: PathBuf,
        /// Also write every upsert as a Cypher script
        #[arg(long)]
        cypher_out: Option<PathBuf>,
    },

    /// Node and edge counts
    Stats,
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("parliament_graph={}", level)))
        .context("Invalid log filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env().context("Invalid environment")?;

    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Commands::Run {
        workers: Some(workers), ..
    } = &cli.command
    {
        config.workers = *workers;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Run {
            snapshot_out,
            cypher_out,
            ..
        } => cmd_run(&config, snapshot_out.as_deref(), cypher_out.as_deref()),
        Commands::Import { snapshot, cypher_out } => cmd_import(&config, snapshot, cypher_out.as_deref()),
        Commands::Stats => cmd_stats(&config),
    }
}

fn open_store(config: &PipelineConfig) -> Result<SqliteGraphStore> {
    SqliteGraphStore::open(&config.db_path)
        .with_context(|| format!("Failed to open graph database: {}", config.db_path.display()))
}

fn cmd_run(config: &PipelineConfig, snapshot_out: Option<&Path>, cypher_out: Option<&Path>) -> Result<()> {
    config.validate(true).context("Invalid configuration")?;

    println!("🏛️  Parliament graph - live run");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let aliases = match &config.party_alias_file {
        Some(path) => PartyAliases::from_file(path)?,
        None => PartyAliases::default(),
    };
    let fetcher = Throttled::new(
        ReqwestFetcher::new(config.timeout(), &config.user_agent)?,
        config.throttle(),
    );
    let store = open_store(config)?;

    let output = Pipeline::new(&fetcher, config)
        .with_aliases(aliases)
        .run(&store)
        .context("Pipeline run aborted")?;

    if let Some(path) = snapshot_out {
        snapshot::save(path, &output.legislators)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        println!("✓ Snapshot written to {}", path.display());
    }
    if let Some(path) = cypher_out {
        write_cypher(path, &output.legislators)?;
    }

    print_report(&output.report);
    store.close()?;
    Ok(())
}

fn cmd_import(config: &PipelineConfig, path: &Path, cypher_out: Option<&Path>) -> Result<()> {
    config.validate(false).context("Invalid configuration")?;

    println!("📂 Importing snapshot {}", path.display());
    let snapshot =
        snapshot::load(path).with_context(|| format!("Failed to load snapshot: {}", path.display()))?;

    let store = open_store(config)?;
    let report = import_snapshot(&store, &snapshot);
    if let Some(out) = cypher_out {
        write_cypher(out, &snapshot.legislators)?;
    }

    print_report(&report);
    store.close()?;
    Ok(())
}

fn cmd_stats(config: &PipelineConfig) -> Result<()> {
    let store = open_store(config)?;

    println!("📊 Graph at {}", config.db_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Nodes: {}   Edges: {}", store.node_count()?, store.edge_count()?);
    for stat in store.stats()? {
        let kind = match stat.kind {
            StatKind::Node => "node",
            StatKind::Edge => "edge",
        };
        println!("  {:<5} {:<20} {:>6}", kind, stat.name, stat.count);
    }

    match store.latest_run_id()? {
        Some(run_id) => {
            let events = store.run_events(&run_id)?;
            let incomplete = events
                .iter()
                .filter(|event| event.details["votes_complete"] == false)
                .count();
            println!("\nLast run {}: {} legislators written ({} flagged incomplete)", run_id, events.len(), incomplete);
            if let (Some(first), Some(last)) = (events.first(), events.last()) {
                println!("  {} → {}", first.recorded_at.to_rfc3339(), last.recorded_at.to_rfc3339());
            }
            for event in &events {
                println!("  {:<30} {:>4} votes", event.legislator, event.details["votes"]);
            }
        }
        None => println!("\nNo runs recorded yet"),
    }

    store.close()?;
    Ok(())
}

fn write_cypher(path: &Path, legislators: &[parliament_graph::Legislator]) -> Result<()> {
    let script = CypherScript::new();
    import_legislators(&script, legislators);
    script
        .write_to(path)
        .with_context(|| format!("Failed to write Cypher script: {}", path.display()))?;
    println!("✓ {} Cypher statements written to {}", script.len(), path.display());
    Ok(())
}

fn print_report(report: &parliament_graph::RunReport) {
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    for failure in &report.failures {
        let marker = if failure.critical { "❌" } else { "⚠️ " };
        println!("{} [{}] {}: {}", marker, failure.code, failure.constituency, failure.message);
    }
}
