use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use digital_trainer::config::AppConfig;
use digital_trainer::db::Database;
use digital_trainer::ingest::Ingestor;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Parse the configured guide PDFs into searchable sections")]
struct Cli {
    /// Re-parse even when the guide files are unchanged.
    #[arg(long, default_value_t = false)]
    rebuild: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let db = Database::new(&config).await?;
    let ingestor = Ingestor::new(config, db);

    let outcome = ingestor.run(cli.rebuild).await?;
    println!(
        "Ingest complete. skipped={} sections={}",
        outcome.skipped, outcome.section_count
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
