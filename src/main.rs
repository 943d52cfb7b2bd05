use anyhow::Result;
use tracing_subscriber::EnvFilter;

use digital_trainer::config::AppConfig;
use digital_trainer::db::Database;
use digital_trainer::gigachat::GigaChatClient;
use digital_trainer::ingest::Ingestor;
use digital_trainer::ranking::SynonymMap;
use digital_trainer::trainer::Trainer;
use digital_trainer::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let db = Database::new(&config).await?;

    let ingestor = Ingestor::new(config.clone(), db.clone());
    let outcome = ingestor.run(config.rebuild_on_start).await?;
    tracing::info!(
        sections = outcome.section_count,
        skipped = outcome.skipped,
        "guide sections ready"
    );

    let synonyms = SynonymMap::load(config.synonyms_path.as_deref());

    // Missing credentials disable the generation endpoints but leave the
    // rest of the service up.
    let trainer = match GigaChatClient::new(&config.gigachat) {
        Ok(llm) => Some(Trainer::new(
            config.clone(),
            db.clone(),
            llm,
            synonyms.clone(),
        )),
        Err(err) => {
            tracing::warn!(error = %err, "GigaChat unavailable, generation endpoints disabled");
            None
        }
    };

    run_server(config, db, trainer, synonyms).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
