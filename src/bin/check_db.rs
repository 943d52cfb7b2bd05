use std::collections::BTreeMap;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use digital_trainer::config::AppConfig;
use digital_trainer::db::Database;

#[derive(Parser, Debug)]
#[command(name = "check-db")]
#[command(about = "Print statistics about the ingested guide sections")]
struct Cli {
    /// How many sections to preview.
    #[arg(long, default_value_t = 5)]
    preview: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    let db = Database::new(&config).await?;

    let total = db.count_sections().await?;
    println!("Sections stored: {total}");

    if let Some(manifest) = db.latest_manifest().await? {
        let hash_prefix: String = manifest.guide_hash.chars().take(12).collect();
        println!(
            "Last ingest: {} sections at {} (hash {hash_prefix})",
            manifest.section_count,
            manifest.created_at.to_rfc3339()
        );
    }

    let sections = db.get_sections(config.section_scan_limit).await?;

    let mut per_guide: BTreeMap<&str, usize> = BTreeMap::new();
    for section in &sections {
        *per_guide.entry(section.source_guide.as_str()).or_default() += 1;
    }
    for (guide, count) in &per_guide {
        println!("  {guide}: {count} sections");
    }

    for section in sections.iter().take(cli.preview) {
        let page = section
            .page_number
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let preview: String = section.content.chars().take(80).collect();
        println!(
            "[{}] {} (page {page}, {} chars): {preview}...",
            section.id,
            section.title,
            section.content.chars().count()
        );
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
