pub mod pdf;

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{IngestManifest, NewSection};
use crate::prompts::truncate_chars;

const SECTION_CHAR_CAP: usize = 2_000;
const RAW_FALLBACK_CAP: usize = 1_500;
const MIN_CLEANED_CHARS: usize = 50;
const MIN_LINE_CHARS: usize = 15;

#[derive(Clone)]
pub struct Ingestor {
    config: AppConfig,
    db: Database,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub section_count: i64,
    pub skipped: bool,
}

impl Ingestor {
    pub fn new(config: AppConfig, db: Database) -> Self {
        Self { config, db }
    }

    /// Parse every configured guide into per-page sections. The whole run
    /// is skipped when the guide files are unchanged since the recorded
    /// manifest, unless `rebuild` forces a refresh.
    pub async fn run(&self, rebuild: bool) -> Result<IngestOutcome> {
        let guide_hash = self.combined_guide_hash().await;

        if !rebuild {
            if let Some(latest) = self.db.latest_manifest().await? {
                if latest.guide_hash == guide_hash {
                    tracing::info!(
                        sections = latest.section_count,
                        "guide files unchanged, skipping ingest"
                    );
                    return Ok(IngestOutcome {
                        section_count: latest.section_count,
                        skipped: true,
                    });
                }
            }
        }

        self.db.clear_sections().await?;

        let mut total = 0i64;
        for guide_file in &self.config.guide_files {
            let path = self.config.guide_path(guide_file);
            if !path.exists() {
                tracing::warn!(guide = %guide_file, path = %path.display(), "guide file not found");
                continue;
            }

            match self.ingest_guide(&path, guide_file).await {
                Ok(count) => {
                    tracing::info!(guide = %guide_file, pages = count, "guide parsed");
                    total += count;
                }
                Err(err) => {
                    tracing::error!(guide = %guide_file, error = %err, "guide parsing failed");
                }
            }
        }

        self.db
            .record_manifest(&IngestManifest {
                guide_hash,
                created_at: Utc::now(),
                section_count: total,
            })
            .await?;

        tracing::info!(
            guides = self.config.guide_files.len(),
            sections = total,
            "ingest finished"
        );

        Ok(IngestOutcome {
            section_count: total,
            skipped: false,
        })
    }

    async fn ingest_guide(&self, path: &Path, guide_name: &str) -> Result<i64> {
        let pages = pdf::extract_guide_pages(path).await?;

        let mut sections = Vec::new();
        for page in &pages {
            let cleaned = clean_page_text(&page.text, page.page);
            if cleaned.is_empty() {
                continue;
            }

            let title = match page.page {
                Some(number) => format!("{guide_name} - Страница {number}"),
                None => guide_name.to_string(),
            };

            sections.push(NewSection {
                title,
                content: cleaned,
                page_number: page.page,
                category: Some(guide_name.to_string()),
                source_guide: guide_name.to_string(),
            });
        }

        self.db.insert_sections(&sections).await?;
        Ok(sections.len() as i64)
    }

    /// One hash over every configured guide, in configuration order.
    /// Missing files contribute their name only, so dropping the file in
    /// place later changes the hash and triggers a re-ingest.
    async fn combined_guide_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for guide_file in &self.config.guide_files {
            hasher.update(guide_file.as_bytes());
            if let Ok(bytes) = tokio::fs::read(self.config.guide_path(guide_file)).await {
                hasher.update(&bytes);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Collapse whitespace and drop page numbers and table-of-contents
/// boilerplate. When cleaning strips almost everything the raw page is
/// kept instead, truncated; either way the section is capped so one page
/// cannot dominate a prompt.
pub(crate) fn clean_page_text(text: &str, page: Option<i64>) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return String::new();
    }

    let kept: Vec<&str> = collapsed
        .split(". ")
        .map(str::trim)
        .filter(|line| line.chars().count() > MIN_LINE_CHARS && !is_garbage_line(line, page))
        .collect();

    let cleaned = kept.join(". ");
    if cleaned.chars().count() < MIN_CLEANED_CHARS {
        return truncate_chars(&collapsed, RAW_FALLBACK_CAP);
    }

    truncate_chars(&cleaned, SECTION_CHAR_CAP)
}

fn is_garbage_line(line: &str, page: Option<i64>) -> bool {
    const GARBAGE_MARKERS: &[&str] = &[
        "оглавление",
        "содержание",
        "contents",
        "глава",
        "chapter",
        "page",
        "страница",
    ];

    let line_lower = line.to_lowercase();
    if GARBAGE_MARKERS
        .iter()
        .any(|marker| line_lower.contains(marker))
    {
        return true;
    }

    // A bare number near the current page is a printed page number.
    if let (Ok(number), Some(page)) = (line.parse::<i64>(), page) {
        if (number - page).abs() <= 1 {
            return true;
        }
    }

    false
}
