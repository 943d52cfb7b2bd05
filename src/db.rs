use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::config::AppConfig;
use crate::models::{GuideSection, IngestManifest, NewSection};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let options = SqliteConnectOptions::from_str(&config.sqlite_dsn())?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guide_sections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                page_number INTEGER,
                category TEXT,
                source_guide TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ingest_manifests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guide_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                section_count INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn clear_sections(&self) -> Result<()> {
        sqlx::query("DELETE FROM guide_sections")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_sections(&self, sections: &[NewSection]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for section in sections {
            sqlx::query(
                r#"
                INSERT INTO guide_sections (title, content, page_number, category, source_guide, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&section.title)
            .bind(&section.content)
            .bind(section.page_number)
            .bind(&section.category)
            .bind(&section.source_guide)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Sections in reading order: by page, then by insertion id.
    pub async fn get_sections(&self, limit: i64) -> Result<Vec<GuideSection>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, content, page_number, category, source_guide
            FROM guide_sections
            ORDER BY page_number, id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_section).collect())
    }

    pub async fn count_sections(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM guide_sections")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    pub async fn record_manifest(&self, manifest: &IngestManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_manifests (guide_hash, created_at, section_count)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&manifest.guide_hash)
        .bind(manifest.created_at.to_rfc3339())
        .bind(manifest.section_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn latest_manifest(&self) -> Result<Option<IngestManifest>> {
        let row = sqlx::query(
            r#"
            SELECT guide_hash, created_at, section_count
            FROM ingest_manifests
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let manifest = row.map(|r| IngestManifest {
            guide_hash: r.get::<String, _>("guide_hash"),
            created_at: chrono::DateTime::parse_from_rfc3339(&r.get::<String, _>("created_at"))
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            section_count: r.get::<i64, _>("section_count"),
        });

        Ok(manifest)
    }
}

fn row_to_section(row: SqliteRow) -> GuideSection {
    GuideSection {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        page_number: row.get("page_number"),
        category: row.get("category"),
        source_guide: row.get("source_guide"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(title: &str, page: i64) -> NewSection {
        NewSection {
            title: title.to_string(),
            content: format!("Содержимое раздела {title}"),
            page_number: Some(page),
            category: Some("guide.pdf".to_string()),
            source_guide: "guide.pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn sections_come_back_in_page_order() {
        let db = Database::new_in_memory().await.expect("memory db");
        db.insert_sections(&[section("Страница 3", 3), section("Страница 1", 1)])
            .await
            .expect("insert");

        let sections = db.get_sections(10).await.expect("select");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].page_number, Some(1));
        assert_eq!(sections[1].page_number, Some(3));
    }

    #[tokio::test]
    async fn clear_removes_all_sections() {
        let db = Database::new_in_memory().await.expect("memory db");
        db.insert_sections(&[section("Страница 1", 1)])
            .await
            .expect("insert");
        db.clear_sections().await.expect("clear");

        assert_eq!(db.count_sections().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn latest_manifest_wins() {
        let db = Database::new_in_memory().await.expect("memory db");
        for (hash, count) in [("aaa", 5), ("bbb", 7)] {
            db.record_manifest(&IngestManifest {
                guide_hash: hash.to_string(),
                created_at: Utc::now(),
                section_count: count,
            })
            .await
            .expect("record");
        }

        let latest = db.latest_manifest().await.expect("select").expect("some");
        assert_eq!(latest.guide_hash, "bbb");
        assert_eq!(latest.section_count, 7);
    }
}
