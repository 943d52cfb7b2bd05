use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

/// Raw text of one guide page. `page` is `None` when the whole document
/// had to be extracted in one pass.
#[derive(Debug, Clone)]
pub struct PageText {
    pub page: Option<i64>,
    pub text: String,
}

/// Extract guide text page by page. Prefers poppler's `pdftotext` so
/// every section keeps its page number; falls back to a single-pass
/// `pdf_extract` run when poppler is missing.
pub async fn extract_guide_pages(pdf_path: &Path) -> Result<Vec<PageText>> {
    let mut pages = Vec::new();

    if has_command("pdftotext").await {
        let page_count = get_pdf_page_count(pdf_path).await.unwrap_or(0);
        for page in 1..=page_count {
            let output = Command::new("pdftotext")
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg("-layout")
                .arg("-nopgbrk")
                .arg(pdf_path)
                .arg("-")
                .output()
                .await
                .with_context(|| format!("failed to run pdftotext for page {}", page))?;

            if !output.status.success() {
                continue;
            }

            let text = String::from_utf8_lossy(&output.stdout).to_string();
            if text.trim().is_empty() {
                continue;
            }

            pages.push(PageText {
                page: Some(page as i64),
                text,
            });
        }
    }

    if pages.is_empty() {
        let pdf_path = pdf_path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&pdf_path))
            .await
            .context("PDF extraction task panicked")?
            .context("failed to extract text from PDF")?;

        if !extracted.trim().is_empty() {
            pages.push(PageText {
                page: None,
                text: extracted,
            });
        }
    }

    Ok(pages)
}

async fn get_pdf_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("pdfinfo exited with non-zero status"));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let regex = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?;
    let pages = regex
        .captures(&stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| anyhow::anyhow!("unable to parse page count from pdfinfo"))?;

    Ok(pages)
}

async fn has_command(binary: &str) -> bool {
    // Some poppler binaries return non-zero for --version, so check PATH
    // presence via `which` instead of probing a specific flag.
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}
