use std::fs;
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::db::PageRow;

/// Program pages indexed by stable key. The set is small and fixed.
pub const PROGRAMS: &[(&str, &str)] = &[
    ("ai", "https://abit.itmo.ru/program/master/ai"),
    ("ai_product", "https://abit.itmo.ru/program/master/ai_product"),
];

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("abit_kb/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Fetch every program page. Each result carries either the body or the
/// error, so one failed page never stops the run.
pub async fn fetch_program_pages(client: &reqwest::Client) -> Vec<PageRow> {
    let mut rows = Vec::with_capacity(PROGRAMS.len());
    for (key, url) in PROGRAMS {
        let row = fetch_with_retry(client, key, url).await;
        match &row.error {
            None => info!("Fetched {} ({})", key, url),
            Some(e) => warn!("Fetch failed for {}: {}", key, e),
        }
        rows.push(row);
    }
    rows
}

async fn fetch_with_retry(client: &reqwest::Client, key: &str, url: &str) -> PageRow {
    for attempt in 0..MAX_RETRIES {
        let row = fetch_one(client, key, url).await;

        let should_retry = matches!(row.status, Some(s) if s == 429 || s >= 500);
        if !should_retry {
            return row;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "HTTP {} on {} (attempt {}/{}), backing off {:.1}s",
            row.status.unwrap_or(0),
            key,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }

    fetch_one(client, key, url).await
}

async fn fetch_one(client: &reqwest::Client, key: &str, url: &str) -> PageRow {
    let mut row = PageRow {
        key: key.to_string(),
        url: url.to_string(),
        html: None,
        status: None,
        error: None,
    };

    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            row.status = Some(status.as_u16());
            match response.text().await {
                Ok(body) if status.is_success() => row.html = Some(body),
                Ok(_) => row.error = Some(format!("HTTP {}", status)),
                Err(e) => row.error = Some(e.to_string()),
            }
        }
        Err(e) => row.error = Some(e.to_string()),
    }

    row
}

/// Resolve a possibly-relative curriculum link against its page URL.
pub fn resolve_link(page_url: &str, link: &str) -> Result<String> {
    let base = reqwest::Url::parse(page_url)
        .with_context(|| format!("invalid page url {}", page_url))?;
    let resolved = base
        .join(link)
        .with_context(|| format!("invalid curriculum link {}", link))?;
    Ok(resolved.to_string())
}

/// Download the curriculum PDF and recover its text. Page text extraction is
/// delegated to pdftotext; pages concatenate into one plain-text stream for
/// the line scanner.
pub async fn fetch_curriculum_text(client: &reqwest::Client, link: &str) -> Result<String> {
    let response = client
        .get(link)
        .send()
        .await
        .with_context(|| format!("curriculum download failed: {}", link))?
        .error_for_status()
        .with_context(|| format!("curriculum download failed: {}", link))?;
    let bytes = response.bytes().await?;
    pdf_to_text(&bytes)
}

fn pdf_to_text(bytes: &[u8]) -> Result<String> {
    let path = std::env::temp_dir().join(format!("abit_kb_plan_{}.pdf", std::process::id()));
    fs::write(&path, bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;

    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(&path)
        .arg("-")
        .output();
    let _ = fs::remove_file(&path);

    let output = output.context("failed to execute pdftotext (is poppler-utils installed?)")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("pdftotext returned non-zero exit status: {}", stderr.trim());
    }

    // Form feeds separate pages; the scanner only needs lines.
    Ok(String::from_utf8_lossy(&output.stdout)
        .replace('\u{000C}', "\n")
        .replace('\u{0000}', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_links_pass_through() {
        let link = resolve_link(
            "https://abit.itmo.ru/program/master/ai",
            "https://api.itmo.su/api/plans/ai.pdf",
        )
        .unwrap();
        assert_eq!(link, "https://api.itmo.su/api/plans/ai.pdf");
    }

    #[test]
    fn relative_links_resolve_against_the_page() {
        let link = resolve_link("https://abit.itmo.ru/program/master/ai", "/files/plan.pdf").unwrap();
        assert_eq!(link, "https://abit.itmo.ru/files/plan.pdf");
    }

    #[test]
    fn garbage_base_is_an_error() {
        assert!(resolve_link("not a url", "/plan.pdf").is_err());
    }
}
