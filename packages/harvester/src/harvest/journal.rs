//! Daily text journal sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::CandidateSink;
use crate::types::page::CandidatePage;

/// Content characters kept per entry.
pub const MAX_ENTRY_CHARS: usize = 2000;

/// Appends accepted candidates to `<data_dir>/<country>/<YYYY-MM-DD>.txt`.
///
/// Each entry is a `--- WEB <domain> @ <timestamp> ---` header followed by
/// title, URL, a blank line and the (truncated) content.
pub struct JournalSink {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JournalSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn day_file(&self, country: &str, at: DateTime<Utc>) -> PathBuf {
        self.data_dir
            .join(country.trim().to_lowercase())
            .join(format!("{}.txt", at.format("%Y-%m-%d")))
    }

    async fn append(&self, path: &Path, entry: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.flush().await.map_err(|e| StoreError::io(path, e))
    }
}

pub fn format_entry(page: &CandidatePage, at: DateTime<Utc>) -> String {
    let content: String = page.content.chars().take(MAX_ENTRY_CHARS).collect();
    format!(
        "--- WEB {} @ {} ---\n{}\n{}\n\n{}\n\n",
        page.domain(),
        at.format("%Y-%m-%d %H:%M:%S"),
        page.title.trim(),
        page.url,
        content.trim()
    )
}

#[async_trait]
impl CandidateSink for JournalSink {
    async fn accept(&self, target: &str, page: &CandidatePage) -> StoreResult<()> {
        let now = Utc::now();
        let path = self.day_file(target, now);
        self.append(&path, &format_entry(page, now)).await?;
        debug!(path = %path.display(), url = %page.url, "Journal entry written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(content: &str) -> CandidatePage {
        CandidatePage {
            url: "https://www.haitilibre.com/en/news-1.html".to_string(),
            site_url: "https://www.haitilibre.com".to_string(),
            title: "Gang attack in Croix-des-Bouquets".to_string(),
            content: content.to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let entry = format_entry(&candidate("Body text."), at);
        assert_eq!(
            entry,
            "--- WEB www.haitilibre.com @ 2024-03-09 14:05:00 ---\n\
             Gang attack in Croix-des-Bouquets\n\
             https://www.haitilibre.com/en/news-1.html\n\nBody text.\n\n"
        );
    }

    #[test]
    fn test_entry_truncates_content() {
        let at = Utc::now();
        let entry = format_entry(&candidate(&"é".repeat(MAX_ENTRY_CHARS + 100)), at);
        assert_eq!(entry.matches('é').count(), MAX_ENTRY_CHARS);
    }

    #[tokio::test]
    async fn test_appends_to_day_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JournalSink::new(dir.path());

        sink.accept("Haiti", &candidate("first")).await.unwrap();
        sink.accept("haiti", &candidate("second")).await.unwrap();

        let path = sink.day_file("haiti", Utc::now());
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.matches("--- WEB").count(), 2);
        assert!(text.find("first").unwrap() < text.find("second").unwrap());
    }
}
