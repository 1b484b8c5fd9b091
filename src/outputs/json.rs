//! JSON archive of curated articles.
//!
//! Files are organized by date with edition names:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── morning.json
//!     ├── morning_run.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//!
//! `{edition}.json` holds the hand-off records (`title`, `summary`, `source`,
//! `author`, `date`, `url`, `category`); `{edition}_run.json` the full run
//! report when the binary asks for it.

use crate::error::{PipelineError, Result};
use crate::models::StoredArticle;
use crate::pipeline::{ArticleStore, StorageOutcome};
use crate::utils::time_of_day;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Dated JSON archive rooted at the configured output directory.
///
/// One archive value covers one run: the date and edition are fixed when it is
/// created, so every file of a run lands in the same `{root}/{date}/` folder.
#[derive(Debug, Clone)]
pub struct JsonArchive {
    root: PathBuf,
    date: NaiveDate,
    edition: String,
}

impl JsonArchive {
    /// Archive for the current local date and edition.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::dated(root, Local::now().date_naive(), &time_of_day())
    }

    pub fn dated(root: impl Into<PathBuf>, date: NaiveDate, edition: &str) -> Self {
        Self {
            root: root.into(),
            date,
            edition: edition.to_string(),
        }
    }

    /// Folder holding this run's files.
    pub fn day_dir(&self) -> PathBuf {
        self.root.join(self.date.to_string())
    }

    /// Serialize `value` to `{root}/{date}/{name}.json`.
    #[instrument(level = "info", skip_all, fields(%name))]
    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| PipelineError::Storage(format!("serialize {name}: {e}")))?;

        let dir = self.day_dir();
        if let Err(e) = fs::create_dir_all(&dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(storage_error(&dir, e));
        }

        let path = dir.join(format!("{name}.json"));
        fs::write(&path, json)
            .await
            .map_err(|e| storage_error(&path, e))?;
        info!(path = %path.display(), "Wrote JSON file");
        Ok(path)
    }

    pub fn edition(&self) -> &str {
        &self.edition
    }
}

fn storage_error(path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::Storage(format!("{}: {e}", path.display()))
}

impl ArticleStore for JsonArchive {
    async fn store(&self, articles: &[StoredArticle]) -> Result<StorageOutcome> {
        let path = self.write_json(&self.edition, &articles).await?;
        Ok(StorageOutcome {
            stored: articles.len(),
            location: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> StoredArticle {
        StoredArticle {
            title: title.into(),
            summary: "summary".into(),
            source: "kdnuggets".into(),
            author: String::new(),
            date: "2025-03-04".into(),
            url: format!("https://a.example/{title}"),
            category: "Research".into(),
        }
    }

    #[tokio::test]
    async fn test_store_writes_dated_edition_file() {
        let root = std::env::temp_dir().join(format!("news_curator_json_{}", std::process::id()));
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let archive = JsonArchive::dated(&root, date, "morning");

        let outcome = archive.store(&[record("one"), record("two")]).await.unwrap();
        assert_eq!(outcome.stored, 2);

        let path = root.join("2025-03-04").join("morning.json");
        assert_eq!(outcome.location, path.display().to_string());
        let back: Vec<StoredArticle> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![record("one"), record("two")]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_storage_error() {
        let file = std::env::temp_dir().join(format!("news_curator_file_{}", std::process::id()));
        std::fs::write(&file, "not a directory").unwrap();
        let archive = JsonArchive::dated(&file, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(), "evening");
        let err = archive.store(&[record("x")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        let _ = std::fs::remove_file(&file);
    }
}
