//! Generation history persistence

use crate::error::HistoryError;
use crate::ledger::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One completed generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: Uuid,
    pub user: UserId,
    pub template_type: String,
    pub form_data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_file_path: Option<String>,
    pub generated_content: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError>;

    /// One page of `user`'s records, newest first
    ///
    /// `page` counts from zero; a `limit` of zero yields nothing.
    async fn list(
        &self,
        user: &UserId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Remove one of `user`'s records; `false` when there was none with `id`
    async fn delete(&self, user: &UserId, id: Uuid) -> Result<bool, HistoryError>;
}

/// Newest first; records sharing a timestamp keep reverse append order
fn page_of(
    mut records: Vec<HistoryRecord>,
    page: usize,
    limit: usize,
) -> Vec<HistoryRecord> {
    records.reverse();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
        .into_iter()
        .skip(page.saturating_mul(limit))
        .take(limit)
        .collect()
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        crate::editor::lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        crate::editor::lock(&self.records).push(record);
        Ok(())
    }

    async fn list(
        &self,
        user: &UserId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = crate::editor::lock(&self.records)
            .iter()
            .filter(|r| &r.user == user)
            .cloned()
            .collect();
        Ok(page_of(records, page, limit))
    }

    async fn delete(&self, user: &UserId, id: Uuid) -> Result<bool, HistoryError> {
        let mut records = crate::editor::lock(&self.records);
        let before = records.len();
        records.retain(|r| !(r.id == id && &r.user == user));
        Ok(records.len() != before)
    }
}

/// Appends one JSON record per line to a file
pub struct JsonlHistoryStore {
    path: PathBuf,
    // Serialises appends from concurrent sessions
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(HistoryError::from))
            .collect()
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), user = %record.user, "history record appended");
        Ok(())
    }

    async fn list(
        &self,
        user: &UserId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| &r.user == user)
            .collect();
        Ok(page_of(records, page, limit))
    }

    async fn delete(&self, user: &UserId, id: Uuid) -> Result<bool, HistoryError> {
        let _guard = self.write_lock.lock().await;
        let records = self.read_all().await?;
        let before = records.len();
        let kept: Vec<_> = records
            .into_iter()
            .filter(|r| !(r.id == id && &r.user == user))
            .collect();
        if kept.len() == before {
            return Ok(false);
        }

        let mut content = String::new();
        for record in &kept {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }
        // Staged, then swapped in by rename
        let staging = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        tracing::debug!(path = %self.path.display(), user = %user, %id, "history record deleted");
        Ok(true)
    }
}
