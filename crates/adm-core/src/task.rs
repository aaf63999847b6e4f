//! Data model (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// `{ name, bundleID, version, fileSizeBytes? }` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoftwareDescriptor {
    pub name: String,
    #[serde(rename = "bundleID")]
    pub bundle_id: String,
    pub version: String,
    pub file_size_bytes: Option<u64>,
}

/// An opaque base64-encoded signature blob paired with a manifest index
/// (spec.md §3, glossary: "Signature blob").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sinf {
    pub id: i64,
    /// Base64-encoded bytes.
    pub sinf: String,
}

/// Task lifecycle state (spec.md §3 "Status transitions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Injecting,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `completed` and `failed` are terminal until deleted (spec.md §3).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A download task (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub software: SoftwareDescriptor,
    pub account_hash: String,
    pub download_url: String,
    pub sinfs: Vec<Sinf>,
    pub itunes_metadata: Option<String>,
    pub status: TaskStatus,
    pub progress: u8,
    pub speed: String,
    pub file_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        software: SoftwareDescriptor,
        account_hash: String,
        download_url: String,
        sinfs: Vec<Sinf>,
        itunes_metadata: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            software,
            account_hash,
            download_url,
            sinfs,
            itunes_metadata,
            status: TaskStatus::Pending,
            progress: 0,
            speed: "0 B/s".to_string(),
            file_path: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Clears every secret/transient field on successful completion
    /// (spec.md §3 invariant: "A task in `completed` state has
    /// `downloadURL == \"\"`, `sinfs == []`, `iTunesMetadata` absent").
    pub fn scrub_secrets(&mut self) {
        self.download_url.clear();
        self.sinfs.clear();
        self.itunes_metadata = None;
    }

    /// True iff this task currently satisfies the completed-task secret
    /// invariant (spec.md §8 property 1).
    pub fn satisfies_completed_invariant(&self) -> bool {
        self.status != TaskStatus::Completed
            || (self.download_url.is_empty()
                && self.sinfs.is_empty()
                && self.itunes_metadata.is_none())
    }

    /// Public projection returned to callers: strips `downloadURL`, `sinfs`,
    /// `iTunesMetadata`, `filePath`, and adds `hasFile` (spec.md §4.6
    /// `sanitizeTaskForResponse`).
    pub fn to_public(&self) -> PublicTask {
        PublicTask {
            id: self.id,
            software: self.software.clone(),
            account_hash: self.account_hash.clone(),
            status: self.status,
            progress: self.progress,
            speed: self.speed.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            has_file: self
                .file_path
                .as_deref()
                .map(|p| p.is_file())
                .unwrap_or(false),
        }
    }

    /// The persisted projection (spec.md §4.5 "Snapshot format"), or `None`
    /// if this task is not eligible for persistence (only `completed` tasks
    /// with an existing file are persisted).
    pub fn to_persisted(&self) -> Option<PersistedTask> {
        if self.status != TaskStatus::Completed {
            return None;
        }
        let file_path = self.file_path.clone()?;
        if !file_path.is_file() {
            return None;
        }
        Some(PersistedTask {
            id: self.id,
            software: self.software.clone(),
            account_hash: self.account_hash.clone(),
            download_url: String::new(),
            sinfs: Vec::new(),
            status: self.status,
            progress: self.progress,
            speed: self.speed.clone(),
            file_path,
            created_at: self.created_at,
        })
    }
}

/// On-disk snapshot projection: only ever written for `completed` tasks
/// (spec.md §4.5 "Snapshot format").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTask {
    pub id: Uuid,
    pub software: SoftwareDescriptor,
    pub account_hash: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub sinfs: Vec<Sinf>,
    pub status: TaskStatus,
    pub progress: u8,
    pub speed: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl PersistedTask {
    /// Reconstitutes a full in-memory `Task` from a loaded snapshot entry.
    /// `iTunesMetadata` is absent in the snapshot, matching the completed
    /// invariant (spec.md §3).
    pub fn into_task(self) -> Task {
        Task {
            id: self.id,
            software: self.software,
            account_hash: self.account_hash,
            download_url: self.download_url,
            sinfs: self.sinfs,
            itunes_metadata: None,
            status: self.status,
            progress: self.progress,
            speed: self.speed,
            file_path: Some(self.file_path),
            error: None,
            created_at: self.created_at,
        }
    }
}

/// Public response projection (spec.md §4.6 `sanitizeTaskForResponse`).
#[derive(Debug, Clone, Serialize)]
pub struct PublicTask {
    pub id: Uuid,
    pub software: SoftwareDescriptor,
    pub account_hash: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub speed: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub has_file: bool,
}
