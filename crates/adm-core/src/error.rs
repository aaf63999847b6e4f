//! Leaf error types.
//!
//! Kept small and purpose-built the way the teacher factors `SegmentError`
//! and `JobAborted` out of `anyhow::Error` rather than one catch-all: a
//! `Task`'s user-visible `error` field is always one of the fixed
//! diagnostics below, never a library error's raw `Display` text.

use std::fmt;

/// Validation failures raised by [`crate::validate`]. Surfaced synchronously
/// at `create`; never causes a task to transition to `failed` because no
/// task exists yet when these are returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Must use HTTPS")]
    MustUseHttps,
    #[error("Must be from an allowed domain")]
    DisallowedDomain,
    #[error("Must not use IP addresses")]
    IpLiteral,
    #[error("Invalid {0}")]
    InvalidSegment(&'static str),
}

/// Error returned by a single chunk download (used for retry classification).
#[derive(Debug)]
pub enum ChunkError {
    /// The transfer layer reported an error (connection, timeout, curl internal).
    Transport(curl::Error),
    /// Non-2xx/206 HTTP status.
    Http(u32),
    /// Fewer or more bytes were written than expected for this chunk.
    SizeMismatch { expected: u64, received: u64 },
    /// Cumulative bytes on the stream exceeded twice the expected length;
    /// the transfer was torn down to guard against a misbehaving origin.
    ExceededExpectedSize,
    /// The task's cancellation source fired mid-transfer.
    Aborted,
    /// Writing the chunk to disk failed.
    Storage(std::io::Error),
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Transport(e) => write!(f, "{e}"),
            ChunkError::Http(code) => write!(f, "HTTP {code}"),
            ChunkError::SizeMismatch { expected, received } => {
                write!(f, "size mismatch: expected {expected}, received {received}")
            }
            ChunkError::ExceededExpectedSize => write!(f, "exceeded expected size"),
            ChunkError::Aborted => write!(f, "aborted"),
            ChunkError::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Transport(e) => Some(e),
            ChunkError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl ChunkError {
    /// True if this is an operator/timeout abort rather than a transfer fault.
    pub fn is_abort(&self) -> bool {
        matches!(self, ChunkError::Aborted)
    }
}

/// Top-level error for a whole-download run (after chunk retries are exhausted,
/// or for the single-stream fallback path).
#[derive(Debug)]
pub enum DownloadError {
    /// Probed or observed size exceeds the global artifact cap.
    SizeLimitExceeded,
    /// A chunk exhausted its retry budget, or the single stream failed.
    Chunk(ChunkError),
    /// The task's cancellation source fired (operator pause/delete, or the
    /// global per-task timeout).
    Aborted,
    /// A re-sanitize/re-validate check failed between task creation and
    /// download start (defense in depth; spec.md §4.6 steps 5-6).
    Invalid,
    /// The resolved destination escaped the packages base directory (spec.md
    /// §3 invariant, §7 "Filesystem safety errors").
    Path(InvalidPathError),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::SizeLimitExceeded => write!(f, "artifact exceeds maximum size"),
            DownloadError::Chunk(e) => write!(f, "{e}"),
            DownloadError::Aborted => write!(f, "aborted"),
            DownloadError::Invalid => write!(f, "invalid task parameters"),
            DownloadError::Path(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownloadError::Chunk(e) => Some(e),
            DownloadError::Path(e) => Some(e),
            _ => None,
        }
    }
}

/// Injection-phase failures (spec.md §4.4 / §7).
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("Could not read manifest or info plist")]
    NoTarget,
    #[error("archive I/O error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive tool failed: {0}")]
    ToolFailed(String),
    #[error("staged path escaped the staging root")]
    UnsafeStagedPath,
}

/// Filesystem-safety errors: a resolved destination escaped its expected root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid path")]
pub struct InvalidPathError;

/// `create`'s size pre-flight (spec.md §6 "Size pre-flight"), run only when
/// `maxDownloadMB > 0`.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    /// Probed size exceeds the configured budget.
    #[error("file size {size_mb} MB exceeds the configured {limit_mb} MB limit")]
    SizeExceeded { size_mb: u64, limit_mb: u64 },
    /// Neither the HEAD `Content-Length` nor a ranged GET's `Content-Range`
    /// revealed a total.
    #[error("Unable to verify file size")]
    UnableToVerifySize,
    /// The HEAD or ranged-GET probe itself failed (network, non-2xx, ...).
    #[error("size pre-flight probe failed: {0}")]
    ProbeFailed(String),
}

/// Top-level error surfaced by [`crate::manager::DownloadManager`]'s public
/// operations, the way the teacher gathers its leaf error types behind one
/// enum at the `scheduler`/CLI boundary rather than returning `anyhow::Error`
/// from library entry points.
#[derive(Debug, thiserror::Error)]
pub enum AdmError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    #[error("task not found")]
    NotFound,
    #[error("task is not in the required state for this operation")]
    InvalidState,
    #[error(transparent)]
    Inject(#[from] InjectError),
    #[error(transparent)]
    Path(#[from] InvalidPathError),
    #[error("{0}")]
    Download(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
