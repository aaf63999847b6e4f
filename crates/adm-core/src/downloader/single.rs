//! Single-stream fallback (spec.md §4.3 "Single-stream fallback").
//!
//! Adapted from `ddm_core::downloader::single::download_single`: one curl
//! transfer straight to the destination file, with the same cap-before- and
//! cap-during-body-consumption guards as the probed chunked path.

use crate::config::MAX_ARTIFACT_SIZE_BYTES;
use crate::downloader::cancel::CancelHandle;
use crate::error::ChunkError;
use std::cell::Cell;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Streams `url` to `dest_path` directly, enforcing [`MAX_ARTIFACT_SIZE_BYTES`]
/// both from a `Content-Length` header (if present) and mid-stream against
/// cumulative bytes received. Intended to run inside `spawn_blocking`.
pub fn download_single(
    url: &str,
    dest_path: &Path,
    counter: Arc<AtomicU64>,
    cancel: &CancelHandle,
) -> Result<(), ChunkError> {
    if cancel.is_cancelled() {
        return Err(ChunkError::Aborted);
    }
    let mut file = std::fs::File::create(dest_path).map_err(ChunkError::Storage)?;

    let aborted = Cell::new(false);
    let exceeded = Cell::new(false);
    let write_err: Cell<Option<std::io::Error>> = Cell::new(None);
    let received = Cell::new(0u64);
    let content_length_exceeded = Cell::new(false);

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(ChunkError::Transport)?;
    easy.follow_location(true).map_err(ChunkError::Transport)?;
    easy.connect_timeout(Duration::from_secs(15))
        .map_err(ChunkError::Transport)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|line| {
                if let Ok(s) = std::str::from_utf8(line) {
                    if let Some((name, value)) = s.trim_end().split_once(':') {
                        if name.trim().eq_ignore_ascii_case("content-length") {
                            if let Ok(n) = value.trim().parse::<u64>() {
                                if n > MAX_ARTIFACT_SIZE_BYTES {
                                    content_length_exceeded.set(true);
                                }
                            }
                        }
                    }
                }
                true
            })
            .map_err(ChunkError::Transport)?;

        transfer
            .write_function(|data| {
                if cancel.is_cancelled() {
                    aborted.set(true);
                    return Ok(0);
                }
                if content_length_exceeded.get() {
                    exceeded.set(true);
                    return Ok(0);
                }
                let total = received.get() + data.len() as u64;
                if total > MAX_ARTIFACT_SIZE_BYTES {
                    exceeded.set(true);
                    return Ok(0);
                }
                match file.write_all(data) {
                    Ok(()) => {
                        received.set(total);
                        counter.store(total, Ordering::SeqCst);
                        Ok(data.len())
                    }
                    Err(e) => {
                        write_err.set(Some(e));
                        Ok(0)
                    }
                }
            })
            .map_err(ChunkError::Transport)?;

        if let Err(e) = transfer.perform() {
            if aborted.get() {
                return Err(ChunkError::Aborted);
            }
            if exceeded.get() {
                return Err(ChunkError::ExceededExpectedSize);
            }
            if let Some(io_err) = write_err.take() {
                return Err(ChunkError::Storage(io_err));
            }
            return Err(ChunkError::Transport(e));
        }
    }

    let code = easy.response_code().map_err(ChunkError::Transport)?;
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let counter = Arc::new(AtomicU64::new(0));
        let cancel = CancelHandle::new();

        let result = download_single("http://127.0.0.1:1/nope", &dest, counter, &cancel);
        assert!(result.is_err());
    }

    #[test]
    fn pre_cancelled_handle_aborts_before_creating_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let counter = Arc::new(AtomicU64::new(0));
        let cancel = CancelHandle::new();
        cancel.cancel();

        let result = download_single("http://127.0.0.1:1/nope", &dest, counter, &cancel);
        assert!(matches!(result, Err(ChunkError::Aborted)));
        assert!(!dest.exists());
    }
}
