//! Per-chunk fetch with retry (spec.md §4.3 "Per-chunk fetch").
//!
//! Adapted from `ddm_core::downloader::segment::download_one_segment`'s
//! curl `Easy` transfer and `write_function` byte counting, retargeted from
//! one `pwrite`-at-offset call per chunk to a dedicated part-file per chunk.
//! Retry reuses the teacher's backoff-policy shape degenerated to a fixed
//! delay (`base_delay == max_delay == 2s`), since spec.md wants a flat
//! 2-second wait rather than exponential growth.

use crate::config::{CHUNK_RETRY_ATTEMPTS, CHUNK_RETRY_DELAY};
use crate::downloader::cancel::CancelHandle;
use crate::downloader::plan::ChunkRange;
use crate::downloader::storage::PartWriter;
use crate::error::ChunkError;
use std::cell::Cell;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fetches one chunk into its sibling part-file, retrying up to
/// [`CHUNK_RETRY_ATTEMPTS`] times on transport/HTTP failure with a fixed
/// [`CHUNK_RETRY_DELAY`] between attempts. An abort short-circuits retry
/// immediately (spec.md §4.3: "An aborted signal short-circuits retry").
///
/// Intended to run inside `spawn_blocking`; `counter` is updated live as
/// bytes arrive so a concurrent progress ticker can sum it.
pub fn fetch_chunk_with_retry(
    url: &str,
    range: ChunkRange,
    part_path: &Path,
    counter: Arc<AtomicU64>,
    cancel: &CancelHandle,
) -> Result<(), ChunkError> {
    let mut last_err = None;
    for attempt in 0..CHUNK_RETRY_ATTEMPTS {
        if cancel.is_cancelled() {
            return Err(ChunkError::Aborted);
        }
        counter.store(0, Ordering::SeqCst);
        match fetch_chunk_once(url, range, part_path, &counter, cancel) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < CHUNK_RETRY_ATTEMPTS {
                    std::thread::sleep(CHUNK_RETRY_DELAY);
                }
            }
        }
    }
    Err(last_err.unwrap_or(ChunkError::Http(0)))
}

fn fetch_chunk_once(
    url: &str,
    range: ChunkRange,
    part_path: &Path,
    counter: &Arc<AtomicU64>,
    cancel: &CancelHandle,
) -> Result<(), ChunkError> {
    let mut writer = PartWriter::create(part_path).map_err(ChunkError::Storage)?;
    let expected_len = range.expected_len();
    let max_len = expected_len.saturating_mul(2);

    let aborted = Cell::new(false);
    let exceeded = Cell::new(false);
    let write_err: Cell<Option<std::io::Error>> = Cell::new(None);
    let received = Cell::new(0u64);

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(ChunkError::Transport)?;
    easy.follow_location(true).map_err(ChunkError::Transport)?;
    easy.range(&range.http_range_header())
        .map_err(ChunkError::Transport)?;
    easy.connect_timeout(Duration::from_secs(15))
        .map_err(ChunkError::Transport)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                if cancel.is_cancelled() {
                    aborted.set(true);
                    return Ok(0);
                }
                let total = received.get() + data.len() as u64;
                if total > max_len {
                    exceeded.set(true);
                    return Ok(0);
                }
                match writer.write_all(data) {
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
    if code != 206 && code != 200 {
        return Err(ChunkError::Http(code));
    }

    Ok(())
}
