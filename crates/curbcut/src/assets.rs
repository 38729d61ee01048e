//! Relocation of evidence files from ephemeral run locations into the per-test output folder.
//!
//! All operations here are best-effort: a missing source yields an empty reference, never an
//! error. The only retry in the whole system lives here, in the bounded video-readiness poll.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// How many times to poll a video attachment for readiness before giving up.
pub const VIDEO_POLL_ATTEMPTS: u32 = 10;

/// Delay between video readiness polls.
pub const VIDEO_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Write raw bytes under `name` into `dest_dir`, creating the directory if absent.
/// Returns the final file name.
pub async fn relocate_bytes(bytes: &[u8], dest_dir: &Path, name: &str) -> Result<String> {
    fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dest_dir.display()))?;
    let dest = dest_dir.join(name);
    fs::write(&dest, bytes)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(name.to_string())
}

/// Copy `src` into `dest_dir` under `name` (or the source's own file name), creating the
/// directory if absent. Returns the final file name, or an empty string when the source does
/// not exist — callers must treat empty as "no asset", not an error.
pub async fn relocate_file(src: &Path, dest_dir: &Path, name: Option<&str>) -> Result<String> {
    if fs::metadata(src).await.is_err() {
        debug!("asset {} does not exist; skipping", src.display());
        return Ok(String::new());
    }
    let name = match name {
        Some(name) => name.to_string(),
        None => src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "asset".to_string()),
    };
    fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dest_dir.display()))?;
    let dest = dest_dir.join(&name);
    fs::copy(src, &dest)
        .await
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
    Ok(name)
}

/// Relocate the best video among `candidates` into `dest_dir`.
///
/// The producer may still be flushing the recording when the test-end event fires, so each
/// candidate is considered ready only once it exists with non-zero size; readiness is polled
/// up to [`VIDEO_POLL_ATTEMPTS`] times at [`VIDEO_POLL_INTERVAL`]. Among ready candidates the
/// largest by byte size wins (largest = most complete recording). Running out of attempts is
/// logged and yields an empty reference, never an error.
pub async fn relocate_video(candidates: &[PathBuf], dest_dir: &Path) -> Result<String> {
    if candidates.is_empty() {
        return Ok(String::new());
    }
    for attempt in 1..=VIDEO_POLL_ATTEMPTS {
        if let Some((len, path)) = largest_ready(candidates).await {
            debug!(
                "selected video {} ({len} bytes) on attempt {attempt}/{VIDEO_POLL_ATTEMPTS}",
                path.display()
            );
            return relocate_file(path, dest_dir, None).await;
        }
        tokio::time::sleep(VIDEO_POLL_INTERVAL).await;
    }
    warn!(
        "no video candidate became ready after {VIDEO_POLL_ATTEMPTS} attempts; \
         continuing without video"
    );
    Ok(String::new())
}

async fn largest_ready(candidates: &[PathBuf]) -> Option<(u64, &PathBuf)> {
    let mut best: Option<(u64, &PathBuf)> = None;
    for candidate in candidates {
        if let Ok(metadata) = fs::metadata(candidate).await {
            let len = metadata.len();
            if len > 0 && best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, candidate));
            }
        }
    }
    best
}
