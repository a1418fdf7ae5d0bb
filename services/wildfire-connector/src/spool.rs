//! Spool-directory sample source
//!
//! Minimal stand-in for a host scan orchestrator: every scan interval, any
//! regular file in the spool directory that has not been seen yet is hashed
//! and queued for analysis. Files stay in place; dedupe is by content hash,
//! so renames do not cause resubmission.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use detonation::Sample;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub fn spawn_scanner(
    spool_dir: PathBuf,
    interval: Duration,
    queue: mpsc::Sender<Sample>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen: HashSet<String> = HashSet::new();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if queue.is_closed() {
                debug!("sample queue closed, scanner exiting");
                break;
            }
            if let Err(e) = scan_once(&spool_dir, &mut seen, &queue).await {
                warn!(error = %e, dir = %spool_dir.display(), "spool scan failed");
            }
        }
    })
}

async fn scan_once(
    dir: &Path,
    seen: &mut HashSet<String>,
    queue: &mpsc::Sender<Sample>,
) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let path = entry.path();
        let content = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to read spool file");
                continue;
            }
        };
        let sha256 = hex_digest(&content);
        if !seen.insert(sha256.clone()) {
            continue;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sample.bin")
            .to_string();
        info!(sha256 = %sha256, file = %file_name, "queueing sample for analysis");
        let sample = Sample {
            sha256,
            file_name,
            content: Bytes::from(content),
        };
        if queue.send(sample).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn hex_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
