use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::BlobStore;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Delete `keys` from `store`, making up to `attempts` batch requests.
///
/// The first request carries the full set; later ones carry only the keys
/// that failed. An empty set issues no request at all.
pub async fn reap(store: &dyn BlobStore, keys: &[String], attempts: u32) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }

    let attempts = attempts.max(1);
    let mut pending = keys.to_vec();
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(RETRY_BACKOFF * (attempt - 1)).await;
        }

        match store.delete_many(&pending).await {
            Ok(report) if report.is_complete() => {
                info!("Reaped {} blob(s)", keys.len());
                return Ok(());
            }
            Ok(report) => {
                warn!(
                    "Blob delete attempt {}/{}: {} of {} key(s) failed",
                    attempt,
                    attempts,
                    report.failed.len(),
                    pending.len()
                );
                last_error = report
                    .failed
                    .iter()
                    .map(|(key, reason)| format!("{key}: {reason}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                pending = report.failed_keys();
            }
            Err(e) => {
                warn!("Blob delete attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = e.to_string();
            }
        }
    }

    bail!("{} blob(s) left undeleted: {}", pending.len(), last_error)
}
