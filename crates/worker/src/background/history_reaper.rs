//! Stale history reaper.
//!
//! Entries that stay RUN past the stale limit are forced to OFFLINE, and
//! entries stuck in DELAY are forced to ERROR. A note is appended to the
//! output before the status changes.

use std::time::Duration;

use chrono::Utc;
use helmsman_core::history::HistoryStatus;
use helmsman_db::repositories::HistoryRepo;
use helmsman_db::DbPool;
use tokio_util::sync::CancellationToken;

/// Run the reaper loop until `cancel` is triggered.
pub async fn run(pool: DbPool, stale_after: Duration, every: Duration, cancel: CancellationToken) {
    tracing::info!(
        stale_after_secs = stale_after.as_secs(),
        interval_secs = every.as_secs(),
        "History reaper started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("History reaper stopping");
                break;
            }
            _ = interval.tick() => {
                let reaped = reap(&pool, stale_after).await;
                if reaped > 0 {
                    tracing::info!(reaped, "History reaper: finalized stale entries");
                } else {
                    tracing::debug!("History reaper: nothing stale");
                }
            }
        }
    }
}

/// Finalize every stale entry once. Returns how many were changed.
pub async fn reap(pool: &DbPool, stale_after: Duration) -> usize {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::days(1));
    let mut reaped = 0;
    for (from, to) in [
        (HistoryStatus::Run, HistoryStatus::Offline),
        (HistoryStatus::Delay, HistoryStatus::Error),
    ] {
        let stale = match HistoryRepo::list_stale(pool, from, cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::error!(status = %from, error = %e, "History reaper: listing failed");
                continue;
            }
        };
        for entry in stale {
            let note = format!(
                "Execution marked {to} after {}s without finishing.\n",
                stale_after.as_secs()
            );
            if let Err(e) = HistoryRepo::append_stdout(pool, entry.id, &note).await {
                tracing::debug!(history_id = entry.id, error = %e, "History reaper: note not recorded");
            }
            match HistoryRepo::transition(pool, entry.id, from, to).await {
                Ok(true) => {
                    tracing::warn!(history_id = entry.id, %from, %to, "History reaper: stale entry finalized");
                    reaped += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(history_id = entry.id, error = %e, "History reaper: transition failed");
                }
            }
        }
    }
    reaped
}
