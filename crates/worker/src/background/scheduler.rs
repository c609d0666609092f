//! Periodic task scheduler.
//!
//! Every tick it asks [`PeriodicTaskService::due_tasks`] what should run and
//! hands each due task to its own launch task. A launch may sync the
//! project first, so the tick itself never waits on one.

use std::time::Duration;

use chrono::Utc;
use helmsman_db::repositories::PeriodicTaskRepo;
use helmsman_pipeline::PeriodicTaskService;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Run the scheduler loop until `cancel` is triggered.
///
/// Launches still in flight are awaited before returning.
pub async fn run(service: PeriodicTaskService, tick: Duration, cancel: CancellationToken) {
    tracing::info!(tick_secs = tick.as_secs(), "Scheduler started");

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let launches = TaskTracker::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                let launched = run_due(&service, &launches).await;
                if launched > 0 {
                    tracing::info!(launched, "Scheduler tick");
                } else {
                    tracing::debug!("Scheduler tick: nothing due");
                }
            }
        }
    }

    launches.close();
    launches.wait().await;
}

/// Launch every task due now on `launches`. Returns how many were handed
/// off.
///
/// `last_run` is stamped before launching so a task that fails to start is
/// not retried on every tick.
pub async fn run_due(service: &PeriodicTaskService, launches: &TaskTracker) -> usize {
    let now = Utc::now();
    let due = match service.due_tasks(now).await {
        Ok(due) => due,
        Err(e) => {
            tracing::error!(error = %e, "Scheduler: listing due tasks failed");
            return 0;
        }
    };

    let mut launched = 0;
    for task in due {
        if let Err(e) = PeriodicTaskRepo::set_last_run(service.pool(), task.id, now).await {
            tracing::error!(task_id = task.id, error = %e, "Scheduler: cannot stamp last run");
            continue;
        }
        let service = service.clone();
        launches.spawn(async move {
            match service.run_task(&task).await {
                Ok((history_id, _)) => {
                    tracing::debug!(task_id = task.id, history_id, "Scheduler: task launched");
                }
                Err(e) => {
                    tracing::warn!(task_id = task.id, name = %task.name, error = %e, "Scheduler: task skipped");
                }
            }
        });
        launched += 1;
    }
    launched
}
