//! Periodic harvests using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (cron, default every 6 hours)
//!     │
//!     └─► Harvester::run(HarvestJob { target: "all", overrides })
//!             └─► per-country crawl → filter → sink
//! ```

use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;

use super::config::LimitOverrides;
use super::orchestrator::{HarvestJob, Harvester};
use crate::error::ConfigError;
use crate::traits::{fetcher::PageFetcher, store::CandidateSink, store::DedupStore};

/// Target of scheduled runs.
pub const SCHEDULED_TARGET: &str = "all";

fn scheduler_error(e: JobSchedulerError) -> ConfigError {
    ConfigError::Scheduler(e.to_string())
}

/// Build the job that harvests every configured country on `cron`.
pub fn harvest_job<F, D, S>(
    harvester: Arc<Harvester<F, D, S>>,
    cron: &str,
    overrides: LimitOverrides,
    cancel: CancellationToken,
) -> Result<Job, ConfigError>
where
    F: PageFetcher + 'static,
    D: DedupStore + 'static,
    S: CandidateSink + 'static,
{
    let job = HarvestJob::new(SCHEDULED_TARGET).with_overrides(overrides);

    Job::new_async(cron, move |_uuid, _lock| {
        let harvester = harvester.clone();
        let job = job.clone();
        let cancel = cancel.clone();
        Box::pin(async move {
            if cancel.is_cancelled() {
                return;
            }
            tracing::info!(target_name = %job.target, "Running scheduled harvest");
            match harvester.run(&job, cancel).await {
                Ok(report) => tracing::info!(
                    total = report.total,
                    degraded = report.degraded,
                    "Scheduled harvest finished"
                ),
                Err(e) => tracing::error!(error = %e, "Scheduled harvest failed"),
            }
        })
    })
    .map_err(|e| {
        tracing::error!(cron, error = %e, "Invalid cron expression");
        scheduler_error(e)
    })
}

/// Start the scheduler with the periodic harvest job.
pub async fn start_scheduler<F, D, S>(
    harvester: Arc<Harvester<F, D, S>>,
    cron: &str,
    overrides: LimitOverrides,
    cancel: CancellationToken,
) -> Result<JobScheduler, ConfigError>
where
    F: PageFetcher + 'static,
    D: DedupStore + 'static,
    S: CandidateSink + 'static,
{
    let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
    scheduler
        .add(harvest_job(harvester, cron, overrides, cancel)?)
        .await
        .map_err(scheduler_error)?;
    scheduler.start().await.map_err(scheduler_error)?;

    tracing::info!(cron, "Scheduled harvests started");
    Ok(scheduler)
}
