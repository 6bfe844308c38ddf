pub mod dau_census;
pub mod store_flush;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::source::Source;
use crate::store::Store;

/// Timeout for individual worker invocations (10 minutes; the census pages
/// through every channel of every guild).
const WORKER_TIMEOUT: Duration = Duration::from_secs(600);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 所有 worker 的枚举，消除字符串匹配，编译期保证完整性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    DauCensus,
    StoreFlush,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DauCensus => "dau_census",
            Self::StoreFlush => "store_flush",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: String,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    source: Option<Arc<dyn Source>>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
    utc_offset_minutes: i32,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        source: Option<Arc<dyn Source>>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            store,
            source,
            shutdown_rx,
            config: config.clone(),
            utc_offset_minutes,
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::DauCensus,
                cron: self.config.census_cron.clone(),
                // 无平台凭证时普查无数据来源
                enabled: self.source.is_some(),
            },
            JobSpec {
                name: WorkerName::StoreFlush,
                cron: "0 0 * * * *".to_string(),
                enabled: true,
            },
        ]
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot be
    /// created or started.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        let specs = self.planned_jobs();

        for spec in &specs {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::DauCensus => {
                    let Some(source) = self.source.clone() else {
                        continue;
                    };
                    let offset = self.utc_offset_minutes;
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let store = store.clone();
                        let source = source.clone();
                        async move {
                            dau_census::run(&store, source.as_ref(), offset).await;
                        }
                    })
                    .await;
                }
                WorkerName::StoreFlush => {
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let store = store.clone();
                        async move {
                            store_flush::run(&store).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = %spec.cron, "Registered worker");
        }
    }
}

/// Add a job to the scheduler with an overlap guard and timeout wrapper.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            match tokio::time::timeout(WORKER_TIMEOUT, fut).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::error!(
                        worker = name,
                        timeout_secs = WORKER_TIMEOUT.as_secs(),
                        "Worker timed out"
                    );
                }
            }
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}
