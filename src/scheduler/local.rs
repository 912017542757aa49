// src/scheduler/local.rs

//! In-process [`SchedulerAdapter`] backed by Tokio tasks.
//!
//! `submit` parks a unit under its key; `trigger` moves it onto the
//! executor loop's channel. The loop starts one Tokio task per job, with
//! at most `max_workers` running at once, resolves the unit's handler
//! from the [`HandlerRegistry`] and reports the outcome to the listener
//! registered for the unit's group. Completions are delivered from the
//! worker tasks, so a listener sees them concurrently and in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ConfigSection;
use crate::errors::{Result, TierflowError};
use crate::exec::{HandlerContext, HandlerRegistry};
use crate::scheduler::{CompletionListener, JobKey, SchedulerAdapter, SubscriptionId};
use crate::tier::JobUnit;

struct Registration {
    id: SubscriptionId,
    listener: Arc<dyn CompletionListener>,
}

type Listeners = Arc<Mutex<HashMap<String, Registration>>>;

#[derive(Debug, Clone, Copy)]
pub struct LocalSchedulerOptions {
    pub max_workers: usize,
    pub job_timeout: Option<Duration>,
}

impl Default for LocalSchedulerOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            job_timeout: None,
        }
    }
}

impl LocalSchedulerOptions {
    pub fn from_config(section: &ConfigSection) -> Self {
        Self {
            max_workers: section.max_workers.max(1),
            job_timeout: section.job_timeout_secs.map(Duration::from_secs),
        }
    }
}

pub struct LocalScheduler {
    jobs: Mutex<HashMap<JobKey, JobUnit>>,
    listeners: Listeners,
    next_subscription: AtomicU64,
    tx: mpsc::UnboundedSender<JobUnit>,
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("pending", &self.pending_jobs())
            .finish()
    }
}

impl LocalScheduler {
    /// Start the executor loop and return the scheduler feeding it.
    ///
    /// Must be called from within a Tokio runtime. The loop stops once the
    /// scheduler is dropped.
    pub fn spawn(
        registry: HandlerRegistry,
        ctx: HandlerContext,
        options: LocalSchedulerOptions,
    ) -> Arc<Self> {
        let missing = registry.missing();
        if !missing.is_empty() {
            warn!(?missing, "no handler installed for some step types");
        }

        let listeners: Listeners = Arc::new(Mutex::new(HashMap::new()));
        let tx = spawn_executor(
            Arc::new(registry),
            Arc::new(ctx),
            Arc::clone(&listeners),
            options,
        );

        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            listeners,
            next_subscription: AtomicU64::new(1),
            tx,
        })
    }

    /// Submitted units not yet triggered.
    pub fn pending_jobs(&self) -> usize {
        lock(&self.jobs).len()
    }
}

impl SchedulerAdapter for LocalScheduler {
    fn submit(&self, unit: JobUnit) -> Result<JobKey> {
        let key = unit.key();
        debug!(job = %key, tier = unit.tier, "job submitted");
        if lock(&self.jobs).insert(key.clone(), unit).is_some() {
            debug!(job = %key, "replaced pending job with the same key");
        }
        Ok(key)
    }

    fn trigger(&self, handle: &JobKey) -> Result<()> {
        let unit = lock(&self.jobs).remove(handle).ok_or_else(|| {
            TierflowError::SchedulerRegistration(format!("no submitted job '{handle}'"))
        })?;

        self.tx.send(unit).map_err(|_| {
            TierflowError::SchedulerRegistration("executor loop has stopped".to_string())
        })?;
        debug!(job = %handle, "job triggered");
        Ok(())
    }

    fn subscribe(
        &self,
        group: &str,
        listener: Arc<dyn CompletionListener>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).insert(group.to_string(), Registration { id, listener });
        debug!(group = %group, subscription = %id, "completion listener registered");
        Ok(id)
    }

    fn unsubscribe(&self, group: &str, id: SubscriptionId) -> Result<()> {
        let mut listeners = lock(&self.listeners);
        match listeners.get(group) {
            Some(current) if current.id == id => {
                listeners.remove(group);
                debug!(group = %group, subscription = %id, "completion listener removed");
            }
            Some(current) => {
                debug!(
                    group = %group,
                    subscription = %id,
                    current = %current.id,
                    "listener already replaced; keeping the newer one"
                );
            }
            None => {}
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawn the background executor loop; returns the sender `trigger` uses.
fn spawn_executor(
    registry: Arc<HandlerRegistry>,
    ctx: Arc<HandlerContext>,
    listeners: Listeners,
    options: LocalSchedulerOptions,
) -> mpsc::UnboundedSender<JobUnit> {
    let (tx, mut rx) = mpsc::unbounded_channel::<JobUnit>();

    tokio::spawn(async move {
        info!(max_workers = options.max_workers, "executor loop started");
        let permits = Arc::new(Semaphore::new(options.max_workers.max(1)));

        while let Some(unit) = rx.recv().await {
            // Waiting here keeps jobs starting in trigger order.
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };

            let registry = Arc::clone(&registry);
            let ctx = Arc::clone(&ctx);
            let listeners = Arc::clone(&listeners);

            tokio::spawn(async move {
                let success = run_job(&unit, registry, ctx, options.job_timeout).await;
                drop(permit);
                notify(&listeners, &unit, success);
            });
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Run one job to completion; `true` on success.
async fn run_job(
    unit: &JobUnit,
    registry: Arc<HandlerRegistry>,
    ctx: Arc<HandlerContext>,
    timeout: Option<Duration>,
) -> bool {
    let key = unit.key();
    let Some(handler) = registry.get(unit.type_tag) else {
        error!(job = %key, step_type = %unit.type_tag, "no handler for step type");
        return false;
    };

    info!(job = %key, tier = unit.tier, step_type = %unit.type_tag, "job started");

    let owned = unit.clone();
    let job = tokio::spawn(async move { handler.run(&owned, &ctx).await });
    let abort = job.abort_handle();

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, job).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                Ok(Err(anyhow!("timed out after {}s", limit.as_secs())))
            }
        },
        None => job.await,
    };

    let result = joined.unwrap_or_else(|e| Err(anyhow!("job task failed: {e}")));
    match result {
        Ok(()) => {
            info!(job = %key, "job succeeded");
            true
        }
        Err(err) => {
            error!(job = %key, error = %format!("{err:#}"), "job failed");
            false
        }
    }
}

fn notify(listeners: &Listeners, unit: &JobUnit, success: bool) {
    let listener = lock(listeners)
        .get(&unit.group)
        .map(|r| Arc::clone(&r.listener));
    match listener {
        Some(listener) => listener.on_completion(&unit.name, success),
        None => warn!(
            job = %unit.key(),
            success,
            "no completion listener for group; outcome dropped"
        ),
    }
}
