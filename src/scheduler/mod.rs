pub mod tasks;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Six-field cron expression (with seconds), in local time.
    Cron(String),
    /// Fixed interval, written `@every 90s`, `@every 5m`, `@every 1h30m`.
    Every(Duration),
}

impl Trigger {
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();

        if let Some(interval) = expression.strip_prefix("@every") {
            let interval = parse_interval(interval.trim())
                .with_context(|| format!("Invalid interval schedule: {:?}", expression))?;
            return Ok(Trigger::Every(interval));
        }

        if let Some(expr) = cron_keyword(expression) {
            return Ok(Trigger::Cron(expr.to_string()));
        }

        match expression.split_whitespace().count() {
            // Classic five-field cron; fire at second zero.
            5 => Ok(Trigger::Cron(format!("0 {}", expression))),
            6 => Ok(Trigger::Cron(expression.to_string())),
            n => anyhow::bail!(
                "Invalid cron schedule {:?}: expected 5 or 6 fields, got {}",
                expression,
                n
            ),
        }
    }
}

/// Six-field equivalents of the standard cron shorthands.
fn cron_keyword(expression: &str) -> Option<&'static str> {
    let expr = match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 0 1 1 *",
        "@monthly" => "0 0 0 1 * *",
        "@weekly" => "0 0 0 * * 0",
        "@daily" | "@midnight" => "0 0 0 * * *",
        "@hourly" => "0 0 * * * *",
        _ => return None,
    };
    Some(expr)
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Cron(expr) => write!(f, "cron '{}'", expr),
            Trigger::Every(interval) => write!(f, "every {:?}", interval),
        }
    }
}

/// Parse `1h30m`, `45s`, `2m` into a non-zero duration.
fn parse_interval(raw: &str) -> Result<Duration> {
    let mut total = Duration::ZERO;
    let mut digits = String::new();

    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: u64 = digits
            .parse()
            .with_context(|| format!("Missing number before unit '{}'", ch))?;
        digits.clear();
        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            other => anyhow::bail!("Unknown interval unit '{}'", other),
        };
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(Duration::from_secs(secs)))
            .with_context(|| format!("Interval {:?} is too large", raw))?;
    }

    if !digits.is_empty() {
        anyhow::bail!("Interval {:?} has a number without a unit", raw);
    }
    if total.is_zero() {
        anyhow::bail!("Interval must be greater than zero");
    }
    Ok(total)
}

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Build the cron-scheduler job for `trigger`. Cron expressions are evaluated
/// in the host's local time.
fn build_job<F>(trigger: &Trigger, fire: F) -> Result<Job>
where
    F: Fn() -> TaskFuture + Send + Sync + 'static,
{
    let job = match trigger {
        Trigger::Cron(expr) => {
            Job::new_async_tz(expr.as_str(), Local, move |_uuid, _lock| fire())
        }
        Trigger::Every(interval) => {
            Job::new_repeated_async(*interval, move |_uuid, _lock| fire())
        }
    };
    job.with_context(|| format!("Invalid schedule {}", trigger))
}

/// Resets the in-flight flag when a run ends, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Wrapper around tokio-cron-scheduler for background tasks.
///
/// Every run is spawned on a [`TaskTracker`] so that [`Scheduler::shutdown`]
/// can wait for it. A fire that arrives while the previous run of the same
/// job is still going is skipped.
pub struct Scheduler {
    inner: JobScheduler,
    tracker: TaskTracker,
}

impl Scheduler {
    /// Create a new scheduler
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self {
            inner,
            tracker: TaskTracker::new(),
        })
    }

    /// Add a recurring job
    pub async fn add_job<F>(&self, trigger: &Trigger, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let running = Arc::new(AtomicBool::new(false));
        let tracker = self.tracker.clone();
        let job_name = name.to_string();

        let fire = move || -> TaskFuture {
            let name = job_name.clone();
            if running.swap(true, Ordering::SeqCst) {
                warn!("Skipping '{}': previous run still in progress", name);
                return Box::pin(async {});
            }
            let guard = RunningGuard(Arc::clone(&running));
            let fut = task();
            tracker.spawn(async move {
                let _guard = guard;
                info!("Running scheduled task: {}", name);
                fut.await;
            });
            Box::pin(async {})
        };

        let job = build_job(trigger, fire)
            .with_context(|| format!("Failed to create job '{}'", name))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled task '{}' {}", name, trigger);
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    /// Stop firing, then wait for every in-flight run to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        let stopped = self
            .inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler");

        self.tracker.close();
        if !self.tracker.is_empty() {
            info!("Waiting for {} in-flight run(s) to finish", self.tracker.len());
        }
        self.tracker.wait().await;

        info!("Scheduler stopped");
        stopped
    }
}
