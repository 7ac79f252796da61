//! Interval scheduling for workflows.
//!
//! One coordinator ticks at a fixed resolution and fires every workflow
//! whose `nextRun` has passed. Patterns are `<n>m`, `<n>h` or `<n>d`.
//! Launches are fire-and-forget: a tick never waits for a previous run.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::engine::ExecutionLauncher;

/// Tick resolution (in milliseconds).
const TICK_INTERVAL_MS: u64 = 1000;

/// Schedule attached to a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleConfig {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            enabled: true,
            pattern: pattern.into(),
            last_run: None,
            next_run: None,
        }
    }
}

fn pattern_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)(m|h|d)$").expect("valid regex"))
}

/// Parse an interval pattern. Only overflowing amounts are rejected; a
/// zero interval parses and is clamped when scheduled.
pub fn parse_pattern(pattern: &str) -> Option<Duration> {
    let caps = pattern_regex().captures(pattern)?;
    let amount: i64 = caps[1].parse().ok()?;
    match &caps[2] {
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => None,
    }
}

pub fn is_valid_pattern(pattern: &str) -> bool {
    parse_pattern(pattern).is_some()
}

/// Human description of when a schedule fires next.
pub fn format_next_run(next_run: Option<DateTime<Utc>>) -> String {
    format_next_run_at(next_run, Utc::now())
}

/// [`format_next_run`] against an explicit clock.
pub fn format_next_run_at(next_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(next_run) = next_run else {
        return "Not scheduled".to_string();
    };
    let remaining = next_run - now;
    if remaining < Duration::zero() {
        return "Overdue".to_string();
    }

    let plural = |n: i64, unit: &str| {
        format!("in {} {}{}", n, unit, if n == 1 { "" } else { "s" })
    };
    if remaining.num_days() > 0 {
        plural(remaining.num_days(), "day")
    } else if remaining.num_hours() > 0 {
        plural(remaining.num_hours(), "hour")
    } else if remaining.num_minutes() > 0 {
        plural(remaining.num_minutes(), "minute")
    } else {
        "in less than a minute".to_string()
    }
}

#[derive(Debug, Clone)]
struct ScheduleEntry {
    config: ScheduleConfig,
    /// `None` when disabled or the pattern is invalid
    interval: Option<Duration>,
}

type Entries = Arc<RwLock<HashMap<String, ScheduleEntry>>>;

/// Tick-driven coordinator for scheduled workflows.
pub struct Scheduler {
    entries: Entries,
    launcher: Arc<dyn ExecutionLauncher>,
    tick_interval_ms: u64,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(launcher: Arc<dyn ExecutionLauncher>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            launcher,
            tick_interval_ms: TICK_INTERVAL_MS,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Set custom tick resolution.
    pub fn with_tick_interval(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms.max(1);
        self
    }

    /// Install (or replace) a workflow's schedule. Returns the next run
    /// time, or `None` when the schedule is disabled or invalid.
    pub async fn schedule(&self, workflow_id: &str, config: ScheduleConfig) -> Option<DateTime<Utc>> {
        self.schedule_at(workflow_id, config, Utc::now()).await
    }

    /// [`schedule`](Self::schedule) against an explicit clock.
    pub async fn schedule_at(
        &self,
        workflow_id: &str,
        mut config: ScheduleConfig,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let interval = if config.enabled {
            let parsed = parse_pattern(&config.pattern);
            if parsed.is_none() {
                warn!(
                    workflow_id,
                    pattern = %config.pattern,
                    "Invalid schedule pattern; workflow will not run on a schedule"
                );
            }
            parsed.map(|i| i.max(self.min_interval()))
        } else {
            None
        };

        config.next_run = interval.map(|i| now + i);
        let next_run = config.next_run;
        self.entries
            .write()
            .await
            .insert(workflow_id.to_string(), ScheduleEntry { config, interval });

        if let Some(next) = next_run {
            info!(workflow_id, "Scheduled; next run {}", format_next_run_at(Some(next), now));
        }
        next_run
    }

    /// Shortest interval a schedule can run at: one tick.
    fn min_interval(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.tick_interval_ms).unwrap_or(i64::MAX))
    }

    /// Remove a workflow's schedule. No run for it starts after this returns.
    pub async fn unschedule(&self, workflow_id: &str) -> bool {
        let removed = self.entries.write().await.remove(workflow_id).is_some();
        if removed {
            debug!(workflow_id, "Unscheduled");
        }
        removed
    }

    pub async fn get_schedule(&self, workflow_id: &str) -> Option<ScheduleConfig> {
        self.entries
            .read()
            .await
            .get(workflow_id)
            .map(|e| e.config.clone())
    }

    /// Number of workflows with an active timer.
    pub async fn active_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.interval.is_some())
            .count()
    }

    /// Fire everything due at `now`. Returns the launched workflow IDs.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Vec<String> {
        fire_due(&self.entries, &self.launcher, now).await
    }

    /// Start ticking in the background.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            warn!("Scheduler already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let entries = self.entries.clone();
        let launcher = self.launcher.clone();
        let tick_ms = self.tick_interval_ms;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_millis(tick_ms));
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        fire_due(&entries, &launcher, Utc::now()).await;
                    }
                }
            }
        });

        self.handle = Some(handle);
        info!("Scheduler started (tick {}ms)", tick_ms);
    }

    /// Stop ticking. Runs already launched are not cancelled.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Scheduler task failed: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

async fn fire_due(
    entries: &Entries,
    launcher: &Arc<dyn ExecutionLauncher>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut due = Vec::new();
    {
        let mut entries = entries.write().await;
        for (workflow_id, entry) in entries.iter_mut() {
            let (Some(interval), Some(next_run)) = (entry.interval, entry.config.next_run) else {
                continue;
            };
            if next_run > now {
                continue;
            }
            entry.config.last_run = Some(now);
            entry.config.next_run = Some(now + interval);
            due.push(workflow_id.clone());
        }
    }
    due.sort();

    for workflow_id in &due {
        let launcher = launcher.clone();
        let workflow_id = workflow_id.clone();
        tokio::spawn(async move {
            match launcher.launch(&workflow_id, "system", Map::new()).await {
                Ok(execution) => debug!(
                    workflow_id = %workflow_id,
                    execution_id = %execution.id,
                    "Scheduled run finished with status {}", execution.status
                ),
                Err(e) => error!(workflow_id = %workflow_id, "Scheduled run failed: {}", e),
            }
        });
    }
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WorkflowExecution;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLauncher {
        count: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionLauncher for CountingLauncher {
        async fn launch(
            &self,
            workflow_id: &str,
            triggered_by: &str,
            context: Map<String, Value>,
        ) -> Result<WorkflowExecution> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(WorkflowExecution::start(workflow_id, triggered_by, context))
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(parse_pattern("5m"), Some(Duration::minutes(5)));
        assert_eq!(parse_pattern("2h"), Some(Duration::hours(2)));
        assert_eq!(parse_pattern("1d"), Some(Duration::days(1)));
        assert_eq!(parse_pattern("0m"), Some(Duration::zero()));
        assert!(is_valid_pattern("0m"));
        assert!(is_valid_pattern("00h"));
        assert!(is_valid_pattern("15m"));
        for bad in ["", "5", "15", "1x", "m", "5s", " 5m", "5m ", "-5m", "1.5h", "5M"] {
            assert!(parse_pattern(bad).is_none(), "{:?} should be invalid", bad);
            assert!(!is_valid_pattern(bad));
        }
        assert!(parse_pattern("99999999999999999999d").is_none());
    }

    #[test]
    fn test_format_next_run() {
        let now = Utc::now();
        assert_eq!(format_next_run_at(None, now), "Not scheduled");
        assert_eq!(format_next_run_at(Some(now - Duration::minutes(1)), now), "Overdue");
        assert_eq!(
            format_next_run_at(Some(now + Duration::seconds(90)), now),
            "in 1 minute"
        );
        assert_eq!(
            format_next_run_at(Some(now + Duration::minutes(5) + Duration::seconds(1)), now),
            "in 5 minutes"
        );
        assert_eq!(format_next_run_at(Some(now + Duration::hours(3)), now), "in 3 hours");
        assert_eq!(format_next_run_at(Some(now + Duration::days(2)), now), "in 2 days");
        assert_eq!(
            format_next_run_at(Some(now + Duration::seconds(20)), now),
            "in less than a minute"
        );
    }

    #[tokio::test]
    async fn test_tick_fires_when_due_and_reschedules() {
        let launcher = Arc::new(CountingLauncher::default());
        let scheduler = Scheduler::new(launcher.clone());
        let t0 = Utc::now();

        let next = scheduler.schedule_at("wf-1", ScheduleConfig::new("5m"), t0).await;
        assert_eq!(next, Some(t0 + Duration::minutes(5)));

        assert!(scheduler.tick_at(t0 + Duration::minutes(4)).await.is_empty());

        let fired_at = t0 + Duration::minutes(5);
        assert_eq!(scheduler.tick_at(fired_at).await, vec!["wf-1".to_string()]);
        settle().await;
        assert_eq!(launcher.count.load(Ordering::SeqCst), 1);

        let config = scheduler.get_schedule("wf-1").await.unwrap();
        assert_eq!(config.last_run, Some(fired_at));
        assert_eq!(config.next_run, Some(fired_at + Duration::minutes(5)));
    }

    #[tokio::test]
    async fn test_unschedule_prevents_runs() {
        let launcher = Arc::new(CountingLauncher::default());
        let scheduler = Scheduler::new(launcher.clone());
        let t0 = Utc::now();

        scheduler.schedule_at("wf-1", ScheduleConfig::new("5m"), t0).await;
        assert!(scheduler.unschedule("wf-1").await);

        assert!(scheduler.tick_at(t0 + Duration::minutes(6)).await.is_empty());
        assert!(scheduler.tick_at(t0 + Duration::hours(1)).await.is_empty());
        settle().await;
        assert_eq!(launcher.count.load(Ordering::SeqCst), 0);
        assert!(scheduler.get_schedule("wf-1").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_or_invalid_schedules_never_fire() {
        let launcher = Arc::new(CountingLauncher::default());
        let scheduler = Scheduler::new(launcher.clone());
        let t0 = Utc::now();

        let mut disabled = ScheduleConfig::new("1m");
        disabled.enabled = false;
        assert!(scheduler.schedule_at("wf-off", disabled, t0).await.is_none());
        assert!(scheduler
            .schedule_at("wf-bad", ScheduleConfig::new("every day"), t0)
            .await
            .is_none());

        assert!(scheduler.tick_at(t0 + Duration::days(2)).await.is_empty());
        assert_eq!(scheduler.active_count().await, 0);
        assert!(scheduler.get_schedule("wf-bad").await.is_some());
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped_to_tick() {
        let launcher = Arc::new(CountingLauncher::default());
        let scheduler = Scheduler::new(launcher.clone()).with_tick_interval(250);
        let t0 = Utc::now();

        let next = scheduler.schedule_at("wf-0", ScheduleConfig::new("0m"), t0).await;
        assert_eq!(next, Some(t0 + Duration::milliseconds(250)));
        assert_eq!(scheduler.active_count().await, 1);

        let fired_at = t0 + Duration::milliseconds(250);
        assert_eq!(scheduler.tick_at(fired_at).await.len(), 1);
        let config = scheduler.get_schedule("wf-0").await.unwrap();
        assert_eq!(config.next_run, Some(fired_at + Duration::milliseconds(250)));
    }

    #[tokio::test]
    async fn test_reschedule_replaces_previous_timer() {
        let launcher = Arc::new(CountingLauncher::default());
        let scheduler = Scheduler::new(launcher.clone());
        let t0 = Utc::now();

        scheduler.schedule_at("wf-1", ScheduleConfig::new("5m"), t0).await;
        scheduler.schedule_at("wf-1", ScheduleConfig::new("1h"), t0).await;

        assert!(scheduler.tick_at(t0 + Duration::minutes(10)).await.is_empty());
        assert_eq!(scheduler.tick_at(t0 + Duration::hours(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_background_loop_starts_and_stops() {
        let launcher = Arc::new(CountingLauncher::default());
        let mut scheduler = Scheduler::new(launcher.clone()).with_tick_interval(5);
        let past = Utc::now() - Duration::minutes(10);
        scheduler.schedule_at("wf-1", ScheduleConfig::new("5m"), past).await;

        scheduler.start();
        assert!(scheduler.is_running());
        for _ in 0..50 {
            if launcher.count.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        scheduler.stop().await;

        assert_eq!(launcher.count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }
}
