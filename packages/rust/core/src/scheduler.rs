//! Weekly, timezone-aware job scheduling.
//!
//! The scheduler is only a timer: each registered job runs in its own tokio
//! task that sleeps until the next occurrence and then fires the job.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use enquete_shared::{EnqueteError, Result, ScheduleConfig};

use crate::pipeline::Pipeline;

/// Longest local-time gap a DST transition can open.
const MAX_GAP_MINUTES: i64 = 180;

// ---------------------------------------------------------------------------
// WeeklySchedule
// ---------------------------------------------------------------------------

/// One weekly occurrence: `weekday` at `hour:minute` local time in `timezone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
}

impl WeeklySchedule {
    pub fn new(weekday: Weekday, hour: u32, minute: u32, timezone: Tz) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(EnqueteError::config(format!(
                "invalid schedule time {hour:02}:{minute:02}"
            )));
        }
        Ok(Self {
            weekday,
            hour,
            minute,
            timezone,
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(
            config.weekday()?,
            config.hour,
            config.minute,
            config.timezone()?,
        )
    }

    /// First occurrence strictly after `after`.
    ///
    /// A local time skipped by a DST jump fires at the first valid minute
    /// after the gap; a local time that occurs twice fires on the earlier one.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let today = after.with_timezone(&self.timezone).date_naive();

        (0..=14)
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter(|date| date.weekday() == self.weekday)
            .filter_map(|date| date.and_hms_opt(self.hour, self.minute, 0))
            .filter_map(|local| self.resolve(local))
            .find(|instant| *instant > after)
            .unwrap_or_else(|| after + Duration::weeks(1))
    }

    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        (0..=MAX_GAP_MINUTES).find_map(|shift| {
            let candidate = local + Duration::minutes(shift);
            self.timezone
                .from_local_datetime(&candidate)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
        })
    }
}

impl std::fmt::Display for WeeklySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "every {} at {:02}:{:02} ({})",
            self.weekday,
            self.hour,
            self.minute,
            self.timezone.name()
        )
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Work fired by the scheduler. Implementations log their own failures.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn fire(&self);
}

#[async_trait]
impl ScheduledJob for Pipeline {
    async fn fire(&self) {
        match self.run().await {
            Ok(summary) => info!(
                record_id = summary.record_id,
                question = summary.question_title.as_str(),
                "scheduled run complete"
            ),
            Err(EnqueteError::Busy { job }) => {
                info!(job = job.as_str(), "scheduled run: already running, skipping")
            }
            Err(e) => error!(error = %e, "scheduled run failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns one background task per registered job id.
#[derive(Default)]
pub struct Scheduler {
    jobs: HashMap<String, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start firing `job` on `schedule`. An existing job with the same id is
    /// stopped and replaced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(
        &mut self,
        job_id: impl Into<String>,
        schedule: WeeklySchedule,
        job: Arc<dyn ScheduledJob>,
    ) {
        let job_id = job_id.into();
        let task_id = job_id.clone();

        let handle = tokio::spawn(async move {
            let mut last = Utc::now();
            loop {
                let now = Utc::now();
                // Timers can wake before the wall clock reaches `next`; never
                // fire the same occurrence twice.
                let next = schedule.next_after(now.max(last));
                let wait = (next - now).to_std().unwrap_or_default();
                info!(
                    job = task_id.as_str(),
                    next = %next.with_timezone(&schedule.timezone),
                    "next run scheduled"
                );

                tokio::time::sleep(wait).await;
                last = next;
                info!(job = task_id.as_str(), "firing scheduled job");
                job.fire().await;
            }
        });

        if let Some(previous) = self.jobs.insert(job_id.clone(), handle) {
            previous.abort();
            warn!(job = job_id.as_str(), "replaced existing job");
        } else {
            info!(job = job_id.as_str(), %schedule, "job registered");
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Stop every job.
    pub fn shutdown(&mut self) {
        for (job_id, handle) in self.jobs.drain() {
            handle.abort();
            info!(job = job_id.as_str(), "job stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in self.jobs.values() {
            handle.abort();
        }
    }
}
