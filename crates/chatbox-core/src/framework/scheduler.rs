//! Background scheduler.
//!
//! Jobs are grouped by interval in whole seconds. Each idle period the
//! session calls [`Scheduler::tick`], which runs every job once for each
//! integer second in `(last_tick, now]` divisible by its interval. A busy
//! loop that skipped several idle periods therefore catches up by running a
//! job more than once in one call.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{SchedulerError, SessionError, SessionResult};
use crate::framework::clock::TickClock;
use crate::transport::connection::ConnectionHandle;

/// A periodic background job.
///
/// Jobs that touch durable storage open, use and release it within one
/// call. An `Err` ends the whole session.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Runs the job once.
    async fn run(&self, conn: ConnectionHandle) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Job for F
where
    F: Fn(ConnectionHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, conn: ConnectionHandle) -> anyhow::Result<()> {
        (self)(conn).await
    }
}

/// Shared job.
pub type BoxedJob = Arc<dyn Job>;

/// A job with the name it was registered under.
#[derive(Clone)]
pub struct ScheduledJob {
    name: String,
    job: BoxedJob,
}

impl ScheduledJob {
    /// The registered name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Jobs grouped by interval.
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    groups: BTreeMap<u64, Vec<ScheduledJob>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job to the group for `interval` seconds.
    ///
    /// Interval `0` is reserved and rejected.
    pub fn register<J>(
        &mut self,
        interval: u64,
        name: impl Into<String>,
        job: J,
    ) -> Result<(), SchedulerError>
    where
        J: Job,
    {
        self.register_boxed(interval, name, Arc::new(job))
    }

    /// Appends an already shared job.
    pub fn register_boxed(
        &mut self,
        interval: u64,
        name: impl Into<String>,
        job: BoxedJob,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        if interval == 0 {
            return Err(SchedulerError::ReservedInterval { job: name });
        }
        self.groups
            .entry(interval)
            .or_default()
            .push(ScheduledJob { name, job });
        Ok(())
    }

    /// Registered intervals, ascending.
    pub fn intervals(&self) -> impl Iterator<Item = u64> + '_ {
        self.groups.keys().copied()
    }

    /// Total number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether no job is registered.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Runs every due job for one idle period, then advances the clock.
    ///
    /// Groups are scanned in ascending interval order; within a group, due
    /// seconds ascend and jobs run in registration order. The first failing
    /// job ends the pass with [`SessionError::Job`]. Returns how many job
    /// runs completed.
    pub async fn tick(
        &self,
        clock: &mut TickClock,
        now: f64,
        conn: &ConnectionHandle,
    ) -> SessionResult<usize> {
        clock.observe(now);
        let mut runs = 0;

        for (&interval, jobs) in &self.groups {
            for second in clock.due_seconds(interval) {
                trace!(interval, second, jobs = jobs.len(), "Running due jobs");
                for scheduled in jobs {
                    scheduled
                        .job
                        .run(conn.clone())
                        .await
                        .map_err(|source| SessionError::Job {
                            job: scheduled.name.clone(),
                            interval,
                            source,
                        })?;
                    runs += 1;
                }
            }
        }

        clock.commit();
        if runs > 0 {
            debug!(runs, last_tick = clock.last_tick(), "Scheduler pass finished");
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(count: &Arc<AtomicUsize>) -> impl Job {
        let count = Arc::clone(count);
        move |_conn: ConnectionHandle| {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_catch_up_runs_once_per_qualifying_second() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.register(2, "every-2", counter(&count)).unwrap();
        let (conn, _rx) = ConnectionHandle::channel();
        let mut clock = TickClock::new(100.2);

        let runs = scheduler.tick(&mut clock, 105.7, &conn).await.unwrap();

        assert_eq!(runs, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(clock.last_tick(), 105.7);
    }

    #[tokio::test]
    async fn test_empty_window_runs_nothing() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.register(1, "a", counter(&count)).unwrap();
        scheduler.register(3, "b", counter(&count)).unwrap();
        let (conn, _rx) = ConnectionHandle::channel();
        let mut clock = TickClock::new(100.0);

        let runs = scheduler.tick(&mut clock, 100.0, &conn).await.unwrap();

        assert_eq!(runs, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_consecutive_ticks_never_double_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.register(1, "every-1", counter(&count)).unwrap();
        let (conn, _rx) = ConnectionHandle::channel();
        let mut clock = TickClock::new(10.0);

        for now in [10.5, 11.0, 11.0, 11.9, 13.2] {
            scheduler.tick(&mut clock, now, &conn).await.unwrap();
        }

        // Seconds 11, 12 and 13.
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rewound_clock_runs_nothing() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.register(1, "every-1", counter(&count)).unwrap();
        let (conn, _rx) = ConnectionHandle::channel();
        let mut clock = TickClock::new(50.0);

        scheduler.tick(&mut clock, 40.0, &conn).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(clock.last_tick(), 50.0);

        scheduler.tick(&mut clock, 51.0, &conn).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_group_order_and_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for (interval, name, fail) in [(5, "slow", true), (1, "fast", false)] {
            let log = Arc::clone(&log);
            scheduler
                .register(interval, name, move |_conn: ConnectionHandle| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push(name);
                        if fail {
                            anyhow::bail!("ledger unreachable");
                        }
                        Ok(())
                    }
                })
                .unwrap();
        }
        let (conn, _rx) = ConnectionHandle::channel();
        let mut clock = TickClock::new(9.5);

        let err = scheduler.tick(&mut clock, 10.5, &conn).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Job { ref job, interval: 5, .. } if job == "slow"
        ));
        assert_eq!(*log.lock(), vec!["fast", "slow"]);
    }

    #[test]
    fn test_interval_zero_is_reserved() {
        let mut scheduler = Scheduler::new();
        let err = scheduler
            .register(0, "every-pass", |_conn: ConnectionHandle| async { anyhow::Ok(()) })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ReservedInterval { ref job } if job == "every-pass"));
        assert!(scheduler.is_empty());
    }
}
