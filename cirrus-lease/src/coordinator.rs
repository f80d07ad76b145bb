use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cirrus_blob::{BlobAdapter, UpdateOutcome};
use cirrus_core::{Clock, DataSerializer, JsonSerializer, SystemClock};
use tracing::{debug, info, instrument, warn};

use crate::state::{Refusal, ScheduledJobState};
use crate::{LeaseConfig, LeaseError, LeaseResult};

/// How often a job should run and how long one run may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
    pub trigger_interval: Duration,
    pub execution_timeout: Duration,
}

impl JobSchedule {
    pub fn new(trigger_interval: Duration, execution_timeout: Duration) -> Self {
        Self {
            trigger_interval,
            execution_timeout,
        }
    }
}

/// Proof of a successful acquisition, handed back to [`LeaseCoordinator::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseGrant {
    pub job: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
}

/// Outcome of [`LeaseCoordinator::try_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// This worker owns the job until the grant times out.
    Acquired(LeaseGrant),
    /// The trigger interval has not elapsed since the last run.
    NotDue { next_due: DateTime<Utc> },
    /// Another worker holds a live lease.
    Busy { owner: String, timeout_at: DateTime<Utc> },
    /// Another worker wrote the record between our read and our write.
    Conflict,
}

impl Acquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

/// Lets many workers share periodic jobs without running one twice.
///
/// Each job has a [`ScheduledJobState`] blob. Acquiring and releasing are
/// single-shot atomic updates of that blob, so of several workers racing
/// on the same record exactly one write lands. A worker that dies while
/// holding a lease blocks the job until the lease times out, which is the
/// execution timeout plus a safety margin.
pub struct LeaseCoordinator<S: DataSerializer = JsonSerializer> {
    blobs: BlobAdapter<S>,
    owner: String,
    clock: Arc<dyn Clock>,
    config: LeaseConfig,
}

impl<S: DataSerializer> LeaseCoordinator<S> {
    /// `owner` must be stable for the worker and unique across the fleet.
    pub fn new<O: Into<String>>(blobs: BlobAdapter<S>, owner: O) -> Self {
        Self {
            blobs,
            owner: owner.into(),
            clock: Arc::new(SystemClock),
            config: LeaseConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: LeaseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn lease_timeout(&self, schedule: &JobSchedule) -> Duration {
        schedule.execution_timeout + self.config.safety_margin
    }

    /// Try to claim `job` for this worker. Never retries on its own: a lost
    /// race comes back as [`Acquisition::Conflict`] and the caller tries
    /// again on its next scheduling round.
    #[instrument(skip(self, schedule), fields(owner = %self.owner))]
    pub async fn try_acquire(&self, job: &str, schedule: &JobSchedule) -> LeaseResult<Acquisition> {
        validate_job(job)?;
        let now = self.clock.now();
        let lease_timeout = self.lease_timeout(schedule);
        let owner = self.owner.as_str();

        let mut refusal = None;
        let mut previous_owner = None;
        let outcome = self
            .blobs
            .atomic_update::<ScheduledJobState, _>(&self.config.container, job, |current| {
                let mut state =
                    current.unwrap_or_else(|| ScheduledJobState::new(job, schedule.trigger_interval));
                previous_owner = state.lease.as_ref().map(|lease| lease.owner.clone());
                match state.try_claim(owner, now, lease_timeout) {
                    Ok(_) => Some(state),
                    Err(why) => {
                        refusal = Some(why);
                        None
                    }
                }
            })
            .await?;

        match outcome {
            UpdateOutcome::Applied { value, .. } => match value.lease {
                Some(lease) => {
                    if let Some(previous) = previous_owner {
                        warn!(
                            "Took over expired lease on job {} from {}",
                            job, previous
                        );
                    }
                    info!("Acquired lease on job {} until {}", job, lease.timeout_at);
                    Ok(Acquisition::Acquired(LeaseGrant {
                        job: job.to_string(),
                        owner: lease.owner,
                        acquired_at: lease.acquired_at,
                        timeout_at: lease.timeout_at,
                    }))
                }
                None => Ok(Acquisition::Conflict),
            },
            UpdateOutcome::Aborted => match refusal {
                Some(Refusal::NotDue { next_due }) => Ok(Acquisition::NotDue { next_due }),
                Some(Refusal::Busy { owner, timeout_at }) => {
                    debug!("Job {} is busy, held by {}", job, owner);
                    Ok(Acquisition::Busy { owner, timeout_at })
                }
                None => Ok(Acquisition::Conflict),
            },
            UpdateOutcome::Conflict => {
                debug!("Lost the acquisition race on job {}", job);
                Ok(Acquisition::Conflict)
            }
        }
    }

    /// Clear the lease if this grant still holds it.
    ///
    /// Returns `false` when the lease was cleared by an operator or taken
    /// over after a timeout; neither is an error. Lost write races are
    /// retried with a fresh read.
    #[instrument(skip(self, grant), fields(job = %grant.job, owner = %grant.owner))]
    pub async fn release(&self, grant: &LeaseGrant) -> LeaseResult<bool> {
        for _ in 0..self.config.release_attempts.max(1) {
            let outcome = self
                .blobs
                .atomic_update::<ScheduledJobState, _>(&self.config.container, &grant.job, |current| {
                    let mut state = current?;
                    if state.release(&grant.owner, grant.acquired_at) {
                        Some(state)
                    } else {
                        None
                    }
                })
                .await?;

            match outcome {
                UpdateOutcome::Applied { .. } => {
                    info!("Released lease on job {}", grant.job);
                    return Ok(true);
                }
                UpdateOutcome::Aborted => {
                    warn!(
                        "Lease on job {} was no longer held by {} at release",
                        grant.job, grant.owner
                    );
                    return Ok(false);
                }
                UpdateOutcome::Conflict => continue,
            }
        }
        warn!("Gave up releasing lease on job {}, it will time out", grant.job);
        Ok(false)
    }

    /// Run `work` if the job is due and free, releasing the lease afterwards
    /// whatever `work` returns. `None` means the job did not run.
    ///
    /// A failed release is logged and left to time out; the result of `work`
    /// is still returned.
    pub async fn run_if_due<F, Fut, T>(
        &self,
        job: &str,
        schedule: &JobSchedule,
        work: F,
    ) -> LeaseResult<Option<T>>
    where
        F: FnOnce(LeaseGrant) -> Fut,
        Fut: Future<Output = T>,
    {
        let grant = match self.try_acquire(job, schedule).await? {
            Acquisition::Acquired(grant) => grant,
            _ => return Ok(None),
        };

        let output = work(grant.clone()).await;

        if let Err(err) = self.release(&grant).await {
            warn!("Failed to release lease on job {}: {}", job, err);
        }
        Ok(Some(output))
    }

    /// Clear any lease on `job`, whoever holds it. Returns `false` if there
    /// was none.
    #[instrument(skip(self))]
    pub async fn force_release(&self, job: &str) -> LeaseResult<bool> {
        validate_job(job)?;
        for _ in 0..self.config.release_attempts.max(1) {
            let outcome = self
                .blobs
                .atomic_update::<ScheduledJobState, _>(&self.config.container, job, |current| {
                    let mut state = current?;
                    state.lease.take()?;
                    Some(state)
                })
                .await?;
            match outcome {
                UpdateOutcome::Applied { .. } => {
                    info!("Force-released lease on job {}", job);
                    return Ok(true);
                }
                UpdateOutcome::Aborted => return Ok(false),
                UpdateOutcome::Conflict => continue,
            }
        }
        Ok(false)
    }

    /// Current scheduling record of `job`, if it was ever written.
    pub async fn state(&self, job: &str) -> LeaseResult<Option<ScheduledJobState>> {
        validate_job(job)?;
        Ok(self
            .blobs
            .get::<ScheduledJobState>(&self.config.container, job)
            .await?
            .map(|versioned| versioned.value))
    }

    /// Change the stored trigger interval of `job`, creating the record if
    /// needed. Returns `false` if another writer got in first.
    #[instrument(skip(self))]
    pub async fn set_trigger_interval(&self, job: &str, interval: Duration) -> LeaseResult<bool> {
        validate_job(job)?;
        let outcome = self
            .blobs
            .atomic_update::<ScheduledJobState, _>(&self.config.container, job, |current| {
                let mut state = current.unwrap_or_else(|| ScheduledJobState::new(job, interval));
                state.trigger_interval = interval;
                Some(state)
            })
            .await?;
        Ok(outcome.is_applied())
    }
}

fn validate_job(job: &str) -> LeaseResult<()> {
    if job.is_empty() || job.starts_with('/') || job.ends_with('/') {
        return Err(LeaseError::InvalidJob(job.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_blob::{BlobConfig, MemoryBlobStore};
    use cirrus_core::{ManualClock, RetryPolicies};
    use tracing_test::traced_test;

    const SCHEDULE: JobSchedule = JobSchedule {
        trigger_interval: Duration::from_secs(60),
        execution_timeout: Duration::from_secs(30),
    };

    fn coordinators(owners: &[&str]) -> (ManualClock, Vec<LeaseCoordinator>) {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryBlobStore::new());
        let list = owners
            .iter()
            .map(|owner| {
                let blobs = BlobAdapter::from_arc(store.clone())
                    .with_config(BlobConfig::new().with_retry(RetryPolicies::immediate()));
                LeaseCoordinator::new(blobs, *owner).with_clock(Arc::new(clock.clone()))
            })
            .collect();
        (clock, list)
    }

    #[tokio::test]
    async fn lease_timeout_adds_the_safety_margin() {
        let (clock, workers) = coordinators(&["w1"]);
        let grant = match workers[0].try_acquire("job", &SCHEDULE).await.unwrap() {
            Acquisition::Acquired(grant) => grant,
            other => panic!("expected acquisition, got {:?}", other),
        };
        assert_eq!(grant.acquired_at, clock.now());
        assert_eq!(grant.timeout_at, clock.now() + chrono::Duration::seconds(150));
    }

    #[tokio::test]
    async fn invalid_job_names_are_rejected() {
        let (_, workers) = coordinators(&["w1"]);
        let err = workers[0].try_acquire("", &SCHEDULE).await.unwrap_err();
        assert!(matches!(err, LeaseError::InvalidJob(_)));
    }

    #[tokio::test]
    #[traced_test]
    async fn expired_lease_is_taken_over_and_logged() {
        let (clock, workers) = coordinators(&["w1", "w2"]);
        let first = workers[0].try_acquire("job", &SCHEDULE).await.unwrap();
        assert!(first.is_acquired());

        // past both the trigger interval and the 150s lease timeout
        clock.advance(chrono::Duration::seconds(151));
        let second = workers[1].try_acquire("job", &SCHEDULE).await.unwrap();
        assert!(second.is_acquired());
        assert!(logs_contain("Took over expired lease on job job from w1"));

        if let Acquisition::Acquired(grant) = first {
            assert!(!workers[0].release(&grant).await.unwrap());
        }
        let state = workers[0].state("job").await.unwrap().unwrap();
        assert_eq!(state.lease.map(|lease| lease.owner), Some("w2".to_string()));
    }

    #[tokio::test]
    async fn stored_interval_can_be_changed() {
        let (clock, workers) = coordinators(&["w1"]);
        let grant = match workers[0].try_acquire("job", &SCHEDULE).await.unwrap() {
            Acquisition::Acquired(grant) => grant,
            other => panic!("expected acquisition, got {:?}", other),
        };
        workers[0].release(&grant).await.unwrap();

        assert!(workers[0]
            .set_trigger_interval("job", Duration::from_secs(3600))
            .await
            .unwrap());
        clock.advance(chrono::Duration::seconds(61));
        let again = workers[0].try_acquire("job", &SCHEDULE).await.unwrap();
        assert!(matches!(again, Acquisition::NotDue { .. }));
    }
}
