use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted scheduling record of one periodic job, stored as a blob named
/// after the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJobState {
    pub name: String,
    /// Minimum time between two runs. Seeded from the caller's schedule when
    /// the record is first written; afterwards the stored value governs.
    pub trigger_interval: Duration,
    pub last_executed: Option<DateTime<Utc>>,
    pub lease: Option<LeaseState>,
}

/// Who currently runs the job, and until when the claim holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseState {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
}

impl LeaseState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.timeout_at <= now
    }
}

/// Why a claim was declined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    NotDue { next_due: DateTime<Utc> },
    Busy { owner: String, timeout_at: DateTime<Utc> },
}

impl ScheduledJobState {
    pub fn new<S: Into<String>>(name: S, trigger_interval: Duration) -> Self {
        Self {
            name: name.into(),
            trigger_interval,
            last_executed: None,
            lease: None,
        }
    }

    /// When the job may run next. `None` if it never ran.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.last_executed
            .map(|last| last + to_chrono(self.trigger_interval))
    }

    /// Claim the job for `owner` at `now`.
    ///
    /// Declines when the trigger interval has not elapsed since the last run,
    /// or when another lease is still live. An expired lease is taken over.
    pub fn try_claim(
        &mut self,
        owner: &str,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<LeaseState, Refusal> {
        if let Some(next_due) = self.next_due() {
            if now < next_due {
                return Err(Refusal::NotDue { next_due });
            }
        }
        if let Some(lease) = &self.lease {
            if !lease.is_expired(now) {
                return Err(Refusal::Busy {
                    owner: lease.owner.clone(),
                    timeout_at: lease.timeout_at,
                });
            }
        }

        let lease = LeaseState {
            owner: owner.to_string(),
            acquired_at: now,
            timeout_at: now + to_chrono(lease_timeout),
        };
        self.last_executed = Some(now);
        self.lease = Some(lease.clone());
        Ok(lease)
    }

    /// Clear the lease if it is still the one described. Returns `false`
    /// when it was already cleared or taken over.
    pub fn release(&mut self, owner: &str, acquired_at: DateTime<Utc>) -> bool {
        match &self.lease {
            Some(lease) if lease.owner == owner && lease.acquired_at == acquired_at => {
                self.lease = None;
                true
            }
            _ => false,
        }
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);
    const TIMEOUT: Duration = Duration::from_secs(600);

    #[test]
    fn fresh_job_is_due_and_claim_stamps_the_run() {
        let now = Utc::now();
        let mut state = ScheduledJobState::new("report", HOUR);

        let lease = state.try_claim("w1", now, TIMEOUT).unwrap();
        assert_eq!(lease.owner, "w1");
        assert_eq!(lease.timeout_at, now + chrono::Duration::seconds(600));
        assert_eq!(state.last_executed, Some(now));
        assert_eq!(state.next_due(), Some(now + chrono::Duration::hours(1)));
    }

    #[test]
    fn claim_is_refused_before_the_interval() {
        let now = Utc::now();
        let mut state = ScheduledJobState::new("report", HOUR);
        state.try_claim("w1", now, TIMEOUT).unwrap();
        assert!(state.release("w1", now));

        let later = now + chrono::Duration::minutes(59);
        assert_eq!(
            state.try_claim("w2", later, TIMEOUT),
            Err(Refusal::NotDue {
                next_due: now + chrono::Duration::hours(1)
            })
        );
        assert!(state.try_claim("w2", now + chrono::Duration::hours(1), TIMEOUT).is_ok());
    }

    #[test]
    fn live_lease_blocks_and_expired_lease_is_taken_over() {
        let now = Utc::now();
        let mut state = ScheduledJobState::new("sync", Duration::ZERO);
        state.try_claim("w1", now, TIMEOUT).unwrap();

        let err = state
            .try_claim("w2", now + chrono::Duration::minutes(5), TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, Refusal::Busy { owner, .. } if owner == "w1"));

        let takeover = now + chrono::Duration::minutes(10);
        let lease = state.try_claim("w2", takeover, TIMEOUT).unwrap();
        assert_eq!(lease.owner, "w2");

        // the old owner's release must not clear the new lease
        assert!(!state.release("w1", now));
        assert!(state.lease.is_some());
        assert!(state.release("w2", takeover));
        assert!(state.lease.is_none());
    }
}
