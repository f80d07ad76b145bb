//! Fault injection for the in-memory backends.
//!
//! Lets tests reproduce throttling, timeouts and "being deleted" races
//! deterministically: queued faults are returned, in order, by the next calls
//! to the matching operation instead of executing it.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{RemoteError, RemoteErrorKind, RemoteResult};

#[derive(Debug)]
struct Fault {
    operation: Option<String>,
    kind: RemoteErrorKind,
}

#[derive(Debug, Default)]
pub struct FaultInjector {
    pending: Mutex<VecDeque<Fault>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of any operation with `kind`.
    pub fn inject(&self, kind: RemoteErrorKind, times: usize) {
        let mut pending = self.pending.lock();
        for _ in 0..times {
            pending.push_back(Fault {
                operation: None,
                kind,
            });
        }
    }

    /// Fail the next `times` calls of `operation` with `kind`.
    pub fn inject_for(&self, operation: &str, kind: RemoteErrorKind, times: usize) {
        let mut pending = self.pending.lock();
        for _ in 0..times {
            pending.push_back(Fault {
                operation: Some(operation.to_string()),
                kind,
            });
        }
    }

    /// Called by a backend at the start of `operation`.
    pub fn check(&self, operation: &str) -> RemoteResult<()> {
        let mut pending = self.pending.lock();
        let position = pending
            .iter()
            .position(|fault| fault.operation.as_deref().map_or(true, |op| op == operation));
        match position.and_then(|index| pending.remove(index)) {
            Some(fault) => Err(RemoteError::new(
                fault.kind,
                format!("injected fault on {}", operation),
            )),
            None => Ok(()),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_fire_once_per_call() {
        let faults = FaultInjector::new();
        faults.inject(RemoteErrorKind::ServerBusy, 2);

        assert!(faults.check("put").is_err());
        assert!(faults.check("get").is_err());
        assert!(faults.check("put").is_ok());
    }

    #[test]
    fn targeted_faults_skip_other_operations() {
        let faults = FaultInjector::new();
        faults.inject_for("create", RemoteErrorKind::BeingDeleted, 1);

        assert!(faults.check("put").is_ok());
        let err = faults.check("create").unwrap_err();
        assert!(err.is_being_deleted());
        assert_eq!(faults.pending(), 0);
    }
}
