//! At most one in-flight run per job id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use enquete_shared::{EnqueteError, Result};

/// Tracks which jobs are currently running.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<Mutex<HashSet<String>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `job` as running, or fail with [`EnqueteError::Busy`] if it
    /// already is. The mark is released when the guard drops.
    pub fn try_acquire(&self, job: &str) -> Result<FlightGuard> {
        let mut running = lock(&self.running);
        if !running.insert(job.to_string()) {
            return Err(EnqueteError::Busy {
                job: job.to_string(),
            });
        }
        Ok(FlightGuard {
            running: Arc::clone(&self.running),
            job: job.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self, job: &str) -> bool {
        lock(&self.running).contains(job)
    }
}

/// Releases its job on drop, including on early return and panic.
#[derive(Debug)]
pub struct FlightGuard {
    running: Arc<Mutex<HashSet<String>>>,
    job: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.job);
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    // A poisoned set is still consistent: inserts and removes are atomic.
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
