//! Retry policy: decides whether a failed dispatch gets another poll.

/// What to do with a job whose publish just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Leave it Pending with the same fire time.
    Retry { attempts: u32 },

    /// Move it to Failed.
    GiveUp { attempts: u32 },
}

/// Retry policy for failed dispatches.
///
/// There is no backoff: a retried job keeps its `fire_at`, so it is simply
/// claimed again by the next poll, one poll interval later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total dispatch attempts allowed before a job is Failed.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decide after a failure.
    ///
    /// # Arguments
    /// * `previous_attempts` - failed attempts recorded on the job before this one.
    pub fn after_failure(&self, previous_attempts: u32) -> RetryDecision {
        let attempts = previous_attempts.saturating_add(1);
        if attempts < self.max_retries {
            RetryDecision::Retry { attempts }
        } else {
            RetryDecision::GiveUp { attempts }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
