//! Queue module: reminder job state, retry policy, and the in-memory job store.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::InMemoryJobStore;
pub use record::ReminderJob;
pub use retry::{RetryDecision, RetryPolicy};
pub use state::JobStatus;
