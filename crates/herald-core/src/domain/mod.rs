//! Domain model (IDs, task snapshots, notification events).

pub mod event;
pub mod ids;
pub mod task;

pub use self::event::NotificationEvent;
pub use self::ids::{JobId, SubscriptionId, TaskId, UserId};
pub use self::task::{Task, User};
