//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（タスク DB, job 永続化, 配送経路）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - タスク／ユーザーの正本は外部ストレージ（TaskStore、読み取り専用）
//! - reminder の正本は JobStore
//! - 配送は Publisher の先で行われ、worker は購読者を知らない

pub mod clock;
pub mod id_generator;
pub mod job_store;
pub mod publisher;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{JobStore, NewReminder};
pub use self::publisher::Publisher;
pub use self::task_store::TaskStore;
