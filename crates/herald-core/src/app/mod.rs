//! App - アプリケーション層
//!
//! ports を組み合わせて reminder のライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **Scheduler**: task の変更を受けて reminder job を登録／差し替え／キャンセル
//! - **Dispatcher**: 期限到来 job の claim → publish → 記録
//! - **JobReaper**: stale claim の回収と終端レコードの掃除
//! - **StatusReporter**: 予約状況のスナップショット
//! - **WorkerLoop / WorkerGroup**: 上記を poll_interval ごとに回す
//! - **AppBuilder**: ワイヤリング

pub mod builder;
pub mod dispatcher;
pub mod reaper_loop;
pub mod scheduler;
pub mod status;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder, BuildError, RunningApp};
pub use self::dispatcher::{DispatchOutcome, Dispatcher, PollSummary};
pub use self::reaper_loop::{JobReaper, ReapSummary};
pub use self::scheduler::{Reconciliation, Scheduler};
pub use self::status::{StatusReport, StatusReporter, UpcomingReminder};
pub use self::worker_loop::{TickReport, WorkerGroup, WorkerLoop};
