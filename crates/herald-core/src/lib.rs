//! herald-core
//!
//! タスクの期限リマインダーを配送するためのコア部品。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, event）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, TaskStore, JobStore, Publisher）
//! - **queue**: reminder job のレコードと状態遷移、インメモリ JobStore、リトライ方針
//! - **app**: Scheduler / Dispatcher / Reaper / Status / WorkerLoop と AppBuilder
//! - **impls**: PubSubBridge と LocalTransport、開発用の TaskStore
//! - **config**: TOML 設定
//! - **error**: エラー型と分類

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

#[cfg(test)]
mod testing;

pub use self::config::HeraldConfig;
pub use self::error::{ErrorKind, HeraldError, Result};
