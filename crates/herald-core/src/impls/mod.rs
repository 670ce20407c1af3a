//! Impls - ports の in-process 実装
//!
//! # 含まれる実装
//! - **PubSubBridge**: user channel ごとの購読レジストリ（Publisher としても使える）
//! - **LocalTransport**: worker → bridge の publish 経路（pump タスク付き）
//! - **InMemoryTaskStorage**: 開発用の TaskStore
//!
//! 永続化された JobStore / 外部ブローカー経由の Publisher は別クレートで実装する想定。

pub mod bridge;
pub mod inmem_storage;
pub mod transport;

pub use self::bridge::{PubSubBridge, Subscription, SubscriptionHandle};
pub use self::inmem_storage::InMemoryTaskStorage;
pub use self::transport::{LocalTransport, run_pump};
