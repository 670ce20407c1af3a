//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{JobId, SubscriptionId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は herald が発行する ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（JobStore と bridge から共有される）
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_subscription_id(&self) -> SubscriptionId;
}

/// UlidGenerator は Clock の時刻を timestamp 部に使う ULID 生成器
///
/// FixedClock を渡すと timestamp 部が決定的になる（ランダム部は異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_subscription_id(&self) -> SubscriptionId {
        SubscriptionId::from(self.next_ulid())
    }
}
