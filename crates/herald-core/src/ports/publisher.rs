//! Publisher port - worker から見た配送経路
//!
//! worker は user の channel に publish するだけで、誰が購読しているかは知らない。

use async_trait::async_trait;

use crate::domain::{NotificationEvent, UserId};
use crate::error::HeraldError;

/// Publisher は NotificationEvent を user の channel に流す
///
/// - 購読者ゼロでも成功（キューイングも再送もしない）
/// - 経路自体が使えない場合は `HeraldError::PublishFailure`
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, user_id: UserId, event: &NotificationEvent) -> Result<(), HeraldError>;
}
