//! LocalTransport - worker と bridge の間の publish 経路
//!
//! worker は JSON に直列化したペイロードを channel に流すだけで、
//! 購読者への配送は pump タスクが bridge に渡して行う。
//! pump がいなくなると publish は `PublishFailure` になる（経路断）。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::PubSubBridge;
use crate::domain::{NotificationEvent, UserId};
use crate::error::HeraldError;
use crate::ports::Publisher;

pub struct LocalTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl LocalTransport {
    /// 受信側は `run_pump` に渡す。
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// channel が閉じるまでペイロードを bridge に渡し続ける。
pub async fn run_pump(bridge: Arc<PubSubBridge>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(payload) = rx.recv().await {
        let delivered = bridge.deliver_raw(&payload);
        tracing::debug!(delivered, "payload pumped to bridge");
    }
    tracing::debug!("transport pump stopped");
}

#[async_trait]
impl Publisher for LocalTransport {
    async fn publish(&self, user_id: UserId, event: &NotificationEvent) -> Result<(), HeraldError> {
        if event.user_id != user_id {
            return Err(HeraldError::MalformedPayload(format!(
                "event for user {} addressed to channel {}",
                event.user_id, user_id
            )));
        }
        let payload = event.to_payload()?;
        self.tx
            .send(payload)
            .map_err(|_| HeraldError::PublishFailure("transport closed".to_string()))
    }
}
