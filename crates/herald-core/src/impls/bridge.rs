//! PubSubBridge - user channel ごとの購読レジストリ
//!
//! # 構造
//! - `DashMap<UserId, HashMap<SubscriptionId, Sender>>` で channel ごとに接続を保持
//! - 接続ごとに 1 つの subscription。同じ user の接続が複数あればそれぞれにコピーを配る（fan-out）
//! - publish はシャードの読み取りだけで済み、connect / disconnect と並行に動く
//!
//! # 失敗の扱い
//! - 受信側が閉じた接続は次の publish で取り除く（他の購読者への配送は止めない）
//! - 壊れたペイロードは警告を出して捨てる

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::domain::{NotificationEvent, SubscriptionId, UserId};
use crate::error::HeraldError;
use crate::ports::IdGenerator;

/// 接続が保持する購読の識別子。unsubscribe に渡す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub user_id: UserId,
}

/// 1 接続分の購読。receiver から NotificationEvent を受け取る。
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    receiver: mpsc::UnboundedReceiver<NotificationEvent>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    pub fn user_id(&self) -> UserId {
        self.handle.user_id
    }

    /// 次のイベントを待つ。bridge 側から登録が消えると None。
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        self.receiver.recv().await
    }

    /// 待たずに取り出す。
    pub fn try_recv(&mut self) -> Option<NotificationEvent> {
        self.receiver.try_recv().ok()
    }
}

type Senders = HashMap<SubscriptionId, mpsc::UnboundedSender<NotificationEvent>>;

pub struct PubSubBridge {
    channels: DashMap<UserId, Senders>,
    ids: Arc<dyn IdGenerator>,
}

impl PubSubBridge {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            channels: DashMap::new(),
            ids,
        }
    }

    /// 接続確立時に呼ぶ。`raw_user_id` は接続パラメータの値そのもの。
    ///
    /// 無い・不正な場合は `InvalidSubject`（呼び出し側は接続を閉じる）。
    pub fn subscribe(&self, raw_user_id: Option<&str>) -> Result<Subscription, HeraldError> {
        let user_id = match raw_user_id {
            Some(raw) => UserId::parse(raw),
            None => Err(HeraldError::InvalidSubject("missing user id".to_string())),
        };
        match user_id {
            Ok(user_id) => Ok(self.subscribe_user(user_id)),
            Err(err) => {
                tracing::warn!(raw_user_id = ?raw_user_id, error = %err, "rejecting subscription");
                Err(err)
            }
        }
    }

    /// 検証済みの user id で購読する。
    pub fn subscribe_user(&self, user_id: UserId) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle {
            id: self.ids.generate_subscription_id(),
            user_id,
        };
        self.channels
            .entry(user_id)
            .or_default()
            .insert(handle.id, tx);
        tracing::debug!(user_id = %user_id, subscription_id = %handle.id, "subscribed");
        Subscription { handle, receiver }
    }

    /// 切断時に呼ぶ。何度呼んでもよい。取り除いたら true。
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.remove(handle.user_id, handle.id);
        if removed {
            tracing::debug!(user_id = %handle.user_id, subscription_id = %handle.id, "unsubscribed");
        }
        removed
    }

    fn remove(&self, user_id: UserId, id: SubscriptionId) -> bool {
        let removed = match self.channels.get_mut(&user_id) {
            Some(mut senders) => senders.remove(&id).is_some(),
            None => false,
        };
        // remove_if keeps the emptiness check and the removal under one shard lock.
        self.channels.remove_if(&user_id, |_, senders| senders.is_empty());
        removed
    }

    /// `user_id` の channel を購読している全接続に配る。戻り値は配送できた接続数。
    ///
    /// 購読者ゼロは正常（キューイングしない）。
    pub fn publish(&self, user_id: UserId, event: &NotificationEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        if let Some(senders) = self.channels.get(&user_id) {
            for (id, tx) in senders.iter() {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }
        for id in closed {
            tracing::debug!(user_id = %user_id, subscription_id = %id, "pruning closed subscription");
            self.remove(user_id, id);
        }
        delivered
    }

    /// publish 経路から届いた生のペイロードを配る。壊れていれば警告して捨てる。
    pub fn deliver_raw(&self, payload: &str) -> usize {
        match NotificationEvent::from_payload(payload) {
            Ok(event) => self.publish(event.user_id, &event),
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed notification payload");
                0
            }
        }
    }

    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.channels
            .get(&user_id)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.channels.iter().map(|entry| entry.value().len()).sum()
    }
}
