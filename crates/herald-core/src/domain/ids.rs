//! Domain identifiers (strongly-typed IDs).
//!
//! 2 種類の ID がある:
//! - **ULID ベース**: herald 自身が発行する ID（`JobId`, `SubscriptionId`）。
//!   Phantom type パターンで共通実装を持ちつつ、型としては混同できない。
//! - **ストレージ由来の整数 ID**: `TaskId`, `UserId`。外部ストレージが採番し、
//!   wire 上も integer として現れる。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

use crate::error::HeraldError;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"job-", "sub-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しません。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// ReminderJob のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

/// Subscription のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subscription {}

impl IdMarker for Subscription {
    fn prefix() -> &'static str {
        "sub-"
    }
}

/// Identifier of a ReminderJob (assigned by the job store on insert).
pub type JobId = Id<Job>;

/// Identifier of one live connection's subscription.
pub type SubscriptionId = Id<Subscription>;

// ========================================
// ストレージ由来の ID
// ========================================

/// Identifier of a Task row in the external storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a User row in the external storage. Also the pub/sub channel key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// 接続時に渡される生の user id を解釈する
    ///
    /// 空・数値以外・0 以下は `InvalidSubject`。
    pub fn parse(raw: &str) -> Result<Self, HeraldError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(HeraldError::InvalidSubject("empty user id".to_string()));
        }
        let value: i64 = trimmed
            .parse()
            .map_err(|_| HeraldError::InvalidSubject(format!("not an integer: {trimmed:?}")))?;
        if value <= 0 {
            return Err(HeraldError::InvalidSubject(format!(
                "user id must be positive: {value}"
            )));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
