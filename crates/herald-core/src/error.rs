use thiserror::Error;

use crate::domain::{TaskId, UserId};

/// ErrorKind は運用上の分類
///
/// - Transient: 一時的な障害（次の poll / 次の scheduling 呼び出しでリトライ）
/// - Permanent: データが存在しない（リトライ無意味）
/// - Rejected: 入力が不正（接続拒否・ペイロード破棄）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Rejected,
}

#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("task not found: task_id={0}")]
    TaskNotFound(TaskId),

    #[error("user not found: user_id={0}")]
    UserNotFound(UserId),

    #[error("job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("task storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("publish failed: {0}")]
    PublishFailure(String),

    #[error("invalid subscription subject: {0}")]
    InvalidSubject(String),

    #[error("malformed notification payload: {0}")]
    MalformedPayload(String),

    #[error("config error: {0}")]
    Config(String),
}

impl HeraldError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HeraldError::TaskNotFound(_) | HeraldError::UserNotFound(_) => ErrorKind::Permanent,
            HeraldError::StoreUnavailable(_)
            | HeraldError::StorageUnavailable(_)
            | HeraldError::PublishFailure(_) => ErrorKind::Transient,
            HeraldError::InvalidSubject(_)
            | HeraldError::MalformedPayload(_)
            | HeraldError::Config(_) => ErrorKind::Rejected,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub type Result<T, E = HeraldError> = std::result::Result<T, E>;
