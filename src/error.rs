//! 存储层错误类型
//!
//! 所有错误在检测点抛出，原样传播到 API 边界（`commands`），
//! 由边界统一映射为对外的状态类别。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: String, id: String },

    #[error("{first} {first_id} is not related to {second} {second_id}")]
    UnrelatedEntities {
        first: String,
        first_id: String,
        second: String,
        second_id: String,
    },

    #[error("{entity} already exists: {id}")]
    DuplicateEntity { entity: String, id: String },

    #[error("invalid {entity} request: {message}")]
    InvalidRequest { entity: String, message: String },

    #[error("permission denied")]
    PermissionDenied,

    #[error("data integrity fault: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        StoreError::EntityNotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn unrelated(
        first: impl Into<String>,
        first_id: impl ToString,
        second: impl Into<String>,
        second_id: impl ToString,
    ) -> Self {
        StoreError::UnrelatedEntities {
            first: first.into(),
            first_id: first_id.to_string(),
            second: second.into(),
            second_id: second_id.to_string(),
        }
    }

    pub fn duplicate(entity: impl Into<String>, id: impl ToString) -> Self {
        StoreError::DuplicateEntity {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid(entity: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::InvalidRequest {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 判断是否为唯一约束/主键冲突
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
