// 命令模块
// 对外的 API 边界：权限校验、响应 DTO 组装，以及 StoreError -> ApiError 的统一映射

pub mod admin;
pub mod lessons;
pub mod users;

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use admin::{
    add_lesson_to_unit, add_question_to_lesson, add_sign, create_camera_question,
    create_fill_question, create_lesson, create_match_question, create_mc_question, create_unit,
    create_watch_question, delete_lesson, delete_question, delete_sign, delete_unit, get_sign,
    get_questions_by_sign, remove_lesson_from_unit, remove_question_from_lesson, update_sign,
    LessonInUnitDto, QuestionInLessonDto, SignQuestionsResponse, UpdateSignDto,
};
pub use lessons::{
    check_answer, get_lesson, get_lessons, get_questions, get_units, AnswerResponse,
    LessonCollection, LessonResponse, QuestionCollection, QuestionResponse, UnitCollection,
};
pub use users::{
    add_friend, add_user_xp, get_followers, get_permissions, get_user, get_user_xp,
    get_xp_week, register, remove_friend, reset_password, search_users, update_me,
    update_progress, DateResponse, FollowersResponse, PermissionsResponse, ProgressResponse,
    UserResponse, LESSON_XP_AMOUNT,
};

/// 命令返回类型
pub type ApiResult<T> = Result<T, ApiError>;

/// 已通过认证的调用方，由上游身份层提供
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }
}

/// 管理接口的统一前置检查
pub fn require_admin(caller: &Caller) -> ApiResult<()> {
    if caller.is_admin {
        Ok(())
    } else {
        warn!("user {} denied admin operation", caller.user_id);
        Err(StoreError::PermissionDenied.into())
    }
}

/// 集合响应的元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub count: usize,
}

impl Meta {
    pub fn of<T>(items: &[T]) -> Self {
        Self { count: items.len() }
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    NotFound,
    Conflict,
    Unprocessable,
    Forbidden,
    UnrelatedEntities,
    Internal,
}

impl ErrorStatus {
    /// 对应的 HTTP 状态码，关联不存在与实体不存在同为 404
    pub fn http_code(self) -> u16 {
        match self {
            ErrorStatus::NotFound | ErrorStatus::UnrelatedEntities => 404,
            ErrorStatus::Conflict => 409,
            ErrorStatus::Unprocessable => 422,
            ErrorStatus::Forbidden => 403,
            ErrorStatus::Internal => 500,
        }
    }
}

/// 对外错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub status: ErrorStatus,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
}

impl ApiError {
    fn new(status: ErrorStatus, kind: &str, entity: Option<String>, id: Option<String>, message: String) -> Self {
        Self {
            status,
            kind: kind.to_string(),
            entity,
            id,
            message,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status.http_code(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::EntityNotFound { entity, id } => ApiError::new(
                ErrorStatus::NotFound,
                "entity_not_found",
                Some(entity),
                Some(id),
                message,
            ),
            StoreError::UnrelatedEntities { first, first_id, .. } => ApiError::new(
                ErrorStatus::UnrelatedEntities,
                "relation_not_found",
                Some(first),
                Some(first_id),
                message,
            ),
            StoreError::DuplicateEntity { entity, id } => ApiError::new(
                ErrorStatus::Conflict,
                "duplicate_entity",
                Some(entity),
                Some(id),
                message,
            ),
            StoreError::InvalidRequest { entity, .. } => ApiError::new(
                ErrorStatus::Unprocessable,
                "invalid_route_request",
                Some(entity),
                None,
                message,
            ),
            StoreError::PermissionDenied => {
                ApiError::new(ErrorStatus::Forbidden, "forbidden", None, None, message)
            }
            StoreError::Integrity(_) | StoreError::Database(_) | StoreError::Io(_) => {
                error!("{}", message);
                // 不向调用方暴露存储细节
                ApiError::new(
                    ErrorStatus::Internal,
                    "internal",
                    None,
                    None,
                    "internal store error".to_string(),
                )
            }
        }
    }
}
