// 用户命令
// 注册、资料、经验值、学习进度与关注关系

use chrono::{Local, NaiveDate};
use log::info;
use serde::{Deserialize, Serialize};

use crate::commands::{ApiResult, Caller, Meta};
use crate::models::{NewUser, ProgressUpdate, User, UserUpdate, XpSummary};
use crate::services::DatabaseService;

/// 每完成一节课奖励的经验值
pub const LESSON_XP_AMOUNT: i64 = 10;

/// 最近记录经验值的天数
const XP_WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateResponse {
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowersResponse {
    pub meta: Meta,
    pub followers: Vec<User>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ==================== 用户资料 ====================

/// 注册，password 为上游计算好的哈希
pub fn register(db: &DatabaseService, registration: &NewUser) -> ApiResult<UserResponse> {
    Ok(UserResponse {
        user: db.create_user(registration)?,
    })
}

pub fn get_user(db: &DatabaseService, user_id: i64) -> ApiResult<UserResponse> {
    Ok(UserResponse {
        user: db.get_user(user_id)?,
    })
}

pub fn update_me(db: &DatabaseService, caller: &Caller, update: &UserUpdate) -> ApiResult<UserResponse> {
    Ok(UserResponse {
        user: db.update_user(caller.user_id, update)?,
    })
}

pub fn reset_password(db: &DatabaseService, username: &str, password_hash: &str) -> ApiResult<UserResponse> {
    Ok(UserResponse {
        user: db.reset_password(username, password_hash)?,
    })
}

pub fn get_permissions(db: &DatabaseService, user_id: i64) -> ApiResult<PermissionsResponse> {
    Ok(PermissionsResponse {
        is_admin: db.get_user(user_id)?.is_admin,
    })
}

/// 按用户名前缀查找可添加的好友
pub fn search_users(db: &DatabaseService, user_id: i64, query: &str) -> ApiResult<Vec<User>> {
    db.get_user(user_id)?;
    Ok(db
        .search_users(query)?
        .into_iter()
        .filter(|u| u.user_id != user_id)
        .collect())
}

// ==================== 经验值 ====================

pub fn get_user_xp(db: &DatabaseService, caller: &Caller) -> ApiResult<XpSummary> {
    Ok(db.get_user_xp(caller.user_id, today())?)
}

pub fn add_user_xp(db: &DatabaseService, caller: &Caller, amount: i64) -> ApiResult<XpSummary> {
    Ok(db.add_user_xp(caller.user_id, amount, today())?)
}

pub fn get_xp_week(db: &DatabaseService, caller: &Caller) -> ApiResult<DateResponse> {
    Ok(DateResponse {
        dates: db.get_xp_dates(caller.user_id, XP_WEEK_DAYS)?,
    })
}

/// 完成课程：发放经验值并尝试推进进度，两者同一事务提交
pub fn update_progress(
    db: &DatabaseService,
    caller: &Caller,
    details: ProgressUpdate,
) -> ApiResult<ProgressResponse> {
    let success = db.complete_lesson(caller.user_id, details, LESSON_XP_AMOUNT, today())?;
    info!(
        "user {} completed unit {} lesson {} (advanced: {})",
        caller.user_id, details.unit_progress, details.lesson_index, success
    );
    Ok(ProgressResponse { success })
}

// ==================== 关注关系 ====================

pub fn get_followers(db: &DatabaseService, user_id: i64) -> ApiResult<FollowersResponse> {
    let followers = db.get_followers(user_id)?;
    Ok(FollowersResponse {
        meta: Meta::of(&followers),
        followers,
    })
}

pub fn add_friend(db: &DatabaseService, user_id: i64, new_friend_id: i64) -> ApiResult<UserResponse> {
    Ok(UserResponse {
        user: db.add_friend(user_id, new_friend_id)?,
    })
}

pub fn remove_friend(db: &DatabaseService, user_id: i64, old_friend_id: i64) -> ApiResult<UserResponse> {
    Ok(UserResponse {
        user: db.remove_friend(user_id, old_friend_id)?,
    })
}
