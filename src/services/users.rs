// 用户服务
// 用户资料、关注关系、学习进度与每日经验值

use chrono::{Local, NaiveDate};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{is_constraint_violation, StoreError, StoreResult};
use crate::models::{NewUser, ProgressUpdate, User, UserUpdate, XpSummary};
use crate::services::curriculum::{count_lessons_in_unit, fetch_unit};
use crate::services::database::DatabaseService;

const USER_COLUMNS: &str = "user_id, username, email, password, first_name, last_name, created_at,
     unit_progress, lesson_index, days_logged, is_admin";

impl DatabaseService {
    // ==================== 用户 ====================

    pub fn create_user(&self, registration: &NewUser) -> StoreResult<User> {
        let created_at = Local::now().date_naive();
        self.unit_of_work(|tx| {
            ensure_unique(tx, "username", &registration.username, None)?;
            ensure_unique(tx, "email", &registration.email, None)?;

            tx.execute(
                "INSERT INTO users (created_at, password, username, email, first_name, last_name)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    created_at,
                    registration.password,
                    registration.username,
                    registration.email,
                    registration.first_name,
                    registration.last_name,
                ],
            )
            .map_err(|e| unique_violation(e, &registration.username))?;

            let user_id = tx.last_insert_rowid();
            info!("registered user {} ({})", user_id, registration.username);
            fetch_user(tx, user_id)
        })
    }

    pub fn get_user(&self, user_id: i64) -> StoreResult<User> {
        self.read(|conn| fetch_user(conn, user_id))
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        self.read(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
                params![username],
                row_to_user,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("User", username))
        })
    }

    /// 更新资料，未提供的字段保持不变
    pub fn update_user(&self, user_id: i64, update: &UserUpdate) -> StoreResult<User> {
        self.unit_of_work(|tx| {
            let mut user = fetch_user(tx, user_id)?;

            if let Some(username) = &update.username {
                ensure_unique(tx, "username", username, Some(user_id))?;
                user.username = username.clone();
            }
            if let Some(email) = &update.email {
                ensure_unique(tx, "email", email, Some(user_id))?;
                user.email = email.clone();
            }
            if let Some(first_name) = &update.first_name {
                user.first_name = first_name.clone();
            }
            if let Some(last_name) = &update.last_name {
                user.last_name = last_name.clone();
            }

            tx.execute(
                "UPDATE users SET username = ?, email = ?, first_name = ?, last_name = ?
                 WHERE user_id = ?",
                params![user.username, user.email, user.first_name, user.last_name, user_id],
            )
            .map_err(|e| unique_violation(e, &user.username))?;

            info!("updated profile of user {}", user_id);
            Ok(user)
        })
    }

    /// 重置密码，password_hash 由上游计算
    pub fn reset_password(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        self.unit_of_work(|tx| {
            let changed = tx.execute(
                "UPDATE users SET password = ? WHERE username = ?",
                params![password_hash, username],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("User", username));
            }
            info!("password reset for {}", username);
            tx.query_row(
                &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
                params![username],
                row_to_user,
            )
            .map_err(StoreError::from)
        })
    }

    /// 按用户名前缀搜索（区分大小写）
    pub fn search_users(&self, prefix: &str) -> StoreResult<Vec<User>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users WHERE substr(username, 1, length(?1)) = ?1 ORDER BY username",
                USER_COLUMNS
            ))?;
            let rows = stmt.query_map(params![prefix], row_to_user)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    // ==================== 关注关系 ====================

    /// new_friend_id 成为 user_id 的关注者
    pub fn add_friend(&self, user_id: i64, new_friend_id: i64) -> StoreResult<User> {
        if user_id == new_friend_id {
            return Err(StoreError::invalid(
                "Friends",
                "You cannot add yourself as a friend",
            ));
        }

        self.unit_of_work(|tx| {
            let user = fetch_user(tx, user_id)?;
            fetch_user(tx, new_friend_id)?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM friends WHERE follower_id = ? AND followed_id = ?)",
                params![new_friend_id, user_id],
                |row| row.get(0),
            )?;
            if exists {
                return Err(duplicate_friend(new_friend_id, user_id));
            }

            tx.execute(
                "INSERT INTO friends (follower_id, followed_id) VALUES (?, ?)",
                params![new_friend_id, user_id],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    duplicate_friend(new_friend_id, user_id)
                } else {
                    e.into()
                }
            })?;

            info!("user {} now follows {}", new_friend_id, user_id);
            Ok(user)
        })
    }

    /// 移除关注关系，返回被移除的用户
    pub fn remove_friend(&self, user_id: i64, old_friend_id: i64) -> StoreResult<User> {
        self.unit_of_work(|tx| {
            let removed = fetch_user(tx, old_friend_id)?;
            let deleted = tx.execute(
                "DELETE FROM friends WHERE follower_id = ? AND followed_id = ?",
                params![old_friend_id, user_id],
            )?;
            if deleted == 0 {
                return Err(StoreError::unrelated(
                    "User",
                    user_id,
                    "Follower",
                    old_friend_id,
                ));
            }
            info!("user {} no longer follows {}", old_friend_id, user_id);
            Ok(removed)
        })
    }

    pub fn get_followers(&self, user_id: i64) -> StoreResult<Vec<User>> {
        self.read(|conn| {
            fetch_user(conn, user_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users WHERE user_id IN
                 (SELECT follower_id FROM friends WHERE followed_id = ?)
                 ORDER BY user_id",
                USER_COLUMNS
            ))?;
            let rows = stmt.query_map(params![user_id], row_to_user)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    // ==================== 学习进度 ====================

    /// 推进用户进度，只允许向前。
    /// 返回 false 表示请求没有推进进度，状态保持不变。
    pub fn update_progress(&self, user_id: i64, details: ProgressUpdate) -> StoreResult<bool> {
        self.unit_of_work(|tx| {
            let user = fetch_user(tx, user_id)?;
            advance_progress(tx, &user, details)
        })
    }

    /// 完成一节课：发放经验值并尝试推进进度，两步在同一事务内，任一步失败都不留下写入
    pub fn complete_lesson(
        &self,
        user_id: i64,
        details: ProgressUpdate,
        xp_amount: i64,
        day: NaiveDate,
    ) -> StoreResult<bool> {
        self.unit_of_work(|tx| {
            award_xp(tx, user_id, xp_amount, day)?;
            let user = fetch_user(tx, user_id)?;
            advance_progress(tx, &user, details)
        })
    }

    // ==================== 经验值 ====================

    /// 累加某天的经验值；当天首次记录时 days_logged 加一
    pub fn add_user_xp(&self, user_id: i64, amount: i64, day: NaiveDate) -> StoreResult<XpSummary> {
        self.unit_of_work(|tx| {
            award_xp(tx, user_id, amount, day)?;
            xp_summary(tx, user_id, day)
        })
    }

    pub fn get_user_xp(&self, user_id: i64, day: NaiveDate) -> StoreResult<XpSummary> {
        self.read(|conn| {
            fetch_user(conn, user_id)?;
            xp_summary(conn, user_id, day)
        })
    }

    /// 最近有经验值变化的日期，按时间倒序
    pub fn get_xp_dates(&self, user_id: i64, limit: i64) -> StoreResult<Vec<NaiveDate>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT day FROM user_xp WHERE user_id = ? ORDER BY day DESC LIMIT ?",
            )?;
            let rows = stmt.query_map(params![user_id, limit], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}

// ==================== 辅助方法 ====================

/// user 为本事务内读到的快照。
/// 写入以快照中的进度为条件，快照过期时不覆盖更新的进度，返回 false。
fn advance_progress(conn: &Connection, user: &User, details: ProgressUpdate) -> StoreResult<bool> {
    let user_id = user.user_id;
    fetch_unit(conn, details.unit_progress)?;

    if details.unit_progress < user.unit_progress {
        warn!(
            "user {} is past unit {} (at {})",
            user_id, details.unit_progress, user.unit_progress
        );
        return Ok(false);
    }

    let lesson_count = count_lessons_in_unit(conn, details.unit_progress)?;
    let (unit_progress, lesson_index) = if details.lesson_index >= lesson_count {
        // 完成整个单元
        (details.unit_progress + 1, 0)
    } else if details.unit_progress > user.unit_progress {
        (details.unit_progress, details.lesson_index)
    } else if details.lesson_index > user.lesson_index {
        (user.unit_progress, details.lesson_index)
    } else {
        debug!(
            "user {} already at lesson {} of unit {}",
            user_id, user.lesson_index, user.unit_progress
        );
        return Ok(false);
    };

    let changed = conn.execute(
        "UPDATE users SET unit_progress = ?, lesson_index = ?
         WHERE user_id = ? AND unit_progress = ? AND lesson_index = ?",
        params![
            unit_progress,
            lesson_index,
            user_id,
            user.unit_progress,
            user.lesson_index
        ],
    )?;

    if changed == 1 {
        info!(
            "user {} progress ({}, {}) -> ({}, {})",
            user_id, user.unit_progress, user.lesson_index, unit_progress, lesson_index
        );
    } else {
        warn!("user {} progress changed concurrently, update skipped", user_id);
    }
    Ok(changed == 1)
}

fn award_xp(conn: &Connection, user_id: i64, amount: i64, day: NaiveDate) -> StoreResult<()> {
    fetch_user(conn, user_id)?;

    let logged: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM user_xp WHERE user_id = ? AND day = ?)",
        params![user_id, day],
        |row| row.get(0),
    )?;
    if !logged {
        conn.execute(
            "UPDATE users SET days_logged = days_logged + 1 WHERE user_id = ?",
            params![user_id],
        )?;
    }

    conn.execute(
        "INSERT INTO user_xp (user_id, day, xp) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, day) DO UPDATE SET xp = xp + excluded.xp",
        params![user_id, day, amount],
    )?;

    debug!("user {} +{} xp on {}", user_id, amount, day);
    Ok(())
}

fn xp_summary(conn: &Connection, user_id: i64, day: NaiveDate) -> StoreResult<XpSummary> {
    let daily_xp: i64 = conn
        .query_row(
            "SELECT xp FROM user_xp WHERE user_id = ? AND day = ?",
            params![user_id, day],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let total_xp: i64 = conn.query_row(
        "SELECT COALESCE(SUM(xp), 0) FROM user_xp WHERE user_id = ?",
        params![user_id],
        |row| row.get(0),
    )?;

    Ok(XpSummary {
        user_id,
        daily_xp,
        total_xp,
    })
}

/// column 仅为 "username" 或 "email"
fn ensure_unique(
    conn: &Connection,
    column: &str,
    value: &str,
    except_user: Option<i64>,
) -> StoreResult<()> {
    let taken: bool = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM users WHERE {} = ?1 AND (?2 IS NULL OR user_id <> ?2))",
            column
        ),
        params![value, except_user],
        |row| row.get(0),
    )?;
    if taken {
        return Err(StoreError::duplicate("Users", value));
    }
    Ok(())
}

fn unique_violation(err: rusqlite::Error, username: &str) -> StoreError {
    if is_constraint_violation(&err) {
        StoreError::duplicate("Users", username)
    } else {
        err.into()
    }
}

fn duplicate_friend(follower_id: i64, followed_id: i64) -> StoreError {
    StoreError::duplicate(
        "Friends",
        format!("follower: {}, followed: {}", follower_id, followed_id),
    )
}

pub(crate) fn fetch_user(conn: &Connection, user_id: i64) -> StoreResult<User> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS),
        params![user_id],
        row_to_user,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("User", user_id))
}

fn row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        created_at: row.get(6)?,
        unit_progress: row.get(7)?,
        lesson_index: row.get(8)?,
        days_logged: row.get(9)?,
        is_admin: row.get(10)?,
    })
}
