// 数据库服务模块
// 提供 SQLite 连接、表结构初始化以及事务（工作单元）封装

use log::{debug, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreResult;
use crate::models::QuestionType;

/// 表结构，所有表均为 IF NOT EXISTS，可重复执行
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        password TEXT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        unit_progress INTEGER NOT NULL DEFAULT 0,
        lesson_index INTEGER NOT NULL DEFAULT 0,
        days_logged INTEGER NOT NULL DEFAULT 0,
        is_admin INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS friends (
        follower_id INTEGER NOT NULL REFERENCES users(user_id),
        followed_id INTEGER NOT NULL REFERENCES users(user_id),
        PRIMARY KEY (follower_id, followed_id),
        CHECK (follower_id <> followed_id)
    );

    CREATE TABLE IF NOT EXISTS user_xp (
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        day TEXT NOT NULL,
        xp INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, day)
    );

    CREATE TABLE IF NOT EXISTS signs (
        sign TEXT PRIMARY KEY,
        image_path TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS units (
        unit_id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        lesson_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS lessons (
        lesson_id INTEGER PRIMARY KEY AUTOINCREMENT,
        lesson_type INTEGER NOT NULL CHECK (lesson_type IN (0, 1, 2)),
        title TEXT NOT NULL,
        question_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS lessons_in_unit (
        unit_id INTEGER NOT NULL REFERENCES units(unit_id),
        lesson_id INTEGER NOT NULL REFERENCES lessons(lesson_id),
        lesson_index INTEGER NOT NULL,
        PRIMARY KEY (unit_id, lesson_index)
    );

    CREATE TABLE IF NOT EXISTS camera_questions (
        question_id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        sign TEXT NOT NULL,
        starting_position TEXT NOT NULL,
        num_hands INTEGER NOT NULL,
        motion INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS multiple_choice_questions (
        question_id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        option_1 TEXT NOT NULL,
        option_2 TEXT NOT NULL,
        option_3 TEXT NOT NULL,
        option_4 TEXT NOT NULL,
        answer TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS matching_questions (
        question_id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        pairs TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS fill_in_the_blank_questions (
        question_id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        image_path TEXT NOT NULL,
        answer TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS watch_to_learn_questions (
        question_id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        sign TEXT NOT NULL,
        starting_position TEXT NOT NULL,
        num_hands INTEGER NOT NULL,
        motion INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS camera_questions_in_lesson (
        lesson_id INTEGER NOT NULL REFERENCES lessons(lesson_id),
        question_id INTEGER NOT NULL REFERENCES camera_questions(question_id),
        PRIMARY KEY (lesson_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS multiple_choice_questions_in_lesson (
        lesson_id INTEGER NOT NULL REFERENCES lessons(lesson_id),
        question_id INTEGER NOT NULL REFERENCES multiple_choice_questions(question_id),
        PRIMARY KEY (lesson_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS matching_questions_in_lesson (
        lesson_id INTEGER NOT NULL REFERENCES lessons(lesson_id),
        question_id INTEGER NOT NULL REFERENCES matching_questions(question_id),
        PRIMARY KEY (lesson_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS fill_in_the_blank_questions_in_lesson (
        lesson_id INTEGER NOT NULL REFERENCES lessons(lesson_id),
        question_id INTEGER NOT NULL REFERENCES fill_in_the_blank_questions(question_id),
        PRIMARY KEY (lesson_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS watch_to_learn_questions_in_lesson (
        lesson_id INTEGER NOT NULL REFERENCES lessons(lesson_id),
        question_id INTEGER NOT NULL REFERENCES watch_to_learn_questions(question_id),
        PRIMARY KEY (lesson_id, question_id)
    );

    CREATE INDEX IF NOT EXISTS idx_lessons_in_unit_lesson ON lessons_in_unit(lesson_id);
    CREATE INDEX IF NOT EXISTS idx_friends_followed ON friends(followed_id);
";

/// 各表行数统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub users: i64,
    pub signs: i64,
    pub units: i64,
    pub lessons: i64,
    pub questions: i64,
    pub friends: i64,
}

/// 数据库服务
pub struct DatabaseService {
    pool: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// 打开（或创建）磁盘数据库并初始化表结构
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!("opened {} (journal_mode={})", db_path.display(), mode);

        let service = Self {
            pool: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path),
        };
        service.initialize()?;
        Ok(service)
    }

    /// 内存数据库，测试与一次性工具使用
    pub fn open_in_memory() -> StoreResult<Self> {
        let service = Self {
            pool: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: None,
        };
        service.initialize()?;
        Ok(service)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// 初始化数据库表结构
    pub fn initialize(&self) -> StoreResult<()> {
        let conn = self.lock();
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        info!("schema ready");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // 连接本身没有跨调用的中间状态，中毒后可以继续使用
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 只读操作
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// 工作单元：闭包内的所有写入一起提交，任一步出错则整体回滚。
    /// IMMEDIATE 事务在开始时即取得写锁，检查与写入看到同一快照。
    pub(crate) fn unit_of_work<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // 出错时 tx 被丢弃，rusqlite 默认回滚
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        self.read(|conn| {
            let count = |table: &str| -> StoreResult<i64> {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?)
            };

            let mut questions = 0;
            for question_type in QuestionType::ALL {
                questions += count(question_type.tables().question_table)?;
            }

            Ok(StoreStats {
                users: count("users")?,
                signs: count("signs")?,
                units: count("units")?,
                lessons: count("lessons")?,
                questions,
                friends: count("friends")?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_initialize_is_idempotent() {
        let db = DatabaseService::open_in_memory().unwrap();
        db.initialize().unwrap();
        assert_eq!(db.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_unit_of_work_rolls_back_on_error() {
        let db = DatabaseService::open_in_memory().unwrap();

        let result: StoreResult<()> = db.unit_of_work(|tx| {
            tx.execute(
                "INSERT INTO signs (sign, image_path) VALUES ('A', 'a.png')",
                [],
            )?;
            Err(StoreError::invalid("Signs", "abort"))
        });
        assert!(result.is_err());
        assert_eq!(db.stats().unwrap().signs, 0);
    }

    #[test]
    fn test_open_on_disk_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("signable.db");

        {
            let db = DatabaseService::open(&path).unwrap();
            assert_eq!(db.db_path(), Some(path.as_path()));
            db.unit_of_work(|tx| {
                tx.execute("INSERT INTO signs (sign) VALUES ('B')", [])?;
                Ok(())
            })
            .unwrap();
        }

        let reopened = DatabaseService::open(&path).unwrap();
        assert_eq!(reopened.stats().unwrap().signs, 1);
    }
}
