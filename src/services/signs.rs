// 手势资源服务

use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::models::{QuestionType, Sign};
use crate::services::database::DatabaseService;

impl DatabaseService {
    pub fn create_sign(&self, new_sign: &Sign) -> StoreResult<Sign> {
        self.unit_of_work(|tx| {
            if find_sign(tx, &new_sign.sign)?.is_some() {
                return Err(StoreError::duplicate("Signs", &new_sign.sign));
            }
            tx.execute(
                "INSERT INTO signs (sign, image_path) VALUES (?, ?)",
                params![new_sign.sign, new_sign.image_path],
            )?;
            info!("created sign {}", new_sign.sign);
            Ok(new_sign.clone())
        })
    }

    pub fn get_sign(&self, sign: &str) -> StoreResult<Sign> {
        self.read(|conn| fetch_sign(conn, sign))
    }

    /// 更新手势图片路径
    pub fn update_sign(&self, sign: &str, image_path: &str) -> StoreResult<Sign> {
        self.unit_of_work(|tx| {
            fetch_sign(tx, sign)?;
            tx.execute(
                "UPDATE signs SET image_path = ? WHERE sign = ?",
                params![image_path, sign],
            )?;
            fetch_sign(tx, sign)
        })
    }

    /// 仍被任何题目引用的手势不能删除
    pub fn delete_sign(&self, sign: &str) -> StoreResult<Sign> {
        self.unit_of_work(|tx| {
            let existing = fetch_sign(tx, sign)?;

            for question_type in QuestionType::ALL {
                let columns = question_type.sign_columns();
                if columns.is_empty() {
                    continue;
                }
                let predicate = columns
                    .iter()
                    .map(|column| format!("{} = ?1", column))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                let referenced: bool = tx.query_row(
                    &format!(
                        "SELECT EXISTS(SELECT 1 FROM {} WHERE {})",
                        question_type.tables().question_table,
                        predicate
                    ),
                    params![sign],
                    |row| row.get(0),
                )?;
                if referenced {
                    warn!("sign {} still used by {} questions", sign, question_type);
                    return Err(StoreError::invalid(
                        "Signs",
                        format!("sign [{}] is still referenced by {} questions", sign, question_type),
                    ));
                }
            }

            tx.execute("DELETE FROM signs WHERE sign = ?", params![sign])?;
            info!("deleted sign {}", sign);
            Ok(existing)
        })
    }
}

fn find_sign(conn: &Connection, sign: &str) -> StoreResult<Option<Sign>> {
    Ok(conn
        .query_row(
            "SELECT sign, image_path FROM signs WHERE sign = ?",
            params![sign],
            |row| {
                Ok(Sign {
                    sign: row.get(0)?,
                    image_path: row.get(1)?,
                })
            },
        )
        .optional()?)
}

fn fetch_sign(conn: &Connection, sign: &str) -> StoreResult<Sign> {
    find_sign(conn, sign)?.ok_or_else(|| StoreError::not_found("Signs", sign))
}

/// 校验列表中的手势均已存在，报告第一个缺失的手势
pub(crate) fn check_signs(conn: &Connection, signs: &[&str]) -> StoreResult<()> {
    for sign in signs {
        fetch_sign(conn, sign)?;
    }
    Ok(())
}
