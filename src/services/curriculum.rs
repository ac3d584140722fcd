// 课程结构服务
// 单元（Unit）与课程（Lesson）的增删查、单元内课程排序、冗余计数重算

use log::{debug, info, warn};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{is_constraint_violation, StoreError, StoreResult};
use crate::models::{Lesson, LessonInUnit, LessonType, QuestionType, Unit};
use crate::services::database::DatabaseService;

impl ToSql for LessonType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for LessonType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        LessonType::from_code(code).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl DatabaseService {
    // ==================== 单元 ====================

    pub fn create_unit(&self, title: &str, description: &str) -> StoreResult<Unit> {
        self.unit_of_work(|tx| {
            tx.execute(
                "INSERT INTO units (title, description, lesson_count) VALUES (?, ?, 0)",
                params![title, description],
            )?;
            let unit_id = tx.last_insert_rowid();
            info!("created unit {} ({})", unit_id, title);
            fetch_unit(tx, unit_id)
        })
    }

    pub fn get_unit(&self, unit_id: i64) -> StoreResult<Unit> {
        self.read(|conn| fetch_unit(conn, unit_id))
    }

    /// 按 unit_id 升序返回闭区间 [lower, upper] 内的单元，upper 为 None 时不设上界
    pub fn list_units(&self, lower: i64, upper: Option<i64>) -> StoreResult<Vec<Unit>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT unit_id, title, description, lesson_count FROM units
                 WHERE unit_id >= ?1 AND (?2 IS NULL OR unit_id <= ?2)
                 ORDER BY unit_id",
            )?;
            let rows = stmt.query_map(params![lower, upper], row_to_unit)?;

            let mut units = Vec::new();
            for row in rows {
                units.push(row?);
            }
            debug!("listed {} units in [{}, {:?}]", units.len(), lower, upper);
            Ok(units)
        })
    }

    /// 删除单元及其课程关联，课程本身保留
    pub fn delete_unit(&self, unit_id: i64) -> StoreResult<Unit> {
        self.unit_of_work(|tx| {
            let unit = fetch_unit(tx, unit_id)?;
            let links = tx.execute(
                "DELETE FROM lessons_in_unit WHERE unit_id = ?",
                params![unit_id],
            )?;
            tx.execute("DELETE FROM units WHERE unit_id = ?", params![unit_id])?;
            info!("deleted unit {} and {} lesson links", unit_id, links);
            Ok(unit)
        })
    }

    // ==================== 课程 ====================

    pub fn create_lesson(&self, title: &str, lesson_type: LessonType) -> StoreResult<Lesson> {
        self.unit_of_work(|tx| {
            tx.execute(
                "INSERT INTO lessons (lesson_type, title, question_count) VALUES (?, ?, 0)",
                params![lesson_type, title],
            )?;
            let lesson_id = tx.last_insert_rowid();
            info!("created lesson {} ({:?})", lesson_id, lesson_type);
            fetch_lesson(tx, lesson_id)
        })
    }

    pub fn get_lesson(&self, lesson_id: i64) -> StoreResult<Lesson> {
        self.read(|conn| fetch_lesson(conn, lesson_id))
    }

    /// 删除课程：先移除所有单元关联与五张题目关联表中的记录，再删除课程本身
    pub fn delete_lesson(&self, lesson_id: i64) -> StoreResult<Lesson> {
        self.unit_of_work(|tx| {
            let lesson = fetch_lesson(tx, lesson_id)?;

            let unit_links = tx.execute(
                "DELETE FROM lessons_in_unit WHERE lesson_id = ?",
                params![lesson_id],
            )?;

            let mut question_links = 0;
            for question_type in QuestionType::ALL {
                question_links += tx.execute(
                    &format!(
                        "DELETE FROM {} WHERE lesson_id = ?",
                        question_type.tables().link_table
                    ),
                    params![lesson_id],
                )?;
            }

            tx.execute("DELETE FROM lessons WHERE lesson_id = ?", params![lesson_id])?;
            info!(
                "deleted lesson {} ({} unit links, {} question links)",
                lesson_id, unit_links, question_links
            );
            Ok(lesson)
        })
    }

    // ==================== 单元内课程 ====================

    pub fn add_lesson_to_unit(
        &self,
        unit_id: i64,
        lesson_id: i64,
        lesson_index: i64,
    ) -> StoreResult<LessonInUnit> {
        self.unit_of_work(|tx| {
            fetch_unit(tx, unit_id)?;
            fetch_lesson(tx, lesson_id)?;

            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM lessons_in_unit WHERE unit_id = ? AND lesson_index = ?)",
                params![unit_id, lesson_index],
                |row| row.get(0),
            )?;
            if taken {
                warn!("unit {} index {} already occupied", unit_id, lesson_index);
                return Err(duplicate_index(unit_id, lesson_index));
            }

            insert_lesson_link(tx, unit_id, lesson_id, lesson_index)?;

            info!("lesson {} -> unit {} @ {}", lesson_id, unit_id, lesson_index);
            Ok(LessonInUnit {
                unit_id,
                lesson_id,
                lesson_index,
            })
        })
    }

    pub fn remove_lesson_from_unit(
        &self,
        unit_id: i64,
        lesson_index: i64,
    ) -> StoreResult<LessonInUnit> {
        self.unit_of_work(|tx| {
            let link = tx
                .query_row(
                    "SELECT unit_id, lesson_id, lesson_index FROM lessons_in_unit
                     WHERE unit_id = ? AND lesson_index = ?",
                    params![unit_id, lesson_index],
                    row_to_lesson_in_unit,
                )
                .optional()?
                .ok_or_else(|| StoreError::unrelated("Unit", unit_id, "Index", lesson_index))?;

            tx.execute(
                "DELETE FROM lessons_in_unit WHERE unit_id = ? AND lesson_index = ?",
                params![unit_id, lesson_index],
            )?;
            info!("removed index {} from unit {}", lesson_index, unit_id);
            Ok(link)
        })
    }

    /// 按 lesson_index 升序返回单元内的课程。
    /// 关联记录指向不存在的课程属于数据完整性错误，不会被跳过。
    pub fn list_lessons_in_unit(&self, unit_id: i64) -> StoreResult<Vec<Lesson>> {
        self.read(|conn| {
            fetch_unit(conn, unit_id)?;

            let links = {
                let mut stmt = conn.prepare(
                    "SELECT unit_id, lesson_id, lesson_index FROM lessons_in_unit
                     WHERE unit_id = ? ORDER BY lesson_index",
                )?;
                let rows = stmt.query_map(params![unit_id], row_to_lesson_in_unit)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut lessons = Vec::with_capacity(links.len());
            for link in links {
                let lesson = find_lesson(conn, link.lesson_id)?.ok_or_else(|| {
                    StoreError::Integrity(format!(
                        "unit {} index {} references missing lesson {}",
                        link.unit_id, link.lesson_index, link.lesson_id
                    ))
                })?;
                lessons.push(lesson);
            }
            Ok(lessons)
        })
    }

    pub fn get_lesson_from_unit(&self, unit_id: i64, lesson_id: i64) -> StoreResult<Lesson> {
        self.list_lessons_in_unit(unit_id)?
            .into_iter()
            .find(|lesson| lesson.lesson_id == lesson_id)
            .ok_or_else(|| StoreError::unrelated("Units", unit_id, "Lessons", lesson_id))
    }

    // ==================== 冗余计数 ====================

    /// 重新统计单元内课程数并写回 units.lesson_count
    pub fn recount_lessons_in_unit(&self, unit_id: i64) -> StoreResult<i64> {
        self.unit_of_work(|tx| {
            fetch_unit(tx, unit_id)?;
            let count = count_lessons_in_unit(tx, unit_id)?;
            tx.execute(
                "UPDATE units SET lesson_count = ? WHERE unit_id = ?",
                params![count, unit_id],
            )?;
            debug!("unit {} lesson_count = {}", unit_id, count);
            Ok(count)
        })
    }

    /// 重新统计课程内题目数（五张关联表之和）并写回 lessons.question_count
    pub fn recount_questions_in_lesson(&self, lesson_id: i64) -> StoreResult<i64> {
        self.unit_of_work(|tx| {
            fetch_lesson(tx, lesson_id)?;

            let mut count = 0;
            for question_type in QuestionType::ALL {
                count += tx.query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {} WHERE lesson_id = ?",
                        question_type.tables().link_table
                    ),
                    params![lesson_id],
                    |row| row.get::<_, i64>(0),
                )?;
            }

            tx.execute(
                "UPDATE lessons SET question_count = ? WHERE lesson_id = ?",
                params![count, lesson_id],
            )?;
            debug!("lesson {} question_count = {}", lesson_id, count);
            Ok(count)
        })
    }
}

// ==================== 辅助方法 ====================

fn duplicate_index(unit_id: i64, lesson_index: i64) -> StoreError {
    StoreError::duplicate(
        "unit_lesson_index",
        format!("u_id: {}, index: {}", unit_id, lesson_index),
    )
}

/// 主键是最终防线：绕过占用检查的并发插入同样报告为重复
fn insert_lesson_link(
    conn: &Connection,
    unit_id: i64,
    lesson_id: i64,
    lesson_index: i64,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO lessons_in_unit (unit_id, lesson_id, lesson_index) VALUES (?, ?, ?)",
        params![unit_id, lesson_id, lesson_index],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            duplicate_index(unit_id, lesson_index)
        } else {
            e.into()
        }
    })?;
    Ok(())
}

pub(crate) fn count_lessons_in_unit(conn: &Connection, unit_id: i64) -> StoreResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM lessons_in_unit WHERE unit_id = ?",
        params![unit_id],
        |row| row.get(0),
    )?)
}

pub(crate) fn fetch_unit(conn: &Connection, unit_id: i64) -> StoreResult<Unit> {
    conn.query_row(
        "SELECT unit_id, title, description, lesson_count FROM units WHERE unit_id = ?",
        params![unit_id],
        row_to_unit,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("Units", unit_id))
}

fn find_lesson(conn: &Connection, lesson_id: i64) -> StoreResult<Option<Lesson>> {
    Ok(conn
        .query_row(
            "SELECT lesson_id, lesson_type, title, question_count FROM lessons WHERE lesson_id = ?",
            params![lesson_id],
            row_to_lesson,
        )
        .optional()?)
}

pub(crate) fn fetch_lesson(conn: &Connection, lesson_id: i64) -> StoreResult<Lesson> {
    find_lesson(conn, lesson_id)?.ok_or_else(|| StoreError::not_found("Lessons", lesson_id))
}

fn row_to_unit(row: &Row) -> Result<Unit, rusqlite::Error> {
    Ok(Unit {
        unit_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        lesson_count: row.get(3)?,
    })
}

fn row_to_lesson(row: &Row) -> Result<Lesson, rusqlite::Error> {
    Ok(Lesson {
        lesson_id: row.get(0)?,
        lesson_type: row.get(1)?,
        title: row.get(2)?,
        question_count: row.get(3)?,
    })
}

fn row_to_lesson_in_unit(row: &Row) -> Result<LessonInUnit, rusqlite::Error> {
    Ok(LessonInUnit {
        unit_id: row.get(0)?,
        lesson_id: row.get(1)?,
        lesson_index: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> DatabaseService {
        DatabaseService::open_in_memory().unwrap()
    }

    #[test]
    fn test_list_lessons_in_unit_orders_by_index() {
        let db = setup();
        let unit = db.create_unit("Alphabet", "A to Z").unwrap();
        let first = db.create_lesson("Letters A-E", LessonType::Teach).unwrap();
        let second = db.create_lesson("Letters F-J", LessonType::Practice).unwrap();
        let quiz = db.create_lesson("Quiz", LessonType::Test).unwrap();

        // 稀疏且乱序插入
        db.add_lesson_to_unit(unit.unit_id, quiz.lesson_id, 10).unwrap();
        db.add_lesson_to_unit(unit.unit_id, first.lesson_id, 0).unwrap();
        db.add_lesson_to_unit(unit.unit_id, second.lesson_id, 4).unwrap();

        let ids: Vec<i64> = db
            .list_lessons_in_unit(unit.unit_id)
            .unwrap()
            .iter()
            .map(|l| l.lesson_id)
            .collect();
        assert_eq!(ids, vec![first.lesson_id, second.lesson_id, quiz.lesson_id]);
    }

    #[test]
    fn test_add_lesson_to_unit_rejects_taken_index() {
        let db = setup();
        let unit = db.create_unit("Numbers", "1-10").unwrap();
        let a = db.create_lesson("One", LessonType::Teach).unwrap();
        let b = db.create_lesson("Two", LessonType::Teach).unwrap();

        db.add_lesson_to_unit(unit.unit_id, a.lesson_id, 1).unwrap();
        let err = db.add_lesson_to_unit(unit.unit_id, b.lesson_id, 1).unwrap_err();
        match err {
            StoreError::DuplicateEntity { entity, id } => {
                assert_eq!(entity, "unit_lesson_index");
                assert_eq!(id, format!("u_id: {}, index: 1", unit.unit_id));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_add_lesson_to_unit_requires_both_entities() {
        let db = setup();
        let unit = db.create_unit("Greetings", "hi").unwrap();

        let err = db.add_lesson_to_unit(unit.unit_id, 99, 0).unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { ref entity, .. } if entity == "Lessons"));

        let lesson = db.create_lesson("Hello", LessonType::Teach).unwrap();
        let err = db.add_lesson_to_unit(42, lesson.lesson_id, 0).unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { ref entity, .. } if entity == "Units"));
    }

    #[test]
    fn test_remove_lesson_from_unit_never_added() {
        let db = setup();
        let unit = db.create_unit("Colors", "red, blue").unwrap();

        let err = db.remove_lesson_from_unit(unit.unit_id, 3).unwrap_err();
        assert!(matches!(err, StoreError::UnrelatedEntities { .. }));
    }

    #[test]
    fn test_remove_lesson_from_unit_deletes_one_link() {
        let db = setup();
        let unit = db.create_unit("Colors", "red, blue").unwrap();
        let lesson = db.create_lesson("Red", LessonType::Teach).unwrap();
        db.add_lesson_to_unit(unit.unit_id, lesson.lesson_id, 0).unwrap();
        db.add_lesson_to_unit(unit.unit_id, lesson.lesson_id, 1).unwrap();

        let removed = db.remove_lesson_from_unit(unit.unit_id, 0).unwrap();
        assert_eq!(removed.lesson_id, lesson.lesson_id);
        assert_eq!(db.list_lessons_in_unit(unit.unit_id).unwrap().len(), 1);
    }

    #[test]
    fn test_get_lesson_from_unit() {
        let db = setup();
        let unit = db.create_unit("Food", "eat").unwrap();
        let inside = db.create_lesson("Apple", LessonType::Teach).unwrap();
        let outside = db.create_lesson("Bread", LessonType::Teach).unwrap();
        db.add_lesson_to_unit(unit.unit_id, inside.lesson_id, 0).unwrap();

        assert_eq!(
            db.get_lesson_from_unit(unit.unit_id, inside.lesson_id).unwrap(),
            inside
        );
        let err = db
            .get_lesson_from_unit(unit.unit_id, outside.lesson_id)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnrelatedEntities { .. }));
    }

    #[test]
    fn test_lesson_count_is_stale_until_recount() {
        let db = setup();
        let unit = db.create_unit("Family", "mom, dad").unwrap();
        let lesson = db.create_lesson("Mom", LessonType::Teach).unwrap();
        db.add_lesson_to_unit(unit.unit_id, lesson.lesson_id, 0).unwrap();

        assert_eq!(db.get_unit(unit.unit_id).unwrap().lesson_count, 0);
        assert_eq!(db.recount_lessons_in_unit(unit.unit_id).unwrap(), 1);
        assert_eq!(db.get_unit(unit.unit_id).unwrap().lesson_count, 1);
    }

    #[test]
    fn test_list_units_range() {
        let db = setup();
        for i in 1..=4 {
            db.create_unit(&format!("Unit {}", i), "").unwrap();
        }

        let all: Vec<i64> = db.list_units(1, None).unwrap().iter().map(|u| u.unit_id).collect();
        assert_eq!(all, vec![1, 2, 3, 4]);

        let middle: Vec<i64> = db
            .list_units(2, Some(3))
            .unwrap()
            .iter()
            .map(|u| u.unit_id)
            .collect();
        assert_eq!(middle, vec![2, 3]);
    }

    #[test]
    fn test_delete_unit_keeps_lessons() {
        let db = setup();
        let unit = db.create_unit("Animals", "cat, dog").unwrap();
        let lesson = db.create_lesson("Cat", LessonType::Teach).unwrap();
        db.add_lesson_to_unit(unit.unit_id, lesson.lesson_id, 0).unwrap();

        db.delete_unit(unit.unit_id).unwrap();
        assert!(matches!(
            db.get_unit(unit.unit_id),
            Err(StoreError::EntityNotFound { .. })
        ));
        assert_eq!(db.get_lesson(lesson.lesson_id).unwrap(), lesson);
        assert!(matches!(
            db.delete_unit(unit.unit_id),
            Err(StoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn test_dangling_link_is_integrity_fault() {
        let db = setup();
        let unit = db.create_unit("Broken", "").unwrap();
        db.read(|conn| {
            conn.pragma_update(None, "foreign_keys", false)?;
            conn.execute(
                "INSERT INTO lessons_in_unit (unit_id, lesson_id, lesson_index) VALUES (?, 77, 0)",
                params![unit.unit_id],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            db.list_lessons_in_unit(unit.unit_id),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_index_taken_by_another_handle_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signable.db");
        let first = DatabaseService::open(&path).unwrap();
        let second = DatabaseService::open(&path).unwrap();

        let unit = first.create_unit("Numbers", "1-10").unwrap();
        let one = first.create_lesson("One", LessonType::Teach).unwrap();
        let two = first.create_lesson("Two", LessonType::Teach).unwrap();

        second.add_lesson_to_unit(unit.unit_id, one.lesson_id, 0).unwrap();

        let err = first
            .unit_of_work(|tx| insert_lesson_link(tx, unit.unit_id, two.lesson_id, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateEntity { ref entity, .. } if entity == "unit_lesson_index"
        ));

        let ids: Vec<i64> = first
            .list_lessons_in_unit(unit.unit_id)
            .unwrap()
            .iter()
            .map(|l| l.lesson_id)
            .collect();
        assert_eq!(ids, vec![one.lesson_id]);
    }
}
