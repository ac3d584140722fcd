// 题目服务
// 五种题目的创建/查询/删除，以及题目与课程之间的关联

use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{is_constraint_violation, StoreError, StoreResult};
use crate::models::{
    FillInTheBlankQuestion, MatchingQuestion, MultipleChoiceQuestion, NewFillInTheBlankQuestion,
    NewMatchingQuestion, NewMultipleChoiceQuestion, NewSignQuestion, Question, QuestionInLesson,
    QuestionType, SignQuestion,
};
use crate::services::curriculum::fetch_lesson;
use crate::services::database::DatabaseService;
use crate::services::signs::check_signs;

impl DatabaseService {
    // ==================== 题目创建 ====================

    pub fn create_camera_question(&self, details: &NewSignQuestion) -> StoreResult<Question> {
        self.insert_sign_question(QuestionType::Camera, details)
    }

    pub fn create_watch_question(&self, details: &NewSignQuestion) -> StoreResult<Question> {
        self.insert_sign_question(QuestionType::WatchToLearn, details)
    }

    fn insert_sign_question(
        &self,
        question_type: QuestionType,
        details: &NewSignQuestion,
    ) -> StoreResult<Question> {
        self.unit_of_work(|tx| {
            check_signs(tx, &[details.sign.as_str(), details.starting_position.as_str()])?;
            tx.execute(
                &format!(
                    "INSERT INTO {} (text, sign, starting_position, num_hands, motion)
                     VALUES (?, ?, ?, ?, ?)",
                    question_type.tables().question_table
                ),
                params![
                    details.text,
                    details.sign,
                    details.starting_position,
                    details.num_hands,
                    details.motion,
                ],
            )?;
            inserted(tx, question_type)
        })
    }

    pub fn create_multiple_choice_question(
        &self,
        details: &NewMultipleChoiceQuestion,
    ) -> StoreResult<Question> {
        let options: [String; 4] = details.options.clone().try_into().map_err(|o: Vec<String>| {
            StoreError::invalid(
                "Multiple Choice Question",
                format!("expected 4 options, got {}", o.len()),
            )
        })?;

        self.unit_of_work(|tx| {
            let mut signs: Vec<&str> = options.iter().map(String::as_str).collect();
            signs.push(details.answer.as_str());
            check_signs(tx, &signs)?;

            tx.execute(
                "INSERT INTO multiple_choice_questions
                 (text, option_1, option_2, option_3, option_4, answer)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    details.text,
                    options[0],
                    options[1],
                    options[2],
                    options[3],
                    details.answer,
                ],
            )?;
            inserted(tx, QuestionType::MultipleChoice)
        })
    }

    pub fn create_fill_question(&self, details: &NewFillInTheBlankQuestion) -> StoreResult<Question> {
        self.unit_of_work(|tx| {
            check_signs(tx, &[details.answer.as_str()])?;
            tx.execute(
                "INSERT INTO fill_in_the_blank_questions (text, image_path, answer) VALUES (?, ?, ?)",
                params![details.text, details.image_path, details.answer],
            )?;
            inserted(tx, QuestionType::FillInTheBlank)
        })
    }

    /// 连线题的 pairs 不做手势校验
    pub fn create_matching_question(&self, details: &NewMatchingQuestion) -> StoreResult<Question> {
        self.unit_of_work(|tx| {
            tx.execute(
                "INSERT INTO matching_questions (text, pairs) VALUES (?, ?)",
                params![details.text, details.pairs],
            )?;
            inserted(tx, QuestionType::Matching)
        })
    }

    // ==================== 题目查询 ====================

    pub fn get_question(&self, question_type: QuestionType, question_id: i64) -> StoreResult<Question> {
        self.read(|conn| fetch_question(conn, question_type, question_id))
    }

    /// 按答案手势查找题目，连线题没有答案列，不支持
    pub fn get_questions_by_sign(
        &self,
        question_type: QuestionType,
        sign: &str,
    ) -> StoreResult<Vec<Question>> {
        let answer_column = question_type.require_answer_column()?;

        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} WHERE {} = ? ORDER BY question_id",
                question_columns(question_type),
                question_type.tables().question_table,
                answer_column
            ))?;
            let rows = stmt.query_map(params![sign], |row| row_to_question(question_type, row))?;

            let mut questions = Vec::new();
            for row in rows {
                questions.push(row?);
            }
            Ok(questions)
        })
    }

    /// 删除题目：先删除所有课程中的关联，再删除题目本身，同一事务内完成
    pub fn delete_question(&self, question_type: QuestionType, question_id: i64) -> StoreResult<Question> {
        let tables = question_type.tables();
        self.unit_of_work(|tx| {
            let question = fetch_question(tx, question_type, question_id)?;

            let links = tx.execute(
                &format!("DELETE FROM {} WHERE question_id = ?", tables.link_table),
                params![question_id],
            )?;
            tx.execute(
                &format!("DELETE FROM {} WHERE question_id = ?", tables.question_table),
                params![question_id],
            )?;

            info!(
                "deleted {} question {} ({} lesson links)",
                question_type, question_id, links
            );
            Ok(question)
        })
    }

    // ==================== 课程内题目 ====================

    pub fn add_question_to_lesson(
        &self,
        lesson_id: i64,
        question_type: QuestionType,
        question_id: i64,
    ) -> StoreResult<QuestionInLesson> {
        let link_table = question_type.tables().link_table;
        self.unit_of_work(|tx| {
            fetch_lesson(tx, lesson_id)?;
            fetch_question(tx, question_type, question_id)?;

            let linked: bool = tx.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE lesson_id = ? AND question_id = ?)",
                    link_table
                ),
                params![lesson_id, question_id],
                |row| row.get(0),
            )?;
            if linked {
                warn!(
                    "{} question {} already in lesson {}",
                    question_type, question_id, lesson_id
                );
                return Err(duplicate_link(question_type, lesson_id, question_id));
            }

            insert_question_link(tx, lesson_id, question_type, question_id)?;

            info!(
                "{} question {} -> lesson {}",
                question_type, question_id, lesson_id
            );
            Ok(QuestionInLesson {
                lesson_id,
                question_type,
                question_id,
            })
        })
    }

    pub fn remove_question_from_lesson(
        &self,
        lesson_id: i64,
        question_type: QuestionType,
        question_id: i64,
    ) -> StoreResult<QuestionInLesson> {
        let link_table = question_type.tables().link_table;
        self.unit_of_work(|tx| {
            let removed = tx.execute(
                &format!(
                    "DELETE FROM {} WHERE lesson_id = ? AND question_id = ?",
                    link_table
                ),
                params![lesson_id, question_id],
            )?;
            if removed == 0 {
                return Err(StoreError::unrelated(
                    "Lesson",
                    lesson_id,
                    format!("{} Question", question_type),
                    question_id,
                ));
            }

            info!(
                "removed {} question {} from lesson {}",
                question_type, question_id, lesson_id
            );
            Ok(QuestionInLesson {
                lesson_id,
                question_type,
                question_id,
            })
        })
    }

    /// 合并五张关联表中属于该课程的题目。
    /// 顺序固定：按 `QuestionType::ALL` 的类型顺序，同类型内按 question_id 升序。
    pub fn list_questions_in_lesson(&self, lesson_id: i64) -> StoreResult<Vec<Question>> {
        self.read(|conn| {
            fetch_lesson(conn, lesson_id)?;

            let mut questions = Vec::new();
            for question_type in QuestionType::ALL {
                let tables = question_type.tables();
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM {} q
                     JOIN {} l ON l.question_id = q.question_id
                     WHERE l.lesson_id = ?
                     ORDER BY q.question_id",
                    prefixed_columns(question_type),
                    tables.question_table,
                    tables.link_table
                ))?;
                let rows =
                    stmt.query_map(params![lesson_id], |row| row_to_question(question_type, row))?;
                for row in rows {
                    questions.push(row?);
                }
            }

            debug!("lesson {} has {} questions", lesson_id, questions.len());
            Ok(questions)
        })
    }
}

// ==================== 辅助方法 ====================

fn duplicate_link(question_type: QuestionType, lesson_id: i64, question_id: i64) -> StoreError {
    StoreError::duplicate(
        question_type.name(),
        format!("l_id: {}, q_id: {}", lesson_id, question_id),
    )
}

/// 主键是最终防线：绕过存在性检查的并发插入同样报告为重复
fn insert_question_link(
    conn: &Connection,
    lesson_id: i64,
    question_type: QuestionType,
    question_id: i64,
) -> StoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (lesson_id, question_id) VALUES (?, ?)",
            question_type.tables().link_table
        ),
        params![lesson_id, question_id],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            duplicate_link(question_type, lesson_id, question_id)
        } else {
            e.into()
        }
    })?;
    Ok(())
}

fn inserted(conn: &Connection, question_type: QuestionType) -> StoreResult<Question> {
    let question_id = conn.last_insert_rowid();
    info!("created {} question {}", question_type, question_id);
    fetch_question(conn, question_type, question_id)
}

pub(crate) fn fetch_question(
    conn: &Connection,
    question_type: QuestionType,
    question_id: i64,
) -> StoreResult<Question> {
    conn.query_row(
        &format!(
            "SELECT {} FROM {} WHERE question_id = ?",
            question_columns(question_type),
            question_type.tables().question_table
        ),
        params![question_id],
        |row| row_to_question(question_type, row),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(question_type.name(), question_id))
}

fn question_columns(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::Camera | QuestionType::WatchToLearn => {
            "question_id, text, sign, starting_position, num_hands, motion"
        }
        QuestionType::MultipleChoice => {
            "question_id, text, option_1, option_2, option_3, option_4, answer"
        }
        QuestionType::Matching => "question_id, text, pairs",
        QuestionType::FillInTheBlank => "question_id, text, image_path, answer",
    }
}

fn prefixed_columns(question_type: QuestionType) -> String {
    question_columns(question_type)
        .split(", ")
        .map(|column| format!("q.{}", column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_question(question_type: QuestionType, row: &Row) -> Result<Question, rusqlite::Error> {
    let sign_question = |row: &Row| -> Result<SignQuestion, rusqlite::Error> {
        Ok(SignQuestion {
            question_id: row.get(0)?,
            text: row.get(1)?,
            sign: row.get(2)?,
            starting_position: row.get(3)?,
            num_hands: row.get(4)?,
            motion: row.get(5)?,
        })
    };

    Ok(match question_type {
        QuestionType::Camera => Question::Camera(sign_question(row)?),
        QuestionType::WatchToLearn => Question::WatchToLearn(sign_question(row)?),
        QuestionType::MultipleChoice => Question::MultipleChoice(MultipleChoiceQuestion {
            question_id: row.get(0)?,
            text: row.get(1)?,
            options: [row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?],
            answer: row.get(6)?,
        }),
        QuestionType::Matching => Question::Matching(MatchingQuestion {
            question_id: row.get(0)?,
            text: row.get(1)?,
            pairs: row.get(2)?,
        }),
        QuestionType::FillInTheBlank => Question::FillInTheBlank(FillInTheBlankQuestion {
            question_id: row.get(0)?,
            text: row.get(1)?,
            image_path: row.get(2)?,
            answer: row.get(3)?,
        }),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{LessonType, Sign};

    pub(crate) fn seeded() -> DatabaseService {
        let db = DatabaseService::open_in_memory().unwrap();
        for sign in ["A", "B", "C", "D", "HELLO", "FIST"] {
            db.create_sign(&Sign {
                sign: sign.to_string(),
                image_path: format!("/signs/{}.png", sign.to_lowercase()),
            })
            .unwrap();
        }
        db
    }

    pub(crate) fn camera(db: &DatabaseService) -> Question {
        db.create_camera_question(&NewSignQuestion {
            text: "Sign the letter A".into(),
            sign: "A".into(),
            starting_position: "FIST".into(),
            num_hands: 1,
            motion: false,
        })
        .unwrap()
    }

    pub(crate) fn multiple_choice(db: &DatabaseService) -> Question {
        db.create_multiple_choice_question(&NewMultipleChoiceQuestion {
            text: "Which sign is this?".into(),
            options: vec!["A".into(), "B".into(), "C".into(), "HELLO".into()],
            answer: "HELLO".into(),
        })
        .unwrap()
    }

    pub(crate) fn matching(db: &DatabaseService) -> Question {
        db.create_matching_question(&NewMatchingQuestion {
            text: "Match the letters".into(),
            pairs: "A.B.C".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_add_then_list_contains_question_once() {
        let db = seeded();
        let lesson = db.create_lesson("Letters", LessonType::Practice).unwrap();
        let q = multiple_choice(&db);

        db.add_question_to_lesson(lesson.lesson_id, q.question_type(), q.question_id())
            .unwrap();

        let listed = db.list_questions_in_lesson(lesson.lesson_id).unwrap();
        assert_eq!(listed.iter().filter(|x| **x == q).count(), 1);
    }

    #[test]
    fn test_add_question_twice_is_duplicate() {
        let db = seeded();
        let lesson = db.create_lesson("Letters", LessonType::Practice).unwrap();
        let q = camera(&db);

        db.add_question_to_lesson(lesson.lesson_id, QuestionType::Camera, q.question_id())
            .unwrap();
        let err = db
            .add_question_to_lesson(lesson.lesson_id, QuestionType::Camera, q.question_id())
            .unwrap_err();
        match err {
            StoreError::DuplicateEntity { entity, id } => {
                assert_eq!(entity, "CAMERA");
                assert_eq!(
                    id,
                    format!("l_id: {}, q_id: {}", lesson.lesson_id, q.question_id())
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_add_question_to_lesson_reports_missing_entity() {
        let db = seeded();
        let lesson = db.create_lesson("Letters", LessonType::Teach).unwrap();

        let err = db
            .add_question_to_lesson(lesson.lesson_id, QuestionType::Matching, 5)
            .unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { ref entity, .. } if entity == "MATCHING"));

        let q = matching(&db);
        let err = db
            .add_question_to_lesson(999, QuestionType::Matching, q.question_id())
            .unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { ref entity, .. } if entity == "Lessons"));
    }

    #[test]
    fn test_same_id_different_type_is_distinct_link() {
        let db = seeded();
        let lesson = db.create_lesson("Mixed", LessonType::Test).unwrap();
        let c = camera(&db);
        let m = matching(&db);
        assert_eq!(c.question_id(), m.question_id());

        db.add_question_to_lesson(lesson.lesson_id, QuestionType::Camera, c.question_id())
            .unwrap();
        db.add_question_to_lesson(lesson.lesson_id, QuestionType::Matching, m.question_id())
            .unwrap();
        assert_eq!(db.list_questions_in_lesson(lesson.lesson_id).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_question_from_lesson() {
        let db = seeded();
        let lesson = db.create_lesson("Letters", LessonType::Teach).unwrap();
        let q = camera(&db);

        let err = db
            .remove_question_from_lesson(lesson.lesson_id, QuestionType::Camera, q.question_id())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnrelatedEntities { ref second, .. } if second == "CAMERA Question"));

        db.add_question_to_lesson(lesson.lesson_id, QuestionType::Camera, q.question_id())
            .unwrap();
        db.remove_question_from_lesson(lesson.lesson_id, QuestionType::Camera, q.question_id())
            .unwrap();
        assert!(db.list_questions_in_lesson(lesson.lesson_id).unwrap().is_empty());
    }

    #[test]
    fn test_list_questions_order_is_stable() {
        let db = seeded();
        let lesson = db.create_lesson("Mixed", LessonType::Test).unwrap();
        let m = matching(&db);
        let mc = multiple_choice(&db);
        let c = camera(&db);
        for q in [&m, &mc, &c] {
            db.add_question_to_lesson(lesson.lesson_id, q.question_type(), q.question_id())
                .unwrap();
        }

        let first = db.list_questions_in_lesson(lesson.lesson_id).unwrap();
        let second = db.list_questions_in_lesson(lesson.lesson_id).unwrap();
        assert_eq!(first, second);
        let types: Vec<QuestionType> = first.iter().map(Question::question_type).collect();
        assert_eq!(
            types,
            vec![
                QuestionType::Camera,
                QuestionType::MultipleChoice,
                QuestionType::Matching
            ]
        );
    }

    #[test]
    fn test_create_question_rejects_unknown_sign() {
        let db = seeded();
        let err = db
            .create_fill_question(&NewFillInTheBlankQuestion {
                text: "Fill it".into(),
                image_path: "/img/z.png".into(),
                answer: "Z".into(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { ref entity, ref id } if entity == "Signs" && id == "Z"));
        assert_eq!(db.stats().unwrap().questions, 0);
    }

    #[test]
    fn test_multiple_choice_needs_four_options() {
        let db = seeded();
        let err = db
            .create_multiple_choice_question(&NewMultipleChoiceQuestion {
                text: "Pick".into(),
                options: vec!["A".into(), "B".into()],
                answer: "A".into(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest { .. }));
    }

    #[test]
    fn test_delete_question_removes_links() {
        let db = seeded();
        let first = db.create_lesson("One", LessonType::Teach).unwrap();
        let second = db.create_lesson("Two", LessonType::Teach).unwrap();
        let q = camera(&db);
        for lesson in [&first, &second] {
            db.add_question_to_lesson(lesson.lesson_id, QuestionType::Camera, q.question_id())
                .unwrap();
        }

        let deleted = db.delete_question(QuestionType::Camera, q.question_id()).unwrap();
        assert_eq!(deleted, q);
        assert!(db.list_questions_in_lesson(first.lesson_id).unwrap().is_empty());
        assert!(db.list_questions_in_lesson(second.lesson_id).unwrap().is_empty());
        assert!(matches!(
            db.delete_question(QuestionType::Camera, q.question_id()),
            Err(StoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn test_questions_by_sign() {
        let db = seeded();
        let q = multiple_choice(&db);

        let found = db
            .get_questions_by_sign(QuestionType::MultipleChoice, "HELLO")
            .unwrap();
        assert_eq!(found, vec![q]);
        assert!(db
            .get_questions_by_sign(QuestionType::Camera, "HELLO")
            .unwrap()
            .is_empty());
        assert!(matches!(
            db.get_questions_by_sign(QuestionType::Matching, "A"),
            Err(StoreError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_recount_questions_in_lesson() {
        let db = seeded();
        let lesson = db.create_lesson("Mixed", LessonType::Test).unwrap();
        let c = camera(&db);
        let m = matching(&db);
        db.add_question_to_lesson(lesson.lesson_id, QuestionType::Camera, c.question_id())
            .unwrap();
        db.add_question_to_lesson(lesson.lesson_id, QuestionType::Matching, m.question_id())
            .unwrap();

        assert_eq!(db.get_lesson(lesson.lesson_id).unwrap().question_count, 0);
        assert_eq!(db.recount_questions_in_lesson(lesson.lesson_id).unwrap(), 2);
        assert_eq!(db.get_lesson(lesson.lesson_id).unwrap().question_count, 2);
    }

    #[test]
    fn test_delete_lesson_cascades_links() {
        let db = seeded();
        let unit_a = db.create_unit("A", "").unwrap();
        let unit_b = db.create_unit("B", "").unwrap();
        let keep = db.create_lesson("Keep", LessonType::Teach).unwrap();
        let doomed = db.create_lesson("Doomed", LessonType::Test).unwrap();

        db.add_lesson_to_unit(unit_a.unit_id, keep.lesson_id, 0).unwrap();
        db.add_lesson_to_unit(unit_a.unit_id, doomed.lesson_id, 1).unwrap();
        db.add_lesson_to_unit(unit_b.unit_id, doomed.lesson_id, 0).unwrap();

        let questions = [camera(&db), multiple_choice(&db), matching(&db)];
        for q in &questions {
            db.add_question_to_lesson(doomed.lesson_id, q.question_type(), q.question_id())
                .unwrap();
        }

        db.delete_lesson(doomed.lesson_id).unwrap();

        let in_a: Vec<i64> = db
            .list_lessons_in_unit(unit_a.unit_id)
            .unwrap()
            .iter()
            .map(|l| l.lesson_id)
            .collect();
        assert_eq!(in_a, vec![keep.lesson_id]);
        assert!(db.list_lessons_in_unit(unit_b.unit_id).unwrap().is_empty());
        assert!(matches!(
            db.list_questions_in_lesson(doomed.lesson_id),
            Err(StoreError::EntityNotFound { .. })
        ));

        // 题目本身仍然存在
        for q in &questions {
            assert_eq!(&db.get_question(q.question_type(), q.question_id()).unwrap(), q);
        }
    }

    #[test]
    fn test_link_inserted_by_another_handle_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signable.db");
        let first = DatabaseService::open(&path).unwrap();
        let second = DatabaseService::open(&path).unwrap();

        for sign in ["A", "FIST"] {
            first
                .create_sign(&Sign {
                    sign: sign.to_string(),
                    image_path: String::new(),
                })
                .unwrap();
        }
        let lesson = first.create_lesson("Letters", LessonType::Teach).unwrap();
        let q = camera(&first);

        // second 在 first 检查之后抢先写入关联
        second
            .add_question_to_lesson(lesson.lesson_id, q.question_type(), q.question_id())
            .unwrap();

        let err = first
            .unit_of_work(|tx| {
                insert_question_link(tx, lesson.lesson_id, q.question_type(), q.question_id())
            })
            .unwrap_err();
        match err {
            StoreError::DuplicateEntity { entity, id } => {
                assert_eq!(entity, "CAMERA");
                assert_eq!(id, format!("l_id: {}, q_id: {}", lesson.lesson_id, q.question_id()));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(first.list_questions_in_lesson(lesson.lesson_id).unwrap(), vec![q]);
    }
}
