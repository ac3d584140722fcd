// 初始数据导入
// 从 JSON 文件批量写入带固定 id 的测试/演示数据，整体在一个事务内完成

use log::info;
use rusqlite::{params, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    Friend, Lesson, LessonInUnit, Question, QuestionInLesson, Sign, Unit, User, UserXp,
};
use crate::services::database::DatabaseService;
use crate::services::signs::check_signs;

/// 导入文件结构，各字段均可省略
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub signs: Vec<Sign>,
    pub users: Vec<User>,
    pub xp: Vec<UserXp>,
    pub friends: Vec<Friend>,
    pub units: Vec<Unit>,
    pub lessons: Vec<Lesson>,
    pub lessons_in_unit: Vec<LessonInUnit>,
    pub questions: Vec<Question>,
    pub questions_in_lesson: Vec<QuestionInLesson>,
}

impl SeedData {
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| {
            StoreError::invalid(
                "Seed",
                format!("{}: {}", path.as_ref().display(), e),
            )
        })
    }
}

/// 导入结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    pub signs: usize,
    pub users: usize,
    pub xp: usize,
    pub friends: usize,
    pub units: usize,
    pub lessons: usize,
    pub lessons_in_unit: usize,
    pub questions: usize,
    pub questions_in_lesson: usize,
}

impl DatabaseService {
    /// 批量导入，任一条失败则全部回滚
    pub fn seed(&self, data: &SeedData) -> StoreResult<SeedReport> {
        self.unit_of_work(|tx| {
            let mut report = SeedReport::default();

            for sign in &data.signs {
                tx.execute(
                    "INSERT INTO signs (sign, image_path) VALUES (?, ?)",
                    params![sign.sign, sign.image_path],
                )?;
                report.signs += 1;
            }

            for user in &data.users {
                tx.execute(
                    "INSERT INTO users (user_id, created_at, password, username, email, first_name,
                     last_name, unit_progress, lesson_index, days_logged, is_admin)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        user.user_id,
                        user.created_at,
                        user.password,
                        user.username,
                        user.email,
                        user.first_name,
                        user.last_name,
                        user.unit_progress,
                        user.lesson_index,
                        user.days_logged,
                        user.is_admin,
                    ],
                )?;
                report.users += 1;
            }

            for xp in &data.xp {
                tx.execute(
                    "INSERT INTO user_xp (user_id, day, xp) VALUES (?, ?, ?)",
                    params![xp.user_id, xp.day, xp.xp],
                )?;
                report.xp += 1;
            }

            for friend in &data.friends {
                tx.execute(
                    "INSERT INTO friends (follower_id, followed_id) VALUES (?, ?)",
                    params![friend.follower_id, friend.followed_id],
                )?;
                report.friends += 1;
            }

            for unit in &data.units {
                tx.execute(
                    "INSERT INTO units (unit_id, title, description, lesson_count) VALUES (?, ?, ?, ?)",
                    params![unit.unit_id, unit.title, unit.description, unit.lesson_count],
                )?;
                report.units += 1;
            }

            for lesson in &data.lessons {
                tx.execute(
                    "INSERT INTO lessons (lesson_id, lesson_type, title, question_count) VALUES (?, ?, ?, ?)",
                    params![lesson.lesson_id, lesson.lesson_type, lesson.title, lesson.question_count],
                )?;
                report.lessons += 1;
            }

            for link in &data.lessons_in_unit {
                tx.execute(
                    "INSERT INTO lessons_in_unit (unit_id, lesson_id, lesson_index) VALUES (?, ?, ?)",
                    params![link.unit_id, link.lesson_id, link.lesson_index],
                )?;
                report.lessons_in_unit += 1;
            }

            for question in &data.questions {
                insert_question(tx, question)?;
                report.questions += 1;
            }

            for link in &data.questions_in_lesson {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (lesson_id, question_id) VALUES (?, ?)",
                        link.question_type.tables().link_table
                    ),
                    params![link.lesson_id, link.question_id],
                )?;
                report.questions_in_lesson += 1;
            }

            info!("seeded {:?}", report);
            Ok(report)
        })
    }
}

fn insert_question(tx: &Transaction<'_>, question: &Question) -> StoreResult<()> {
    let table = question.question_type().tables().question_table;
    match question {
        Question::Camera(q) | Question::WatchToLearn(q) => {
            check_signs(tx, &[q.sign.as_str(), q.starting_position.as_str()])?;
            tx.execute(
                &format!(
                    "INSERT INTO {} (question_id, text, sign, starting_position, num_hands, motion)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    table
                ),
                params![
                    q.question_id,
                    q.text,
                    q.sign,
                    q.starting_position,
                    q.num_hands,
                    q.motion
                ],
            )?;
        }
        Question::MultipleChoice(q) => {
            let mut signs: Vec<&str> = q.options.iter().map(String::as_str).collect();
            signs.push(q.answer.as_str());
            check_signs(tx, &signs)?;
            tx.execute(
                "INSERT INTO multiple_choice_questions
                 (question_id, text, option_1, option_2, option_3, option_4, answer)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    q.question_id,
                    q.text,
                    q.options[0],
                    q.options[1],
                    q.options[2],
                    q.options[3],
                    q.answer
                ],
            )?;
        }
        Question::Matching(q) => {
            tx.execute(
                "INSERT INTO matching_questions (question_id, text, pairs) VALUES (?, ?, ?)",
                params![q.question_id, q.text, q.pairs],
            )?;
        }
        Question::FillInTheBlank(q) => {
            check_signs(tx, &[q.answer.as_str()])?;
            tx.execute(
                "INSERT INTO fill_in_the_blank_questions (question_id, text, image_path, answer)
                 VALUES (?, ?, ?, ?)",
                params![q.question_id, q.text, q.image_path, q.answer],
            )?;
        }
    }
    Ok(())
}
