// 学习命令
// 单元/课程/题目的只读浏览与答案校验，题目下发前隐藏答案

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::commands::{ApiResult, Meta};
use crate::models::{Lesson, Question, QuestionType, Unit};
use crate::services::{ans_encode, DatabaseService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitCollection {
    pub meta: Meta,
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonCollection {
    pub meta: Meta,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonResponse {
    pub lesson: Lesson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub is_correct: bool,
}

/// 下发给学员的题目，不含明文答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question_id: i64,
    pub text: String,
    pub question_type: QuestionType,
    #[serde(flatten)]
    pub body: QuestionBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionBody {
    Sign {
        sign: String,
        starting_position: String,
        num_hands: i64,
        motion: bool,
    },
    MultipleChoice {
        options: Vec<String>,
    },
    Matching {
        image_options: Vec<String>,
        text_options: Vec<String>,
    },
    FillInTheBlank {
        image_path: String,
    },
}

impl From<Question> for QuestionResponse {
    fn from(question: Question) -> Self {
        let question_type = question.question_type();
        match question {
            Question::Camera(q) | Question::WatchToLearn(q) => QuestionResponse {
                question_id: q.question_id,
                text: q.text,
                question_type,
                body: QuestionBody::Sign {
                    sign: q.sign,
                    starting_position: q.starting_position,
                    num_hands: q.num_hands,
                    motion: q.motion,
                },
            },
            Question::MultipleChoice(q) => QuestionResponse {
                question_id: q.question_id,
                text: q.text,
                question_type,
                body: QuestionBody::MultipleChoice {
                    options: q.options.iter().map(|o| ans_encode(o)).collect(),
                },
            },
            Question::Matching(q) => {
                // 两列各自打乱，位置不能泄露配对关系
                let mut rng = rand::thread_rng();
                let mut text_options = q.pair_options();
                let mut image_options: Vec<String> =
                    text_options.iter().map(|o| ans_encode(o)).collect();
                text_options.shuffle(&mut rng);
                image_options.shuffle(&mut rng);
                QuestionResponse {
                    question_id: q.question_id,
                    text: q.text,
                    question_type,
                    body: QuestionBody::Matching {
                        image_options,
                        text_options,
                    },
                }
            }
            Question::FillInTheBlank(q) => QuestionResponse {
                question_id: q.question_id,
                text: q.text,
                question_type,
                body: QuestionBody::FillInTheBlank {
                    image_path: ans_encode(&q.image_path),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionCollection {
    pub meta: Meta,
    pub questions: Vec<QuestionResponse>,
}

/// 按 id 范围列出单元（闭区间，upper 为空表示不设上限），列出前刷新课程计数
pub fn get_units(db: &DatabaseService, lower: Option<i64>, upper: Option<i64>) -> ApiResult<UnitCollection> {
    let mut units = db.list_units(lower.unwrap_or(1), upper)?;
    for unit in &mut units {
        unit.lesson_count = db.recount_lessons_in_unit(unit.unit_id)?;
    }

    Ok(UnitCollection {
        meta: Meta::of(&units),
        units,
    })
}

/// 单元内课程，按 lesson_index 排序，列出前刷新题目计数
pub fn get_lessons(db: &DatabaseService, unit_id: i64) -> ApiResult<LessonCollection> {
    let mut lessons = db.list_lessons_in_unit(unit_id)?;
    for lesson in &mut lessons {
        lesson.question_count = db.recount_questions_in_lesson(lesson.lesson_id)?;
    }

    Ok(LessonCollection {
        meta: Meta::of(&lessons),
        lessons,
    })
}

pub fn get_questions(db: &DatabaseService, lesson_id: i64) -> ApiResult<QuestionCollection> {
    let questions: Vec<QuestionResponse> = db
        .list_questions_in_lesson(lesson_id)?
        .into_iter()
        .map(QuestionResponse::from)
        .collect();

    Ok(QuestionCollection {
        meta: Meta::of(&questions),
        questions,
    })
}

pub fn get_lesson(db: &DatabaseService, unit_id: i64, lesson_id: i64) -> ApiResult<LessonResponse> {
    Ok(LessonResponse {
        lesson: db.get_lesson_from_unit(unit_id, lesson_id)?,
    })
}

/// question_type 为外部传入的原始标签（编码或名称）
pub fn check_answer(
    db: &DatabaseService,
    question_type: &str,
    question_id: i64,
    answer: &str,
) -> ApiResult<AnswerResponse> {
    let question_type: QuestionType = question_type.parse()?;
    Ok(AnswerResponse {
        is_correct: db.check_answer(question_type, question_id, answer)?,
    })
}
