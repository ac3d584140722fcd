// 管理命令
// 手势、题目、课程、单元的增删与关联维护，全部要求管理员权限

use serde::{Deserialize, Serialize};

use crate::commands::{require_admin, ApiResult, Caller, Meta};
use crate::models::{
    Lesson, LessonInUnit, LessonType, NewFillInTheBlankQuestion, NewMatchingQuestion,
    NewMultipleChoiceQuestion, NewSignQuestion, Question, QuestionInLesson, QuestionType, Sign,
    Unit,
};
use crate::services::DatabaseService;

/// 更新手势图片
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSignDto {
    pub sign: String,
    pub image_path: String,
}

/// 课程内题目关联（question_type 使用数字编码）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuestionInLessonDto {
    pub lesson_id: i64,
    pub question_type: QuestionType,
    pub question_id: i64,
}

/// 单元内课程关联
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LessonInUnitDto {
    pub unit_id: i64,
    pub lesson_id: i64,
    pub lesson_index: i64,
}

/// 按答案手势查询的结果，管理端可见明文答案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignQuestionsResponse {
    pub meta: Meta,
    pub questions: Vec<Question>,
}

// ==================== 手势 ====================

pub fn get_sign(db: &DatabaseService, caller: &Caller, sign: &str) -> ApiResult<Sign> {
    require_admin(caller)?;
    Ok(db.get_sign(sign)?)
}

pub fn add_sign(db: &DatabaseService, caller: &Caller, new_sign: &Sign) -> ApiResult<Sign> {
    require_admin(caller)?;
    Ok(db.create_sign(new_sign)?)
}

pub fn update_sign(db: &DatabaseService, caller: &Caller, details: &UpdateSignDto) -> ApiResult<Sign> {
    require_admin(caller)?;
    Ok(db.update_sign(&details.sign, &details.image_path)?)
}

pub fn delete_sign(db: &DatabaseService, caller: &Caller, sign: &str) -> ApiResult<Sign> {
    require_admin(caller)?;
    Ok(db.delete_sign(sign)?)
}

/// question_type 为外部传入的原始标签（编码或名称）
pub fn get_questions_by_sign(
    db: &DatabaseService,
    caller: &Caller,
    question_type: &str,
    sign: &str,
) -> ApiResult<SignQuestionsResponse> {
    require_admin(caller)?;
    let question_type: QuestionType = question_type.parse()?;
    let questions = db.get_questions_by_sign(question_type, sign)?;
    Ok(SignQuestionsResponse {
        meta: Meta::of(&questions),
        questions,
    })
}

// ==================== 题目 ====================

pub fn create_watch_question(
    db: &DatabaseService,
    caller: &Caller,
    details: &NewSignQuestion,
) -> ApiResult<Question> {
    require_admin(caller)?;
    Ok(db.create_watch_question(details)?)
}

pub fn create_camera_question(
    db: &DatabaseService,
    caller: &Caller,
    details: &NewSignQuestion,
) -> ApiResult<Question> {
    require_admin(caller)?;
    Ok(db.create_camera_question(details)?)
}

pub fn create_mc_question(
    db: &DatabaseService,
    caller: &Caller,
    details: &NewMultipleChoiceQuestion,
) -> ApiResult<Question> {
    require_admin(caller)?;
    Ok(db.create_multiple_choice_question(details)?)
}

pub fn create_fill_question(
    db: &DatabaseService,
    caller: &Caller,
    details: &NewFillInTheBlankQuestion,
) -> ApiResult<Question> {
    require_admin(caller)?;
    Ok(db.create_fill_question(details)?)
}

pub fn create_match_question(
    db: &DatabaseService,
    caller: &Caller,
    details: &NewMatchingQuestion,
) -> ApiResult<Question> {
    require_admin(caller)?;
    Ok(db.create_matching_question(details)?)
}

pub fn delete_question(
    db: &DatabaseService,
    caller: &Caller,
    question_type: &str,
    question_id: i64,
) -> ApiResult<Question> {
    require_admin(caller)?;
    let question_type: QuestionType = question_type.parse()?;
    Ok(db.delete_question(question_type, question_id)?)
}

// ==================== 课程与单元 ====================

pub fn create_lesson(
    db: &DatabaseService,
    caller: &Caller,
    title: &str,
    lesson_type: LessonType,
) -> ApiResult<Lesson> {
    require_admin(caller)?;
    Ok(db.create_lesson(title, lesson_type)?)
}

pub fn delete_lesson(db: &DatabaseService, caller: &Caller, lesson_id: i64) -> ApiResult<Lesson> {
    require_admin(caller)?;
    Ok(db.delete_lesson(lesson_id)?)
}

pub fn add_question_to_lesson(
    db: &DatabaseService,
    caller: &Caller,
    details: &QuestionInLessonDto,
) -> ApiResult<QuestionInLesson> {
    require_admin(caller)?;
    Ok(db.add_question_to_lesson(details.lesson_id, details.question_type, details.question_id)?)
}

pub fn remove_question_from_lesson(
    db: &DatabaseService,
    caller: &Caller,
    details: &QuestionInLessonDto,
) -> ApiResult<QuestionInLesson> {
    require_admin(caller)?;
    Ok(db.remove_question_from_lesson(
        details.lesson_id,
        details.question_type,
        details.question_id,
    )?)
}

pub fn create_unit(
    db: &DatabaseService,
    caller: &Caller,
    title: &str,
    description: &str,
) -> ApiResult<Unit> {
    require_admin(caller)?;
    Ok(db.create_unit(title, description)?)
}

pub fn delete_unit(db: &DatabaseService, caller: &Caller, unit_id: i64) -> ApiResult<Unit> {
    require_admin(caller)?;
    Ok(db.delete_unit(unit_id)?)
}

pub fn add_lesson_to_unit(
    db: &DatabaseService,
    caller: &Caller,
    details: &LessonInUnitDto,
) -> ApiResult<LessonInUnit> {
    require_admin(caller)?;
    Ok(db.add_lesson_to_unit(details.unit_id, details.lesson_id, details.lesson_index)?)
}

/// 按 (unit_id, lesson_index) 移除，忽略 lesson_id
pub fn remove_lesson_from_unit(
    db: &DatabaseService,
    caller: &Caller,
    details: &LessonInUnitDto,
) -> ApiResult<LessonInUnit> {
    require_admin(caller)?;
    Ok(db.remove_lesson_from_unit(details.unit_id, details.lesson_index)?)
}
