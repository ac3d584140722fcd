use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

// ==================== 元数据枚举 ====================

/// 课程类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LessonType {
    Teach,
    Practice,
    Test,
}

impl LessonType {
    pub fn code(self) -> i64 {
        match self {
            LessonType::Teach => 0,
            LessonType::Practice => 1,
            LessonType::Test => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, StoreError> {
        match code {
            0 => Ok(LessonType::Teach),
            1 => Ok(LessonType::Practice),
            2 => Ok(LessonType::Test),
            other => Err(StoreError::invalid(
                "Lesson Type",
                format!("Lesson Type [{}] is unsupported", other),
            )),
        }
    }
}

impl TryFrom<i64> for LessonType {
    type Error = StoreError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<LessonType> for i64 {
    fn from(value: LessonType) -> Self {
        value.code()
    }
}

/// 题目类型，五种变体各自拥有独立的题目表与课程关联表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum QuestionType {
    Camera,
    MultipleChoice,
    Matching,
    FillInTheBlank,
    WatchToLearn,
}

impl QuestionType {
    /// 固定的遍历顺序，列出课程题目时按此顺序合并
    pub const ALL: [QuestionType; 5] = [
        QuestionType::Camera,
        QuestionType::MultipleChoice,
        QuestionType::Matching,
        QuestionType::FillInTheBlank,
        QuestionType::WatchToLearn,
    ];

    pub fn code(self) -> i64 {
        match self {
            QuestionType::Camera => 0,
            QuestionType::MultipleChoice => 1,
            QuestionType::Matching => 2,
            QuestionType::FillInTheBlank => 3,
            QuestionType::WatchToLearn => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QuestionType::Camera => "CAMERA",
            QuestionType::MultipleChoice => "MULTIPLE_CHOICE",
            QuestionType::Matching => "MATCHING",
            QuestionType::FillInTheBlank => "FILL_IN_THE_BLANK",
            QuestionType::WatchToLearn => "WATCH_TO_LEARN",
        }
    }

    pub fn from_code(code: i64) -> Result<Self, StoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| unsupported_question_type(code))
    }
}

pub(crate) fn unsupported_question_type(tag: impl fmt::Display) -> StoreError {
    StoreError::invalid(
        "Question Type",
        format!("Question Type [{}] is unsupported for this route", tag),
    )
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 接受数字编码（"1"）或名称（"multiple_choice" / "MULTIPLE_CHOICE"）
impl FromStr for QuestionType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        if let Ok(code) = tag.parse::<i64>() {
            return Self::from_code(code);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(tag))
            .ok_or_else(|| unsupported_question_type(tag))
    }
}

impl TryFrom<i64> for QuestionType {
    type Error = StoreError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<QuestionType> for i64 {
    fn from(value: QuestionType) -> Self {
        value.code()
    }
}

// ==================== 用户 ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub created_at: NaiveDate,
    #[serde(default)]
    pub unit_progress: i64,
    #[serde(default)]
    pub lesson_index: i64,
    #[serde(default)]
    pub days_logged: i64,
    #[serde(default)]
    pub is_admin: bool,
}

/// 注册信息，密码由上游完成哈希
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// 关注关系：follower_id 关注 followed_id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub follower_id: i64,
    pub followed_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub unit_progress: i64,
    pub lesson_index: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserXp {
    pub user_id: i64,
    pub day: NaiveDate,
    pub xp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpSummary {
    pub user_id: i64,
    pub daily_xp: i64,
    pub total_xp: i64,
}

// ==================== 课程结构 ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub unit_id: i64,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub lesson_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub lesson_id: i64,
    pub lesson_type: LessonType,
    pub title: String,
    #[serde(default)]
    pub question_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonInUnit {
    pub unit_id: i64,
    pub lesson_id: i64,
    pub lesson_index: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionInLesson {
    pub lesson_id: i64,
    pub question_type: QuestionType,
    pub question_id: i64,
}

// ==================== 题目 ====================

/// 手势类题目（拍摄题 / 观看学习题）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignQuestion {
    pub question_id: i64,
    pub text: String,
    pub sign: String,
    pub starting_position: String,
    pub num_hands: i64,
    pub motion: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleChoiceQuestion {
    pub question_id: i64,
    pub text: String,
    pub options: [String; 4],
    pub answer: String,
}

/// 连线题，pairs 为以 "." 分隔的手语词
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingQuestion {
    pub question_id: i64,
    pub text: String,
    pub pairs: String,
}

impl MatchingQuestion {
    pub fn pair_options(&self) -> Vec<String> {
        self.pairs
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillInTheBlankQuestion {
    pub question_id: i64,
    pub text: String,
    pub image_path: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
    Camera(SignQuestion),
    MultipleChoice(MultipleChoiceQuestion),
    Matching(MatchingQuestion),
    FillInTheBlank(FillInTheBlankQuestion),
    WatchToLearn(SignQuestion),
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        match self {
            Question::Camera(_) => QuestionType::Camera,
            Question::MultipleChoice(_) => QuestionType::MultipleChoice,
            Question::Matching(_) => QuestionType::Matching,
            Question::FillInTheBlank(_) => QuestionType::FillInTheBlank,
            Question::WatchToLearn(_) => QuestionType::WatchToLearn,
        }
    }

    pub fn question_id(&self) -> i64 {
        match self {
            Question::Camera(q) | Question::WatchToLearn(q) => q.question_id,
            Question::MultipleChoice(q) => q.question_id,
            Question::Matching(q) => q.question_id,
            Question::FillInTheBlank(q) => q.question_id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Question::Camera(q) | Question::WatchToLearn(q) => &q.text,
            Question::MultipleChoice(q) => &q.text,
            Question::Matching(q) => &q.text,
            Question::FillInTheBlank(q) => &q.text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSignQuestion {
    pub text: String,
    pub sign: String,
    pub starting_position: String,
    pub num_hands: i64,
    pub motion: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMultipleChoiceQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatchingQuestion {
    pub text: String,
    pub pairs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFillInTheBlankQuestion {
    pub text: String,
    pub image_path: String,
    pub answer: String,
}

// ==================== 资源 ====================

/// ASL 手势
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sign {
    pub sign: String,
    #[serde(default)]
    pub image_path: String,
}
