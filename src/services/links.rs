//! 题目类型 → 数据表映射
//!
//! 每种题目类型对应一张题目表和一张课程关联表。所有按类型分派的地方都经过
//! 这里的穷尽 match，新增题目类型时编译器会指出遗漏的分支。

use crate::error::StoreResult;
use crate::models::{unsupported_question_type, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionTables {
    /// 存放题干与答案的题目表
    pub question_table: &'static str,
    /// 课程与题目的多对多关联表
    pub link_table: &'static str,
}

impl QuestionType {
    pub fn tables(self) -> QuestionTables {
        let (question_table, link_table) = match self {
            QuestionType::Camera => ("camera_questions", "camera_questions_in_lesson"),
            QuestionType::MultipleChoice => (
                "multiple_choice_questions",
                "multiple_choice_questions_in_lesson",
            ),
            QuestionType::Matching => ("matching_questions", "matching_questions_in_lesson"),
            QuestionType::FillInTheBlank => (
                "fill_in_the_blank_questions",
                "fill_in_the_blank_questions_in_lesson",
            ),
            QuestionType::WatchToLearn => (
                "watch_to_learn_questions",
                "watch_to_learn_questions_in_lesson",
            ),
        };
        QuestionTables {
            question_table,
            link_table,
        }
    }

    /// 引用手势的"答案"列；连线题没有外键答案
    pub fn answer_column(self) -> Option<&'static str> {
        match self {
            QuestionType::Camera | QuestionType::WatchToLearn => Some("sign"),
            QuestionType::MultipleChoice | QuestionType::FillInTheBlank => Some("answer"),
            QuestionType::Matching => None,
        }
    }

    /// 所有引用手势的列，删除手势前用来检查是否仍被引用
    pub fn sign_columns(self) -> &'static [&'static str] {
        match self {
            QuestionType::Camera | QuestionType::WatchToLearn => &["sign", "starting_position"],
            QuestionType::MultipleChoice => {
                &["option_1", "option_2", "option_3", "option_4", "answer"]
            }
            QuestionType::FillInTheBlank => &["answer"],
            QuestionType::Matching => &[],
        }
    }

    pub(crate) fn require_answer_column(self) -> StoreResult<&'static str> {
        self.answer_column()
            .ok_or_else(|| unsupported_question_type(self.name()))
    }
}
