//! 答案校验
//!
//! `ans_encode` / `ans_decode` 只是让下发给客户端的答案不以明文出现，
//! 不具备任何加密强度。

use log::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::{Question, QuestionType};
use crate::services::database::DatabaseService;

const ODD_FACTOR: u64 = 49;
const EVEN_FACTOR: u64 = 98;

/// 逐字符编码：码点为奇数乘 49，偶数乘 98，以 "-" 连接
pub fn ans_encode(data: &str) -> String {
    data.chars()
        .map(|c| {
            let code = u64::from(c as u32);
            let factor = if code % 2 == 1 { ODD_FACTOR } else { EVEN_FACTOR };
            (code * factor).to_string()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// 解码时按编码后整数的奇偶选择除数（奇数 × 49 仍为奇数，偶数 × 98 仍为偶数）
pub fn ans_decode(data: &str) -> StoreResult<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    data.split('-')
        .map(|token| {
            let value: u64 = token
                .parse()
                .map_err(|_| malformed(format!("token [{}] is not a number", token)))?;
            let divisor = if value % 2 == 1 { ODD_FACTOR } else { EVEN_FACTOR };
            u32::try_from(value / divisor)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| malformed(format!("token [{}] is not a character", token)))
        })
        .collect()
}

fn malformed(message: String) -> StoreError {
    StoreError::invalid("Answer", message)
}

/// 近似完整大小写折叠：先转大写展开 ß、连字等多字符映射，再转小写
fn fold_case(s: &str) -> String {
    s.to_uppercase().to_lowercase()
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    fold_case(a) == fold_case(b)
}

/// 无状态比对。拍摄题与观看学习题不在此处判定，始终返回 false。
pub fn is_correct(question: &Question, submitted: &str) -> StoreResult<bool> {
    match question {
        Question::FillInTheBlank(q) => Ok(eq_ignore_case(submitted, &q.answer)),
        Question::MultipleChoice(q) => Ok(eq_ignore_case(&ans_decode(submitted)?, &q.answer)),
        Question::Matching(q) => {
            // 提交格式：<编码后的图片手势>.<文字选项>
            let mut parts = submitted.split('.');
            let image_token = parts.next().unwrap_or_default();
            let text = parts.next().ok_or_else(|| {
                malformed(format!("matching answer [{}] has no text part", submitted))
            })?;
            if text.is_empty() {
                return Ok(false);
            }

            let image_name = ans_decode(image_token)?;
            // TODO: compare against the split pair list instead of a substring of the raw string
            Ok(q.pairs.to_uppercase().contains(&text.to_uppercase())
                && eq_ignore_case(&image_name, text))
        }
        Question::Camera(_) | Question::WatchToLearn(_) => Ok(false),
    }
}

impl DatabaseService {
    pub fn check_answer(
        &self,
        question_type: QuestionType,
        question_id: i64,
        submitted: &str,
    ) -> StoreResult<bool> {
        let question = self.get_question(question_type, question_id)?;
        let correct = is_correct(&question, submitted)?;
        debug!(
            "{} question {} answered {}",
            question_type,
            question_id,
            if correct { "correctly" } else { "incorrectly" }
        );
        Ok(correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FillInTheBlankQuestion, MatchingQuestion, MultipleChoiceQuestion, SignQuestion};
    use crate::services::questions::tests::{camera, matching, multiple_choice, seeded};

    #[test]
    fn test_encode_known_values() {
        // 'A' = 65 (奇) -> 3185, 'B' = 66 (偶) -> 6468
        assert_eq!(ans_encode("AB"), "3185-6468");
        assert_eq!(ans_encode(""), "");
        assert_eq!(ans_decode("3185-6468").unwrap(), "AB");
    }

    #[test]
    fn test_round_trip() {
        let printable: String = (0x20u8..0x7f).map(char::from).collect();
        for s in [
            printable.as_str(),
            "HELLO",
            "ñandú",
            "Straße",
            "Жизнь",
            "手语",
            "👋 wave",
            "",
        ] {
            assert_eq!(ans_decode(&ans_encode(s)).unwrap(), s, "round trip of {s:?}");
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ans_decode("12-abc"),
            Err(StoreError::InvalidRequest { .. })
        ));
        assert!(matches!(ans_decode("3185-"), Err(StoreError::InvalidRequest { .. })));
        // 0x110000 * 98 超出 Unicode 范围
        assert!(ans_decode(&(0x11_0000u64 * 98).to_string()).is_err());
    }

    #[test]
    fn test_multiple_choice_decodes_then_ignores_case() {
        let q = Question::MultipleChoice(MultipleChoiceQuestion {
            question_id: 1,
            text: "?".into(),
            options: ["A".into(), "B".into(), "C".into(), "HELLO".into()],
            answer: "HELLO".into(),
        });
        assert!(is_correct(&q, &ans_encode("hello")).unwrap());
        assert!(!is_correct(&q, &ans_encode("B")).unwrap());
        // 未编码的明文无法通过
        assert!(is_correct(&q, "hello").is_err());
    }

    #[test]
    fn test_fill_in_the_blank_ignores_case() {
        let q = Question::FillInTheBlank(FillInTheBlankQuestion {
            question_id: 1,
            text: "_ is for apple".into(),
            image_path: "/img/a.png".into(),
            answer: "A".into(),
        });
        assert!(is_correct(&q, "a").unwrap());
        assert!(!is_correct(&q, "b").unwrap());
    }

    #[test]
    fn test_case_folding_expands_special_letters() {
        let street = Question::FillInTheBlank(FillInTheBlankQuestion {
            question_id: 1,
            text: "_ sign".into(),
            image_path: "/img/street.png".into(),
            answer: "straße".into(),
        });
        assert!(is_correct(&street, "STRASSE").unwrap());
        assert!(is_correct(&street, "Strasse").unwrap());

        let ligature = Question::FillInTheBlank(FillInTheBlankQuestion {
            question_id: 2,
            text: "_ sign".into(),
            image_path: "/img/fi.png".into(),
            answer: "\u{FB01}".into(),
        });
        assert!(is_correct(&ligature, "FI").unwrap());
        assert!(!is_correct(&ligature, "F").unwrap());
    }

    #[test]
    fn test_matching() {
        let q = Question::Matching(MatchingQuestion {
            question_id: 1,
            text: "match".into(),
            pairs: "CAT.DOG.BIRD".into(),
        });
        let submit = |image: &str, text: &str| format!("{}.{}", ans_encode(image), text);

        assert!(is_correct(&q, &submit("DOG", "dog")).unwrap());
        assert!(!is_correct(&q, &submit("CAT", "dog")).unwrap());
        assert!(!is_correct(&q, &submit("FISH", "fish")).unwrap());
        assert!(!is_correct(&q, &format!("{}.", ans_encode("CAT"))).unwrap());
        assert!(is_correct(&q, &ans_encode("CAT")).is_err());

        // 子串匹配：与原有行为一致
        assert!(is_correct(&q, &submit("IRD", "ird")).unwrap());
    }

    #[test]
    fn test_sign_questions_are_not_evaluated() {
        let sign = SignQuestion {
            question_id: 1,
            text: "sign A".into(),
            sign: "A".into(),
            starting_position: "FIST".into(),
            num_hands: 1,
            motion: false,
        };
        assert!(!is_correct(&Question::Camera(sign.clone()), "A").unwrap());
        assert!(!is_correct(&Question::WatchToLearn(sign), "A").unwrap());
    }

    #[test]
    fn test_check_answer_against_store() {
        let db = seeded();
        let mc = multiple_choice(&db);
        let m = matching(&db);
        let c = camera(&db);

        assert!(db
            .check_answer(QuestionType::MultipleChoice, mc.question_id(), &ans_encode("hello"))
            .unwrap());
        assert!(db
            .check_answer(QuestionType::Matching, m.question_id(), &format!("{}.b", ans_encode("B")))
            .unwrap());
        assert!(!db
            .check_answer(QuestionType::Camera, c.question_id(), "A")
            .unwrap());
        assert!(matches!(
            db.check_answer(QuestionType::FillInTheBlank, 1, "A"),
            Err(StoreError::EntityNotFound { .. })
        ));
    }
}
