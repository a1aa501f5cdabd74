//! 엔티티 규칙 카탈로그
//!
//! 엔티티 유형마다 (패턴, 검증, 정규화, 실패 정책) 디스크립터 하나.
//! 배열 순서가 곧 우선순위입니다 (앞일수록 높음).
//! 새 유형 추가 시 여기에 한 줄을 넣으면 되고, 추출 흐름은 바뀌지 않습니다.

use std::sync::OnceLock;

use regex::Regex;

use super::validate;
use super::EntityType;

/// 검증 실패 시 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPolicy {
    /// 매치 폐기 (체크섬/구조 검증이 확실한 유형)
    Discard,
    /// `valid = false`로 유지 (형식 편차가 큰 유형)
    Flag,
}

/// 규칙 디스크립터
pub struct EntityRule {
    pub entity_type: EntityType,
    pub pattern: Regex,
    pub validate: fn(&str) -> bool,
    pub canonicalize: fn(&str) -> String,
    pub on_invalid: InvalidPolicy,
}

impl EntityRule {
    /// 카탈로그 내 우선순위 (0이 가장 높음)
    pub fn priority(&self) -> usize {
        self.entity_type as usize
    }
}

impl std::fmt::Debug for EntityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRule")
            .field("entity_type", &self.entity_type)
            .field("pattern", &self.pattern.as_str())
            .field("on_invalid", &self.on_invalid)
            .finish()
    }
}

/// (유형, 패턴, 검증, 정규화, 정책) - 우선순위 순서
type RuleSpec = (
    EntityType,
    &'static str,
    fn(&str) -> bool,
    fn(&str) -> String,
    InvalidPolicy,
);

const RULE_SPECS: &[RuleSpec] = &[
    (
        EntityType::Pan,
        r"(?i)\b[A-Z]{5}[0-9]{4}[A-Z]\b",
        validate::validate_pan,
        validate::canonical_upper,
        InvalidPolicy::Discard,
    ),
    (
        EntityType::Aadhaar,
        r"\b\d{4}[ -]?\d{4}[ -]?\d{4}\b",
        validate::validate_aadhaar,
        validate::strip_separators,
        InvalidPolicy::Discard,
    ),
    (
        EntityType::Ifsc,
        r"(?i)\b[A-Z]{4}0[A-Z0-9]{6}\b",
        validate::validate_ifsc,
        validate::canonical_upper,
        InvalidPolicy::Discard,
    ),
    (
        EntityType::Phone,
        r"(?:\+91[ -]?|\b0?)[6-9]\d{9}\b",
        validate::validate_phone,
        validate::canonical_phone,
        InvalidPolicy::Discard,
    ),
    (
        EntityType::AccountNumber,
        r"\b\d{9,18}\b|\b\d{3,6}(?:-\d{3,8}){1,3}\b",
        validate::validate_account_number,
        validate::strip_separators,
        InvalidPolicy::Discard,
    ),
    (
        EntityType::Email,
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        validate::validate_email,
        validate::canonical_lower,
        InvalidPolicy::Discard,
    ),
    (
        EntityType::Amount,
        r"(?i)(?:₹|\brs\.?|\binr)\s?\d(?:[\d,]*\d)?(?:\.\d+)?",
        validate::validate_amount,
        validate::canonical_amount,
        InvalidPolicy::Flag,
    ),
    (
        EntityType::Date,
        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b|\b\d{4}-\d{2}-\d{2}\b",
        validate::validate_date,
        validate::canonical_date,
        InvalidPolicy::Flag,
    ),
    (
        EntityType::Percentage,
        r"\b\d{1,3}(?:\.\d+)?\s?%",
        validate::validate_percentage,
        validate::canonical_percentage,
        InvalidPolicy::Flag,
    ),
    (
        EntityType::PinCode,
        r"\b[1-9]\d{5}\b",
        validate::validate_pin_code,
        validate::canonical_identity,
        InvalidPolicy::Discard,
    ),
];

/// 규칙 카탈로그 (최초 호출 시 한 번 컴파일)
pub fn catalogue() -> &'static [EntityRule] {
    static CATALOGUE: OnceLock<Vec<EntityRule>> = OnceLock::new();

    CATALOGUE.get_or_init(|| {
        RULE_SPECS
            .iter()
            .map(|&(entity_type, pattern, validate, canonicalize, on_invalid)| EntityRule {
                entity_type,
                pattern: Regex::new(pattern).expect("Invalid entity pattern"),
                validate,
                canonicalize,
                on_invalid,
            })
            .collect()
    })
}

// ============================================================================
// Tests
// ============================================================================
