//! 엔티티 추출 모듈
//!
//! 정규화된 텍스트에서 PAN, Aadhaar, 계좌번호, 금액, 날짜 등을 찾아
//! 검증/정규화하고, 문서 유형 분류와 품질 점수를 함께 계산합니다.

pub mod classify;
pub mod quality;
pub mod rules;
pub mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use classify::{classify, Classification, DocumentType};
pub use quality::{quality_score, QualityScore, QualityWeights};
pub use rules::{catalogue, EntityRule, InvalidPolicy};

// ============================================================================
// 엔티티 유형
// ============================================================================

/// 엔티티 유형 (선언 순서 = 겹침 해소 우선순위)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Pan,
    Aadhaar,
    Ifsc,
    Phone,
    AccountNumber,
    Email,
    Amount,
    Date,
    Percentage,
    PinCode,
}

impl EntityType {
    pub const ALL: [EntityType; 10] = [
        EntityType::Pan,
        EntityType::Aadhaar,
        EntityType::Ifsc,
        EntityType::Phone,
        EntityType::AccountNumber,
        EntityType::Email,
        EntityType::Amount,
        EntityType::Date,
        EntityType::Percentage,
        EntityType::PinCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pan => "PAN",
            Self::Aadhaar => "AADHAAR",
            Self::Ifsc => "IFSC",
            Self::Phone => "PHONE",
            Self::AccountNumber => "ACCOUNT_NUMBER",
            Self::Email => "EMAIL",
            Self::Amount => "AMOUNT",
            Self::Date => "DATE",
            Self::Percentage => "PERCENTAGE",
            Self::PinCode => "PIN_CODE",
        }
    }

    /// 대소문자 무시 파싱 (`account`, `pin` 같은 축약 허용)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "PAN" => Some(Self::Pan),
            "AADHAAR" | "AADHAR" => Some(Self::Aadhaar),
            "IFSC" => Some(Self::Ifsc),
            "PHONE" => Some(Self::Phone),
            "ACCOUNT_NUMBER" | "ACCOUNT" => Some(Self::AccountNumber),
            "EMAIL" => Some(Self::Email),
            "AMOUNT" => Some(Self::Amount),
            "DATE" => Some(Self::Date),
            "PERCENTAGE" | "PERCENT" => Some(Self::Percentage),
            "PIN_CODE" | "PIN" | "PINCODE" => Some(Self::PinCode),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// 추출 결과
// ============================================================================

/// 추출된 엔티티
///
/// `start..end`는 정규화 텍스트의 문자(`char`) 오프셋이며,
/// 그 구간의 문자열은 항상 `raw`와 같습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    /// 매치된 원문
    pub raw: String,
    /// 정규화 값 (유효하지 않으면 원문 그대로)
    pub value: String,
    pub valid: bool,
    pub start: usize,
    pub end: usize,
}

impl Entity {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &Entity) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// 문서 하나에 대한 추출 보고서
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    /// 시작 오프셋 순으로 정렬된 엔티티
    pub entities: Vec<Entity>,
    pub classification: Classification,
    pub quality: QualityScore,
    /// 검증 실패로 버려진 매치 수 (유형별)
    pub validation_failures: BTreeMap<EntityType, usize>,
}

impl ExtractionReport {
    pub fn doc_type(&self) -> DocumentType {
        self.classification.doc_type
    }

    pub fn valid_count(&self) -> usize {
        self.entities.iter().filter(|e| e.valid).count()
    }

    pub fn rejected(&self, entity_type: EntityType) -> usize {
        self.validation_failures
            .get(&entity_type)
            .copied()
            .unwrap_or(0)
    }

    /// 유형별 엔티티 수
    pub fn counts_by_type(&self) -> BTreeMap<EntityType, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entities {
            *counts.entry(e.entity_type).or_insert(0) += 1;
        }
        counts
    }
}

// ============================================================================
// 추출기
// ============================================================================

/// 규칙 카탈로그 기반 엔티티 추출기
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    rules: &'static [EntityRule],
    min_classification_hits: usize,
    weights: QualityWeights,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl EntityExtractor {
    pub fn new(min_classification_hits: usize) -> Self {
        Self {
            rules: catalogue(),
            min_classification_hits,
            weights: QualityWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// 정규화 텍스트만으로 추출 (완전성 = 1.0)
    pub fn extract(&self, normalized: &str) -> ExtractionReport {
        self.extract_document(normalized, normalized)
    }

    /// 원문 길이를 함께 반영해 추출
    pub fn extract_document(&self, raw: &str, normalized: &str) -> ExtractionReport {
        let (entities, validation_failures) = self.find_entities(normalized);
        let classification = classify(normalized, self.min_classification_hits);

        let raw_chars = raw.chars().count();
        let normalized_chars = normalized.chars().count();
        let quality = quality_score(
            &classification,
            &entities,
            raw_chars,
            normalized_chars,
            &self.weights,
        );

        debug!(
            "Extracted {} entities ({} rejected), type={}, quality={:.2}",
            entities.len(),
            validation_failures.values().sum::<usize>(),
            classification.doc_type,
            quality.score
        );

        ExtractionReport {
            entities,
            classification,
            quality,
            validation_failures,
        }
    }

    /// 모든 규칙을 적용하고 겹침을 해소
    fn find_entities(&self, text: &str) -> (Vec<Entity>, BTreeMap<EntityType, usize>) {
        let offsets = CharOffsets::new(text);
        let mut candidates: Vec<Entity> = Vec::new();
        let mut failures: BTreeMap<EntityType, usize> = BTreeMap::new();

        for rule in self.rules {
            for m in rule.pattern.find_iter(text) {
                let raw = m.as_str();
                let valid = (rule.validate)(raw);

                if !valid && rule.on_invalid == InvalidPolicy::Discard {
                    *failures.entry(rule.entity_type).or_insert(0) += 1;
                    continue;
                }

                let value = if valid {
                    (rule.canonicalize)(raw)
                } else {
                    raw.to_string()
                };

                candidates.push(Entity {
                    entity_type: rule.entity_type,
                    raw: raw.to_string(),
                    value,
                    valid,
                    start: offsets.char_index(m.start()),
                    end: offsets.char_index(m.end()),
                });
            }
        }

        (resolve_overlaps(candidates), failures)
    }
}

/// 겹치는 후보 중 하나만 남김
///
/// 순위: 유효 > 무효, 긴 매치 > 짧은 매치, 카탈로그 우선순위, 이른 시작.
fn resolve_overlaps(mut candidates: Vec<Entity>) -> Vec<Entity> {
    candidates.sort_by(|a, b| {
        b.valid
            .cmp(&a.valid)
            .then_with(|| b.len().cmp(&a.len()))
            .then_with(|| a.entity_type.cmp(&b.entity_type))
            .then_with(|| a.start.cmp(&b.start))
    });

    let mut kept: Vec<Entity> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !kept.iter().any(|k| k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }

    kept.sort_by_key(|e| (e.start, e.end));
    kept
}

/// 바이트 오프셋 → 문자 오프셋 변환표
struct CharOffsets {
    starts: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        Self {
            starts: text.char_indices().map(|(b, _)| b).collect(),
        }
    }

    /// 문자 경계에 있는 바이트 오프셋의 문자 인덱스
    fn char_index(&self, byte: usize) -> usize {
        self.starts.partition_point(|&b| b < byte)
    }
}

// ============================================================================
// Tests
// ============================================================================
