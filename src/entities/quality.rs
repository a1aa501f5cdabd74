//! 문서 품질 점수
//!
//! `score = 100 × (0.30·type + 0.50·entity + 0.20·completeness)`
//!
//! - type: 분류 신뢰도 (unknown = 0, 그 외 `min(1, hits / 3)`)
//! - entity: `0.5·coverage + 0.3·diversity + 0.2·volume`
//! - completeness: 정규화 텍스트 길이 / 원문 길이 (문자 단위)

use std::collections::BTreeSet;

use serde::Serialize;

use super::classify::{Classification, DocumentType};
use super::{Entity, EntityType};

/// 가중치 (합계 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
pub struct QualityWeights {
    pub classification: f64,
    pub entities: f64,
    pub completeness: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            classification: 0.30,
            entities: 0.50,
            completeness: 0.20,
        }
    }
}

/// 분류 신뢰도가 1.0이 되는 키워드 적중 수
const FULL_CONFIDENCE_HITS: f64 = 3.0;
/// 다양성 1.0 기준 유효 엔티티 유형 수
const FULL_DIVERSITY_TYPES: f64 = 5.0;
/// 물량 1.0 기준 유효 엔티티 수
const FULL_VOLUME_COUNT: f64 = 10.0;

/// 점수 구성 요소
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityScore {
    /// 최종 점수 (0 ~ 100, 소수 둘째 자리)
    pub score: f64,
    pub classification: f64,
    pub entities: f64,
    pub completeness: f64,
}

/// 품질 점수 계산 (동일 입력 → 동일 점수)
pub fn quality_score(
    classification: &Classification,
    entities: &[Entity],
    raw_chars: usize,
    normalized_chars: usize,
    weights: &QualityWeights,
) -> QualityScore {
    let classification_part = if classification.doc_type == DocumentType::Unknown {
        0.0
    } else {
        (classification.hits as f64 / FULL_CONFIDENCE_HITS).min(1.0)
    };

    let valid_types: BTreeSet<EntityType> = entities
        .iter()
        .filter(|e| e.valid)
        .map(|e| e.entity_type)
        .collect();
    let valid_count = entities.iter().filter(|e| e.valid).count();

    let diversity = (valid_types.len() as f64 / FULL_DIVERSITY_TYPES).min(1.0);
    let volume = (valid_count as f64 / FULL_VOLUME_COUNT).min(1.0);

    let required = classification.doc_type.required_entities();
    let coverage = if required.is_empty() {
        diversity
    } else {
        let found = required.iter().filter(|t| valid_types.contains(t)).count();
        found as f64 / required.len() as f64
    };

    let entity_part = 0.5 * coverage + 0.3 * diversity + 0.2 * volume;

    let completeness = if raw_chars == 0 {
        0.0
    } else {
        (normalized_chars as f64 / raw_chars as f64).min(1.0)
    };

    let raw_score = 100.0
        * (weights.classification * classification_part
            + weights.entities * entity_part
            + weights.completeness * completeness);
    let score = ((raw_score * 100.0).round() / 100.0).clamp(0.0, 100.0);

    QualityScore {
        score,
        classification: classification_part,
        entities: entity_part,
        completeness,
    }
}

// ============================================================================
// Tests
// ============================================================================
