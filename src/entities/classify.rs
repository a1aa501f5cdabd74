//! 문서 유형 분류 (키워드 휴리스틱)
//!
//! ML 모델 없이 카테고리별 키워드 적중 수로 유형을 고릅니다.

use serde::{Deserialize, Serialize};

use super::EntityType;

/// 문서 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LoanApplication,
    KycDocument,
    BankStatement,
    SalarySlip,
    Unknown,
}

impl DocumentType {
    /// 분류 대상 카테고리 (`Unknown` 제외, 동점 시 앞쪽 우선)
    pub const KNOWN: [DocumentType; 4] = [
        DocumentType::LoanApplication,
        DocumentType::KycDocument,
        DocumentType::BankStatement,
        DocumentType::SalarySlip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoanApplication => "loan_application",
            Self::KycDocument => "kyc_document",
            Self::BankStatement => "bank_statement",
            Self::SalarySlip => "salary_slip",
            Self::Unknown => "unknown",
        }
    }

    /// 문자열에서 파싱 (`other`는 `unknown`의 별칭)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "loan_application" | "loan" => Some(Self::LoanApplication),
            "kyc_document" | "kyc" => Some(Self::KycDocument),
            "bank_statement" | "statement" => Some(Self::BankStatement),
            "salary_slip" | "salary" => Some(Self::SalarySlip),
            "unknown" | "other" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// 유형별 키워드
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::LoanApplication => &[
                "loan application",
                "loan amount",
                "emi",
                "interest rate",
                "home loan",
                "personal loan",
                "business loan",
                "loan tenure",
                "principal amount",
                "loan purpose",
                "collateral",
                "outstanding loan",
            ],
            Self::KycDocument => &[
                "aadhaar",
                "aadhar",
                "pan card",
                "kyc",
                "know your customer",
                "identity proof",
                "address proof",
                "passport",
                "voter id",
                "driving license",
                "verification",
                "identity document",
            ],
            Self::BankStatement => &[
                "account statement",
                "transaction history",
                "opening balance",
                "closing balance",
                "credit",
                "debit",
                "statement period",
                "account number",
                "transaction date",
                "bank statement",
            ],
            Self::SalarySlip => &[
                "salary slip",
                "pay slip",
                "gross salary",
                "net salary",
                "basic pay",
                "allowances",
                "deductions",
                "pf contribution",
                "income tax",
                "take home",
                "earnings",
            ],
            Self::Unknown => &[],
        }
    }

    /// 품질 점수 계산 시 기대되는 필수 엔티티
    pub fn required_entities(&self) -> &'static [EntityType] {
        match self {
            Self::LoanApplication => &[
                EntityType::Pan,
                EntityType::Phone,
                EntityType::Amount,
                EntityType::Date,
            ],
            Self::KycDocument => &[
                EntityType::Pan,
                EntityType::Aadhaar,
                EntityType::Phone,
                EntityType::Date,
            ],
            Self::BankStatement => &[
                EntityType::AccountNumber,
                EntityType::Ifsc,
                EntityType::Date,
                EntityType::Amount,
            ],
            Self::SalarySlip => &[EntityType::Pan, EntityType::Amount, EntityType::Date],
            Self::Unknown => &[],
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub doc_type: DocumentType,
    /// 선택된 유형의 키워드 적중 수
    pub hits: usize,
}

/// 키워드 적중 수로 문서 유형 결정
///
/// 최고 적중 수가 `min_hits` 미만이면 `Unknown`.
pub fn classify(text: &str, min_hits: usize) -> Classification {
    let lower = text.to_lowercase();

    let mut best = Classification {
        doc_type: DocumentType::Unknown,
        hits: 0,
    };

    for doc_type in DocumentType::KNOWN {
        let hits = doc_type
            .keywords()
            .iter()
            .filter(|kw| contains_keyword(&lower, kw))
            .count();
        if hits > best.hits {
            best = Classification { doc_type, hits };
        }
    }

    if best.hits < min_hits.max(1) {
        return Classification {
            doc_type: DocumentType::Unknown,
            hits: 0,
        };
    }

    best
}

/// 단어 경계를 지키는 키워드 포함 여부 ("emi"가 "premium"에 걸리지 않도록)
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + keyword.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

// ============================================================================
// Tests
// ============================================================================
