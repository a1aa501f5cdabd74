//! 엔티티 검증 및 정규화 함수
//!
//! 규칙 카탈로그([`super::rules`])가 함수 포인터로 참조합니다.
//! 검증 함수는 원문 매치(raw)를 받아 구조/체크섬을 확인하고,
//! 정규화 함수는 저장용 값(구분자 제거, ISO 날짜 등)을 만듭니다.

use chrono::NaiveDate;

// ============================================================================
// PAN
// ============================================================================

/// PAN 4번째 문자 (보유자 유형: P=개인, C=회사, H=HUF, F=회사 등)
const PAN_HOLDER_TYPES: &[u8] = b"PCHFATBLJG";

/// 체크 문자 가중치 (26과 서로소 → 한 글자 치환은 항상 검출됨)
const PAN_WEIGHTS: [u32; 9] = [1, 3, 5, 7, 9, 11, 15, 17, 19];

/// PAN 체크 문자 계산
///
/// 앞 9자리(숫자 0-9, 영문 A-Z=10-35)의 가중합 mod 26 을 알파벳으로 변환합니다.
/// 형식이 맞지 않으면 `None`.
pub fn pan_check_letter(first_nine: &str) -> Option<char> {
    let bytes = first_nine.as_bytes();
    if bytes.len() != 9 {
        return None;
    }

    let mut sum = 0u32;
    for (&b, w) in bytes.iter().zip(PAN_WEIGHTS) {
        let value = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'A'..=b'Z' => u32::from(b - b'A') + 10,
            _ => return None,
        };
        sum += value * w;
    }

    Some(char::from(b'A' + (sum % 26) as u8))
}

/// PAN 검증: `AAAAA9999A` 형식 + 보유자 유형 + 체크 문자
pub fn validate_pan(raw: &str) -> bool {
    let pan = raw.to_ascii_uppercase();
    let b = pan.as_bytes();

    if b.len() != 10
        || !b[..5].iter().all(u8::is_ascii_uppercase)
        || !b[5..9].iter().all(u8::is_ascii_digit)
        || !b[9].is_ascii_uppercase()
    {
        return false;
    }

    if !PAN_HOLDER_TYPES.contains(&b[3]) {
        return false;
    }

    pan_check_letter(&pan[..9]) == Some(char::from(b[9]))
}

// ============================================================================
// Aadhaar (Verhoeff)
// ============================================================================

/// Verhoeff 곱셈표
const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

/// Verhoeff 치환표
const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const VERHOEFF_INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

fn digits_of(s: &str) -> Option<Vec<u8>> {
    s.bytes()
        .map(|b| b.is_ascii_digit().then(|| b - b'0'))
        .collect()
}

/// Verhoeff 체크섬 검증 (체크 숫자 포함 전체 번호)
pub fn verhoeff_valid(number: &str) -> bool {
    let Some(digits) = digits_of(number) else {
        return false;
    };
    if digits.is_empty() {
        return false;
    }

    let c = digits.iter().rev().enumerate().fold(0u8, |c, (i, &d)| {
        VERHOEFF_D[c as usize][VERHOEFF_P[i % 8][d as usize] as usize]
    });
    c == 0
}

/// Verhoeff 체크 숫자 생성
pub fn verhoeff_check_digit(base: &str) -> Option<u8> {
    let digits = digits_of(base)?;
    let c = digits.iter().rev().enumerate().fold(0u8, |c, (i, &d)| {
        VERHOEFF_D[c as usize][VERHOEFF_P[(i + 1) % 8][d as usize] as usize]
    });
    Some(VERHOEFF_INV[c as usize])
}

/// Aadhaar 검증: 12자리, 첫 자리 2-9, Verhoeff 체크섬
pub fn validate_aadhaar(raw: &str) -> bool {
    let digits = strip_separators(raw);
    digits.len() == 12
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !digits.starts_with(['0', '1'])
        && verhoeff_valid(&digits)
}

// ============================================================================
// IFSC / Phone / Account / Email / PIN
// ============================================================================

/// IFSC 검증: 은행코드 4자 + `0` + 지점코드 6자
pub fn validate_ifsc(raw: &str) -> bool {
    let ifsc = raw.to_ascii_uppercase();
    let b = ifsc.as_bytes();
    b.len() == 11
        && b[..4].iter().all(u8::is_ascii_uppercase)
        && b[4] == b'0'
        && b[5..].iter().all(u8::is_ascii_alphanumeric)
}

/// 휴대폰 번호 검증: (+91 또는 0) + 6-9로 시작하는 10자리
pub fn validate_phone(raw: &str) -> bool {
    let digits = canonical_phone(raw);
    digits.len() == 10
        && digits.bytes().all(|b| b.is_ascii_digit())
        && matches!(digits.as_bytes()[0], b'6'..=b'9')
}

/// 계좌번호 검증: 구분자 제거 후 9-18자리, 모두 같은 숫자가 아닐 것
pub fn validate_account_number(raw: &str) -> bool {
    let digits = strip_separators(raw);
    let len = digits.len();
    if !(9..=18).contains(&len) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let first = digits.as_bytes()[0];
    !digits.bytes().all(|b| b == first)
}

/// 이메일 구조 검증
pub fn validate_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && domain.contains('.')
        && !domain.starts_with(['.', '-'])
        && !domain.ends_with(['.', '-'])
        && !domain.contains("..")
}

/// PIN 코드 검증: 6자리, 첫 자리 1-9
pub fn validate_pin_code(raw: &str) -> bool {
    raw.len() == 6
        && raw.bytes().all(|b| b.is_ascii_digit())
        && !raw.starts_with('0')
}

// ============================================================================
// Amount / Date / Percentage
// ============================================================================

/// 통화 접두사 제거 후 숫자 부분
fn amount_digits(raw: &str) -> &str {
    let start = raw.find(|c: char| c.is_ascii_digit()).unwrap_or(raw.len());
    &raw[start..]
}

/// 금액 검증: 쉼표 그룹핑이 서양식(3자리) 또는 인도식(3자리 후 2자리)일 것
pub fn validate_amount(raw: &str) -> bool {
    let number = amount_digits(raw);
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (number, None),
    };

    if let Some(frac) = frac_part {
        if frac.is_empty() || frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }

    if int_part.is_empty() {
        return false;
    }
    if !int_part.contains(',') {
        return int_part.bytes().all(|b| b.is_ascii_digit());
    }

    let groups: Vec<&str> = int_part.split(',').collect();
    let Some((head, rest)) = groups.split_first() else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return false;
    };

    let all_digits = groups.iter().all(|g| g.bytes().all(|b| b.is_ascii_digit()));
    let head_ok = (1..=3).contains(&head.len());
    let western = middle.iter().all(|g| g.len() == 3);
    let indian = middle.iter().all(|g| g.len() == 2) && head.len() <= 2;

    all_digits && head_ok && last.len() == 3 && (western || indian)
}

/// 금액 정규화: `"Rs. 1,50,000.5"` → `"150000.50"`
pub fn canonical_amount(raw: &str) -> String {
    let number: String = amount_digits(raw).chars().filter(|c| *c != ',').collect();
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number.as_str(), ""));

    let int_trimmed = int_part.trim_start_matches('0');
    let int_trimmed = if int_trimmed.is_empty() { "0" } else { int_trimmed };

    let mut frac: String = frac_part.chars().take(2).collect();
    while frac.len() < 2 {
        frac.push('0');
    }

    format!("{}.{}", int_trimmed, frac)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let sep = if raw.contains('/') { '/' } else { '-' };
    let parts: Vec<&str> = raw.split(sep).collect();
    if parts.len() != 3 || (sep == '/' && raw.contains('-')) {
        return None;
    }

    let nums: Vec<u32> = parts.iter().map(|p| p.parse().ok()).collect::<Option<_>>()?;
    if parts[0].len() == 4 {
        // YYYY-MM-DD
        NaiveDate::from_ymd_opt(nums[0] as i32, nums[1], nums[2])
    } else {
        // DD/MM/YYYY
        NaiveDate::from_ymd_opt(nums[2] as i32, nums[1], nums[0])
    }
}

/// 날짜 검증: 실제 달력 날짜인지 확인
pub fn validate_date(raw: &str) -> bool {
    parse_date(raw).is_some()
}

/// 날짜 정규화: ISO 8601 (`YYYY-MM-DD`), 파싱 실패 시 원문 유지
pub fn canonical_date(raw: &str) -> String {
    parse_date(raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// 퍼센트 검증: 0 ~ 100
pub fn validate_percentage(raw: &str) -> bool {
    raw.trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map(|v| (0.0..=100.0).contains(&v))
        .unwrap_or(false)
}

pub fn canonical_percentage(raw: &str) -> String {
    format!("{}%", raw.trim_end_matches('%').trim())
}

// ============================================================================
// Shared canonicalizers
// ============================================================================

/// 공백/하이픈 구분자 제거
pub fn strip_separators(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect()
}

pub fn canonical_upper(raw: &str) -> String {
    raw.to_ascii_uppercase()
}

pub fn canonical_lower(raw: &str) -> String {
    raw.to_lowercase()
}

pub fn canonical_phone(raw: &str) -> String {
    let digits = strip_separators(raw);
    if let Some(rest) = digits.strip_prefix("+91") {
        return rest.to_string();
    }
    // 국내 트렁크 접두 0
    match digits.strip_prefix('0') {
        Some(rest) if rest.len() == 10 => rest.to_string(),
        _ => digits,
    }
}

pub fn canonical_identity(raw: &str) -> String {
    raw.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_check_letter() {
        assert_eq!(pan_check_letter("ABCPE1234"), Some('A'));
        assert_eq!(pan_check_letter("BNZPM2501"), Some('Q'));
        assert_eq!(pan_check_letter("ABC"), None);
    }

    #[test]
    fn test_validate_pan() {
        assert!(validate_pan("ABCPE1234A"));
        assert!(validate_pan("BNZPM2501Q"));
        assert!(validate_pan("abcpe1234a"));

        // 숫자 하나 변경 → 체크 문자 불일치
        assert!(!validate_pan("ABCPE1235A"));
        // 잘못된 보유자 유형
        assert!(!validate_pan("ABCDE1234A"));
        assert!(!validate_pan("ABCPE12345"));
    }

    #[test]
    fn test_pan_single_substitution_detected() {
        let valid = "ABCPE1234A";
        for pos in 5..9 {
            for d in b'0'..=b'9' {
                let mut bytes = valid.as_bytes().to_vec();
                if bytes[pos] == d {
                    continue;
                }
                bytes[pos] = d;
                let altered = String::from_utf8(bytes).unwrap();
                assert!(!validate_pan(&altered), "{} should fail", altered);
            }
        }
    }

    #[test]
    fn test_verhoeff() {
        // 236 → 체크 숫자 3
        assert_eq!(verhoeff_check_digit("236"), Some(3));
        assert!(verhoeff_valid("2363"));
        assert!(!verhoeff_valid("2364"));
        assert_eq!(verhoeff_check_digit("23456789012"), Some(4));
    }

    #[test]
    fn test_validate_aadhaar() {
        assert!(validate_aadhaar("2345 6789 0124"));
        assert!(validate_aadhaar("234567890124"));
        assert!(!validate_aadhaar("2345 6789 0125"));
        // 0, 1로 시작 불가
        assert!(!validate_aadhaar("1234 5678 9012"));
        assert!(!validate_aadhaar("2345 6789 012"));
    }

    #[test]
    fn test_validate_ifsc() {
        assert!(validate_ifsc("SBIN0001234"));
        assert!(validate_ifsc("HDFC0ABC123"));
        assert!(!validate_ifsc("SBIN1001234"));
        assert!(!validate_ifsc("SBI0001234"));
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("9876543210"));
        assert!(validate_phone("+91 9876543210"));
        assert_eq!(canonical_phone("+91-9876543210"), "9876543210");
        assert!(!validate_phone("5876543210"));
    }

    #[test]
    fn test_phone_trunk_prefix() {
        assert!(validate_phone("09876543210"));
        assert_eq!(canonical_phone("09876543210"), "9876543210");
        assert_eq!(canonical_phone("0987654321"), "0987654321");
        assert!(!validate_phone("05876543210"));
    }

    #[test]
    fn test_validate_account_number() {
        assert!(validate_account_number("123456789012"));
        assert!(validate_account_number("1234-5678-9012"));
        assert!(!validate_account_number("12345678"));
        assert!(!validate_account_number("111111111111"));
        assert_eq!(strip_separators("1234-5678 9012"), "123456789012");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ravi.kumar@example.co.in"));
        assert!(!validate_email("ravi..kumar@example.com"));
        assert!(!validate_email("ravi@localhost"));
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("Rs. 45000"));
        assert!(validate_amount("₹ 1,50,000"));
        assert!(validate_amount("INR 2,500,000.00"));
        assert!(validate_amount("Rs.5,000.5"));
        assert!(!validate_amount("Rs. 1,0000"));
        assert!(!validate_amount("Rs. 45,00,0"));
        assert!(!validate_amount("Rs. 12.345"));
    }

    #[test]
    fn test_canonical_amount() {
        assert_eq!(canonical_amount("Rs. 1,50,000.5"), "150000.50");
        assert_eq!(canonical_amount("₹45000"), "45000.00");
        assert_eq!(canonical_amount("INR 007"), "7.00");
    }

    #[test]
    fn test_dates() {
        assert!(validate_date("15/08/2023"));
        assert!(validate_date("2023-08-15"));
        assert!(validate_date("29/02/2024"));
        assert!(!validate_date("29/02/2023"));
        assert!(!validate_date("32/01/2024"));
        assert!(!validate_date("15/08-2023"));

        assert_eq!(canonical_date("5/8/2023"), "2023-08-05");
        assert_eq!(canonical_date("31/02/2023"), "31/02/2023");
    }

    #[test]
    fn test_percentage() {
        assert!(validate_percentage("8.5%"));
        assert!(validate_percentage("100 %"));
        assert!(!validate_percentage("250%"));
        assert_eq!(canonical_percentage("100 %"), "100%");
    }

    #[test]
    fn test_pin_code() {
        assert!(validate_pin_code("560001"));
        assert!(!validate_pin_code("060001"));
    }
}
