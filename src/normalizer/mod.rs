//! 텍스트 정규화 모듈
//!
//! 파서가 뽑아낸 원문 텍스트를 균일한 형태로 바꿉니다.
//! - 문단 내부의 연속 공백/줄바꿈 → 공백 하나
//! - 빈 줄, 폼피드(PDF 페이지 구분) → 문단 구분 `"\n\n"`
//! - 제어 문자, BOM, 폭 없는 문자, U+FFFD 제거
//!
//! 결과는 멱등입니다: `normalize(normalize(x)) == normalize(x)`.

/// 문단 구분자
pub const PARAGRAPH_BREAK: &str = "\n\n";

/// 원문 텍스트 정규화
pub fn normalize(raw: &str) -> String {
    let cleaned = strip_invisible(raw);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in cleaned.split('\n') {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs.join(PARAGRAPH_BREAK)
}

/// 바이트 입력 정규화
///
/// 잘못된 UTF-8 시퀀스는 실패 대신 버려집니다.
pub fn normalize_bytes(raw: &[u8]) -> String {
    normalize(&String::from_utf8_lossy(raw))
}

/// 문자 단위 구간 `[start, end)` 슬라이스
///
/// 엔티티 오프셋과 청크 구간은 모두 `char` 단위입니다.
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let byte_at = |idx: usize| {
        if idx == 0 {
            Some(0)
        } else {
            text.char_indices()
                .map(|(b, _)| b)
                .chain(std::iter::once(text.len()))
                .nth(idx)
        }
    };
    let from = byte_at(start)?;
    let to = byte_at(end)?;
    text.get(from..to)
}

/// 제어/비가시 문자 정리
///
/// `\r\n`, `\r` → `\n`, 폼피드 → 빈 줄, 탭 등 나머지 공백 → `' '`.
fn strip_invisible(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    out.push('\n');
                }
            }
            '\n' => out.push('\n'),
            '\x0c' => out.push_str("\n\n"),
            c if is_invisible(c) => {}
            c if c.is_whitespace() => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}

/// 화면에 보이지 않는 포맷 문자 (U+FFFD 포함)
#[inline]
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{00AD}' | '\u{FFFD}'
    )
}

fn flush_paragraph(current: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }

    let joined = current
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");

    if !joined.is_empty() {
        paragraphs.push(joined);
    }
    current.clear();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(normalize("Loan   amount\t\tis  45000"), "Loan amount is 45000");
    }

    #[test]
    fn test_single_newline_is_space() {
        assert_eq!(normalize("Loan\namount"), "Loan amount");
    }

    #[test]
    fn test_paragraph_breaks_preserved() {
        let raw = "First paragraph\nstill first.\n\n\n  \nSecond paragraph.";
        assert_eq!(normalize(raw), "First paragraph still first.\n\nSecond paragraph.");
    }

    #[test]
    fn test_crlf_and_formfeed() {
        let raw = "Page one\r\n\r\nmore\x0cPage two";
        assert_eq!(normalize(raw), "Page one\n\nmore\n\nPage two");
    }

    #[test]
    fn test_strip_control_and_invisible() {
        let raw = "\u{FEFF}PAN\u{0007}: ABC\u{200B}DE\u{0000}";
        assert_eq!(normalize(raw), "PAN: ABCDE");
    }

    #[test]
    fn test_non_breaking_space() {
        assert_eq!(normalize("Rs.\u{00A0}5,000"), "Rs. 5,000");
    }

    #[test]
    fn test_invalid_utf8_dropped() {
        let bytes = b"Amount \xff\xfe 45000";
        assert_eq!(normalize_bytes(bytes), "Amount 45000");
    }

    #[test]
    fn test_char_slice() {
        let text = "₹ 500 ok";
        assert_eq!(char_slice(text, 0, 1), Some("₹"));
        assert_eq!(char_slice(text, 2, 5), Some("500"));
        assert_eq!(char_slice(text, 0, 8), Some(text));
        assert_eq!(char_slice(text, 3, 9), None);
        assert_eq!(char_slice(text, 4, 2), None);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t\r\n "), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "  a  b \n\n\n c\r\nd\x0c\x0ce ",
            "\u{FEFF}\t\tloan\u{00A0}application\n\n\n\nKYC \u{200D}",
            "안녕하세요   세계\n\n 두번째\n문단",
            "\r\r\r",
            "x\n \n \ny",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }
}
