//! DOCX 텍스트 추출
//!
//! docx-rs로 본문 문단과 표 셀 문단의 텍스트를 읽습니다.

use std::path::Path;

use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent, TableChild,
    TableRowChild,
};

use crate::error::{RagError, Result};
use crate::normalizer::PARAGRAPH_BREAK;

/// DOCX 바이트에서 텍스트 추출 (문단 단위 `\n\n` 구분)
pub fn extract_docx_text(bytes: &[u8], path: &Path) -> Result<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| RagError::parse(path, format!("Failed to read DOCX: {}", e)))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => push_paragraph(p, &mut paragraphs),
            DocumentChild::Table(t) => push_table(t, &mut paragraphs),
            _ => {}
        }
    }

    Ok(paragraphs.join(PARAGRAPH_BREAK))
}

fn push_paragraph(paragraph: &Paragraph, out: &mut Vec<String>) {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    if !text.trim().is_empty() {
        out.push(text);
    }
}

fn push_table(table: &Table, out: &mut Vec<String>) {
    for TableChild::TableRow(row) in &table.rows {
        for TableRowChild::TableCell(cell) in &row.cells {
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(p) => push_paragraph(p, out),
                    TableCellContent::Table(t) => push_table(t, out),
                    _ => {}
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
