use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader};
use csv::ReaderBuilder;
use encoding_rs::{Encoding, EUC_KR, UTF_16BE, UTF_16LE, UTF_8};
use tracing::debug;

use crate::domain::RawTable;
use crate::error::StrategyError;

/// One way of turning bytes into an untyped grid.
pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn parse(&self, bytes: &[u8]) -> Result<RawTable, StrategyError>;
}

/// The default attempt order: workbook first, then delimited text per encoding.
pub fn default_strategies() -> Vec<Box<dyn ParseStrategy>> {
    vec![
        Box::new(SpreadsheetStrategy),
        Box::new(DelimitedTextStrategy::new(TextEncoding::Utf8Sig)),
        Box::new(DelimitedTextStrategy::new(TextEncoding::Cp949)),
        Box::new(DelimitedTextStrategy::new(TextEncoding::Utf16)),
    ]
}

/// First worksheet of any workbook format calamine recognises.
pub struct SpreadsheetStrategy;

impl ParseStrategy for SpreadsheetStrategy {
    fn name(&self) -> &str {
        "spreadsheet"
    }

    fn parse(&self, bytes: &[u8]) -> Result<RawTable, StrategyError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| StrategyError::Workbook(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| StrategyError::Workbook("workbook has no worksheets".to_string()))?
            .map_err(|e| StrategyError::Workbook(e.to_string()))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        non_empty(RawTable::new(rows))
    }
}

/// Text encodings tried for delimited exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, with or without a byte-order mark.
    Utf8Sig,
    /// Korean legacy code page. encoding_rs decodes `euc-kr` as windows-949,
    /// so one decoder covers both EUC-KR and CP949 exports.
    Cp949,
    /// UTF-16 with a byte-order mark ("Unicode text" exports).
    Utf16,
}

impl TextEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Cp949 => "cp949",
            TextEncoding::Utf16 => "utf-16",
        }
    }

    /// Strict decode: malformed input is an error, never replaced.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, StrategyError> {
        let (encoding, body): (&'static Encoding, &[u8]) = match self {
            TextEncoding::Utf8Sig => (UTF_8, bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)),
            TextEncoding::Cp949 => (EUC_KR, bytes),
            TextEncoding::Utf16 => match Encoding::for_bom(bytes) {
                Some((enc, bom_len)) if enc == UTF_16LE || enc == UTF_16BE => (enc, &bytes[bom_len..]),
                _ => return Err(StrategyError::Encoding(self.label())),
            },
        };

        encoding
            .decode_without_bom_handling_and_without_replacement(body)
            .map(|text| text.into_owned())
            .ok_or(StrategyError::Encoding(self.label()))
    }
}

/// Comma/semicolon/tab/pipe separated text in a fixed encoding.
pub struct DelimitedTextStrategy {
    encoding: TextEncoding,
    name: String,
}

impl DelimitedTextStrategy {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            name: format!("delimited/{}", encoding.label()),
        }
    }
}

impl ParseStrategy for DelimitedTextStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, bytes: &[u8]) -> Result<RawTable, StrategyError> {
        let text = self.encoding.decode(bytes)?;
        let delimiter = detect_delimiter(&text);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for (index, result) in reader.records().enumerate() {
            match result {
                Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
                Err(e) => {
                    debug!("{}: skipping malformed record {}: {}", self.name, index, e);
                    skipped += 1;
                }
            }
        }

        if rows.is_empty() && skipped > 0 {
            return Err(StrategyError::Delimited(format!(
                "all {} records were malformed",
                skipped
            )));
        }

        non_empty(RawTable::new(rows))
    }
}

/// Pick the delimiter whose per-line count is most frequent and most consistent.
pub fn detect_delimiter(content: &str) -> u8 {
    let candidates = [b',', b';', b'\t', b'|'];
    let sample_lines: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(10)
        .collect();

    let mut best_delimiter = b',';
    let mut best_score = 0.0f32;

    if sample_lines.is_empty() {
        return best_delimiter;
    }

    for &delimiter in &candidates {
        let field_counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delimiter).count())
            .collect();

        let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
        let variance = field_counts
            .iter()
            .map(|&x| (x as f32 - avg).powi(2))
            .sum::<f32>()
            / field_counts.len() as f32;

        let score = avg / (1.0 + variance.sqrt());
        if score > best_score {
            best_score = score;
            best_delimiter = delimiter;
        }
    }

    best_delimiter
}

fn non_empty(table: RawTable) -> Result<RawTable, StrategyError> {
    if table.is_empty() {
        Err(StrategyError::Empty)
    } else {
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\nd,e,f"), b',');
        assert_eq!(detect_delimiter("a;b;c\nd;e;f"), b';');
        assert_eq!(detect_delimiter("a\tb\tc\nd\te\tf"), b'\t');
    }

    #[test]
    fn test_detect_delimiter_ignores_multibyte_text() {
        // Hangul syllables must not be mistaken for delimiters.
        assert_eq!(detect_delimiter("농가명|상품명\n행복농장|사과"), b'|');
    }

    #[test]
    fn test_spreadsheet_strategy_rejects_text() {
        let err = SpreadsheetStrategy.parse(b"a,b\n1,2").unwrap_err();
        assert!(matches!(err, StrategyError::Workbook(_)));
    }

    #[test]
    fn test_spreadsheet_strategy_reads_xlsx() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "판매내역").unwrap();
        for (col, label) in ["농가명", "상품명", "회원번호", "회원명"].iter().enumerate() {
            sheet.write_string(1, col as u16, *label).unwrap();
        }
        sheet.write_string(2, 0, "행복농장").unwrap();
        sheet.write_string(2, 1, "사과").unwrap();
        sheet.write_number(2, 2, 1.0).unwrap();
        sheet.write_string(2, 3, "김철수").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let table = SpreadsheetStrategy.parse(&bytes).unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0][0], "판매내역");
        assert_eq!(table.rows[0][1], "");
        assert_eq!(table.rows[1], vec!["농가명", "상품명", "회원번호", "회원명"]);
        // Whole-number cells come back without a trailing ".0".
        assert_eq!(table.rows[2], vec!["행복농장", "사과", "1", "김철수"]);
    }

    #[test]
    fn test_utf8_with_bom() {
        let bytes = b"\xEF\xBB\xBFname,phone\nKim,010";
        let table = DelimitedTextStrategy::new(TextEncoding::Utf8Sig)
            .parse(bytes)
            .unwrap();
        assert_eq!(table.rows[0], vec!["name", "phone"]);
        assert_eq!(table.rows[1], vec!["Kim", "010"]);
    }

    #[test]
    fn test_cp949_decodes_legacy_korean() {
        let (bytes, _, had_errors) = EUC_KR.encode("농가명,회원명\n행복농장,김철수\n");
        assert!(!had_errors);

        assert_eq!(
            DelimitedTextStrategy::new(TextEncoding::Utf8Sig).parse(&bytes),
            Err(StrategyError::Encoding("utf-8-sig"))
        );

        let table = DelimitedTextStrategy::new(TextEncoding::Cp949)
            .parse(&bytes)
            .unwrap();
        assert_eq!(table.rows[0], vec!["농가명", "회원명"]);
        assert_eq!(table.rows[1], vec!["행복농장", "김철수"]);
    }

    #[test]
    fn test_utf16_requires_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "a\tb\n1\t2".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let table = DelimitedTextStrategy::new(TextEncoding::Utf16)
            .parse(&bytes)
            .unwrap();
        assert_eq!(table.rows[1], vec!["1", "2"]);

        assert!(DelimitedTextStrategy::new(TextEncoding::Utf16)
            .parse(b"a,b")
            .is_err());
    }

    #[test]
    fn test_ragged_rows_are_kept() {
        let table = DelimitedTextStrategy::new(TextEncoding::Utf8Sig)
            .parse(b"title\na,b,c\nd")
            .unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1].len(), 3);
    }

    #[test]
    fn test_blank_text_is_empty() {
        assert_eq!(
            DelimitedTextStrategy::new(TextEncoding::Utf8Sig).parse(b"\n , \n"),
            Err(StrategyError::Empty)
        );
    }
}
