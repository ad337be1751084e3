use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::models::Transaction;

/// Semantic role assigned to a parsed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    None,
    Date,
    Description,
    Amount,
}

impl ColumnType {
    pub fn label(self) -> &'static str {
        match self {
            ColumnType::None => "None",
            ColumnType::Date => "Date",
            ColumnType::Description => "Description",
            ColumnType::Amount => "Amount",
        }
    }

    pub fn next(self) -> ColumnType {
        match self {
            ColumnType::None => ColumnType::Date,
            ColumnType::Date => ColumnType::Description,
            ColumnType::Description => ColumnType::Amount,
            ColumnType::Amount => ColumnType::None,
        }
    }
}

/// Date layouts offered by the wizard. `/`, `-` and `.` are all accepted
/// between the fields of an incoming value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    YearMonthDay,
    MonthDayYear,
    DayMonthYear,
}

impl DateFormat {
    pub const ALL: [DateFormat; 3] = [
        DateFormat::YearMonthDay,
        DateFormat::MonthDayYear,
        DateFormat::DayMonthYear,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DateFormat::YearMonthDay => "y-m-d",
            DateFormat::MonthDayYear => "m-d-y",
            DateFormat::DayMonthYear => "d-m-y",
        }
    }
}

/// Encodings offered by the wizard's selector, in display order.
pub const ENCODINGS: &[&str] = &[
    "UTF-8",
    "UTF-16LE",
    "UTF-16BE",
    "windows-1252",
    "ISO-8859-15",
    "windows-1251",
    "KOI8-R",
    "macintosh",
    "Shift_JIS",
    "EUC-JP",
    "GBK",
    "Big5",
];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("could not open {path}: {source}")]
    FileOpen {
        path: String,
        source: std::io::Error,
    },
    #[error("could not determine the character encoding of {path}")]
    EncodingGuess { path: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0:?} cannot be used as a field separator")]
    BadSeparator(char),
    #[error("the file contains no data rows")]
    NoRows,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unknown encoding: {0}")]
    Unknown(String),
    #[error("the file cannot be read as {0}")]
    Conversion(String),
}

/// The parsing configuration a preview reflects: encoding, separator set
/// and date layout. The separator set is what the tokenizer consumes;
/// which checkboxes produced it is the wizard's business.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    pub encoding: String,
    pub separators: BTreeSet<char>,
    pub date_format: DateFormat,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            encoding: "UTF-8".to_string(),
            separators: BTreeSet::from([',']),
            date_format: DateFormat::YearMonthDay,
        }
    }
}

/// The mutable working set for one import session: the raw file, its
/// decoded text, the tokenized rows, per-column types, and the rows that
/// failed transaction construction.
#[derive(Debug, Default)]
pub struct ParseData {
    raw: Vec<u8>,
    text: String,
    pub orig_lines: Vec<Vec<String>>,
    pub column_types: Vec<ColumnType>,
    pub options: ParseOptions,
    pub error_lines: BTreeSet<usize>,
    pub transactions: Vec<Transaction>,
}

impl ParseData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the file and decode it with a guessed encoding. A failed
    /// guess is not fatal: the text is loaded as lossy UTF-8 with a blank
    /// encoding label, and the caller surfaces the error.
    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        self.raw = std::fs::read(path).map_err(|source| LoadError::FileOpen {
            path: path.display().to_string(),
            source,
        })?;
        match guess_encoding(&self.raw) {
            Some((label, text)) => {
                debug!(encoding = %label, bytes = self.raw.len(), "loaded import file");
                self.options.encoding = label;
                self.text = text;
                Ok(())
            }
            None => {
                self.decode_lossy();
                Err(LoadError::EncodingGuess {
                    path: path.display().to_string(),
                })
            }
        }
    }

    /// Re-tokenize the decoded text with the current options. All-or-
    /// nothing: on error the previous rows and column types are untouched.
    pub fn parse(&mut self, guess_column_types: bool) -> Result<(), ParseError> {
        for &sep in &self.options.separators {
            if sep == '"' || sep == '\n' || sep == '\r' {
                return Err(ParseError::BadSeparator(sep));
            }
        }
        let lines = tokenize(&self.text, &self.options.separators)?;
        let ncols = lines.iter().map(|l| l.len()).max().unwrap_or(0);
        self.orig_lines = lines;
        self.column_types.resize(ncols, ColumnType::None);
        if guess_column_types {
            self.guess_column_types();
        }
        Ok(())
    }

    /// Best-effort decode for a file whose encoding could not be guessed:
    /// lossy UTF-8 under a blank encoding label.
    pub fn decode_lossy(&mut self) {
        self.options.encoding = String::new();
        self.text = String::from_utf8_lossy(&self.raw).into_owned();
    }

    /// Re-decode the raw bytes as `label`. The current text survives a
    /// failed conversion.
    pub fn convert_encoding(&mut self, label: &str) -> Result<(), EncodingError> {
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| EncodingError::Unknown(label.to_string()))?;
        let (text, used, had_errors) = encoding.decode(&self.raw);
        if had_errors {
            return Err(EncodingError::Conversion(label.to_string()));
        }
        self.text = text.into_owned();
        self.options.encoding = used.name().to_string();
        Ok(())
    }

    /// Build transactions from rows whose Date and Amount columns parse.
    /// Failing rows are recorded in `error_lines`, never raised. With
    /// `redo_errors` only the current error rows are re-attempted and the
    /// transactions built so far are kept.
    pub fn build_transactions(&mut self, redo_errors: bool) {
        let date_col = self.find_column(ColumnType::Date);
        let amount_col = self.find_column(ColumnType::Amount);
        let desc_col = self.find_column(ColumnType::Description);

        let rows: Vec<usize> = if redo_errors {
            // A reparse may have changed the row count under us.
            self.error_lines.retain(|&i| i < self.orig_lines.len());
            self.error_lines.iter().copied().collect()
        } else {
            self.transactions.clear();
            self.error_lines.clear();
            (0..self.orig_lines.len()).collect()
        };

        for i in rows {
            match self.row_to_transaction(i, date_col, amount_col, desc_col) {
                Some(txn) => {
                    self.error_lines.remove(&i);
                    self.transactions.push(txn);
                }
                None => {
                    self.error_lines.insert(i);
                }
            }
        }
        debug!(
            transactions = self.transactions.len(),
            errors = self.error_lines.len(),
            "built transactions"
        );
    }

    pub fn find_column(&self, column_type: ColumnType) -> Option<usize> {
        self.column_types.iter().position(|t| *t == column_type)
    }

    fn row_to_transaction(
        &self,
        row_index: usize,
        date_col: Option<usize>,
        amount_col: Option<usize>,
        desc_col: Option<usize>,
    ) -> Option<Transaction> {
        let row = self.orig_lines.get(row_index)?;
        let date = parse_date(row.get(date_col?)?, self.options.date_format)?;
        let amount = parse_amount(row.get(amount_col?)?)?;
        let description = desc_col
            .and_then(|c| row.get(c))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        Some(Transaction {
            date: date.format("%Y-%m-%d").to_string(),
            description,
            amount,
        })
    }

    /// Heuristic column typing for the initial parse: the first column
    /// whose samples read as dates, the first reading as amounts, and the
    /// first remaining non-empty column as the description. Existing
    /// assignments are discarded; duplicates cannot arise.
    fn guess_column_types(&mut self) {
        let ncols = self.column_types.len();
        self.column_types = vec![ColumnType::None; ncols];

        let sample: Vec<&Vec<String>> = self.orig_lines.iter().take(20).collect();
        let majority = |re: &Regex, col: usize| {
            let mut seen = 0usize;
            let mut hits = 0usize;
            for row in &sample {
                if let Some(value) = row.get(col) {
                    let value = value.trim();
                    if !value.is_empty() {
                        seen += 1;
                        if re.is_match(value) {
                            hits += 1;
                        }
                    }
                }
            }
            seen > 0 && hits * 2 > seen
        };

        let mut date_col = None;
        let mut amount_col = None;
        for col in 0..ncols {
            if date_col.is_none() && majority(date_re(), col) {
                date_col = Some(col);
                continue;
            }
            if amount_col.is_none() && majority(amount_re(), col) {
                amount_col = Some(col);
            }
        }
        let desc_col = (0..ncols).find(|&col| {
            Some(col) != date_col
                && Some(col) != amount_col
                && sample
                    .iter()
                    .any(|row| row.get(col).is_some_and(|v| !v.trim().is_empty()))
        });

        if let Some(col) = date_col {
            self.column_types[col] = ColumnType::Date;
        }
        if let Some(col) = amount_col {
            self.column_types[col] = ColumnType::Amount;
        }
        if let Some(col) = desc_col {
            self.column_types[col] = ColumnType::Description;
        }
    }

    #[cfg(test)]
    pub fn from_text(text: &str) -> Self {
        Self {
            raw: text.as_bytes().to_vec(),
            text: text.to_string(),
            ..Self::default()
        }
    }
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}$").unwrap())
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\(?-?[$€£]?[\d,]+(\.\d+)?\)?$").unwrap())
}

/// Guess the encoding of `raw` and decode it: BOM first, then strict
/// UTF-8, then Windows-1252 provided the bytes look like text at all.
fn guess_encoding(raw: &[u8]) -> Option<(String, String)> {
    if let Some((encoding, _)) = encoding_rs::Encoding::for_bom(raw) {
        let (text, used, had_errors) = encoding.decode(raw);
        if !had_errors {
            return Some((used.name().to_string(), text.into_owned()));
        }
        return None;
    }
    if let Ok(text) = std::str::from_utf8(raw) {
        return Some(("UTF-8".to_string(), text.to_string()));
    }
    if raw.contains(&0) {
        return None;
    }
    let (text, used, _) = encoding_rs::WINDOWS_1252.decode(raw);
    Some((used.name().to_string(), text.into_owned()))
}

fn tokenize(text: &str, separators: &BTreeSet<char>) -> Result<Vec<Vec<String>>, ParseError> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let fields = split_line(line, separators);
        if fields.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(fields);
    }
    if rows.is_empty() {
        return Err(ParseError::NoRows);
    }
    Ok(rows)
}

/// Quote-aware split of one line. The lowest separator drives the `csv`
/// reader; any remaining separator characters then split the unquoted
/// fields it produced.
fn split_line(line: &str, separators: &BTreeSet<char>) -> Vec<String> {
    let mut seps = separators.iter().copied();
    let primary = match seps.next() {
        Some(c) => c,
        None => return vec![line.to_string()],
    };
    let rest: Vec<char> = seps.collect();

    let fields: Vec<String> = if primary.is_ascii() {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(primary as u8)
            .from_reader(line.as_bytes());
        match rdr.records().next() {
            Some(Ok(record)) => record.iter().map(str::to_string).collect(),
            _ => vec![line.to_string()],
        }
    } else {
        line.split(primary).map(str::to_string).collect()
    };

    if rest.is_empty() {
        return fields;
    }
    fields
        .into_iter()
        .flat_map(|field| {
            field
                .split(|c| rest.contains(&c))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Parse a date value according to `format`. Two-digit years are
/// windowed: 70..99 into the 1900s, everything below into the 2000s.
pub fn parse_date(raw: &str, format: DateFormat) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split(['/', '-', '.']).collect();
    if parts.len() != 3 {
        return None;
    }
    let (y, m, d) = match format {
        DateFormat::YearMonthDay => (parts[0], parts[1], parts[2]),
        DateFormat::MonthDayYear => (parts[2], parts[0], parts[1]),
        DateFormat::DayMonthYear => (parts[2], parts[1], parts[0]),
    };
    let mut year: i32 = y.trim().parse().ok()?;
    let month: u32 = m.trim().parse().ok()?;
    let day: u32 = d.trim().parse().ok()?;
    if year < 100 {
        year += if year >= 70 { 1900 } else { 2000 };
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse an amount value: thousands separators, a leading currency sign
/// and parenthesized negatives are all accepted.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '"' | '$' | '€' | '£'))
        .collect();
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seps(chars: &[char]) -> BTreeSet<char> {
        chars.iter().copied().collect()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("\"500.00\""), Some(500.0));
        assert_eq!(parse_amount("  -42.50  "), Some(-42.5));
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("(500.00)"), Some(-500.0));
        assert_eq!(parse_amount("€12.00"), Some(12.0));
        assert_eq!(parse_amount("not_a_number"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(parse_date("2025-01-15", DateFormat::YearMonthDay), Some(d));
        assert_eq!(parse_date("01/15/2025", DateFormat::MonthDayYear), Some(d));
        assert_eq!(parse_date("15.01.2025", DateFormat::DayMonthYear), Some(d));
        assert_eq!(parse_date("15.01.25", DateFormat::DayMonthYear), Some(d));
        assert_eq!(
            parse_date("15/01/75", DateFormat::DayMonthYear),
            NaiveDate::from_ymd_opt(1975, 1, 15)
        );
        assert_eq!(parse_date("01/15/2025", DateFormat::DayMonthYear), None);
        assert_eq!(parse_date("2025-01", DateFormat::YearMonthDay), None);
        assert_eq!(parse_date("02/30/2025", DateFormat::MonthDayYear), None);
    }

    #[test]
    fn test_split_line_respects_quotes() {
        let fields = split_line("01/31/2025,MOBILE DEPOSIT,\"2,000.00\"", &seps(&[',']));
        assert_eq!(fields, vec!["01/31/2025", "MOBILE DEPOSIT", "2,000.00"]);
    }

    #[test]
    fn test_split_line_multiple_separators() {
        let fields = split_line("a,b;c", &seps(&[',', ';']));
        assert_eq!(fields, vec!["a", "b", "c"]);
        // Insertion order must not matter.
        let fields = split_line("a,b;c", &seps(&[';', ',']));
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_line_no_separators() {
        let fields = split_line("one whole line", &seps(&[]));
        assert_eq!(fields, vec!["one whole line"]);
    }

    #[test]
    fn test_parse_rejects_bad_separator() {
        let mut data = ParseData::from_text("a,b\n");
        data.options.separators = seps(&['"']);
        assert_eq!(data.parse(false), Err(ParseError::BadSeparator('"')));
        // Nothing was touched by the failed parse.
        assert!(data.orig_lines.is_empty());
    }

    #[test]
    fn test_parse_empty_text_is_no_rows() {
        let mut data = ParseData::from_text("\n  \n");
        assert_eq!(data.parse(false), Err(ParseError::NoRows));
    }

    #[test]
    fn test_parse_skips_blank_lines_and_sizes_columns() {
        let mut data = ParseData::from_text("a,b,c\n\nd,e\n");
        data.parse(false).unwrap();
        assert_eq!(data.orig_lines.len(), 2);
        assert_eq!(data.column_types.len(), 3);
    }

    #[test]
    fn test_reparse_preserves_column_types() {
        let mut data = ParseData::from_text("2025-01-15,COFFEE,-4.50\n");
        data.parse(true).unwrap();
        assert_eq!(
            data.column_types,
            vec![ColumnType::Date, ColumnType::Description, ColumnType::Amount]
        );
        data.options.separators = seps(&[',', ';']);
        data.parse(false).unwrap();
        assert_eq!(
            data.column_types,
            vec![ColumnType::Date, ColumnType::Description, ColumnType::Amount]
        );
    }

    #[test]
    fn test_guess_column_types() {
        let mut data = ParseData::from_text(
            "2025-01-15,ADOBE CREATIVE,-50.00\n2025-01-16,STRIPE PAYOUT,\"2,500.00\"\n",
        );
        data.parse(true).unwrap();
        assert_eq!(
            data.column_types,
            vec![ColumnType::Date, ColumnType::Description, ColumnType::Amount]
        );
    }

    #[test]
    fn test_guess_handles_amount_before_date() {
        let mut data = ParseData::from_text("-50.00,2025-01-15\n120.00,2025-01-16\n");
        data.parse(true).unwrap();
        assert_eq!(data.column_types[0], ColumnType::Amount);
        assert_eq!(data.column_types[1], ColumnType::Date);
    }

    #[test]
    fn test_convert_encoding_failure_keeps_text() {
        let mut data = ParseData::new();
        data.raw = vec![b'C', b'A', b'F', 0xC9, b',', b'1'];
        data.text = "CAFE,1".to_string();
        assert_eq!(
            data.convert_encoding("UTF-8"),
            Err(EncodingError::Conversion("UTF-8".to_string()))
        );
        assert_eq!(data.text, "CAFE,1");

        assert_eq!(
            data.convert_encoding("no-such-charset"),
            Err(EncodingError::Unknown("no-such-charset".to_string()))
        );

        data.convert_encoding("windows-1252").unwrap();
        assert_eq!(data.text, "CAFÉ,1");
        assert_eq!(data.options.encoding, "windows-1252");
    }

    #[test]
    fn test_load_file_guesses_utf8_and_1252() {
        let dir = tempfile::tempdir().unwrap();
        let utf8 = dir.path().join("utf8.csv");
        std::fs::write(&utf8, "2025-01-15,CAFÉ,-4.50\n").unwrap();
        let mut data = ParseData::new();
        data.load_file(&utf8).unwrap();
        assert_eq!(data.options.encoding, "UTF-8");

        let latin = dir.path().join("latin.csv");
        std::fs::write(&latin, [b'C', b'A', b'F', 0xC9, b'\n']).unwrap();
        let mut data = ParseData::new();
        data.load_file(&latin).unwrap();
        assert_eq!(data.options.encoding, "windows-1252");
        data.parse(false).unwrap();
        assert_eq!(data.orig_lines[0][0], "CAFÉ");
    }

    #[test]
    fn test_load_file_missing_is_fatal_open_error() {
        let mut data = ParseData::new();
        let err = data.load_file(Path::new("/no/such/file.csv")).unwrap_err();
        assert!(matches!(err, LoadError::FileOpen { .. }));
    }

    #[test]
    fn test_load_file_binary_degrades_with_guess_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary.csv");
        std::fs::write(&path, [0xFF, 0x00, b'a', b',', b'b']).unwrap();
        let mut data = ParseData::new();
        let err = data.load_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::EncodingGuess { .. }));
        // Best-effort text is still available for the preview.
        assert!(data.options.encoding.is_empty());
        assert!(data.text.contains("a,b"));
    }

    #[test]
    fn test_build_transactions_records_error_lines() {
        let mut data = ParseData::from_text(
            "2025-01-15,PAYMENT ONE,-100.00\n\
             2025-01-16,PAYMENT TWO,-250.00\n\
             2025-01-17,DEPOSIT,500.00\n\
             17.01.2025,BAD DATE,10.00\n",
        );
        data.parse(true).unwrap();
        data.build_transactions(false);
        assert_eq!(data.transactions.len(), 3);
        assert_eq!(data.error_lines.iter().copied().collect::<Vec<_>>(), [3]);

        // Corrected date format: only the error row is re-attempted.
        data.options.date_format = DateFormat::DayMonthYear;
        data.build_transactions(true);
        assert!(data.error_lines.is_empty());
        assert_eq!(data.transactions.len(), 4);
        assert_eq!(data.transactions[3].date, "2025-01-17");
        assert_eq!(data.transactions[3].description, "BAD DATE");
    }

    #[test]
    fn test_build_transactions_without_required_columns() {
        let mut data = ParseData::from_text("just,text,here\nmore,text,rows\n");
        data.parse(false).unwrap();
        data.build_transactions(false);
        assert!(data.transactions.is_empty());
        assert_eq!(data.error_lines.len(), 2);
    }
}
