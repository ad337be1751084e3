use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::models::Transaction;
use crate::parse::{
    ColumnType, DateFormat, EncodingError, LoadError, ParseData, ParseError,
};

/// The six stock separator checkboxes, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SepButton {
    Space,
    Tab,
    Comma,
    Colon,
    Semicolon,
    Hyphen,
}

impl SepButton {
    pub const ALL: [SepButton; 6] = [
        SepButton::Space,
        SepButton::Tab,
        SepButton::Comma,
        SepButton::Colon,
        SepButton::Semicolon,
        SepButton::Hyphen,
    ];

    pub fn ch(self) -> char {
        match self {
            SepButton::Space => ' ',
            SepButton::Tab => '\t',
            SepButton::Comma => ',',
            SepButton::Colon => ':',
            SepButton::Semicolon => ';',
            SepButton::Hyphen => '-',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SepButton::Space => "Space",
            SepButton::Tab => "Tab",
            SepButton::Comma => "Comma",
            SepButton::Colon => "Colon",
            SepButton::Semicolon => "Semicolon",
            SepButton::Hyphen => "Hyphen",
        }
    }
}

/// Checkbox and entry state for the separator row. This is the
/// user-visible source of truth; the parser's separator set is derived
/// from it, deduplicated, on every reparse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatorConfig {
    checked: [bool; 6],
    pub custom_checked: bool,
    pub custom_text: String,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        let mut checked = [false; 6];
        checked[SepButton::Comma as usize] = true;
        Self {
            checked,
            custom_checked: false,
            custom_text: String::new(),
        }
    }
}

impl SeparatorConfig {
    pub fn is_checked(&self, button: SepButton) -> bool {
        self.checked[button as usize]
    }

    /// Every character of the custom entry is an individual separator.
    pub fn to_set(&self) -> BTreeSet<char> {
        let mut set = BTreeSet::new();
        for button in SepButton::ALL {
            if self.checked[button as usize] {
                set.insert(button.ch());
            }
        }
        if self.custom_checked {
            set.extend(self.custom_text.chars());
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    PreviewAll,
    PreviewErrors,
    Committed,
    Cancelled,
}

/// UI-facing projection of the parse data: which rows are shown, the
/// working per-column type assignment, and whether the user confirmed
/// the displayed configuration. Never persisted.
#[derive(Debug, Default)]
pub struct PreviewState {
    pub errors_only: bool,
    pub approved: bool,
    pub column_types: Vec<ColumnType>,
}

/// The import wizard: owns the parse data and the preview, and keeps the
/// two consistent through the parse → preview → correct → reparse cycle.
/// Every operation that can fail reverts exactly the configuration
/// change that triggered it, so the displayed configuration always
/// matches the rows on screen.
pub struct ImportWizard {
    pub parse_data: ParseData,
    pub preview: PreviewState,
    pub separators: SeparatorConfig,
    pub date_format: DateFormat,
    pub encoding: String,
    stage: Stage,
}

impl ImportWizard {
    pub fn new() -> Self {
        Self {
            parse_data: ParseData::new(),
            preview: PreviewState::default(),
            separators: SeparatorConfig::default(),
            date_format: DateFormat::YearMonthDay,
            encoding: "UTF-8".to_string(),
            stage: Stage::Loading,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Load the file. `FileOpen` is fatal; `EncodingGuess` leaves a
    /// best-effort decode behind and the wizard keeps going.
    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        self.parse_data.load_file(path)
    }

    /// Initial parse with column-type guessing, then enter the preview.
    /// A parse error here is surfaced but the preview opens regardless,
    /// so the user can fix the configuration.
    pub fn begin_preview(&mut self) -> Result<(), ParseError> {
        self.parse_data.options.separators = self.separators.to_set();
        let result = self.parse_data.parse(true);
        self.preview.column_types = self.parse_data.column_types.clone();
        self.encoding = self.parse_data.options.encoding.clone();
        self.date_format = self.parse_data.options.date_format;
        self.stage = Stage::PreviewAll;
        result
    }

    /// Toggle one stock separator checkbox and reparse. On failure the
    /// checkbox is put back and the prior configuration stands.
    pub fn toggle_separator(&mut self, button: SepButton) -> Result<(), ParseError> {
        let i = button as usize;
        self.separators.checked[i] = !self.separators.checked[i];
        self.reparse().inspect_err(|_| {
            self.separators.checked[i] = !self.separators.checked[i];
            self.parse_data.options.separators = self.separators.to_set();
        })
    }

    /// Toggle the custom-separator checkbox and reparse, with the same
    /// revert-on-failure contract as the stock checkboxes.
    pub fn toggle_custom_separator(&mut self) -> Result<(), ParseError> {
        self.separators.custom_checked = !self.separators.custom_checked;
        self.reparse().inspect_err(|_| {
            self.separators.custom_checked = !self.separators.custom_checked;
            self.parse_data.options.separators = self.separators.to_set();
        })
    }

    /// Replace the custom separator text and reparse. On failure the
    /// previous text comes back.
    pub fn set_custom_separator(&mut self, text: &str) -> Result<(), ParseError> {
        let previous = std::mem::replace(&mut self.separators.custom_text, text.to_string());
        self.reparse().inspect_err(|_| {
            self.separators.custom_text = previous;
            self.parse_data.options.separators = self.separators.to_set();
        })
    }

    /// Switch to a new encoding: convert, reparse, refresh. On any
    /// failure the selector and the parse data stay on the previously
    /// accepted encoding.
    pub fn change_encoding(&mut self, label: &str) -> Result<(), EncodingError> {
        let previous = self.encoding.clone();
        self.parse_data.convert_encoding(label)?;
        if self.reparse().is_err() {
            // The previous encoding was accepted once, so converting
            // back restores the text the displayed rows came from.
            if previous.is_empty() {
                self.parse_data.decode_lossy();
            } else {
                let _ = self.parse_data.convert_encoding(&previous);
            }
            return Err(EncodingError::Conversion(label.to_string()));
        }
        self.encoding = self.parse_data.options.encoding.clone();
        debug!(encoding = %self.encoding, "encoding changed");
        Ok(())
    }

    pub fn set_date_format(&mut self, format: DateFormat) {
        self.date_format = format;
        self.parse_data.options.date_format = format;
    }

    /// Assign `new_type` to a column. Any other column already holding
    /// `new_type` is reset to None; duplicates are not allowed.
    pub fn edit_column_type(&mut self, column: usize, new_type: ColumnType) {
        if column >= self.preview.column_types.len() {
            return;
        }
        if new_type != ColumnType::None {
            for (i, t) in self.preview.column_types.iter_mut().enumerate() {
                if i != column && *t == new_type {
                    *t = ColumnType::None;
                }
            }
        }
        self.preview.column_types[column] = new_type;
    }

    /// The user accepted the displayed configuration: capture the
    /// working column assignment into the parse data.
    pub fn confirm_preview(&mut self) {
        self.parse_data.column_types = self.preview.column_types.clone();
        self.preview.approved = true;
    }

    pub fn cancel_preview(&mut self) {
        self.preview.approved = false;
        self.stage = Stage::Cancelled;
    }

    /// Switch the preview to the rows that failed, for another round of
    /// correction.
    pub fn show_errors(&mut self) {
        self.preview.errors_only = true;
        self.preview.approved = false;
        self.stage = Stage::PreviewErrors;
    }

    pub fn build_transactions(&mut self, redo_errors: bool) {
        self.parse_data.build_transactions(redo_errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.parse_data.error_lines.is_empty()
    }

    /// Row indices currently on display: everything, or only the rows
    /// that failed. A reparse can shrink the row set while stale error
    /// indices are still recorded, so out-of-range indices are skipped.
    pub fn displayed_rows(&self) -> Vec<usize> {
        if self.preview.errors_only {
            self.parse_data
                .error_lines
                .iter()
                .copied()
                .filter(|&i| i < self.parse_data.orig_lines.len())
                .collect()
        } else {
            (0..self.parse_data.orig_lines.len()).collect()
        }
    }

    /// Hand the built transactions over; unresolved error rows are
    /// dropped with them.
    pub fn commit(&mut self) -> Vec<Transaction> {
        self.stage = Stage::Committed;
        std::mem::take(&mut self.parse_data.transactions)
    }

    fn reparse(&mut self) -> Result<(), ParseError> {
        self.parse_data.options.separators = self.separators.to_set();
        self.parse_data.parse(false)?;
        let ncols = self.parse_data.column_types.len();
        self.preview.column_types.resize(ncols, ColumnType::None);
        Ok(())
    }
}

impl Default for ImportWizard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wizard_from(text: &str) -> ImportWizard {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stmt.csv");
        std::fs::write(&path, text).unwrap();
        let mut wizard = ImportWizard::new();
        wizard.load_file(&path).unwrap();
        wizard.begin_preview().unwrap();
        wizard
    }

    #[test]
    fn test_begin_preview_enters_preview_all() {
        let wizard = wizard_from("2025-01-15,COFFEE,-4.50\n");
        assert_eq!(wizard.stage(), Stage::PreviewAll);
        assert!(!wizard.preview.errors_only);
        assert!(!wizard.preview.approved);
        assert_eq!(wizard.displayed_rows(), vec![0]);
    }

    #[test]
    fn test_toggle_separator_reparses() {
        let mut wizard = wizard_from("a;b;c\nd;e;f\n");
        assert_eq!(wizard.parse_data.orig_lines[0].len(), 1);
        wizard.toggle_separator(SepButton::Semicolon).unwrap();
        assert_eq!(wizard.parse_data.orig_lines[0].len(), 3);
        assert_eq!(wizard.preview.column_types.len(), 3);
    }

    #[test]
    fn test_failed_toggle_restores_checkbox_state() {
        // With the semicolon checked every field of every row is empty,
        // so the reparse fails and the toggle must roll back.
        let mut wizard = wizard_from(";;;\n;;\n");
        let before = wizard.separators.clone();
        let before_rows = wizard.parse_data.orig_lines.clone();

        let err = wizard.toggle_separator(SepButton::Semicolon).unwrap_err();
        assert_eq!(err, ParseError::NoRows);
        assert_eq!(wizard.separators, before);
        assert_eq!(wizard.parse_data.options.separators, before.to_set());
        assert_eq!(wizard.parse_data.orig_lines, before_rows);
    }

    #[test]
    fn test_failed_custom_separator_restores_text() {
        let mut wizard = wizard_from("a|b\nc|d\n");
        wizard.toggle_custom_separator().unwrap();
        wizard.set_custom_separator("|").unwrap();
        assert_eq!(wizard.parse_data.orig_lines[0].len(), 2);

        // A quote cannot be a separator; the entry text must revert.
        let err = wizard.set_custom_separator("\"").unwrap_err();
        assert_eq!(err, ParseError::BadSeparator('"'));
        assert_eq!(wizard.separators.custom_text, "|");
        assert!(wizard.parse_data.options.separators.contains(&'|'));
        assert_eq!(wizard.parse_data.orig_lines[0].len(), 2);
    }

    #[test]
    fn test_column_types_stay_injective() {
        let mut wizard = wizard_from("2025-01-15,COFFEE,-4.50\n");
        wizard.edit_column_type(0, ColumnType::Date);
        wizard.edit_column_type(1, ColumnType::Amount);
        wizard.edit_column_type(2, ColumnType::Amount);
        assert_eq!(
            wizard.preview.column_types,
            vec![ColumnType::Date, ColumnType::None, ColumnType::Amount]
        );

        wizard.edit_column_type(2, ColumnType::Date);
        assert_eq!(
            wizard.preview.column_types,
            vec![ColumnType::None, ColumnType::None, ColumnType::Date]
        );

        for new_type in [ColumnType::Date, ColumnType::Description, ColumnType::Amount] {
            let count = wizard
                .preview
                .column_types
                .iter()
                .filter(|t| **t == new_type)
                .count();
            assert!(count <= 1);
        }
    }

    #[test]
    fn test_failed_encoding_change_keeps_selector_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        std::fs::write(&path, [b'C', b'A', b'F', 0xC9, b',', b'1', b'\n']).unwrap();
        let mut wizard = ImportWizard::new();
        wizard.load_file(&path).unwrap();
        wizard.begin_preview().unwrap();
        assert_eq!(wizard.encoding, "windows-1252");

        let err = wizard.change_encoding("UTF-8").unwrap_err();
        assert_eq!(err, EncodingError::Conversion("UTF-8".to_string()));
        assert_eq!(wizard.encoding, "windows-1252");
        assert_eq!(wizard.parse_data.options.encoding, "windows-1252");
        assert_eq!(wizard.parse_data.orig_lines[0][0], "CAFÉ");

        wizard.change_encoding("KOI8-R").unwrap();
        assert_eq!(wizard.encoding, "KOI8-R");
    }

    #[test]
    fn test_confirm_captures_column_types() {
        let mut wizard = wizard_from("x,y\n");
        wizard.edit_column_type(0, ColumnType::Date);
        wizard.edit_column_type(1, ColumnType::Amount);
        assert_ne!(wizard.parse_data.column_types, wizard.preview.column_types);
        wizard.confirm_preview();
        assert!(wizard.preview.approved);
        assert_eq!(
            wizard.parse_data.column_types,
            vec![ColumnType::Date, ColumnType::Amount]
        );
    }

    #[test]
    fn test_cancel_at_initial_preview_builds_nothing() {
        let mut wizard = wizard_from("2025-01-15,COFFEE,-4.50\n");
        wizard.cancel_preview();
        assert_eq!(wizard.stage(), Stage::Cancelled);
        assert!(wizard.parse_data.transactions.is_empty());
    }

    #[test]
    fn test_error_loop_corrects_bad_date_rows() {
        let mut wizard = wizard_from(
            "2025-01-15,PAYMENT ONE,-100.00\n\
             2025-01-16,PAYMENT TWO,-250.00\n\
             2025-01-17,DEPOSIT,500.00\n\
             18.01.2025,LATE FEE,-35.00\n",
        );
        wizard.confirm_preview();
        wizard.build_transactions(false);
        assert_eq!(wizard.parse_data.transactions.len(), 3);
        assert_eq!(wizard.parse_data.error_lines.len(), 1);

        wizard.show_errors();
        assert_eq!(wizard.stage(), Stage::PreviewErrors);
        assert_eq!(wizard.displayed_rows(), vec![3]);

        wizard.set_date_format(DateFormat::DayMonthYear);
        wizard.confirm_preview();
        wizard.build_transactions(true);
        assert!(!wizard.has_errors());
        assert_eq!(wizard.parse_data.transactions.len(), 4);

        let transactions = wizard.commit();
        assert_eq!(wizard.stage(), Stage::Committed);
        assert_eq!(transactions.len(), 4);
        assert_eq!(transactions[3].date, "2025-01-18");
    }

    #[test]
    fn test_cancel_in_error_loop_keeps_built_transactions() {
        let mut wizard = wizard_from(
            "2025-01-15,PAYMENT ONE,-100.00\n\
             2025-01-16,PAYMENT TWO,-2.00\n\
             not a date,BROKEN,-1.00\n",
        );
        wizard.confirm_preview();
        wizard.build_transactions(false);
        wizard.show_errors();
        wizard.cancel_preview();
        assert_eq!(wizard.stage(), Stage::Cancelled);

        // The unresolved row is dropped; the good rows survive.
        let transactions = wizard.commit();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].description, "PAYMENT ONE");
    }

    #[test]
    fn test_separator_config_round_trip() {
        let mut config = SeparatorConfig::default();
        assert!(config.is_checked(SepButton::Comma));
        assert_eq!(config.to_set(), BTreeSet::from([',']));

        config.custom_checked = true;
        config.custom_text = "|,|".to_string();
        // Deduplicated set, checkbox state untouched.
        assert_eq!(config.to_set(), BTreeSet::from([',', '|']));
        assert!(config.is_checked(SepButton::Comma));
    }
}
