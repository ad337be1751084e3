use std::path::PathBuf;

use crossterm::event::KeyCode;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use rusqlite::Connection;

use crate::error::Result;
use crate::matcher::MatcherSession;
use crate::models::Transaction;
use crate::parse::{ColumnType, DateFormat, LoadError, ENCODINGS};
use crate::settings::{remember_import_dir, shellexpand_path, Settings};
use crate::tui::{Screen, ScreenAction, ERROR_STYLE, FOOTER_STYLE, HEADER_STYLE, SELECTED_STYLE};
use crate::wizard::{ImportWizard, SepButton};

enum Step {
    FileForm,
    Preview,
    AccountSelect,
    Result(Outcome),
}

struct Outcome {
    message: String,
    is_error: bool,
}

// Focusable fields on the preview, in Tab order.
const FIELD_SEP_FIRST: usize = 0; // six stock checkboxes: 0..=5
const FIELD_CUSTOM: usize = 6;
const FIELD_CUSTOM_ENTRY: usize = 7;
const FIELD_ENCODING: usize = 8;
const FIELD_DATE_FORMAT: usize = 9;
const FIELD_COLUMNS: usize = 10;
const NUM_FIELDS: usize = 11;

// Widest a preview column gets before its fields are clipped.
const MAX_COL_WIDTH: usize = 18;

pub struct ImportWizardScreen<'a> {
    conn: &'a Connection,
    data_dir: PathBuf,
    wizard: ImportWizard,
    step: Step,
    accounts: Vec<String>,
    account_idx: usize,
    account_chosen: bool,
    file_path: String,
    loaded_path: Option<PathBuf>,
    focused: usize,
    selected_column: usize,
    banner: Option<String>,
    status_message: Option<String>,
    finished: bool,
}

impl<'a> ImportWizardScreen<'a> {
    pub fn new(
        conn: &'a Connection,
        settings: &Settings,
        file: Option<&str>,
        account: Option<&str>,
    ) -> Self {
        let accounts = load_account_names(conn);
        let account_idx = account
            .and_then(|name| accounts.iter().position(|a| a == name))
            .unwrap_or(0);
        let account_chosen = matches!(account, Some(name) if accounts.iter().any(|a| a == name));
        let file_path = match file {
            Some(f) => f.to_string(),
            None => settings
                .import_dir
                .as_ref()
                .map(|d| format!("{d}/"))
                .unwrap_or_default(),
        };
        let mut screen = Self {
            conn,
            data_dir: PathBuf::from(&settings.data_dir),
            wizard: ImportWizard::new(),
            step: Step::FileForm,
            accounts,
            account_idx,
            account_chosen,
            file_path,
            loaded_path: None,
            focused: FIELD_SEP_FIRST,
            selected_column: 0,
            banner: None,
            status_message: None,
            finished: false,
        };
        if file.is_some() {
            screen.try_load();
        }
        screen
    }

    /// The import went through to a result screen (even an error one);
    /// anything else means the user backed out.
    pub fn completed(&self) -> bool {
        self.finished
    }

    fn try_load(&mut self) {
        let path_str = self.file_path.trim().to_string();
        if path_str.is_empty() {
            self.status_message = Some("File path is required".into());
            return;
        }
        let path = PathBuf::from(shellexpand_path(&path_str));
        if !path.is_file() {
            self.status_message = Some(format!("File not found: {}", path.display()));
            return;
        }
        match self.wizard.load_file(&path) {
            Err(e @ LoadError::FileOpen { .. }) => {
                self.status_message = Some(e.to_string());
                return;
            }
            Err(e @ LoadError::EncodingGuess { .. }) => {
                self.banner = Some(format!("{e}; pick one from the encoding selector."));
            }
            Ok(()) => {}
        }
        let _ = remember_import_dir(&path);
        if let Err(e) = self.wizard.begin_preview() {
            self.banner = Some(e.to_string());
        }
        self.loaded_path = Some(path);
        self.step = Step::Preview;
    }

    /// First build after the preview was accepted. Rows that fail send
    /// the wizard into the error-correction loop.
    fn start_matching(&mut self) {
        self.wizard.build_transactions(false);
        if self.wizard.has_errors() {
            let n = self.wizard.parse_data.error_lines.len();
            self.wizard.show_errors();
            self.banner = Some(format!(
                "{n} row(s) could not be turned into transactions. Adjust the configuration and press Enter to retry, or Esc to import without them."
            ));
            self.selected_column = 0;
            self.step = Step::Preview;
        } else {
            self.finish();
        }
    }

    fn finish(&mut self) {
        let account = match self.accounts.get(self.account_idx) {
            Some(name) => name.clone(),
            None => {
                self.step = Step::Result(Outcome {
                    message: "No accounts found. Add one first.".into(),
                    is_error: true,
                });
                self.finished = true;
                return;
            }
        };
        let transactions = self.wizard.commit();
        let outcome = match self.run_matcher(&account, transactions) {
            Ok(message) => Outcome {
                message,
                is_error: false,
            },
            Err(e) => Outcome {
                message: format!("Import failed: {e}"),
                is_error: true,
            },
        };
        self.banner = None;
        self.finished = true;
        self.step = Step::Result(outcome);
    }

    fn run_matcher(&self, account: &str, transactions: Vec<Transaction>) -> Result<String> {
        let mut session = MatcherSession::new(self.conn, account)?;
        if let Some(path) = &self.loaded_path {
            session.set_source_file(path)?;
        }
        let net: f64 = transactions.iter().map(|t| t.amount).sum();
        for txn in transactions {
            session.add(txn);
        }
        if session.is_empty() {
            session.delete();
            return Ok("No transactions were created; nothing to import.".to_string());
        }
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let snap_path = self
            .data_dir
            .join("snapshots")
            .join(format!("pre-import-{stamp}.db"));
        let summary = session.run(Some(&snap_path))?;
        if summary.duplicate_file {
            Ok("This file has already been imported (duplicate checksum).".to_string())
        } else {
            Ok(format!(
                "{} imported into {account}, {} skipped (duplicates)\nNet amount: {}",
                summary.imported,
                summary.skipped,
                crate::fmt::money(net)
            ))
        }
    }

    // -----------------------------------------------------------------
    // Key handling
    // -----------------------------------------------------------------

    fn handle_form_key(&mut self, code: KeyCode) -> ScreenAction {
        match code {
            KeyCode::Esc => return ScreenAction::Close,
            KeyCode::Char(c) => {
                self.file_path.push(c);
                self.status_message = None;
            }
            KeyCode::Backspace => {
                self.file_path.pop();
                self.status_message = None;
            }
            KeyCode::Enter => self.try_load(),
            _ => {}
        }
        ScreenAction::Continue
    }

    fn handle_preview_key(&mut self, code: KeyCode) -> ScreenAction {
        match code {
            KeyCode::Esc => {
                let correcting = self.wizard.preview.errors_only;
                self.wizard.cancel_preview();
                if correcting {
                    // Give up on the remaining error rows; what was built
                    // so far still gets imported.
                    self.finish();
                } else {
                    return ScreenAction::Close;
                }
            }
            KeyCode::Tab | KeyCode::Down => {
                self.focused = (self.focused + 1) % NUM_FIELDS;
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focused = (self.focused + NUM_FIELDS - 1) % NUM_FIELDS;
            }
            KeyCode::Left => self.handle_left_right(false),
            KeyCode::Right => self.handle_left_right(true),
            KeyCode::Char(' ') if self.focused != FIELD_CUSTOM_ENTRY => self.handle_toggle(),
            KeyCode::Char(c) => {
                if self.focused == FIELD_CUSTOM_ENTRY {
                    let text = format!("{}{}", self.wizard.separators.custom_text, c);
                    self.apply_parse(|w| w.set_custom_separator(&text));
                }
            }
            KeyCode::Backspace => {
                if self.focused == FIELD_CUSTOM_ENTRY {
                    let mut text = self.wizard.separators.custom_text.clone();
                    text.pop();
                    self.apply_parse(|w| w.set_custom_separator(&text));
                }
            }
            KeyCode::Enter => {
                if self.wizard.preview.errors_only {
                    self.wizard.confirm_preview();
                    self.wizard.build_transactions(true);
                    if self.wizard.has_errors() {
                        let n = self.wizard.parse_data.error_lines.len();
                        self.banner = Some(format!("{n} row(s) still failing."));
                    } else {
                        self.finish();
                    }
                } else {
                    self.wizard.confirm_preview();
                    if self.account_chosen {
                        self.start_matching();
                    } else {
                        self.step = Step::AccountSelect;
                    }
                }
            }
            _ => {}
        }
        ScreenAction::Continue
    }

    fn handle_toggle(&mut self) {
        match self.focused {
            f if f < SepButton::ALL.len() => {
                let button = SepButton::ALL[f];
                self.apply_parse(|w| w.toggle_separator(button));
            }
            FIELD_CUSTOM => self.apply_parse(|w| w.toggle_custom_separator()),
            FIELD_COLUMNS => {
                let col = self.selected_column;
                let current = self
                    .wizard
                    .preview
                    .column_types
                    .get(col)
                    .copied()
                    .unwrap_or(ColumnType::None);
                self.wizard.edit_column_type(col, current.next());
            }
            _ => {}
        }
    }

    fn handle_left_right(&mut self, forward: bool) {
        match self.focused {
            FIELD_ENCODING => {
                let current = ENCODINGS
                    .iter()
                    .position(|e| e.eq_ignore_ascii_case(&self.wizard.encoding));
                let next = match (current, forward) {
                    (Some(i), true) => (i + 1) % ENCODINGS.len(),
                    (Some(i), false) => (i + ENCODINGS.len() - 1) % ENCODINGS.len(),
                    (None, _) => 0,
                };
                match self.wizard.change_encoding(ENCODINGS[next]) {
                    Ok(()) => self.banner = None,
                    Err(e) => self.banner = Some(e.to_string()),
                }
            }
            FIELD_DATE_FORMAT => {
                let all = DateFormat::ALL;
                let i = all
                    .iter()
                    .position(|f| *f == self.wizard.date_format)
                    .unwrap_or(0);
                let next = if forward {
                    (i + 1) % all.len()
                } else {
                    (i + all.len() - 1) % all.len()
                };
                self.wizard.set_date_format(all[next]);
            }
            FIELD_COLUMNS => {
                let ncols = self.wizard.preview.column_types.len();
                if ncols == 0 {
                    return;
                }
                self.selected_column = if forward {
                    (self.selected_column + 1) % ncols
                } else {
                    (self.selected_column + ncols - 1) % ncols
                };
            }
            _ => {}
        }
    }

    fn apply_parse<F>(&mut self, op: F)
    where
        F: FnOnce(&mut ImportWizard) -> std::result::Result<(), crate::parse::ParseError>,
    {
        match op(&mut self.wizard) {
            Ok(()) => self.banner = None,
            Err(e) => self.banner = Some(e.to_string()),
        }
        let ncols = self.wizard.preview.column_types.len();
        if ncols > 0 {
            self.selected_column = self.selected_column.min(ncols - 1);
        }
    }

    fn handle_account_key(&mut self, code: KeyCode) -> ScreenAction {
        match code {
            KeyCode::Esc => return ScreenAction::Close,
            KeyCode::Left | KeyCode::Up => {
                if !self.accounts.is_empty() {
                    self.account_idx = if self.account_idx == 0 {
                        self.accounts.len() - 1
                    } else {
                        self.account_idx - 1
                    };
                }
            }
            KeyCode::Right | KeyCode::Down => {
                if !self.accounts.is_empty() {
                    self.account_idx = (self.account_idx + 1) % self.accounts.len();
                }
            }
            KeyCode::Enter => {
                if self.accounts.is_empty() {
                    return ScreenAction::Continue;
                }
                self.account_chosen = true;
                self.start_matching();
            }
            _ => {}
        }
        ScreenAction::Continue
    }

    // -----------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------

    fn value_style(&self, field: usize) -> Style {
        if self.focused == field {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        }
    }

    fn draw_form(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect) {
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                " Import a Statement",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("   File path      ", Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(
                    format!("{}_", self.file_path),
                    Style::default().fg(Color::Cyan),
                ),
            ]),
        ];

        if let Some(msg) = &self.status_message {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("   {msg}"),
                Style::default().fg(Color::Yellow),
            )));
        }

        frame.render_widget(Paragraph::new(lines), content_area);
        frame.render_widget(
            Paragraph::new(" Enter=load file  Esc=back").style(FOOTER_STYLE),
            hints_area,
        );
    }

    fn draw_preview(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect) {
        let correcting = self.wizard.preview.errors_only;
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                if correcting {
                    " Correct Import Errors"
                } else {
                    " Preview Import"
                },
                Style::default().add_modifier(Modifier::BOLD),
            )),
        ];
        if correcting {
            lines.push(Line::from(Span::styled(
                " The rows below had errors. You can attempt to correct them by changing the configuration.",
                Style::default().fg(Color::Yellow),
            )));
        }
        lines.push(Line::from(""));

        // Separator checkboxes.
        let mut spans = vec![Span::styled(
            "   Separators     ",
            Style::default().add_modifier(Modifier::BOLD),
        )];
        for (i, button) in SepButton::ALL.iter().enumerate() {
            let mark = if self.wizard.separators.is_checked(*button) {
                "x"
            } else {
                " "
            };
            spans.push(Span::styled(
                format!("[{mark}] {}  ", button.label()),
                self.value_style(i),
            ));
        }
        lines.push(Line::from(spans));

        // Custom separator checkbox + entry.
        let mark = if self.wizard.separators.custom_checked {
            "x"
        } else {
            " "
        };
        let cursor = if self.focused == FIELD_CUSTOM_ENTRY {
            "_"
        } else {
            ""
        };
        lines.push(Line::from(vec![
            Span::raw("                  "),
            Span::styled(format!("[{mark}] Custom  "), self.value_style(FIELD_CUSTOM)),
            Span::styled(
                format!(
                    "chars: {}{}",
                    self.wizard.separators.custom_text, cursor
                ),
                self.value_style(FIELD_CUSTOM_ENTRY),
            ),
        ]));

        let arrows = |field: usize| {
            if self.focused == field {
                ("< ", " >")
            } else {
                ("  ", "  ")
            }
        };
        let encoding = if self.wizard.encoding.is_empty() {
            "(unknown)"
        } else {
            self.wizard.encoding.as_str()
        };
        let (l, r) = arrows(FIELD_ENCODING);
        lines.push(Line::from(vec![
            Span::styled("   Encoding       ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(format!("{l}{encoding}{r}"), self.value_style(FIELD_ENCODING)),
        ]));
        let (l, r) = arrows(FIELD_DATE_FORMAT);
        lines.push(Line::from(vec![
            Span::styled("   Date format    ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(
                format!("{l}{}{r}", self.wizard.date_format.label()),
                self.value_style(FIELD_DATE_FORMAT),
            ),
        ]));

        // Per-column type editor.
        let mut spans = vec![Span::styled(
            "   Column types   ",
            Style::default().add_modifier(Modifier::BOLD),
        )];
        for (c, t) in self.wizard.preview.column_types.iter().enumerate() {
            if c == self.selected_column && self.focused == FIELD_COLUMNS {
                spans.push(Span::styled(format!("[{}] ", t.label()), SELECTED_STYLE));
            } else {
                spans.push(Span::styled(
                    format!(" {}  ", t.label()),
                    self.value_style(FIELD_COLUMNS),
                ));
            }
        }
        lines.push(Line::from(spans));

        if let Some(banner) = &self.banner {
            let width = content_area.width.saturating_sub(4) as usize;
            let (wrapped, _) = crate::tui::wrap_text(banner, width.max(20));
            lines.push(Line::from(""));
            for l in wrapped.lines() {
                lines.push(Line::from(Span::styled(format!("   {l}"), ERROR_STYLE)));
            }
        }

        // Data rows, clipped to the column widths and remaining height.
        lines.push(Line::from(""));
        let widths = self.column_widths();
        let rows = self.wizard.displayed_rows();
        let header: String = widths
            .iter()
            .enumerate()
            .map(|(c, &w)| {
                let label = self
                    .wizard
                    .preview
                    .column_types
                    .get(c)
                    .map(|t| t.label())
                    .unwrap_or("");
                format!("{label:<w$}")
            })
            .collect::<Vec<_>>()
            .join("  ");
        lines.push(Line::from(Span::styled(
            format!("   {header}"),
            Style::default().add_modifier(Modifier::UNDERLINED),
        )));

        let max_rows = (content_area.height as usize).saturating_sub(lines.len() + 1);
        for &i in rows.iter().take(max_rows) {
            let row = &self.wizard.parse_data.orig_lines[i];
            let text: String = widths
                .iter()
                .enumerate()
                .map(|(c, &w)| {
                    let field = row.get(c).map(String::as_str).unwrap_or("");
                    let clipped: String = field.chars().take(w).collect();
                    format!("{clipped:<w$}")
                })
                .collect::<Vec<_>>()
                .join("  ");
            lines.push(Line::from(format!("   {text}")));
        }
        if rows.len() > max_rows {
            lines.push(Line::from(Span::styled(
                format!("   … {} more rows", rows.len() - max_rows),
                FOOTER_STYLE,
            )));
        }

        frame.render_widget(Paragraph::new(lines), content_area);
        frame.render_widget(
            Paragraph::new(
                " Tab=fields  Space=toggle/cycle  \u{2190}/\u{2192}=change  Enter=OK  Esc=cancel",
            )
            .style(FOOTER_STYLE),
            hints_area,
        );
    }

    fn column_widths(&self) -> Vec<usize> {
        let ncols = self.wizard.preview.column_types.len();
        let mut widths: Vec<usize> = self
            .wizard
            .preview
            .column_types
            .iter()
            .map(|t| t.label().len())
            .collect();
        for &i in &self.wizard.displayed_rows() {
            if let Some(row) = self.wizard.parse_data.orig_lines.get(i) {
                for c in 0..ncols {
                    if let Some(field) = row.get(c) {
                        widths[c] = widths[c].max(field.chars().count().min(MAX_COL_WIDTH));
                    }
                }
            }
        }
        widths
    }

    fn draw_account_select(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect) {
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                " Select an Account",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];

        if self.accounts.is_empty() {
            lines.push(Line::from("   No accounts found. Add one first."));
        } else {
            let account_name = &self.accounts[self.account_idx];
            lines.push(Line::from(vec![
                Span::styled("   Account        ", Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(
                    format!("< {account_name} >"),
                    Style::default().fg(Color::Cyan),
                ),
            ]));
            lines.push(Line::from(""));
            lines.push(Line::from(format!(
                "   {} parsed row(s) will be offered to this account.",
                self.wizard.parse_data.orig_lines.len(),
            )));
        }

        frame.render_widget(Paragraph::new(lines), content_area);
        frame.render_widget(
            Paragraph::new(" \u{2190}/\u{2192}=account  Enter=import  Esc=cancel").style(FOOTER_STYLE),
            hints_area,
        );
    }

    fn draw_result(
        &self,
        frame: &mut Frame,
        content_area: Rect,
        hints_area: Rect,
        outcome: &Outcome,
    ) {
        let color = if outcome.is_error {
            Color::Red
        } else {
            Color::Green
        };
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                " Import Result",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];
        for line in outcome.message.lines() {
            lines.push(Line::from(Span::styled(
                format!("   {line}"),
                Style::default().fg(color),
            )));
        }
        frame.render_widget(Paragraph::new(lines), content_area);
        frame.render_widget(
            Paragraph::new(" Esc=close").style(FOOTER_STYLE),
            hints_area,
        );
    }
}

impl Screen for ImportWizardScreen<'_> {
    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let border_style = Style::default().fg(Color::DarkGray);

        let [header_area, sep, content_area, hints_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(1),
        ])
        .areas(area);

        frame.render_widget(
            Paragraph::new(" penny \u{2014} CSV import").style(HEADER_STYLE),
            header_area,
        );
        let sep_line = "\u{2501}".repeat(area.width as usize);
        frame.render_widget(Paragraph::new(sep_line.as_str()).style(border_style), sep);

        match &self.step {
            Step::FileForm => self.draw_form(frame, content_area, hints_area),
            Step::Preview => self.draw_preview(frame, content_area, hints_area),
            Step::AccountSelect => self.draw_account_select(frame, content_area, hints_area),
            Step::Result(outcome) => self.draw_result(frame, content_area, hints_area, outcome),
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> ScreenAction {
        match &self.step {
            Step::FileForm => self.handle_form_key(code),
            Step::Preview => self.handle_preview_key(code),
            Step::AccountSelect => self.handle_account_key(code),
            Step::Result(_) => match code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => ScreenAction::Close,
                _ => ScreenAction::Continue,
            },
        }
    }
}

fn load_account_names(conn: &Connection) -> Vec<String> {
    let mut stmt = match conn.prepare("SELECT name FROM accounts ORDER BY name") {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    stmt.query_map([], |row| row.get(0))
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}
