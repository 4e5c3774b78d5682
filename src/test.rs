#![cfg(test)]
use crate::{AppState, Frontend, Notice, SaveError};
use anyhow::Result;
use paste_core::{
    AppendOptions,
    fixtures::{empty_worksheet, read_cells, worksheet, write_workbook},
};
use std::{fs, path::{Path, PathBuf}};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingFrontend {
    input: String,
    notices: Vec<Notice>,
    sheets: Vec<String>,
    selected: Option<String>,
    shown: Option<PathBuf>,
    cleared: bool,
}

impl RecordingFrontend {
    fn with_input(text: &str) -> Self {
        Self {
            input: text.to_owned(),
            ..Default::default()
        }
    }
}

impl Frontend for RecordingFrontend {
    fn set_sheet_options(&mut self, names: &[String], selected: &str) {
        self.sheets = names.to_vec();
        self.selected = Some(selected.to_owned());
    }

    fn show_file(&mut self, path: &Path) {
        self.shown = Some(path.to_path_buf());
    }

    fn input_text(&mut self) -> String {
        self.input.clone()
    }

    fn notify(&mut self, notice: &Notice) {
        self.notices.push(notice.clone());
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.cleared = true;
    }
}

fn two_sheet_book() -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("book.xlsx");
    write_workbook(
        &path,
        &[("First", empty_worksheet()), ("Second", empty_worksheet())],
    )?;
    Ok((dir, path))
}

#[test]
fn save_without_file_asks_for_one() {
    let state = AppState::default();
    let mut ui = RecordingFrontend::with_input("|a|");

    let err = state.save_to_excel(&mut ui).unwrap_err();
    assert!(matches!(err, SaveError::NoFileSelected));
    assert!(err.is_precondition());
    assert_eq!(
        ui.notices,
        vec![Notice::Error("Please select an Excel file first.".into())]
    );
    assert!(!ui.cleared);
}

#[test]
fn select_file_lists_sheets_and_picks_first() -> Result<()> {
    let (_dir, path) = two_sheet_book()?;
    let mut state = AppState::default();
    let mut ui = RecordingFrontend::default();

    state.select_file(&path, &mut ui)?;
    assert_eq!(ui.sheets, vec!["First".to_string(), "Second".to_string()]);
    assert_eq!(ui.selected.as_deref(), Some("First"));
    assert_eq!(ui.shown.as_deref(), Some(path.as_path()));
    assert_eq!(state.selected_sheet.as_deref(), Some("First"));
    assert_eq!(state.excel_file.as_deref(), Some(path.as_path()));
    Ok(())
}

#[test]
fn failed_select_keeps_previous_state() -> Result<()> {
    let (dir, path) = two_sheet_book()?;
    let mut state = AppState::default();
    let mut ui = RecordingFrontend::default();
    state.select_file(&path, &mut ui)?;

    let broken = dir.path().join("broken.xlsx");
    fs::write(&broken, "not a zip")?;
    assert!(state.select_file(&broken, &mut ui).is_err());
    assert_eq!(state.excel_file.as_deref(), Some(path.as_path()));
    assert_eq!(state.sheet_names.len(), 2);
    Ok(())
}

#[test]
fn text_without_rows_writes_nothing() -> Result<()> {
    let (_dir, path) = two_sheet_book()?;
    let before = fs::read(&path)?;
    let mut state = AppState::default();
    let mut ui = RecordingFrontend::with_input("no pipes here");
    state.select_file(&path, &mut ui)?;

    let err = state.save_to_excel(&mut ui).unwrap_err();
    assert!(matches!(err, SaveError::NoValidData));
    assert_eq!(
        ui.notices,
        vec![Notice::Error("No valid data to save.".into())]
    );
    assert_eq!(ui.input, "no pipes here");
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn save_reports_rows_and_clears_input() -> Result<()> {
    let (_dir, path) = two_sheet_book()?;
    let mut state = AppState::default();
    let mut ui = RecordingFrontend::with_input("|A|B|\n|C|D<br>E|");
    state.select_file(&path, &mut ui)?;

    let n = state.save_to_excel(&mut ui)?;
    assert_eq!(n, 2);
    assert_eq!(
        ui.notices,
        vec![Notice::Success("2 rows saved to Excel successfully!".into())]
    );
    assert_eq!(ui.notices[0].title(), "Success");
    assert!(ui.cleared);
    assert!(ui.input.is_empty());

    let cells = read_cells(&path, "First")?;
    assert_eq!(cells["A1"], "A");
    assert_eq!(cells["B2"], "D\nE");
    assert!(read_cells(&path, "Second")?.is_empty());
    Ok(())
}

#[test]
fn selected_sheet_receives_rows() -> Result<()> {
    let (_dir, path) = two_sheet_book()?;
    let mut state = AppState::new(AppendOptions {
        column_width: 30.0,
        ..Default::default()
    });
    let mut ui = RecordingFrontend::default();
    state.select_file(&path, &mut ui)?;
    state.select_sheet("Second");

    ui.input = "|x|".into();
    state.save_to_excel(&mut ui)?;
    ui.input = "|y|".into();
    state.save_to_excel(&mut ui)?;

    let cells = read_cells(&path, "Second")?;
    assert_eq!(cells["A1"], "x");
    assert_eq!(cells["A2"], "y");
    assert!(read_cells(&path, "First")?.is_empty());
    Ok(())
}

#[test]
fn unknown_sheet_propagates_without_notice() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("book.xlsx");
    write_workbook(
        &path,
        &[(
            "Data",
            worksheet(r#"<sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData>"#),
        )],
    )?;
    let before = fs::read(&path)?;

    let mut state = AppState::default();
    let mut ui = RecordingFrontend::with_input("|a|");
    state.select_file(&path, &mut ui)?;
    state.select_sheet("Missing");

    let err = state.save_to_excel(&mut ui).unwrap_err();
    assert!(matches!(err, SaveError::Workbook(_)));
    assert!(!err.is_precondition());
    assert!(err.to_string().contains("Sheet 'Missing' not found"));
    assert!(ui.notices.is_empty());
    assert!(!ui.cleared);
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn verbosity_levels() {
    use log::LevelFilter;
    assert_eq!(crate::logging::level_for(0), LevelFilter::Warn);
    assert_eq!(crate::logging::level_for(1), LevelFilter::Info);
    assert_eq!(crate::logging::level_for(2), LevelFilter::Debug);
    assert_eq!(crate::logging::level_for(9), LevelFilter::Trace);
}
