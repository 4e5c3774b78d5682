//! xlsx_paste: the paste-and-save workflow on top of `paste_core`.
//!
//! [`AppState`] holds what the user picked (workbook, sheet) and runs the
//! save action against a [`Frontend`], which is whatever shows sheets, reads
//! the pasted text and displays notices.

pub mod logging;
mod test;

use log::{debug, info};
use paste_core::{AppendOptions, append_table, parse_table, scan};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Modal message shown after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Success(String),
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::Error(_) => "Error",
            Notice::Success(_) => "Success",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Notice::Error(m) | Notice::Success(m) => m,
        }
    }
}

/// What the handlers need from the user interface.
pub trait Frontend {
    /// Replaces the sheet choices and selects `selected`.
    fn set_sheet_options(&mut self, names: &[String], selected: &str);

    /// Shows the chosen workbook path.
    fn show_file(&mut self, _path: &Path) {}

    /// Current content of the paste area.
    fn input_text(&mut self) -> String;

    fn notify(&mut self, notice: &Notice);

    /// Empties the paste area.
    fn clear_input(&mut self);
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Please select an Excel file first.")]
    NoFileSelected,
    #[error("No valid data to save.")]
    NoValidData,
    #[error(transparent)]
    Workbook(#[from] anyhow::Error),
}

impl SaveError {
    /// True for the errors the user was already told about through a notice.
    pub fn is_precondition(&self) -> bool {
        matches!(self, SaveError::NoFileSelected | SaveError::NoValidData)
    }
}

/// Selected workbook and sheet plus the formatting used on save.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub excel_file: Option<PathBuf>,
    pub sheet_names: Vec<String>,
    pub selected_sheet: Option<String>,
    pub options: AppendOptions,
}

impl AppState {
    pub fn new(options: AppendOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Points the state at a workbook and selects its first sheet.
    ///
    /// Nothing changes when the file can't be read or has no sheets.
    pub fn select_file<P: AsRef<Path>>(&mut self, path: P, ui: &mut dyn Frontend) -> anyhow::Result<()> {
        let path = path.as_ref();
        let names = scan(path)?;
        let Some(first) = names.first().cloned() else {
            anyhow::bail!("Workbook '{}' has no sheets", path.display());
        };
        debug!("{} sheets in {}", names.len(), path.display());

        ui.show_file(path);
        ui.set_sheet_options(&names, &first);

        self.excel_file = Some(path.to_path_buf());
        self.sheet_names = names;
        self.selected_sheet = Some(first);
        Ok(())
    }

    /// Changes the target sheet. The name is checked against the workbook on save.
    pub fn select_sheet(&mut self, name: impl Into<String>) {
        self.selected_sheet = Some(name.into());
    }

    /// Parses the paste area and appends it to the selected sheet.
    ///
    /// Returns the number of rows written. Missing file or empty input are
    /// reported through `ui` before returning; workbook failures are only
    /// returned.
    pub fn save_to_excel(&self, ui: &mut dyn Frontend) -> Result<usize, SaveError> {
        let Some(file) = self.excel_file.as_deref() else {
            return Err(precondition(ui, SaveError::NoFileSelected));
        };

        let table = parse_table(&ui.input_text());
        if table.is_empty() {
            return Err(precondition(ui, SaveError::NoValidData));
        }

        let sheet = match &self.selected_sheet {
            Some(sheet) => sheet.clone(),
            None => scan(file)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Workbook '{}' has no sheets", file.display()))?,
        };

        let report = append_table(file, &sheet, &table, &self.options)?;
        info!(
            "saved {} rows to '{}' of {}",
            report.rows_written,
            report.sheet,
            file.display()
        );

        ui.notify(&Notice::Success(format!(
            "{} rows saved to Excel successfully!",
            report.rows_written
        )));
        ui.clear_input();
        Ok(report.rows_written)
    }
}

fn precondition(ui: &mut dyn Frontend, err: SaveError) -> SaveError {
    ui.notify(&Notice::Error(err.to_string()));
    err
}
