//! The append-to-sheet policy: first free row, wrapped and centered cells,
//! auto row height, one fixed width for every column of the sheet.

use anyhow::Result;
use log::info;
use std::path::Path;

use crate::{ParsedTable, XlsxEditor, style::AlignSpec};

/// Width applied to every column of the target sheet on each save.
pub const DEFAULT_COLUMN_WIDTH: f64 = 100.0;

/// Formatting applied by [`append_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOptions {
    /// Width set on all columns `1..=max_column`, not only the written ones.
    pub column_width: f64,
    /// Alignment of every written cell.
    pub alignment: AlignSpec,
    /// Clear explicit heights on the written rows.
    pub auto_row_height: bool,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            column_width: DEFAULT_COLUMN_WIDTH,
            alignment: AlignSpec::wrapped_center(),
            auto_row_height: true,
        }
    }
}

/// What a successful [`append_table`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReport {
    pub sheet: String,
    pub rows_written: usize,
    /// Row the table started at (`max_row + 1` before the write).
    pub first_row: u32,
    /// `max_row` after the write.
    pub max_row: u32,
    pub max_column: u32,
}

/// Appends `table` to `sheet_name` of the workbook at `path` and overwrites the file.
///
/// The workbook is read fresh from disk. An unknown sheet fails before
/// anything is written.
pub fn append_table<P: AsRef<Path>>(
    path: P,
    sheet_name: &str,
    table: &ParsedTable,
    options: &AppendOptions,
) -> Result<AppendReport> {
    let path = path.as_ref();
    let mut editor = XlsxEditor::open(path, sheet_name)?;
    let first_row = editor.max_row() + 1;

    let style = editor.ensure_cell_style(&options.alignment)?;
    let written = editor.append_rows(table.rows(), Some(style))?;

    if options.auto_row_height {
        if let Some(rows) = written {
            editor.set_rows_auto_height(rows)?;
        }
    }
    let max_column = editor.max_column();
    editor.set_columns_width(1..=max_column, options.column_width)?;

    editor.save(path)?;

    info!(
        "{} rows appended to '{sheet_name}' starting at row {first_row}",
        table.len()
    );
    Ok(AppendReport {
        sheet: sheet_name.to_owned(),
        rows_written: table.len(),
        first_row,
        max_row: editor.max_row(),
        max_column,
    })
}
