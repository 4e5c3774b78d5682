//! Pipe-table markup: one `|cell|cell|...|` line per row, `<br>` for a line
//! break inside a cell. Lines without the enclosing pipes are ignored.

/// Cell separator and row boundary.
pub const DELIMITER: char = '|';

/// Written in place of a newline inside a cell.
pub const LINE_BREAK_MARKER: &str = "<br>";

/// Rows of cells in input order. Rows are not required to have equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    rows: Vec<Vec<String>>,
}

impl ParsedTable {
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Length of the longest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }
}

impl FromIterator<Vec<String>> for ParsedTable {
    fn from_iter<T: IntoIterator<Item = Vec<String>>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Parses a pasted block into rows. Never fails: lines that are not
/// delimiter lines are dropped, so unusable input gives an empty table.
pub fn parse_table(text: &str) -> ParsedTable {
    text.trim().lines().filter_map(parse_line).collect()
}

/// Parses one line; `None` unless it starts and ends with [`DELIMITER`]
/// after trimming.
///
/// Exactly one delimiter is stripped from each end, so a line with `n`
/// delimiters yields `n - 1` cells (a lone `|` yields an empty row).
pub fn parse_line(line: &str) -> Option<Vec<String>> {
    let line = line.trim();
    if !(line.starts_with(DELIMITER) && line.ends_with(DELIMITER)) {
        return None;
    }
    let Some(inner) = line
        .strip_prefix(DELIMITER)
        .and_then(|l| l.strip_suffix(DELIMITER))
    else {
        return Some(Vec::new());
    };
    Some(inner.split(DELIMITER).map(parse_cell).collect())
}

fn parse_cell(raw: &str) -> String {
    raw.trim().replace(LINE_BREAK_MARKER, "\n")
}
