//! paste-core: pipe-table parsing and in-place append into existing xlsx sheets.

pub mod append;
mod files_part;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod parser;
pub mod style;

pub use append::{AppendOptions, AppendReport, append_table};
pub use files_part::scan;
pub use parser::{ParsedTable, parse_table};

use anyhow::{Context, Result, bail};
use log::debug;
use quick_xml::{
    Reader, Writer,
    events::{BytesStart, BytesText, Event},
};
use std::{ops::RangeInclusive, path::PathBuf};

use style::{col_letter, split_coord};

/// `XlsxEditor` holds one worksheet of a workbook in memory and appends rows to it.
///
/// Only the worksheet part and `xl/styles.xml` are kept as bytes; every other
/// part of the archive is copied untouched on [`XlsxEditor::save`].
pub struct XlsxEditor {
    src_path: PathBuf,
    sheet_name: String,
    sheet_path: String,
    sheet_xml: Vec<u8>,
    styles_xml: Vec<u8>,
    last_row: u32, // highest row holding at least one <c>
    last_col: u32, // highest column holding a <c>, 1-based
}

/// Main
impl XlsxEditor {
    /// Highest populated row (0 for a sheet without cells).
    pub fn max_row(&self) -> u32 {
        self.last_row
    }

    /// Highest populated column, 1-based (0 for a sheet without cells).
    pub fn max_column(&self) -> u32 {
        self.last_col
    }

    /// Raw XML of the worksheet as it will be written by `save`.
    pub fn sheet_xml(&self) -> &[u8] {
        &self.sheet_xml
    }

    /// Appends rows after the last populated row.
    ///
    /// Columns start at `A` for every row; rows may have different lengths.
    /// Values starting with `=` become formulas, everything else an inline
    /// string. When `style` is given it is set as the `s` attribute of every
    /// written cell.
    ///
    /// Returns the written row numbers, or `None` when `rows` was empty.
    pub fn append_rows<R, I, S>(
        &mut self,
        rows: R,
        style: Option<u32>,
    ) -> Result<Option<RangeInclusive<u32>>>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let first = self.last_row + 1;
        let mut next = first;
        let mut last_col = self.last_col;
        let mut bulk_rows_xml = Vec::<u8>::new();

        for row in rows {
            let row_num = next;
            next += 1;

            // nothing is spliced into the sheet until every row has been checked
            let cells: Vec<S> = row.into_iter().collect();
            for (idx, val) in cells.iter().enumerate() {
                if let Some(ch) = val.as_ref().chars().find(|&c| !is_xml_char(c)) {
                    bail!(
                        "Cell {}{row_num} contains U+{:04X}, which XML does not allow",
                        col_letter(idx as u32 + 1),
                        ch as u32
                    );
                }
            }

            let mut width = 0u32;
            let mut writer = Writer::new(Vec::new());
            writer
                .create_element("row")
                .with_attribute(("r", row_num.to_string().as_str()))
                .write_inner_content(|w| {
                    for (idx, val) in cells.iter().enumerate() {
                        let col = idx as u32 + 1;
                        let coord = format!("{}{}", col_letter(col), row_num);
                        write_cell(w, &coord, val.as_ref(), style)?;
                        width = col;
                    }
                    Ok(())
                })?;
            last_col = last_col.max(width);
            bulk_rows_xml.extend_from_slice(&writer.into_inner());
        }

        if next == first {
            return Ok(None);
        }
        let last = next - 1;
        self.insert_rows(first, last, bulk_rows_xml)?;

        // rows without cells still consume a number, but only cells move the high-water mark
        let layout = SheetDataLayout::scan(&self.sheet_xml)?;
        self.last_row = layout.max_row;
        self.last_col = last_col.max(layout.max_col);
        self.update_dimension()?;

        debug!(
            "appended rows {first}..={last} to '{}' (max_row={}, max_col={})",
            self.sheet_name, self.last_row, self.last_col
        );
        Ok(Some(first..=last))
    }

    /// Drops explicit heights from the given rows so the application sizes them to content.
    pub fn set_rows_auto_height(&mut self, rows: RangeInclusive<u32>) -> Result<()> {
        let layout = SheetDataLayout::scan(&self.sheet_xml)?;
        for span in layout.rows.iter().rev().filter(|s| rows.contains(&s.number)) {
            let tag = &self.sheet_xml[span.start..span.tag_end];
            if let Some(rebuilt) = strip_row_height(tag)? {
                self.sheet_xml.splice(span.start..span.tag_end, rebuilt);
            }
        }
        Ok(())
    }

    fn insert_rows(&mut self, first: u32, last: u32, block: Vec<u8>) -> Result<()> {
        self.expand_sheet_data()?;

        // cell-less rows already numbered inside the new block are replaced by it
        let layout = SheetDataLayout::scan(&self.sheet_xml)?;
        for span in layout
            .rows
            .iter()
            .rev()
            .filter(|s| (first..=last).contains(&s.number))
        {
            self.sheet_xml.drain(span.start..span.end);
        }

        // keep <row> elements sorted by r, otherwise Excel "repairs" the file
        let layout = SheetDataLayout::scan(&self.sheet_xml)?;
        let pos = match layout.rows.iter().find(|s| s.number > last) {
            Some(span) => span.start,
            None => layout.close.context("</sheetData> tag not found")?,
        };
        self.sheet_xml.splice(pos..pos, block);
        Ok(())
    }

    /// `<sheetData/>` -> `<sheetData></sheetData>`
    fn expand_sheet_data(&mut self) -> Result<()> {
        let layout = SheetDataLayout::scan(&self.sheet_xml)?;
        if let Some(collapsed) = layout.collapsed {
            let name = String::from_utf8_lossy(&collapsed.name).into_owned();
            let open = format!("<{name}></{name}>");
            self.sheet_xml
                .splice(collapsed.start..collapsed.end, open.bytes());
        }
        Ok(())
    }

    fn update_dimension(&mut self) -> Result<()> {
        if self.last_row == 0 || self.last_col == 0 {
            return Ok(());
        }
        let Some(tag) = find_bytes(&self.sheet_xml, b"<dimension ") else {
            return Ok(());
        };
        let val_start = find_bytes_from(&self.sheet_xml, b"ref=\"", tag)
            .context("<dimension> without ref attribute")?
            + 5;
        let val_end = find_bytes_from(&self.sheet_xml, b"\"", val_start)
            .context("attr closing '\"' not found")?;

        let current = std::str::from_utf8(&self.sheet_xml[val_start..val_end])?;
        let top = current
            .split(':')
            .next()
            .and_then(split_coord)
            .map_or(1, |(_, row)| row.max(1));
        let new_ref = format!("A{top}:{}{}", col_letter(self.last_col), self.last_row);
        self.sheet_xml.splice(val_start..val_end, new_ref.bytes());
        Ok(())
    }
}

fn write_cell<W: std::io::Write>(
    w: &mut Writer<W>,
    coord: &str,
    value: &str,
    style: Option<u32>,
) -> std::io::Result<()> {
    let is_formula = value.len() > 1 && value.starts_with('=');

    let mut c_elem = w.create_element("c").with_attribute(("r", coord));
    if let Some(s) = style {
        c_elem = c_elem.with_attribute(("s", s.to_string().as_str()));
    }
    if !is_formula {
        c_elem = c_elem.with_attribute(("t", "inlineStr"));
    }
    c_elem.write_inner_content(|w2| {
        if is_formula {
            w2.create_element("f")
                .write_text_content(BytesText::new(&value[1..]))?;
        } else {
            w2.create_element("is").write_inner_content(|w3| {
                let mut t = w3.create_element("t");
                if value.trim() != value {
                    t = t.with_attribute(("xml:space", "preserve"));
                }
                t.write_text_content(BytesText::new(value))?;
                Ok(())
            })?;
        }
        Ok(())
    })?;
    Ok(())
}

/// The `Char` production of XML 1.0: tab, newline and carriage return are the
/// only control characters a worksheet may contain.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Rebuilds a `<row ...>` start tag without `ht` / `customHeight`.
/// Returns `None` when the tag carries neither.
fn strip_row_height(tag: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut reader = Reader::from_reader(tag);
    let (start, self_closing) = match reader.read_event()? {
        Event::Start(e) => (e, false),
        Event::Empty(e) => (e, true),
        _ => return Ok(None),
    };
    let is_height = |key: &[u8]| key == b"ht" || key == b"customHeight";
    if !start
        .attributes()
        .with_checks(false)
        .flatten()
        .any(|a| is_height(a.key.as_ref()))
    {
        return Ok(None);
    }

    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut rebuilt = BytesStart::new(name);
    for a in start.attributes().with_checks(false).flatten() {
        if !is_height(a.key.as_ref()) {
            rebuilt.push_attribute(a);
        }
    }
    let mut writer = Writer::new(Vec::new());
    if self_closing {
        writer.write_event(Event::Empty(rebuilt))?;
    } else {
        writer.write_event(Event::Start(rebuilt))?;
    }
    Ok(Some(writer.into_inner()))
}

/* ========================== SHEET LAYOUT ================================== */

/// Byte span of one `<row>` element inside the worksheet XML.
#[derive(Debug, Clone)]
struct RowSpan {
    number: u32,
    start: usize,
    tag_end: usize, // end of the opening tag
    end: usize,
}

#[derive(Debug)]
struct CollapsedSheetData {
    start: usize,
    end: usize,
    name: Vec<u8>,
}

/// Row spans and the populated extent of a worksheet, read in one pass.
#[derive(Debug, Default)]
struct SheetDataLayout {
    rows: Vec<RowSpan>,
    close: Option<usize>, // position of </sheetData>
    collapsed: Option<CollapsedSheetData>,
    max_row: u32,
    max_col: u32,
}

impl SheetDataLayout {
    fn scan(sheet_xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(sheet_xml);
        let mut layout = SheetDataLayout::default();

        let mut row = 0u32;
        let mut col = 0u32;
        let mut open_row: Option<RowSpan> = None;

        loop {
            let start = reader.buffer_position() as usize;
            match reader.read_event()? {
                Event::Start(ref e) if e.local_name().as_ref() == b"row" => {
                    row = row_number(e)?.unwrap_or(row + 1);
                    col = 0;
                    open_row = Some(RowSpan {
                        number: row,
                        start,
                        tag_end: reader.buffer_position() as usize,
                        end: 0,
                    });
                }
                Event::Empty(ref e) if e.local_name().as_ref() == b"row" => {
                    row = row_number(e)?.unwrap_or(row + 1);
                    col = 0;
                    let end = reader.buffer_position() as usize;
                    layout.rows.push(RowSpan {
                        number: row,
                        start,
                        tag_end: end,
                        end,
                    });
                }
                Event::End(ref e) if e.local_name().as_ref() == b"row" => {
                    if let Some(mut span) = open_row.take() {
                        span.end = reader.buffer_position() as usize;
                        layout.rows.push(span);
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"c" => {
                    col = attr_value(e, b"r")?
                        .and_then(|r| split_coord(&r))
                        .map_or(col + 1, |(c, _)| c);
                    layout.max_row = layout.max_row.max(row);
                    layout.max_col = layout.max_col.max(col);
                }
                Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    layout.close = Some(start);
                }
                Event::Empty(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    layout.collapsed = Some(CollapsedSheetData {
                        start,
                        end: reader.buffer_position() as usize,
                        name: e.name().as_ref().to_vec(),
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(layout)
    }
}

fn row_number(e: &BytesStart<'_>) -> Result<Option<u32>> {
    Ok(attr_value(e, b"r")?.and_then(|r| r.parse::<u32>().ok()))
}

/* ========================== BYTE/XML HELPERS ============================== */

pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for a in e.attributes().with_checks(false).flatten() {
        if a.key.as_ref() == key {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

pub(crate) fn find_bytes(hay: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(hay, needle)
}

pub(crate) fn find_bytes_from(hay: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    memchr::memmem::find(hay.get(start..)?, needle).map(|p| p + start)
}

/// Increments `count="N"` on the first `tag`, if that start tag has one.
pub(crate) fn bump_count(xml: &mut Vec<u8>, tag: &[u8]) -> Result<()> {
    let pos = find_bytes(xml, tag).with_context(|| {
        format!("<{}> not found", String::from_utf8_lossy(&tag[1..]))
    })?;
    let tag_end = find_bytes_from(xml, b">", pos).context("malformed start tag")?;
    let Some(attr) = find_bytes_from(xml, b"count=\"", pos).filter(|&a| a < tag_end) else {
        return Ok(());
    };
    let start = attr + b"count=\"".len();
    let end = find_bytes_from(xml, b"\"", start).context("closing quote not found")?;
    let num: u32 = std::str::from_utf8(&xml[start..end])?.parse()?;
    xml.splice(start..end, (num + 1).to_string().bytes());
    Ok(())
}
