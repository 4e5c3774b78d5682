//! Cell formats in `xl/styles.xml` and column widths in the worksheet `<cols>` block.

use anyhow::{Context, Result, bail};
use log::debug;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use regex::Regex;
use std::{collections::BTreeMap, fmt, ops::RangeInclusive, str::FromStr};

use crate::{XlsxEditor, attr_value, bump_count, find_bytes};

/* ========================== ALIGNMENT ===================================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizAlignment {
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    Distributed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertAlignment {
    Top,
    Center,
    Bottom,
    Justify,
    Distributed,
}

const HORIZ_NAMES: [(HorizAlignment, &str); 7] = [
    (HorizAlignment::General, "general"),
    (HorizAlignment::Left, "left"),
    (HorizAlignment::Center, "center"),
    (HorizAlignment::Right, "right"),
    (HorizAlignment::Fill, "fill"),
    (HorizAlignment::Justify, "justify"),
    (HorizAlignment::Distributed, "distributed"),
];

const VERT_NAMES: [(VertAlignment, &str); 5] = [
    (VertAlignment::Top, "top"),
    (VertAlignment::Center, "center"),
    (VertAlignment::Bottom, "bottom"),
    (VertAlignment::Justify, "justify"),
    (VertAlignment::Distributed, "distributed"),
];

/// Both alignment enums are spelled in styles.xml exactly as in these tables.
macro_rules! ooxml_names {
    ($ty:ty, $table:ident, $what:literal) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                $table
                    .iter()
                    .find(|(v, _)| *v == self)
                    .map_or("", |(_, name)| *name)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;
            fn from_str(s: &str) -> Result<Self> {
                match $table.iter().find(|(_, name)| *name == s) {
                    Some((v, _)) => Ok(*v),
                    None => bail!(concat!("Unknown ", $what, " alignment: {}"), s),
                }
            }
        }
    };
}

ooxml_names!(HorizAlignment, HORIZ_NAMES, "horizontal");
ooxml_names!(VertAlignment, VERT_NAMES, "vertical");

/// The `<alignment>` child of a cell format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignSpec {
    pub horiz: Option<HorizAlignment>,
    pub vert: Option<VertAlignment>,
    pub wrap: bool,
}

impl AlignSpec {
    /// Wrapped text, vertically centered: the format every pasted cell gets.
    pub fn wrapped_center() -> Self {
        Self {
            horiz: None,
            vert: Some(VertAlignment::Center),
            wrap: true,
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn from_tag(e: &BytesStart<'_>) -> Result<Self> {
        // values outside the enums keep the format from matching ours
        Ok(Self {
            horiz: attr_value(e, b"horizontal")?.and_then(|v| v.parse().ok()),
            vert: attr_value(e, b"vertical")?.and_then(|v| v.parse().ok()),
            wrap: attr_value(e, b"wrapText")?.is_some_and(|v| v == "1" || v == "true"),
        })
    }

    fn to_tag(&self) -> String {
        let mut tag = String::from("<alignment");
        if let Some(h) = self.horiz {
            tag += &format!(r#" horizontal="{h}""#);
        }
        if let Some(v) = self.vert {
            tag += &format!(r#" vertical="{v}""#);
        }
        if self.wrap {
            tag += r#" wrapText="1""#;
        }
        tag + "/>"
    }
}

/* ========================== CELL FORMATS ================================== */

/// One `<xf>` of `<cellXfs>`; absent ids read as 0.
#[derive(Debug, Clone, Default, PartialEq)]
struct CellFormat {
    num_fmt: u32,
    font: u32,
    fill: u32,
    border: u32,
    align: Option<AlignSpec>,
}

impl CellFormat {
    fn from_tag(e: &BytesStart<'_>) -> Result<Self> {
        let id = |key: &[u8]| -> Result<u32> {
            Ok(attr_value(e, key)?.and_then(|v| v.parse().ok()).unwrap_or(0))
        };
        Ok(Self {
            num_fmt: id(b"numFmtId")?,
            font: id(b"fontId")?,
            fill: id(b"fillId")?,
            border: id(b"borderId")?,
            align: None,
        })
    }

    /// Default font, fill, border and number format with the given alignment.
    fn plain_with(&self, align: &AlignSpec) -> bool {
        (self.num_fmt, self.font, self.fill, self.border) == (0, 0, 0, 0)
            && self.align.as_ref() == Some(align)
    }
}

impl XlsxEditor {
    /// Index of a plain cell format carrying `align`. The format is added to
    /// `<cellXfs>` only when the workbook doesn't have one yet.
    pub fn ensure_cell_style(&mut self, align: &AlignSpec) -> Result<u32> {
        if align.is_empty() {
            return Ok(0);
        }
        let formats = self.cell_formats()?;
        if let Some(idx) = formats.iter().position(|f| f.plain_with(align)) {
            debug!("reusing cell format {idx}");
            return Ok(idx as u32);
        }

        let xf = format!(
            r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1">{}</xf>"#,
            align.to_tag()
        );
        let close = find_bytes(&self.styles_xml, b"</cellXfs>")
            .context("styles.xml: </cellXfs> not found")?;
        self.styles_xml.splice(close..close, xf.bytes());
        bump_count(&mut self.styles_xml, b"<cellXfs")?;

        let idx = formats.len() as u32;
        debug!("added cell format {idx}: {align:?}");
        Ok(idx)
    }

    fn cell_formats(&self) -> Result<Vec<CellFormat>> {
        let mut reader = Reader::from_reader(self.styles_xml.as_slice());
        let mut inside = false;
        let mut current: Option<CellFormat> = None;
        let mut formats = Vec::new();

        loop {
            let ev = reader.read_event()?;
            let (e, empty) = match &ev {
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(e) => {
                    match e.local_name().as_ref() {
                        b"cellXfs" if inside => return Ok(formats),
                        b"xf" if inside => formats.extend(current.take()),
                        _ => {}
                    }
                    continue;
                }
                Event::Eof => bail!("styles.xml: <cellXfs> not found"),
                _ => continue,
            };
            match e.local_name().as_ref() {
                b"cellXfs" => inside = !empty,
                b"xf" if inside => {
                    let format = CellFormat::from_tag(e)?;
                    if empty {
                        formats.push(format);
                    } else {
                        current = Some(format);
                    }
                }
                b"alignment" => {
                    if let Some(format) = current.as_mut() {
                        format.align = Some(AlignSpec::from_tag(e)?);
                    }
                }
                _ => {}
            }
        }
    }
}

/* ========================== COLUMN WIDTHS ================================= */

/// Attributes of one column. Everything besides the width is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
struct ColAttrs {
    width: Option<f64>,
    custom_width: bool,
    rest: Vec<(String, String)>, // style, hidden, outlineLevel, ...
}

/// A `<cols>` block expanded to one entry per column index.
#[derive(Debug, Default)]
struct ColumnTable {
    cols: BTreeMap<u32, ColAttrs>,
}

impl ColumnTable {
    fn parse(block: &str) -> Result<Self> {
        let col_re = Regex::new(r#"<col\b[^>]*?/?>"#)?;
        let attr_re = Regex::new(r#"([A-Za-z_][\w.:-]*)\s*=\s*"([^"]*)""#)?;
        let mut table = Self::default();

        for tag in col_re.find_iter(block) {
            let (mut min, mut max) = (None, None);
            let mut attrs = ColAttrs::default();
            for cap in attr_re.captures_iter(tag.as_str()) {
                let (key, val) = (&cap[1], &cap[2]);
                match key {
                    "min" => min = Some(val.parse::<u32>()?),
                    "max" => max = Some(val.parse::<u32>()?),
                    "width" => attrs.width = val.parse().ok(),
                    "customWidth" => attrs.custom_width = val == "1" || val == "true",
                    _ => attrs.rest.push((key.to_owned(), val.to_owned())),
                }
            }
            let min = min.unwrap_or(1);
            for col in min..=max.unwrap_or(min) {
                table.cols.insert(col, attrs.clone());
            }
        }
        Ok(table)
    }

    fn set_width(&mut self, cols: RangeInclusive<u32>, width: f64) {
        for col in cols {
            let attrs = self.cols.entry(col).or_default();
            attrs.width = Some(width);
            attrs.custom_width = true;
        }
    }

    fn width(&self, col: u32) -> Option<f64> {
        self.cols.get(&col).and_then(|a| a.width)
    }

    /// Serializes back, merging neighbours with equal attributes into one `min..max` entry.
    fn render(&self) -> String {
        let mut runs: Vec<(u32, u32, &ColAttrs)> = Vec::new();
        for (&col, attrs) in &self.cols {
            match runs.last_mut() {
                Some((_, hi, prev)) if *hi + 1 == col && *prev == attrs => *hi = col,
                _ => runs.push((col, col, attrs)),
            }
        }

        let mut out = String::from("<cols>");
        for (lo, hi, attrs) in runs {
            out += &col_tag(lo, hi, attrs);
        }
        out + "</cols>"
    }
}

fn col_tag(min: u32, max: u32, attrs: &ColAttrs) -> String {
    let mut tag = format!(r#"<col min="{min}" max="{max}""#);
    if let Some(w) = attrs.width {
        tag += &format!(r#" width="{w}""#);
        if attrs.custom_width {
            tag += r#" customWidth="1""#;
        }
    }
    for (k, v) in &attrs.rest {
        tag += &format!(r#" {k}="{v}""#);
    }
    tag + "/>"
}

impl XlsxEditor {
    /// Sets a fixed width on every column in `cols` (1-based, inclusive).
    pub fn set_columns_width(&mut self, cols: RangeInclusive<u32>, width: f64) -> Result<&mut Self> {
        if cols.is_empty() {
            return Ok(self);
        }
        let span = match self.cols_span() {
            Some(span) => span,
            None => {
                // <cols> precedes <sheetData> in CT_Worksheet
                let at = find_bytes(&self.sheet_xml, b"<sheetData")
                    .context("<sheetData> not found on the current sheet")?;
                at..at
            }
        };
        let mut table = ColumnTable::parse(std::str::from_utf8(&self.sheet_xml[span.clone()])?)?;
        table.set_width(cols, width);
        self.sheet_xml.splice(span, table.render().into_bytes());
        Ok(self)
    }

    /// Width of column `col` (1-based) as recorded in `<cols>`.
    pub fn column_width(&self, col: u32) -> Result<Option<f64>> {
        let Some(span) = self.cols_span() else {
            return Ok(None);
        };
        let table = ColumnTable::parse(std::str::from_utf8(&self.sheet_xml[span])?)?;
        Ok(table.width(col))
    }

    /// Byte range of the whole `<cols>...</cols>` element.
    fn cols_span(&self) -> Option<std::ops::Range<usize>> {
        let start = find_bytes(&self.sheet_xml, b"<cols>")?;
        let end = find_bytes(&self.sheet_xml, b"</cols>")? + b"</cols>".len();
        Some(start..end)
    }
}

/* ========================== COORDINATES =================================== */

/// 1 -> "A", 27 -> "AA". Column 0 has no letters.
pub fn col_letter(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// "A" -> 1, "AA" -> 27.
pub fn col_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, ch| {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// "B7" -> (2, 7)
pub fn split_coord(coord: &str) -> Option<(u32, u32)> {
    let digits = coord.find(|c: char| c.is_ascii_digit())?;
    let (letters, row) = coord.split_at(digits);
    Some((col_index(letters)?, row.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(col_letter(1), "A");
        assert_eq!(col_letter(26), "Z");
        assert_eq!(col_letter(27), "AA");
        assert_eq!(col_letter(703), "AAA");
        assert_eq!(col_index("AB"), Some(28));
        assert_eq!(col_index(""), None);
        assert_eq!(split_coord("C12"), Some((3, 12)));
        assert_eq!(split_coord("12"), None);
        assert_eq!(split_coord("B"), None);
    }

    #[test]
    fn alignment_names() {
        assert_eq!("center".parse::<VertAlignment>().unwrap(), VertAlignment::Center);
        assert_eq!(HorizAlignment::Distributed.to_string(), "distributed");
        let err = "middle".parse::<VertAlignment>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown vertical alignment: middle");
        assert_eq!(
            AlignSpec::wrapped_center().to_tag(),
            r#"<alignment vertical="center" wrapText="1"/>"#
        );
    }

    #[test]
    fn cols_merge_and_keep_unknown_attributes() -> anyhow::Result<()> {
        let mut table = ColumnTable::parse(
            r#"<cols><col min="2" max="3" width="9" customWidth="1" outlineLevel="1"/><col min="6" max="6" width="12"/></cols>"#,
        )?;
        assert_eq!(table.width(3), Some(9.0));
        assert_eq!(table.width(4), None);

        table.set_width(1..=4, 100.0);
        assert_eq!(
            table.render(),
            r#"<cols><col min="1" max="1" width="100" customWidth="1"/><col min="2" max="3" width="100" customWidth="1" outlineLevel="1"/><col min="4" max="4" width="100" customWidth="1"/><col min="6" max="6" width="12"/></cols>"#
        );
        Ok(())
    }

    #[test]
    fn prefixed_col_attributes_survive() -> anyhow::Result<()> {
        let mut table = ColumnTable::parse(
            r#"<cols><col min="1" max="1" width="5" x14ac:dyDescent="0.25" my_attr.v-2="x"/></cols>"#,
        )?;
        table.set_width(1..=1, 100.0);
        assert_eq!(
            table.render(),
            r#"<cols><col min="1" max="1" width="100" customWidth="1" x14ac:dyDescent="0.25" my_attr.v-2="x"/></cols>"#
        );
        Ok(())
    }
}
