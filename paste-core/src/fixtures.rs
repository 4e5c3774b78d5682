//! Small workbooks written at test time, and readers to check them afterwards.

use ::zip as zip_crate;
use anyhow::Result;
use quick_xml::{Reader, escape::escape, events::Event};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use crate::{XlsxEditor, attr_value};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

/// Wraps worksheet children (`<cols>`, `<sheetData>`, ...) into a full part.
pub fn worksheet(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><dimension ref="A1"/>{body}</worksheet>"#
    )
}

/// A worksheet with nothing in it.
pub fn empty_worksheet() -> String {
    worksheet("<sheetData/>")
}

/// Writes an xlsx at `path` with one worksheet per `(name, xml)`, in order.
pub fn write_workbook(path: &Path, sheets: &[(&str, String)]) -> Result<()> {
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    let mut workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );

    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(*name)
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }
    content_types.push_str("</Types>");
    workbook.push_str("</sheets></workbook>");
    rels.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="{REL_NS}/styles" Target="styles.xml"/></Relationships>"#,
        sheets.len() + 1
    ));

    let root_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    );

    let mut zout = zip_crate::ZipWriter::new(File::create(path)?);
    let opt: zip_crate::write::FileOptions<'_, ()> = zip_crate::write::FileOptions::default()
        .compression_method(zip_crate::CompressionMethod::Deflated);

    let mut put = |name: &str, content: &str| -> Result<()> {
        zout.start_file(name, opt)?;
        zout.write_all(content.as_bytes())?;
        Ok(())
    };
    put("[Content_Types].xml", &content_types)?;
    put("_rels/.rels", &root_rels)?;
    put("xl/workbook.xml", &workbook)?;
    put("xl/_rels/workbook.xml.rels", &rels)?;
    put("xl/styles.xml", STYLES)?;
    for (i, (_, xml)) in sheets.iter().enumerate() {
        put(&format!("xl/worksheets/sheet{}.xml", i + 1), xml)?;
    }
    zout.finish()?;
    Ok(())
}

/// Text of every cell of a sheet keyed by its reference ("A1").
/// Formulas come back with their leading `=`.
pub fn read_cells(path: &Path, sheet_name: &str) -> Result<BTreeMap<String, String>> {
    let editor = XlsxEditor::open(path, sheet_name)?;
    let mut reader = Reader::from_reader(editor.sheet_xml());

    let mut cells = BTreeMap::new();
    let mut coord: Option<String> = None;
    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if e.local_name().as_ref() == b"c" => {
                coord = attr_value(e, b"r")?;
                text.clear();
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"c" => {
                if let Some(r) = attr_value(e, b"r")? {
                    cells.insert(r, String::new());
                }
            }
            Event::Start(ref e) if matches!(e.local_name().as_ref(), b"t" | b"v") => {
                in_text = true;
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"f" => {
                in_text = true;
                text.push('=');
            }
            Event::Text(ref t) if in_text => {
                text.push_str(&String::from_utf8_lossy(t));
            }
            Event::End(ref e) if matches!(e.local_name().as_ref(), b"t" | b"v" | b"f") => {
                in_text = false;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"c" => {
                if let Some(r) = coord.take() {
                    cells.insert(r, std::mem::take(&mut text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(cells)
}

/// Raw text of one archive part.
pub fn read_part(path: &Path, name: &str) -> Result<String> {
    let mut zip = zip_crate::ZipArchive::new(File::open(path)?)?;
    let mut part = zip.by_name(name)?;
    let mut out = String::new();
    part.read_to_string(&mut out)?;
    Ok(out)
}

/// Raw XML of the worksheet behind `sheet_name`.
pub fn sheet_xml(path: &Path, sheet_name: &str) -> Result<String> {
    let editor = XlsxEditor::open(path, sheet_name)?;
    Ok(String::from_utf8(editor.sheet_xml().to_vec())?)
}
