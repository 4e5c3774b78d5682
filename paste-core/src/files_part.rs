use crate::{SheetDataLayout, XlsxEditor, attr_value};
use ::zip as zip_crate;
use anyhow::{Context, Result};
use log::{debug, info};
use quick_xml::{Reader, events::Event};
use std::{
    fs::{self, File},
    io::{Read, Seek, Write},
    path::Path,
};
use tempfile::NamedTempFile;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PART: &str = "xl/styles.xml";

/// Work with files
impl XlsxEditor {
    /// Opens the workbook at `src` and loads the sheet called `sheet_name`.
    ///
    /// The name must match exactly; a missing sheet is an error and nothing
    /// is created.
    pub fn open<P: AsRef<Path>>(src: P, sheet_name: &str) -> Result<Self> {
        let src_path = src.as_ref().to_path_buf();
        let file = File::open(&src_path)
            .with_context(|| format!("cannot open {}", src_path.display()))?;
        let mut zip = zip_crate::ZipArchive::new(file)
            .with_context(|| format!("{} is not an xlsx archive", src_path.display()))?;

        // ── sheet name -> r:id -> worksheet part ───────────────────────
        let workbook_xml = read_part(&mut zip, WORKBOOK_PART)?;
        let rels_xml = read_part(&mut zip, WORKBOOK_RELS_PART)?;

        let rid = sheet_relationship_id(&workbook_xml, sheet_name)?
            .with_context(|| format!("Sheet '{sheet_name}' not found"))?;
        let target = relationship_target(&rels_xml, &rid)?.with_context(|| {
            format!("Relationship for `{sheet_name}` not found in {WORKBOOK_RELS_PART}")
        })?;
        let sheet_path = part_path(&target);
        debug!("sheet '{sheet_name}' -> {rid} -> {sheet_path}");

        let sheet_xml = read_part(&mut zip, &sheet_path)?;
        let styles_xml = read_part(&mut zip, STYLES_PART)?;

        let layout = SheetDataLayout::scan(&sheet_xml)
            .with_context(|| format!("{sheet_path} is not valid worksheet XML"))?;
        debug!(
            "'{sheet_name}': max_row={}, max_col={}",
            layout.max_row, layout.max_col
        );

        Ok(Self {
            src_path,
            sheet_name: sheet_name.to_owned(),
            sheet_path,
            sheet_xml,
            styles_xml,
            last_row: layout.max_row,
            last_col: layout.max_col,
        })
    }

    /// Writes the whole archive to `dst`, which may be the file it was opened from.
    ///
    /// The archive is built in a temporary file next to `dst` and renamed over
    /// it, so the source stays readable while its parts are copied.
    pub fn save<P: AsRef<Path>>(&self, dst: P) -> Result<()> {
        let dst = dst.as_ref();
        let mut zin = zip_crate::ZipArchive::new(File::open(&self.src_path)?)?;

        let dir = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("cannot create a temporary file in {}", dir.display()))?;
        {
            let mut zout = zip_crate::ZipWriter::new(&mut tmp);
            let opt: zip_crate::write::FileOptions<'_, ()> =
                zip_crate::write::FileOptions::default()
                    .compression_method(zip_crate::CompressionMethod::Deflated);

            for i in 0..zin.len() {
                let file = zin.by_index_raw(i)?;
                let name = file.name().to_owned();

                if name == self.sheet_path {
                    zout.start_file(name.as_str(), opt)?;
                    zout.write_all(&self.sheet_xml)?;
                } else if name == STYLES_PART {
                    zout.start_file(name.as_str(), opt)?;
                    zout.write_all(&self.styles_xml)?;
                } else {
                    zout.raw_copy_file(file)?;
                }
            }
            zout.finish()?;
        }

        if let Ok(meta) = fs::metadata(dst) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.persist(dst)
            .with_context(|| format!("cannot write {}", dst.display()))?;

        info!(
            "saved {} (sheet '{}', max_row={})",
            dst.display(),
            self.sheet_name,
            self.last_row
        );
        Ok(())
    }
}

/// Returns the sheet names of a workbook in tab order.
pub fn scan<P: AsRef<Path>>(src: P) -> Result<Vec<String>> {
    let src = src.as_ref();
    let file = File::open(src).with_context(|| format!("cannot open {}", src.display()))?;
    let mut zip = zip_crate::ZipArchive::new(file)
        .with_context(|| format!("{} is not an xlsx archive", src.display()))?;
    let wb_xml = read_part(&mut zip, WORKBOOK_PART)?;

    let mut reader = Reader::from_reader(wb_xml.as_slice());
    reader.config_mut().trim_text(true);

    let mut names = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                if let Some(n) = attr_value(e, b"name")? {
                    names.push(n);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(names)
}

fn read_part<R: Read + Seek>(zip: &mut zip_crate::ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut part = zip
        .by_name(name)
        .with_context(|| format!("{name} not found"))?;
    let mut buf = Vec::with_capacity(part.size() as usize);
    part.read_to_end(&mut buf)
        .with_context(|| format!("cannot read {name}"))?;
    Ok(buf)
}

/// `r:id` of the `<sheet>` whose name equals `sheet_name`.
fn sheet_relationship_id(workbook_xml: &[u8], sheet_name: &str) -> Result<Option<String>> {
    let mut rdr = Reader::from_reader(workbook_xml);
    rdr.config_mut().trim_text(true);

    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                let mut name: Option<String> = None;
                let mut rid: Option<String> = None;
                for a in e.attributes().with_checks(false).flatten() {
                    // the relationship prefix is usually `r:` but is not fixed
                    let is_rid =
                        a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id";
                    if a.key.as_ref() == b"name" {
                        name = Some(a.unescape_value()?.into_owned());
                    } else if is_rid {
                        rid = Some(a.unescape_value()?.into_owned());
                    }
                }
                if name.as_deref() == Some(sheet_name) {
                    return Ok(rid);
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn relationship_target(rels_xml: &[u8], rid: &str) -> Result<Option<String>> {
    let mut rdr = Reader::from_reader(rels_xml);
    rdr.config_mut().trim_text(true);

    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attr_value(e, b"Id")?.as_deref() == Some(rid) {
                    return attr_value(e, b"Target");
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Relationship targets are relative to `xl/` unless they start with `/`.
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(abs) => abs.to_owned(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

#[cfg(test)]
mod tests {
    use super::part_path;

    #[test]
    fn relative_and_absolute_targets() {
        assert_eq!(part_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(part_path("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(part_path("./worksheets/sheet3.xml"), "xl/worksheets/sheet3.xml");
    }
}
