// End-to-end runs of the `xlsx-paste` binary against generated workbooks.

use anyhow::Result;
use paste_core::fixtures::{empty_worksheet, read_cells, read_part, write_workbook};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};
use tempfile::TempDir;

fn xlsx_paste() -> Command {
    Command::new(env!("CARGO_BIN_EXE_xlsx-paste"))
}

fn book(dir: &TempDir) -> Result<PathBuf> {
    let path = dir.path().join("book.xlsx");
    write_workbook(
        &path,
        &[("First", empty_worksheet()), ("Second", empty_worksheet())],
    )?;
    Ok(path)
}

fn table_file(dir: &TempDir, text: &str) -> Result<PathBuf> {
    let path = dir.path().join("table.txt");
    fs::write(&path, text)?;
    Ok(path)
}

fn append(file: &Path, extra: &[&str]) -> Result<Output> {
    Ok(xlsx_paste().arg("append").arg(file).args(extra).output()?)
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn append_from_file_goes_to_first_sheet() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;
    let input = table_file(&dir, "|A|B|\n|C|D<br>E|\n")?;

    let out = append(&path, &["-i", input.to_str().unwrap_or_default()])?;
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert!(stdout(&out).contains("2 rows saved to Excel successfully!"));

    let cells = read_cells(&path, "First")?;
    assert_eq!(cells["A1"], "A");
    assert_eq!(cells["B2"], "D\nE");
    assert!(read_cells(&path, "Second")?.is_empty());
    Ok(())
}

#[test]
fn append_reads_stdin() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;

    let mut child = xlsx_paste()
        .args(["append", "--sheet", "Second"])
        .arg(&path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(b"|x|y|\n")?;
    }
    let out = child.wait_with_output()?;
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));

    let cells = read_cells(&path, "Second")?;
    assert_eq!(cells["A1"], "x");
    assert_eq!(cells["B1"], "y");
    Ok(())
}

#[test]
fn dry_run_leaves_workbook_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;
    let before = fs::read(&path)?;
    let input = table_file(&dir, "|A|B|\n")?;

    let out = append(&path, &["--dry-run", "-i", input.to_str().unwrap_or_default()])?;
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert!(stdout(&out).contains(r#"["A", "B"]"#));
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn no_valid_data_exits_with_2() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;
    let before = fs::read(&path)?;
    let input = table_file(&dir, "no pipes here\n")?;

    let out = append(&path, &["-i", input.to_str().unwrap_or_default()])?;
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("No valid data to save."));
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn unreadable_input_is_an_error_not_missing_data() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;
    let before = fs::read(&path)?;
    let missing = dir.path().join("does_not_exist.txt");

    let out = append(&path, &["-i", missing.to_str().unwrap_or_default()])?;
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("Can't read"), "{err}");
    assert!(!err.contains("No valid data"), "{err}");
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn unknown_sheet_exits_with_1() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;
    let before = fs::read(&path)?;
    let input = table_file(&dir, "|a|\n")?;

    let out = append(
        &path,
        &["-s", "Missing", "-i", input.to_str().unwrap_or_default()],
    )?;
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Sheet 'Missing' not found"));
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn alignment_and_width_flags_reach_the_workbook() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;
    let input = table_file(&dir, "|a|b|\n")?;

    let out = append(
        &path,
        &[
            "--horizontal",
            "left",
            "--vertical",
            "top",
            "--no-wrap",
            "--column-width",
            "25",
            "-i",
            input.to_str().unwrap_or_default(),
        ],
    )?;
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));

    let styles = read_part(&path, "xl/styles.xml")?;
    assert!(styles.contains(r#"<alignment horizontal="left" vertical="top"/>"#));
    let sheet = read_part(&path, "xl/worksheets/sheet1.xml")?;
    assert!(sheet.contains(r#"<col min="1" max="2" width="25" customWidth="1"/>"#));
    Ok(())
}

#[test]
fn bad_alignment_name_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;

    let out = append(&path, &["--vertical", "middle", "--dry-run"])?;
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("Unknown vertical alignment: middle"));
    Ok(())
}

#[test]
fn sheets_lists_names_in_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = book(&dir)?;

    let out = xlsx_paste().arg("sheets").arg(&path).output()?;
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert_eq!(stdout(&out), "First\nSecond\n");
    Ok(())
}
