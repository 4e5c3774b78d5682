use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use paste_core::{
    AppendOptions, parse_table, scan,
    style::{AlignSpec, HorizAlignment, VertAlignment},
};
use std::{
    fs,
    io::{self, IsTerminal, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};
use xlsx_paste::{AppState, Frontend, Notice, logging};

#[derive(Parser)]
#[command(author, version, about = "Append pipe-delimited tables to an existing xlsx sheet", long_about = None)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append `|a|b|` lines to a sheet and save the workbook in place
    Append {
        /// Workbook to modify
        file: PathBuf,

        /// Target sheet (default: first sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Read the table from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Width applied to every column of the sheet
        #[arg(long, default_value_t = paste_core::append::DEFAULT_COLUMN_WIDTH)]
        column_width: f64,

        /// Keep explicit row heights on the written rows
        #[arg(long)]
        no_auto_height: bool,

        /// Horizontal alignment of written cells
        #[arg(long)]
        horizontal: Option<HorizAlignment>,

        /// Vertical alignment of written cells
        #[arg(long, default_value = "center")]
        vertical: VertAlignment,

        /// Don't wrap text in written cells
        #[arg(long)]
        no_wrap: bool,

        /// Print the parsed rows and write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// List the sheets of a workbook
    Sheets {
        file: PathBuf,
    },
}

/// Reads the pasted table from `path`, or from stdin when no path is given.
fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Can't read {}", path.display()))
        }
        None => {
            if io::stdin().is_terminal() {
                eprintln!("Paste the table, then press Ctrl-D:");
            }
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Can't read stdin")?;
            Ok(text)
        }
    }
}

/// Terminal stand-in for the paste window. The text is read before the
/// workbook is touched; notices go to stdout/stderr.
struct Terminal {
    text: String,
}

impl Frontend for Terminal {
    fn set_sheet_options(&mut self, names: &[String], selected: &str) {
        log::info!("sheets: {} (selected '{selected}')", names.join(", "));
    }

    fn show_file(&mut self, path: &Path) {
        log::info!("workbook: {}", path.display());
    }

    fn input_text(&mut self) -> String {
        self.text.clone()
    }

    fn notify(&mut self, notice: &Notice) {
        match notice {
            Notice::Success(_) => println!("{}", notice.message()),
            Notice::Error(_) => eprintln!("{}: {}", notice.title(), notice.message()),
        }
    }

    fn clear_input(&mut self) {
        self.text.clear();
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Sheets { file } => {
            for name in scan(&file)? {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Append {
            file,
            sheet,
            input,
            column_width,
            no_auto_height,
            horizontal,
            vertical,
            no_wrap,
            dry_run,
        } => {
            let text = read_input(input.as_deref())?;

            if dry_run {
                let table = parse_table(&text);
                for row in table.rows() {
                    println!("{row:?}");
                }
                eprintln!("{} rows parsed, nothing written", table.len());
                return Ok(ExitCode::SUCCESS);
            }

            let options = AppendOptions {
                column_width,
                alignment: AlignSpec {
                    horiz: horizontal,
                    vert: Some(vertical),
                    wrap: !no_wrap,
                },
                auto_row_height: !no_auto_height,
            };
            let mut ui = Terminal { text };
            let mut state = AppState::new(options);
            state.select_file(&file, &mut ui)?;
            if let Some(sheet) = sheet {
                state.select_sheet(sheet);
            }

            match state.save_to_excel(&mut ui) {
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(err) if err.is_precondition() => Ok(ExitCode::from(2)),
                Err(err) => Err(err.into()),
            }
        }
    }
}
