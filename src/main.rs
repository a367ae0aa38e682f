mod buffer;
mod console;
mod pager;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::RawModeWriter;
use pager::Pager;

#[derive(Parser)]
#[command(name = "moreish")]
#[command(version = "0.1.0")]
#[command(about = "A more-style terminal pager with search")]
struct Cli {
    /// File to page; reads piped stdin when omitted
    file: Option<PathBuf>,

    /// Append diagnostic logs to this file (filtered by RUST_LOG)
    #[arg(long, env = "MOREISH_LOG")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let source: Box<dyn Read> = match &cli.file {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => {
            if io::stdin().is_terminal() {
                bail!("No input: pass a file or pipe content into stdin");
            }
            Box::new(io::stdin())
        }
    };

    // Raw mode must be active before the pager samples geometry; restore
    // runs on the error path too so the shell is left usable.
    let mut console = console::init()?;
    let out = RawModeWriter::new(BufWriter::new(io::stdout()));
    let result = Pager::new(source, &mut console, out).and_then(Pager::run);
    console::restore()?;
    result
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
