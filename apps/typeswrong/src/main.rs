mod loader;
mod reporter;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use log::{debug, info};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use typeswrong_analysis::{Config, get_problems};

#[derive(Debug, Parser)]
#[command(name = "typeswrong")]
#[command(about = "Check whether a package's types agree with the code it runs", long_about = None)]
struct Cli {
    /// Package directory or npm tarball (.tgz)
    package: PathBuf,

    /// Print the full analysis as JSON
    #[arg(short, long)]
    raw: bool,

    /// Omit the summary after the problem list
    #[arg(long)]
    no_summary: bool,

    #[command(flatten)]
    config: Config,
}

fn main() -> Result<()> {
    env_logger::init();

    // stdio is blocked by LineWriter, use a BufWriter to reduce syscalls.
    // See https://github.com/rust-lang/rust/issues/60673
    let mut stdout = BufWriter::new(std::io::stdout());

    let cli = Cli::parse();
    debug!("Parsed CLI arguments: {:?}", cli);

    let start = Instant::now();
    let num_threads = rayon::current_num_threads();

    let vfs = loader::load_package(&cli.package)?;
    info!(
        "Analyzing {} files from {} (using {} threads)",
        vfs.len(),
        cli.package.display(),
        num_threads
    );

    let analysis = typeswrong_analysis::analyze(&vfs, &cli.config)
        .with_context(|| format!("Failed to analyze {}", cli.package.display()))?;
    let problems = get_problems(&analysis, None);
    debug!("Found {} problems", problems.len());

    let elapsed_ms = start.elapsed().as_millis();

    if cli.raw {
        reporter::print_raw_json(&mut stdout, &analysis)?;
    } else {
        if !analysis.contains_types() {
            reporter::print_untyped_message(&mut stdout, &analysis)?;
        } else if problems.is_empty() {
            reporter::print_no_problems_message(&mut stdout, &analysis)?;
        } else {
            reporter::print_problems(&mut stdout, &analysis, !cli.no_summary)?;
        }

        writeln!(
            stdout,
            "\n{} Finished in {}ms on {} files (using {} threads).",
            "●".bright_blue(),
            elapsed_ms.to_string().cyan(),
            vfs.len().to_string().cyan(),
            num_threads.to_string().cyan()
        )?;
    }
    stdout.flush()?;

    // Non-zero exit to fail CI
    if analysis.contains_types() && !problems.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
