use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use colored::Colorize;
use log::{debug, trace};
use serde::Serialize;
use typeswrong_analysis::{
    Analysis, Problem, ProblemDetails, ProblemKind, get_problems, group_by_kind,
};

#[derive(Serialize)]
struct RawReport<'a> {
    analysis: &'a Analysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    problems: Option<BTreeMap<ProblemKind, Vec<Problem>>>,
}

/// Writes the whole analysis as pretty JSON, problems grouped by kind.
pub fn print_raw_json<W: Write>(writer: &mut W, analysis: &Analysis) -> anyhow::Result<()> {
    let problems = analysis.contains_types().then(|| group_by_kind(get_problems(analysis, None)));
    serde_json::to_writer_pretty(&mut *writer, &RawReport { analysis, problems })?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn package_label(analysis: &Analysis) -> String {
    match (analysis.package_name(), analysis.package_version()) {
        (Some(name), Some(version)) => format!("{name}@{version}"),
        (Some(name), None) => name.to_string(),
        _ => "<unnamed package>".to_string(),
    }
}

pub fn print_untyped_message<W: Write>(writer: &mut W, analysis: &Analysis) -> io::Result<()> {
    debug!("Package contains no types");
    writeln!(
        writer,
        "{} {} does not contain types",
        "ℹ".blue().bold(),
        package_label(analysis).bright_white().bold()
    )?;
    writer.flush()?;
    Ok(())
}

pub fn print_no_problems_message<W: Write>(writer: &mut W, analysis: &Analysis) -> io::Result<()> {
    debug!("No problems found");
    writeln!(
        writer,
        "{} No problems found in {} ({} entry points)",
        "✓".green().bold(),
        package_label(analysis).bright_white().bold(),
        analysis.entry_points().len()
    )?;
    writer.flush()?;
    Ok(())
}

/// One-line description of what a problem carries beyond its kind.
fn detail_text(problem: &Problem) -> Option<String> {
    match &problem.details {
        ProblemDetails::None => None,
        ProblemDetails::ResolutionFailure { reason } => Some(reason.to_string()),
        ProblemDetails::FormatMismatch { expected, actual, .. } => {
            Some(format!("expected {expected}, found {actual}"))
        }
        ProblemDetails::MissingExports { names } => Some(format!("missing: {}", names.join(", "))),
        ProblemDetails::UntypedCells { cells } => Some(format!("{} untyped", cells.len())),
    }
}

fn problem_line(problem: &Problem) -> String {
    let mut line = format!("{:<12} {}", problem.resolution_kind.as_str(), problem.entry_point);
    match (&problem.types_path, &problem.runtime_path) {
        (Some(types), Some(runtime)) => line.push_str(&format!("  {types} → {runtime}")),
        (Some(path), None) | (None, Some(path)) => line.push_str(&format!("  {path}")),
        (None, None) => {}
    }
    line
}

pub fn print_problems<W: Write>(
    writer: &mut W,
    analysis: &Analysis,
    summary: bool,
) -> io::Result<()> {
    let problems = get_problems(analysis, None);
    debug!("Printing {} problems", problems.len());
    let groups = group_by_kind(problems);

    writeln!(
        writer,
        "{} Problems found in {}\n",
        "⚠".yellow().bold(),
        package_label(analysis).bright_white().bold()
    )?;

    for (kind, grouped) in &groups {
        trace!("Printing {} problems of kind {}", grouped.len(), kind);
        writeln!(writer, "{} {}", kind.title().bold(), format!("({kind})").dimmed())?;
        writeln!(writer, "  {}", kind.description().dimmed())?;

        for (idx, problem) in grouped.iter().enumerate() {
            let prefix = if idx == grouped.len() - 1 { "└──" } else { "├──" };
            match detail_text(problem) {
                Some(detail) => writeln!(
                    writer,
                    "{}  {} ({})",
                    prefix.dimmed(),
                    problem_line(problem),
                    detail.red()
                )?,
                None => writeln!(writer, "{}  {}", prefix.dimmed(), problem_line(problem))?,
            }
        }
        writeln!(writer)?;
    }

    if summary {
        print_summary(writer, analysis, &groups)?;
    }

    writer.flush()?;
    Ok(())
}

fn print_summary<W: Write>(
    writer: &mut W,
    analysis: &Analysis,
    groups: &BTreeMap<ProblemKind, Vec<Problem>>,
) -> io::Result<()> {
    let total: usize = groups.values().map(Vec::len).sum();
    let affected: usize = analysis
        .entry_points()
        .iter()
        .filter(|e| analysis.problems().iter().any(|p| p.entry_point == e.subpath))
        .count();

    writeln!(writer, "{}", "─".repeat(60).dimmed())?;
    writeln!(writer, "{}", "Summary".bold())?;
    writeln!(writer, "  Total problems: {}", total.to_string().yellow().bold())?;
    writeln!(
        writer,
        "  Entry points affected: {} of {}",
        affected.to_string().red().bold(),
        analysis.entry_points().len()
    )?;
    for (kind, grouped) in groups {
        writeln!(writer, "    {}: {}", kind, grouped.len().to_string().red())?;
    }
    Ok(())
}
