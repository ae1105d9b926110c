//! `backup sync`: mirror the source folder into the backup folder.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;
use tabled::{settings::Style, Table, Tabled};

use backup_sync::{pipeline, AutoApprove, Category, CategoryOutcome, RunOptions, SyncReport};

use super::ConfigArg;

/// Arguments for `backup sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Approve every category without asking.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Show what would change without asking or touching anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let options = RunOptions {
            dry_run: self.dry_run,
        };

        let report = if self.yes {
            pipeline::run(&config, &mut AutoApprove, options)
        } else if io::stdin().is_terminal() {
            let mut consent = |summary: &str| {
                Confirm::new()
                    .with_prompt(summary)
                    .default(false)
                    .interact()
                    .unwrap_or_else(|err| {
                        tracing::warn!("could not read answer, treating as no: {err}");
                        false
                    })
            };
            pipeline::run(&config, &mut consent, options)
        } else {
            // Answers piped in, one per line.
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut consent = |summary: &str| match ask_user(&mut input, &mut io::stderr(), summary) {
                Ok(answer) => answer,
                Err(err) => {
                    tracing::warn!("could not read answer, treating as no: {err}");
                    false
                }
            };
            pipeline::run(&config, &mut consent, options)
        }
        .context("backup failed")?;

        if self.json {
            println!("{}", report.to_json()?);
        } else {
            print_summary(&report, self.dry_run);
        }
        Ok(())
    }
}

/// Show `summary` and read `y` or `n` from non-interactive `input`. End of
/// input is a no.
pub fn ask_user<R: BufRead, W: Write>(input: &mut R, output: &mut W, summary: &str) -> io::Result<bool> {
    write!(output, "{summary} [y/n]: ")?;
    loop {
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => write!(output, "Please answer y or n [y/n]: ")?,
        }
    }
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "planned")]
    planned: usize,
    #[tabled(rename = "done")]
    done: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "failed")]
    failed: usize,
    #[tabled(rename = "status")]
    status: String,
}

fn print_summary(report: &SyncReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}backup v{} | {} -> {} | {} source entries | {} backup entries",
        env!("CARGO_PKG_VERSION"),
        report.source_root.display(),
        report.destination_root.display(),
        report.source_entries,
        report.destination_entries,
    );

    if report.plan.is_empty() {
        println!("{prefix}{} backup is up to date", "✓".green().bold());
    } else {
        let rows: Vec<OutcomeRow> = Category::ALL
            .into_iter()
            .map(|category| {
                let outcome = report.outcome(category);
                OutcomeRow {
                    action: category.to_string(),
                    planned: report.plan.paths(category).len(),
                    done: outcome.applied(),
                    skipped: outcome.skipped(),
                    failed: outcome.failed().len(),
                    status: outcome_label(outcome),
                }
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if let Some(folder) = &report.trash_folder {
        println!("Deleted entries moved to {}", folder.display());
    }
    for path in &report.plan.newer_in_destination {
        println!("  {}  {path} is newer in the backup; left untouched", "!".yellow().bold());
    }
    for warning in &report.warnings {
        println!("  {}  skipped {warning}", "!".yellow().bold());
    }
    for (category, failure) in report.failures() {
        println!(
            "  {}  {category} '{}': {}",
            "✗".red().bold(),
            failure.path,
            failure.error
        );
    }
}

fn outcome_label(outcome: &CategoryOutcome) -> String {
    match outcome {
        CategoryOutcome::Empty => "nothing to do".bright_black().to_string(),
        CategoryOutcome::Declined { .. } => "declined".yellow().to_string(),
        CategoryOutcome::DryRun { .. } => "dry run".cyan().to_string(),
        CategoryOutcome::Applied(batch) if batch.failed.is_empty() => "done".green().to_string(),
        CategoryOutcome::Applied(_) => "partial".red().to_string(),
    }
}
