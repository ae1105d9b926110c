//! `backup plan`: show what `backup sync` would do.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use backup_sync::{pipeline, ActionPlan, AutoApprove, Category, RunOptions, WalkWarning};

use super::ConfigArg;

/// Arguments for `backup plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PlanJson<'a> {
    plan: &'a ActionPlan,
    warnings: &'a [WalkWarning],
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let report = pipeline::run(&config, &mut AutoApprove, RunOptions { dry_run: true })
            .context("failed to compute plan")?;

        if self.json {
            let payload = PlanJson {
                plan: &report.plan,
                warnings: &report.warnings,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize plan JSON")?
            );
            return Ok(());
        }

        print_plan(&report.plan);
        for warning in &report.warnings {
            println!("  {}  skipped {warning}", "!".yellow().bold());
        }
        Ok(())
    }
}

fn print_plan(plan: &ActionPlan) {
    if plan.is_empty() {
        println!("{} nothing to do ({} unchanged)", "✓".green().bold(), plan.unchanged);
    }
    for category in Category::ALL {
        for path in plan.paths(category) {
            let marker = match category {
                Category::Create => "+".green(),
                Category::Update => "~".yellow(),
                Category::Delete => "-".red(),
            };
            match plan.kind_change(path) {
                Some(change) => println!(
                    "  {marker}  {path}  ({} replaces {})",
                    change.source, change.destination
                ),
                None => println!("  {marker}  {path}"),
            }
        }
    }
    for path in &plan.newer_in_destination {
        println!("  {}  {path}  (newer in backup, kept)", "!".yellow().bold());
    }
    if !plan.is_empty() {
        println!(
            "{} to create, {} to update, {} to delete, {} unchanged",
            plan.to_create.len(),
            plan.to_update.len(),
            plan.to_delete.len(),
            plan.unchanged
        );
    }
}
