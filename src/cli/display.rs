use crate::api::client::{ModelTransport, Transport};
use crate::commands::analyze::AnalysisOutcome;
use crate::errors::AppError;
use crate::file_processing::scanner::ScanResult;
use crate::models::{ApplyMode, ApplySummary, ChangeSet};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Manages CLI display and output formatting.
#[derive(Default)]
pub struct CliDisplayManager {
    spinner: Option<ProgressBar>,
}

impl CliDisplayManager {
    pub fn new() -> Self {
        CliDisplayManager { spinner: None }
    }

    pub fn print_header(&self) {
        let title = format!("│  🩹 mend v{:<9}│", env!("CARGO_PKG_VERSION"));
        println!("\n{}", "╭──────────────────────╮".bright_magenta());
        println!("{}", title.bright_magenta().bold());
        println!("{}\n", "╰──────────────────────╯".bright_magenta());
    }

    pub fn print_collect_start(&self, root: &Path, target: &str) {
        self.print_section(
            "📁",
            "[1/3] Collecting Context",
            &format!("Searching {} for '{}'", root.display(), target),
        );
    }

    pub fn print_collect_result(&self, result: &ScanResult) {
        self.print_info(&format!(
            "Found {} file(s), written to {}",
            result.file_count(),
            result.output_path.display()
        ));
        for file in &result.files {
            self.print_detail(file);
        }
    }

    pub fn print_analyze_start(&self, model: &str, transport: &Transport) {
        self.print_section(
            "⚓",
            "[2/3] Analyzing Error",
            &format!("{} via {}", model, transport.describe()),
        );
    }

    pub fn print_analysis_result(&self, outcome: &AnalysisOutcome) {
        if !outcome.reply_ok {
            self.print_warning("The model returned an empty response");
        }
        let change_set = &outcome.change_set;
        let hunks = change_set
            .code_change
            .values()
            .flat_map(|change| change.line_edits.values())
            .filter(|edit| !edit.is_empty())
            .count();
        self.print_info(&format!(
            "Proposed changes for {} file(s): {} full rewrite(s), {} line edit(s)",
            change_set.code_change.len(),
            change_set.full_replacements().count(),
            hunks
        ));
        if !change_set.root_cause.is_empty() {
            self.print_detail(&format!("Root cause: {}", change_set.root_cause));
        }
        if !change_set.fix_description.is_empty() {
            self.print_detail(&format!("Fix: {}", change_set.fix_description));
        }
        self.print_info(&format!("Saved to {}", outcome.session.dir.display()));
    }

    pub fn print_apply_result(&self, session_dir: &Path, summary: &ApplySummary) {
        let title = match summary.mode {
            ApplyMode::Overwrite => "[3/3] Applying Changes",
            ApplyMode::DryRun => "[3/3] Previewing Changes",
        };
        self.print_section("💾", title, &format!("From {}", session_dir.display()));

        for file in &summary.files {
            match (&file.diff, file.created) {
                (Some(diff), _) => println!("{}", colorize_diff(diff)),
                (None, true) => self.print_detail(&format!("created {}", file.path)),
                (None, false) => self.print_detail(&format!("updated {}", file.path)),
            }
        }
        for skipped in &summary.skipped {
            self.print_warning(&format!("skipped {}: {}", skipped.path, skipped.reason));
        }
    }

    pub fn print_parse_result(&self, output: &Path, change_set: &ChangeSet) {
        self.print_info(&format!(
            "Parsed {} file change(s) into {}",
            change_set.code_change.len(),
            output.display()
        ));
    }

    pub fn print_rollback_result(&self, restored: &[PathBuf]) {
        self.print_section("⏪", "Rollback", "");
        for path in restored {
            self.print_detail(&path.display().to_string());
        }
        self.print_info(&format!("Restored {} file(s)", restored.len()));
    }

    pub fn print_skipped(&self, stage: &str) {
        println!("{} {}", "⏭".bright_black(), format!("{stage} (skipped)").dimmed());
    }

    pub fn print_footer(&self, updated_files: usize, duration: Duration) {
        println!();
        println!(
            "{}",
            format!("⚡ Updated {} file(s)", updated_files)
                .bright_white()
                .dimmed(),
        );
        println!(
            "{}",
            format!("⚡ Completed in {:.2?}", duration)
                .bright_white()
                .dimmed(),
        );
        println!();
    }

    pub fn print_error(&self, error: &AppError) {
        eprintln!("{} {}", "✖".bright_red().bold(), error.to_string().bright_red());
    }

    pub fn print_warning(&self, message: &str) {
        println!("   {} {}", "!".bright_yellow().bold(), message.yellow());
    }

    /// Starts a spinner for ongoing operations.
    pub fn start_spinner(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        let template = format!(
            "   {} {{spinner}} {}",
            "→".bright_white(),
            message.italic().bright_white()
        );
        if let Ok(style) = ProgressStyle::with_template(&template) {
            spinner.set_style(style.tick_strings(TICKS));
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(spinner);
    }

    pub fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Helper function to print a section header.
    fn print_section(&self, icon: &str, title: &str, description: &str) {
        println!("{} {}", icon.bright_yellow(), title.bright_cyan().bold());
        if !description.is_empty() {
            self.print_info(description);
        }
    }

    fn print_info(&self, message: &str) {
        println!(
            "   {} {}",
            "→".bright_white(),
            message.italic().bright_white()
        );
    }

    fn print_detail(&self, message: &str) {
        println!("     {}", message.dimmed());
    }
}

fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                line.bold().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else if line.starts_with("@@") {
                line.cyan().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
