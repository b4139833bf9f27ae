use colored::Colorize;
use convergence::{
    Error, Notification, ProgressCallback, ResourceRef, RunOutcome, StepReport, StepStatus,
};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// One-word label for a step status
pub fn status_label(status: &StepStatus) -> String {
    match status {
        StepStatus::Executed => "changed".green().to_string(),
        StepStatus::Skipped { .. } => "ok".dimmed().to_string(),
        StepStatus::WouldExecute => "would change".yellow().to_string(),
    }
}

/// Prints run progress as it happens
pub struct UiProgress {
    quiet: bool,
    verbose: bool,
}

impl UiProgress {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }
}

impl ProgressCallback for UiProgress {
    fn on_action_start(&mut self, resource: &ResourceRef, action: &str) {
        if !self.quiet {
            println!("  {} {} {}", "→".cyan(), resource.to_string().bold(), format!("({action})").dimmed());
        }
    }

    fn on_step(&mut self, _resource: &ResourceRef, step: &StepReport) {
        if self.quiet {
            return;
        }
        if step.is_change() || self.verbose {
            println!("    {} {}", status_label(&step.status), step.description);
        }
        if self.verbose && step.is_change() {
            println!("      {}", step.command.dimmed());
        }
    }

    fn on_action_complete(&mut self, outcome: &RunOutcome) {
        if !self.quiet && !outcome.updated && outcome.pending() == 0 {
            println!("    {} up to date", "✓".green());
        }
    }

    fn on_action_failed(&mut self, resource: &ResourceRef, action: &str, error: &Error) {
        eprintln!("    {} {resource} ({action}): {error}", "✗".red());
        if let Some((stdout, stderr)) = error.command_output() {
            for line in stdout.lines().chain(stderr.lines()).filter(|l| !l.trim().is_empty()) {
                eprintln!("      {}", line.dimmed());
            }
        }
    }

    fn on_notification(&mut self, notification: &Notification) {
        if !self.quiet {
            println!(
                "  {} {} {}",
                "↳".magenta(),
                notification.target.to_string().bold(),
                format!("({} from {})", notification.action, notification.source).dimmed()
            );
        }
    }
}
