//! Human-readable progress output.
//!
//! Pure presentation: the reporter observes lifecycle events and prints them.
//! In quiet mode it prints nothing; control flow and errors are unaffected.

use console::{style, Term};

use crate::lifecycle::hooks::{LifecycleEvent, LifecycleObserver, Outcome, Stage};
use crate::lifecycle::state::Subsystem;

pub struct ConsoleReporter {
    term: Term,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            quiet,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    fn line(&self, text: String) {
        // best effort
        let _ = self.term.write_line(&text);
    }

    fn outcome_label(outcome: &Outcome, done: &str, failed: &str) -> String {
        match outcome {
            Outcome::Done => style(done).green().bold().to_string(),
            Outcome::Skipped(reason) => format!("{} ({reason})", style("skipped").yellow().bold()),
            Outcome::Failed(_) => style(failed).red().bold().to_string(),
        }
    }
}

fn phase_name(subsystem: Subsystem) -> &'static str {
    match subsystem {
        Subsystem::App => "application",
        Subsystem::Core => "core (configurator, router)",
        Subsystem::Db => "database manager",
        Subsystem::Loggers => "logger manager",
        Subsystem::Helpers => "helper manager",
        Subsystem::Modules => "module manager",
        Subsystem::Server => "server",
    }
}

fn stage_title(stage: Stage) -> &'static str {
    match stage {
        Stage::DbConnect => "connecting databases",
        Stage::RunLoggers => "starting loggers",
        Stage::RunModules => "starting modules",
        Stage::RunServer => "starting server",
    }
}

impl LifecycleObserver for ConsoleReporter {
    fn on_event(&self, event: &LifecycleEvent) {
        if self.quiet {
            return;
        }
        match event {
            LifecycleEvent::BeforeInit => {
                self.line(String::new());
                self.line(style("Initializing application").bold().to_string());
            }
            LifecycleEvent::PhaseFinished { subsystem, outcome } => {
                let label = Self::outcome_label(outcome, "done", "failed");
                self.line(format!(" - {}: {label}", phase_name(*subsystem)));
                if let Outcome::Failed(cause) = outcome {
                    self.line(format!("   {}", style(cause).red()));
                }
            }
            LifecycleEvent::AfterInit { .. } | LifecycleEvent::StageFinished { .. } => {}
            LifecycleEvent::BeforeRun => {
                self.line(String::new());
                self.line(style("Starting application").bold().to_string());
            }
            LifecycleEvent::BeforeStage(stage) => {
                self.line(format!(" - {}:", stage_title(*stage)));
            }
            LifecycleEvent::TaskFinished {
                name,
                detail,
                outcome,
                ..
            } => {
                let label = Self::outcome_label(outcome, "started", "not started");
                let detail = detail
                    .as_deref()
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default();
                self.line(format!("    \"{}\"{detail}: {label}", style(name).blue().bold()));
                if let Outcome::Failed(cause) = outcome {
                    self.line(format!("    {}", style(cause).red()));
                }
            }
            LifecycleEvent::ServerListening { addr } => {
                self.line(format!(
                    "    server ({}): {}",
                    style(addr).blue().bold(),
                    style("listening").green().bold()
                ));
            }
            LifecycleEvent::AfterRun { ok } => {
                if *ok {
                    self.line(String::new());
                    self.line("------------------------------------------------".to_string());
                    self.line(String::new());
                } else {
                    self.line(style("Application failed to start").red().bold().to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_reporter_accepts_every_event() {
        let reporter = ConsoleReporter::new(true);
        assert!(reporter.is_quiet());
        reporter.on_event(&LifecycleEvent::BeforeInit);
        reporter.on_event(&LifecycleEvent::PhaseFinished {
            subsystem: Subsystem::Db,
            outcome: Outcome::Failed("refused".into()),
        });
        reporter.on_event(&LifecycleEvent::AfterRun { ok: false });
    }

    #[test]
    fn test_outcome_labels() {
        let skipped = ConsoleReporter::outcome_label(&Outcome::Skipped("not configured".into()), "done", "failed");
        assert!(skipped.contains("not configured"));
        let done = ConsoleReporter::outcome_label(&Outcome::Done, "done", "failed");
        assert!(done.contains("done"));
    }
}
