//! Recovery decisions after a failed compile
//!
//! Without a terminal the policy is fixed: carry on when nothing is fatal,
//! retry once when every fatal finding is transient, abort otherwise. With a
//! terminal the user picks, within the same attempt budget.

use crate::diagnostics::Finding;
use serde::Serialize;
use std::fmt;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    Proceed,
    /// Clear the document's transient state and compile again
    Retry,
    Skip,
    Abort,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryAction::Proceed => "proceed",
            RecoveryAction::Retry => "retry",
            RecoveryAction::Skip => "skip",
            RecoveryAction::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Source of interactive recovery choices
pub trait Prompter: Send + Sync {
    /// Presents the fatal findings and returns retry, skip or abort
    fn choose(&self, document: &str, fatal: &[Finding]) -> io::Result<RecoveryAction>;
}

/// Whether stdin is attached to a terminal
pub fn stdin_is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Prompts on stderr and reads the answer from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

const MAX_PROMPT_TRIES: usize = 3;

pub fn parse_choice(answer: &str) -> Option<RecoveryAction> {
    match answer.trim().to_lowercase().as_str() {
        "r" | "retry" => Some(RecoveryAction::Retry),
        "s" | "skip" => Some(RecoveryAction::Skip),
        "a" | "abort" | "q" | "quit" => Some(RecoveryAction::Abort),
        _ => None,
    }
}

impl Prompter for StdinPrompter {
    fn choose(&self, document: &str, fatal: &[Finding]) -> io::Result<RecoveryAction> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr)?;
        writeln!(stderr, "{} failed with {} fatal finding(s):", document, fatal.len())?;
        for finding in fatal {
            writeln!(stderr, "  {}", finding)?;
            if let Some(context) = &finding.context {
                for line in context.lines() {
                    writeln!(stderr, "      | {}", line)?;
                }
            }
            writeln!(stderr, "    hint: {}", finding.remediation)?;
        }

        let stdin = io::stdin();
        for _ in 0..MAX_PROMPT_TRIES {
            write!(stderr, "[r]etry, [s]kip or [a]bort? ")?;
            stderr.flush()?;

            let mut answer = String::new();
            if stdin.lock().read_line(&mut answer)? == 0 {
                // EOF
                return Ok(RecoveryAction::Abort);
            }
            if let Some(action) = parse_choice(&answer) {
                return Ok(action);
            }
        }
        Ok(RecoveryAction::Abort)
    }
}

#[derive(Clone)]
pub struct RecoveryController {
    max_attempts: u32,
    prompter: Option<Arc<dyn Prompter>>,
}

impl fmt::Debug for RecoveryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryController")
            .field("max_attempts", &self.max_attempts)
            .field("interactive", &self.prompter.is_some())
            .finish()
    }
}

impl RecoveryController {
    pub fn non_interactive(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            prompter: None,
        }
    }

    pub fn interactive(max_attempts: u32, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            prompter: Some(prompter),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.prompter.is_some()
    }

    /// Decides what happens after `attempt` (1-based) produced `findings`
    pub fn decide(&self, document: &str, findings: &[Finding], attempt: u32) -> RecoveryAction {
        let fatal: Vec<Finding> = findings.iter().filter(|f| f.is_fatal()).cloned().collect();
        if fatal.is_empty() {
            return RecoveryAction::Proceed;
        }

        let Some(prompter) = &self.prompter else {
            return if attempt == 1 && fatal.iter().all(Finding::is_transient) {
                info!(document, "Transient state conflict, retrying once");
                RecoveryAction::Retry
            } else {
                RecoveryAction::Abort
            };
        };

        match prompter.choose(document, &fatal) {
            Ok(RecoveryAction::Retry) if attempt >= self.max_attempts => {
                warn!(
                    document,
                    attempts = attempt,
                    "Attempt budget exhausted, aborting instead of retrying"
                );
                RecoveryAction::Abort
            }
            // Proceeding past a fatal finding is not offered
            Ok(RecoveryAction::Proceed) => RecoveryAction::Skip,
            Ok(action) => action,
            Err(e) => {
                warn!(document, error = %e, "Prompt failed, aborting");
                RecoveryAction::Abort
            }
        }
    }
}
