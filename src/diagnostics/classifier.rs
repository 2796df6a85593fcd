//! Diagnostic classification
//!
//! Turns compiler and bibliography logs into [`Finding`]s. Well-formed logs
//! never fail to classify, however many errors they contain; the only hard
//! failure is an invocation that left no log behind at all.

use super::finding::{dedup, Finding, FindingKind};
use super::log_parser::{parse_log, EntryKind, LogEntry};
use crate::compiler::{CompilerInvocationResult, InvocationStatus};
use crate::fs::FileSystem;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Tokens showing an error came from reading cross-reference state
const STATE_TOKENS: &[&str] = &["\\@newl@bel", "\\newlabel", "\\@writefile", "\\bibcite", ".aux"];

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("No diagnostic log for '{document}' (expected {expected})")]
    MissingLog { document: String, expected: PathBuf },
}

fn missing_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:[Ff]ile `([^']+)' not found|I can't find file `([^']+)')").unwrap()
    })
}

fn reference_warning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[Rr]eference `([^']+)'.*undefined").unwrap())
}

fn citation_warning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Citation `([^']+)'.*undefined").unwrap())
}

fn missing_entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"I didn't find a database entry for "([^"]+)""#).unwrap())
}

fn missing_database_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"I couldn't open (?:database file|file name|style file) `?([^'\s]+)'?").unwrap()
    })
}

#[derive(Debug, Clone)]
pub struct DiagnosticClassifier {
    hidden_label_prefix: String,
}

impl Default for DiagnosticClassifier {
    fn default() -> Self {
        Self::new("hidden:")
    }
}

impl DiagnosticClassifier {
    pub fn new(hidden_label_prefix: impl Into<String>) -> Self {
        Self {
            hidden_label_prefix: hidden_label_prefix.into(),
        }
    }

    fn read_first(fs: &dyn FileSystem, paths: &[&Path]) -> Option<String> {
        paths.iter().find_map(|path| match fs.read_optional(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Unreadable log");
                None
            }
        })
    }

    /// Classifies one compile: its toolchain log (or console capture) and aux state
    pub fn classify(
        &self,
        fs: &dyn FileSystem,
        result: &CompilerInvocationResult,
    ) -> Result<Vec<Finding>, ClassifierError> {
        let document = result.job_name.as_str();
        let mut findings = Vec::new();

        let timed_out = result.status == InvocationStatus::TimedOut;
        if timed_out {
            findings.push(timeout_finding(document));
        }

        match Self::read_first(fs, &[result.log_path.as_path(), result.console_path.as_path()]) {
            Some(text) => findings.extend(self.classify_log(document, &text)),
            None if timed_out => {}
            None => {
                return Err(ClassifierError::MissingLog {
                    document: document.to_string(),
                    expected: result.log_path.clone(),
                })
            }
        }

        if let Some(aux) = Self::read_first(fs, &[result.aux_path.as_path()]) {
            findings.extend(self.classify_aux(document, &aux));
        }

        if result.status == InvocationStatus::Failed && !findings.iter().any(Finding::is_fatal) {
            let status = result
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            findings.push(Finding::new(
                FindingKind::FatalCompilerError,
                document,
                format!(
                    "Compiler exited with status {} without producing an artifact",
                    status
                ),
            ));
        }

        Ok(dedup(findings))
    }

    /// Classifies a bibliography processor run from its `.blg`
    pub fn classify_bibliography(
        &self,
        fs: &dyn FileSystem,
        result: &CompilerInvocationResult,
    ) -> Result<Vec<Finding>, ClassifierError> {
        let document = result.job_name.as_str();
        let mut findings = Vec::new();
        let timed_out = result.status == InvocationStatus::TimedOut;
        if timed_out {
            findings.push(timeout_finding(document));
        }

        match Self::read_first(fs, &[result.log_path.as_path()]) {
            Some(text) => findings.extend(self.classify_bibliography_log(document, &text)),
            None if timed_out => {}
            None => {
                return Err(ClassifierError::MissingLog {
                    document: document.to_string(),
                    expected: result.log_path.clone(),
                })
            }
        }

        Ok(dedup(findings))
    }

    pub fn classify_log(&self, document: &str, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut fatal_seen = false;

        for entry in parse_log(text) {
            let finding = match entry.kind {
                EntryKind::Error => self.classify_error(document, &entry, fatal_seen),
                EntryKind::FatalAbort if !fatal_seen => Some(
                    Finding::new(FindingKind::FatalCompilerError, document, entry.message.clone()),
                ),
                EntryKind::FatalAbort => None,
                EntryKind::Warning => self.classify_warning(document, &entry),
            };

            if let Some(finding) = finding {
                fatal_seen |= finding.is_fatal();
                findings.push(finding);
            }
        }

        dedup(findings)
    }

    fn classify_error(&self, document: &str, entry: &LogEntry, fatal_seen: bool) -> Option<Finding> {
        let kind = if missing_file_re().is_match(&entry.message) {
            FindingKind::MissingInputArtifact
        } else if STATE_TOKENS
            .iter()
            .any(|t| entry.message.contains(t) || entry.context.contains(t))
        {
            FindingKind::TransientStateConflict
        } else if entry.message.starts_with("Emergency stop") {
            // Usually just the consequence of the error reported before it
            if fatal_seen {
                return None;
            }
            FindingKind::FatalCompilerError
        } else {
            FindingKind::FatalCompilerError
        };

        Some(
            Finding::new(kind, document, entry.message.clone())
                .with_line(entry.line)
                .with_context(entry.context.clone()),
        )
    }

    fn classify_warning(&self, document: &str, entry: &LogEntry) -> Option<Finding> {
        if let Some(cap) = citation_warning_re().captures(&entry.message) {
            return Some(
                Finding::new(
                    FindingKind::BibliographyEntryIssue,
                    document,
                    format!("Citation `{}' undefined", &cap[1]),
                )
                .with_line(entry.line),
            );
        }

        if let Some(cap) = reference_warning_re().captures(&entry.message) {
            let label = &cap[1];
            if entry.hidden || label.starts_with(&self.hidden_label_prefix) {
                return Some(
                    Finding::new(
                        FindingKind::BenignHiddenContentWarning,
                        document,
                        format!("Reference `{}' undefined in hidden content", label),
                    )
                    .with_line(entry.line),
                );
            }
        }

        // Other reference warnings are judged by the pass controller
        None
    }

    /// Structural checks on cross-reference state
    pub fn classify_aux(&self, document: &str, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for directive in ["\\bibdata", "\\bibstyle"] {
            let count = text
                .lines()
                .filter(|l| l.trim_start().starts_with(&format!("{}{{", directive)))
                .count();
            if count > 1 {
                findings.push(Finding::new(
                    FindingKind::DuplicateBibliographyDirective,
                    document,
                    format!("{} {} directives in auxiliary state", count, directive),
                ));
            }
        }
        findings
    }

    pub fn classify_bibliography_log(&self, document: &str, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with("Illegal, another \\bib") {
                findings.push(Finding::new(
                    FindingKind::DuplicateBibliographyDirective,
                    document,
                    line.to_string(),
                ));
            } else if let Some(cap) = missing_database_re().captures(line) {
                findings.push(Finding::new(
                    FindingKind::MissingInputArtifact,
                    document,
                    format!("Bibliography processor could not open {}", &cap[1]),
                ));
            } else if let Some(cap) = missing_entry_re().captures(line) {
                findings.push(Finding::new(
                    FindingKind::BibliographyEntryIssue,
                    document,
                    format!("No database entry for \"{}\"", &cap[1]),
                ));
            } else if line.starts_with("Repeated entry") {
                findings.push(Finding::new(
                    FindingKind::BibliographyEntryIssue,
                    document,
                    line.to_string(),
                ));
            }
        }
        dedup(findings)
    }
}

fn timeout_finding(document: &str) -> Finding {
    Finding::new(
        FindingKind::TimeoutError,
        document,
        "Invocation exceeded the timeout and was terminated",
    )
}
