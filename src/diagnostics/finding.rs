//! Finding taxonomy

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Fatal,
    Warning,
    /// Expected by construction; never escalated
    Benign,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Fatal => "fatal",
            Severity::Warning => "warning",
            Severity::Benign => "benign",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FindingKind {
    FatalCompilerError,
    TransientStateConflict,
    MissingInputArtifact,
    DuplicateBibliographyDirective,
    TimeoutError,
    ResidualUnresolvedReference,
    BibliographyEntryIssue,
    BenignHiddenContentWarning,
}

impl FindingKind {
    pub fn severity(&self) -> Severity {
        match self {
            FindingKind::FatalCompilerError
            | FindingKind::TransientStateConflict
            | FindingKind::MissingInputArtifact
            | FindingKind::DuplicateBibliographyDirective
            | FindingKind::TimeoutError => Severity::Fatal,
            FindingKind::ResidualUnresolvedReference | FindingKind::BibliographyEntryIssue => {
                Severity::Warning
            }
            FindingKind::BenignHiddenContentWarning => Severity::Benign,
        }
    }

    /// Fatal findings that clearing transient state can fix
    pub fn is_transient(&self) -> bool {
        matches!(self, FindingKind::TransientStateConflict)
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            FindingKind::FatalCompilerError => {
                "Fix the source at the reported line; check for typos in macro names \
                 and missing \\usepackage declarations."
            }
            FindingKind::TransientStateConflict => {
                "Auxiliary state is inconsistent; rebuild with --clean if the retry \
                 does not resolve it."
            }
            FindingKind::MissingInputArtifact => {
                "Generate or restore the missing file (figures and tables may need \
                 their upstream models re-run), or fix the path in the source."
            }
            FindingKind::DuplicateBibliographyDirective => {
                "Keep a single \\bibliography/\\bibliographystyle pair; integrated \
                 fragments must not declare their own."
            }
            FindingKind::TimeoutError => {
                "The compiler did not finish in time; look for an interactive prompt or \
                 an infinite loop in the source, or raise --timeout."
            }
            FindingKind::ResidualUnresolvedReference => {
                "Check the label spelling, declare the defining document with \
                 \\externaldocument, or build with --scope all."
            }
            FindingKind::BibliographyEntryIssue => {
                "Add or fix the entry in the bibliography database, or remove the \
                 citation."
            }
            FindingKind::BenignHiddenContentWarning => {
                "None needed; hidden structural content is processed for labels only."
            }
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One classified diagnostic, attached to the document that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub document: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub remediation: String,
}

impl Finding {
    pub fn new(kind: FindingKind, document: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            document: document.into(),
            message: message.into(),
            line: None,
            context: None,
            remediation: kind.remediation().to_string(),
        }
    }

    pub fn with_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = (!context.trim().is_empty()).then_some(context);
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.document)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {} ({})", self.message, self.kind)
    }
}

/// Removes repeated findings, keeping first occurrences in order
pub fn dedup(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = std::collections::HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert((f.kind, f.document.clone(), f.message.clone())))
        .collect()
}
