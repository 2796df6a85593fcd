//! Bibliography inclusion decision
//!
//! Whether a document emits a reference section depends only on two facts
//! known at the start of each build: how many citation directives its source
//! contains and whether it is compiled standalone. The decision is recomputed
//! for every document on every invocation; the same source can be compiled
//! integrated into a parent on one run and standalone for review on the next.

use crate::document::scan::strip_comments;
use crate::variant::CompilationContext;
use regex::Regex;
use serde::Serialize;

/// Citation control words recognized when no list is configured
pub const DEFAULT_CITATION_MARKERS: &[&str] = &[
    "\\cite",
    "\\citep",
    "\\citet",
    "\\citealp",
    "\\citealt",
    "\\citeauthor",
    "\\citeyear",
    "\\citeyearpar",
    "\\nocite",
    "\\parencite",
    "\\textcite",
    "\\autocite",
];

/// `include = (count > 0) ∧ (context == standalone)`
pub fn include_bibliography(citation_count: usize, context: CompilationContext) -> bool {
    citation_count > 0 && context == CompilationContext::Standalone
}

/// Outcome of the inclusion decision for one document in one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BibliographyDecision {
    pub citation_count: usize,
    pub context: CompilationContext,
    pub include: bool,
}

impl BibliographyDecision {
    pub fn decide(citation_count: usize, context: CompilationContext) -> Self {
        Self {
            citation_count,
            context,
            include: include_bibliography(citation_count, context),
        }
    }
}

/// Counts citation directives in raw source text
#[derive(Debug, Clone)]
pub struct CitationScanner {
    pattern: Regex,
}

impl CitationScanner {
    /// Builds a scanner for the given control words (`\cite`, `\citep`, ...)
    ///
    /// A marker only matches as a whole control word, optionally starred, so
    /// `\cite` does not count `\citealp` and `\citep` does not count `\citeplain`.
    pub fn new<S: AsRef<str>>(markers: &[S]) -> Self {
        let alternatives: Vec<String> = markers
            .iter()
            .map(|m| m.as_ref().trim_start_matches('\\'))
            .filter(|m| !m.is_empty())
            .map(regex::escape)
            .collect();

        let pattern = if alternatives.is_empty() {
            // Matches nothing
            r"\b\B".to_string()
        } else {
            format!(r"\\(?:{})\*?(?:[^A-Za-z@]|$)", alternatives.join("|"))
        };

        Self {
            pattern: Regex::new(&pattern).expect("escaped marker alternation is a valid regex"),
        }
    }

    pub fn count(&self, source: &str) -> usize {
        let text = strip_comments(source);
        self.pattern.find_iter(&text).count()
    }
}

impl Default for CitationScanner {
    fn default() -> Self {
        Self::new(DEFAULT_CITATION_MARKERS)
    }
}
