//! Source documents and their discovery
//!
//! A [`SourceDocument`] lives for exactly one build invocation: it is
//! constructed by [`discovery::Discovery`], annotated with its declared
//! dependencies by [`graph::DependencyGraph`], and advanced through
//! [`ResolutionState`] by the pass controller.

pub mod discovery;
pub mod graph;
pub mod scan;

pub use discovery::{Discovery, DiscoveryError};
pub use graph::DependencyGraph;
pub use scan::{ExternalDocument, SourceScan};

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory a document was discovered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentScope {
    Root,
    Figures,
    Tables,
    Subsections,
}

impl fmt::Display for DocumentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentScope::Root => "root",
            DocumentScope::Figures => "figures",
            DocumentScope::Tables => "tables",
            DocumentScope::Subsections => "subsections",
        };
        f.write_str(name)
    }
}

/// Which scopes a build covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeSelector {
    #[default]
    Root,
    All,
    Figures,
    Tables,
    Subsections,
}

impl ScopeSelector {
    /// Scopes to scan, in work-list order
    pub fn scopes(&self) -> &'static [DocumentScope] {
        match self {
            ScopeSelector::Root => &[DocumentScope::Root],
            ScopeSelector::All => &[
                DocumentScope::Root,
                DocumentScope::Figures,
                DocumentScope::Tables,
                DocumentScope::Subsections,
            ],
            ScopeSelector::Figures => &[DocumentScope::Figures],
            ScopeSelector::Tables => &[DocumentScope::Tables],
            ScopeSelector::Subsections => &[DocumentScope::Subsections],
        }
    }

    /// Whether the root scope is part of the selection and must be non-empty
    pub fn requires_root(&self) -> bool {
        self.scopes().contains(&DocumentScope::Root)
    }
}

/// Cross-reference resolution progress of one document within one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    #[default]
    Unresolved,
    PartiallyResolved,
    Converged,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionState::Unresolved => "unresolved",
            ResolutionState::PartiallyResolved => "partially resolved",
            ResolutionState::Converged => "converged",
        };
        f.write_str(name)
    }
}

/// A unit of source content compiled into one rendered artifact
#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// File stem; names every artifact of this document
    pub job_name: String,
    pub scope: DocumentScope,
    pub scan: SourceScan,
    /// Citation directives counted by the bibliography scanner
    pub citation_count: usize,
    /// Job names of documents whose labels this document references
    pub dependencies: BTreeSet<String>,
    state: ResolutionState,
}

impl SourceDocument {
    pub fn new(
        path: PathBuf,
        scope: DocumentScope,
        scan: SourceScan,
        citation_count: usize,
    ) -> Self {
        let job_name = scan::job_name_of(&path.to_string_lossy());
        Self {
            path,
            job_name,
            scope,
            scan,
            citation_count,
            dependencies: BTreeSet::new(),
            state: ResolutionState::Unresolved,
        }
    }

    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    /// Moves the resolution state forward; a regression request is ignored.
    ///
    /// Returns whether the state changed.
    pub fn advance(&mut self, next: ResolutionState) -> bool {
        if next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Starts a new build invocation
    pub fn reset(&mut self) {
        self.state = ResolutionState::Unresolved;
    }

    pub fn depends_on(&self, job_name: &str) -> bool {
        self.dependencies.contains(job_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> SourceDocument {
        SourceDocument::new(
            PathBuf::from("/paper/Subfiles/Appendix.tex"),
            DocumentScope::Subsections,
            SourceScan::default(),
            0,
        )
    }

    #[test]
    fn test_job_name_and_directory() {
        let doc = document();
        assert_eq!(doc.job_name, "Appendix");
        assert_eq!(doc.directory(), Path::new("/paper/Subfiles"));
    }

    #[test]
    fn test_state_only_advances() {
        let mut doc = document();
        assert_eq!(doc.state(), ResolutionState::Unresolved);

        assert!(doc.advance(ResolutionState::PartiallyResolved));
        assert!(!doc.advance(ResolutionState::Unresolved));
        assert_eq!(doc.state(), ResolutionState::PartiallyResolved);

        assert!(doc.advance(ResolutionState::Converged));
        assert!(!doc.advance(ResolutionState::PartiallyResolved));
        assert_eq!(doc.state(), ResolutionState::Converged);

        doc.reset();
        assert_eq!(doc.state(), ResolutionState::Unresolved);
    }

    #[test]
    fn test_scope_selector() {
        assert_eq!(ScopeSelector::Root.scopes(), &[DocumentScope::Root]);
        assert_eq!(ScopeSelector::All.scopes().len(), 4);
        assert!(ScopeSelector::All.requires_root());
        assert!(!ScopeSelector::Tables.requires_root());
    }
}
