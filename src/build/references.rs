//! Label tables read back from auxiliary cross-reference state
//!
//! A compile reads the label tables as they were when it started, so the
//! unresolved set of a document after a pass is computed against the
//! snapshot taken before that pass. Bibliography keys (`\bibcite`) are part of
//! the table: the compile after a bibliography run changes them even though no
//! label moved.

use crate::compiler::ArtifactLayout;
use crate::document::SourceDocument;
use crate::fs::FileSystem;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::debug;

fn newlabel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\\newlabel\{([^}]+)\}").unwrap())
}

fn bibcite_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\\bibcite\{([^}]+)\}").unwrap())
}

/// Labels and bibliography keys defined in one document's aux file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: BTreeSet<String>,
    citations: BTreeSet<String>,
}

impl LabelTable {
    pub fn parse(aux: &str) -> Self {
        let mut table = Self::default();
        for line in aux.lines() {
            if let Some(cap) = newlabel_re().captures(line) {
                // cleveref writes a shadow entry per label
                if !cap[1].ends_with("@cref") {
                    table.labels.insert(cap[1].to_string());
                }
            } else if let Some(cap) = bibcite_re().captures(line) {
                table.citations.insert(cap[1].to_string());
            }
        }
        table
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
            citations: BTreeSet::new(),
        }
    }
}

/// Label tables of a set of documents at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSnapshot {
    tables: BTreeMap<String, LabelTable>,
}

impl LabelSnapshot {
    /// Reads the aux state of every document plus the external documents they declare
    pub fn capture(fs: &dyn FileSystem, layout: &ArtifactLayout, documents: &[SourceDocument]) -> Self {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for doc in documents {
            names.insert(doc.job_name.as_str());
            names.extend(doc.scan.external_documents.iter().map(|e| e.job_name.as_str()));
        }

        let mut tables = BTreeMap::new();
        for name in names {
            let path = layout.aux(name);
            match fs.read_optional(&path) {
                Ok(Some(text)) => {
                    tables.insert(name.to_string(), LabelTable::parse(&text));
                }
                Ok(None) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Unreadable aux state"),
            }
        }
        Self { tables }
    }

    pub fn insert(&mut self, job_name: impl Into<String>, table: LabelTable) {
        self.tables.insert(job_name.into(), table);
    }

    pub fn table(&self, job_name: &str) -> Option<&LabelTable> {
        self.tables.get(job_name)
    }

    fn defines(&self, job_name: &str, label: &str) -> bool {
        self.table(job_name).map_or(false, |t| t.contains(label))
    }

    /// References of `doc` that neither its own table nor a dependency's table defines
    pub fn unresolved(&self, doc: &SourceDocument) -> BTreeSet<String> {
        doc.scan
            .references
            .iter()
            .filter(|reference| {
                let reference = reference.as_str();
                let own = self.defines(&doc.job_name, reference);
                let external = doc.scan.external_documents.iter().any(|ext| {
                    ext.local_to_external(reference)
                        .map_or(false, |label| self.defines(&ext.job_name, label))
                });
                let dependency = doc
                    .dependencies
                    .iter()
                    .any(|dep| self.defines(dep, reference));
                !(own || external || dependency)
            })
            .cloned()
            .collect()
    }

    /// Documents whose table differs between `earlier` and this snapshot
    ///
    /// A missing aux file counts as an empty table.
    pub fn changed_since(&self, earlier: &LabelSnapshot) -> BTreeSet<String> {
        let empty = LabelTable::default();
        let names: BTreeSet<&String> = self.tables.keys().chain(earlier.tables.keys()).collect();
        names
            .into_iter()
            .filter(|name| {
                self.tables.get(*name).unwrap_or(&empty) != earlier.tables.get(*name).unwrap_or(&empty)
            })
            .cloned()
            .collect()
    }
}
