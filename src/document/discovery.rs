//! Document discovery
//!
//! Scans the project root and the auxiliary scope directories for
//! independently compilable sources and builds the ordered, de-duplicated
//! work list for a build invocation.

use super::scan::SourceScan;
use super::{DocumentScope, ScopeSelector, SourceDocument};
use crate::bibliography::CitationScanner;
use crate::fs::{FileSystem, FileType};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const SOURCE_EXTENSION: &str = "tex";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Project root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Project root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("Failed to read {path}: {message}")]
    ReadFailed { path: PathBuf, message: String },
}

impl DiscoveryError {
    /// Returns a user-friendly error message with troubleshooting hints
    pub fn help_message(&self) -> String {
        match self {
            DiscoveryError::ConfigurationError(msg) => format!(
                "Error: {}\n\n\
                Help: The root scope must contain at least one compilable document\n\
                (a .tex file declaring \\documentclass), and every document needs a\n\
                unique file name because artifacts share one auxiliary directory.",
                msg
            ),
            DiscoveryError::RootNotFound(path) => format!(
                "Error: Project root not found\nPath: {}\n\n\
                Help: Pass the directory containing the main document, or run from it.",
                path.display()
            ),
            DiscoveryError::NotADirectory(path) => format!(
                "Error: Project root is not a directory\nPath: {}\n\n\
                Help: Use --single to build one document; the positional argument\n\
                is the project directory.",
                path.display()
            ),
            other => format!("Error: {}", other),
        }
    }
}

/// Directory names of the auxiliary scopes, relative to the project root
#[derive(Debug, Clone)]
pub struct ScopeDirectories {
    pub figures: PathBuf,
    pub tables: PathBuf,
    pub subsections: PathBuf,
}

impl Default for ScopeDirectories {
    fn default() -> Self {
        Self {
            figures: PathBuf::from("Figures"),
            tables: PathBuf::from("Tables"),
            subsections: PathBuf::from("Subfiles"),
        }
    }
}

pub struct Discovery {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    directories: ScopeDirectories,
    citations: CitationScanner,
}

impl Discovery {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: PathBuf,
        directories: ScopeDirectories,
        citations: CitationScanner,
    ) -> Self {
        Self {
            fs,
            root,
            directories,
            citations,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, scope: DocumentScope) -> PathBuf {
        match scope {
            DocumentScope::Root => self.root.clone(),
            DocumentScope::Figures => self.root.join(&self.directories.figures),
            DocumentScope::Tables => self.root.join(&self.directories.tables),
            DocumentScope::Subsections => self.root.join(&self.directories.subsections),
        }
    }

    fn check_root(&self) -> Result<(), DiscoveryError> {
        if !self.fs.exists(&self.root) {
            return Err(DiscoveryError::RootNotFound(self.root.clone()));
        }
        if !self.fs.is_dir(&self.root) {
            return Err(DiscoveryError::NotADirectory(self.root.clone()));
        }
        Ok(())
    }

    /// Enumerates the documents of every scope the selector covers
    pub fn discover(&self, selector: ScopeSelector) -> Result<Vec<SourceDocument>, DiscoveryError> {
        self.check_root()?;

        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        for &scope in selector.scopes() {
            let found = self.scan_scope(scope, &mut seen)?;
            debug!(scope = %scope, count = found.len(), "Scanned scope");

            if scope == DocumentScope::Root && found.is_empty() {
                return Err(DiscoveryError::ConfigurationError(format!(
                    "no compilable documents found in project root {}",
                    self.root.display()
                )));
            }
            documents.extend(found);
        }

        check_unique_job_names(&documents)?;

        info!(
            documents = documents.len(),
            root = %self.root.display(),
            "Discovery complete"
        );
        Ok(documents)
    }

    /// Loads one document for a `--single` build
    pub fn discover_single(&self, path: &Path) -> Result<SourceDocument, DiscoveryError> {
        self.check_root()?;

        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !self.fs.is_file(&candidate) {
            return Err(DiscoveryError::DocumentNotFound(candidate));
        }

        let scope = self.scope_of(&candidate);
        self.load(&candidate, scope)?.ok_or_else(|| {
            DiscoveryError::ConfigurationError(format!(
                "{} is not a compilable document (no \\documentclass)",
                candidate.display()
            ))
        })
    }

    fn scope_of(&self, path: &Path) -> DocumentScope {
        let parent = path.parent().unwrap_or(self.root.as_path());
        [
            DocumentScope::Figures,
            DocumentScope::Tables,
            DocumentScope::Subsections,
        ]
        .into_iter()
        .find(|&scope| parent == self.scope_dir(scope))
        .unwrap_or(DocumentScope::Root)
    }

    fn scan_scope(
        &self,
        scope: DocumentScope,
        seen: &mut HashSet<PathBuf>,
    ) -> Result<Vec<SourceDocument>, DiscoveryError> {
        let dir = self.scope_dir(scope);
        if !self.fs.is_dir(&dir) {
            debug!(dir = %dir.display(), "Scope directory absent");
            return Ok(Vec::new());
        }

        let mut entries = self
            .fs
            .read_dir(&dir)
            .map_err(|e| DiscoveryError::ReadFailed {
                path: dir.clone(),
                message: e.to_string(),
            })?;
        entries.retain(|e| {
            e.file_type() == FileType::File
                && !e.is_hidden()
                && Path::new(e.file_name())
                    .extension()
                    .map(|ext| ext == SOURCE_EXTENSION)
                    .unwrap_or(false)
        });
        entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));

        let mut documents = Vec::new();
        for entry in entries {
            let canonical = self
                .fs
                .canonicalize(entry.path())
                .unwrap_or_else(|_| entry.path().to_path_buf());
            if !seen.insert(canonical) {
                debug!(path = %entry.path().display(), "Skipping duplicate document");
                continue;
            }
            if let Some(doc) = self.load(entry.path(), scope)? {
                documents.push(doc);
            } else {
                debug!(path = %entry.path().display(), "Skipping fragment without \\documentclass");
            }
        }

        Ok(documents)
    }

    fn load(&self, path: &Path, scope: DocumentScope) -> Result<Option<SourceDocument>, DiscoveryError> {
        let source = self
            .fs
            .read_to_string(path)
            .map_err(|e| DiscoveryError::ReadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let scan = SourceScan::from_source(&source);
        if !scan.has_document_class {
            return Ok(None);
        }

        let citation_count = self.citations.count(&source);
        Ok(Some(SourceDocument::new(
            path.to_path_buf(),
            scope,
            scan,
            citation_count,
        )))
    }
}

fn check_unique_job_names(documents: &[SourceDocument]) -> Result<(), DiscoveryError> {
    let mut by_name: HashMap<&str, &Path> = HashMap::new();
    for doc in documents {
        if let Some(first) = by_name.insert(&doc.job_name, &doc.path) {
            return Err(DiscoveryError::ConfigurationError(format!(
                "documents {} and {} share the name '{}'",
                first.display(),
                doc.path.display(),
                doc.job_name
            )));
        }
    }
    Ok(())
}
