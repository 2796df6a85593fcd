//! Removal of transient auxiliary state
//!
//! Cleanup is idempotent: removing an already-absent file is not an error.
//! The promoted artifact in the output directory is never touched, and a
//! document's aux state is kept while an unconverged document depends on it.

use crate::compiler::ArtifactLayout;
use crate::document::{ResolutionState, SourceDocument};
use crate::fs::FileSystem;
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupSummary {
    pub removed: Vec<PathBuf>,
    pub retained: Vec<PathBuf>,
}

impl CleanupSummary {
    fn merge(&mut self, other: CleanupSummary) {
        self.removed.extend(other.removed);
        self.retained.extend(other.retained);
    }
}

pub struct CleanupManager {
    fs: Arc<dyn FileSystem>,
    layout: ArtifactLayout,
}

impl CleanupManager {
    pub fn new(fs: Arc<dyn FileSystem>, layout: ArtifactLayout) -> Self {
        Self { fs, layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    fn remove(&self, path: &Path, job_name: &str, summary: &mut CleanupSummary) -> Result<()> {
        if self.layout.is_final_artifact(path, job_name) {
            return Ok(());
        }
        if self.fs.remove_file(path)? {
            debug!(path = %path.display(), "Removed");
            summary.removed.push(path.to_path_buf());
        }
        Ok(())
    }

    /// First pending document that still needs `job_name`'s aux state
    pub fn retention_reason<'a>(
        &self,
        job_name: &str,
        documents: &'a [SourceDocument],
    ) -> Option<&'a str> {
        documents
            .iter()
            .find(|d| {
                d.job_name != job_name
                    && d.depends_on(job_name)
                    && d.state() != ResolutionState::Converged
            })
            .map(|d| d.job_name.as_str())
    }

    /// Removes one document's transient files, optionally keeping its aux state
    pub fn clean_document(&self, job_name: &str, retain_aux: bool) -> Result<CleanupSummary> {
        let aux = self.layout.aux(job_name);
        let mut summary = CleanupSummary::default();
        for path in self.layout.transient_files(job_name) {
            if retain_aux && path == aux {
                if self.fs.exists(&path) {
                    summary.retained.push(path);
                }
                continue;
            }
            self.remove(&path, job_name, &mut summary)?;
        }
        Ok(summary)
    }

    /// Cleans the documents whose build is finalized, honouring retention
    pub fn finalize<'a>(
        &self,
        documents: &[SourceDocument],
        finalized: impl IntoIterator<Item = &'a str>,
    ) -> Result<CleanupSummary> {
        let mut summary = CleanupSummary::default();
        for job_name in finalized {
            let retain = self.retention_reason(job_name, documents);
            if let Some(dependent) = retain {
                debug!(
                    document = %job_name,
                    dependent = %dependent,
                    "Keeping aux state for unconverged dependent"
                );
            }
            summary.merge(self.clean_document(job_name, retain.is_some())?);
        }
        info!(
            removed = summary.removed.len(),
            retained = summary.retained.len(),
            "Cleanup complete"
        );
        Ok(summary)
    }

    /// Clears everything a retry must not see, aux state included
    pub fn clear_for_retry(&self, job_name: &str) -> Result<CleanupSummary> {
        self.clean_document(job_name, false)
    }

    /// Removes every transient file of every document and the aggregate finding log
    pub fn full_clean(&self, documents: &[SourceDocument]) -> Result<CleanupSummary> {
        let mut summary = CleanupSummary::default();
        for doc in documents {
            summary.merge(self.clean_document(&doc.job_name, false)?);
        }
        if self.fs.remove_file(&self.layout.finding_log())? {
            summary.removed.push(self.layout.finding_log());
        }
        info!(removed = summary.removed.len(), "Full clean complete");
        Ok(summary)
    }
}
