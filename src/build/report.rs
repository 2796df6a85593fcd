//! Build and plan reports

use super::passes::{PassPolicy, PassRecord, PassVerdict};
use crate::compiler::Invocation;
use crate::diagnostics::{Finding, Severity};
use crate::document::{DocumentScope, ResolutionState};
use crate::variant::BuildConfiguration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    Succeeded,
    /// Finalized from a compile that exited non-zero but produced an artifact
    SoftSuccess,
    Failed,
    Skipped,
}

impl DocumentStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DocumentStatus::Succeeded | DocumentStatus::SoftSuccess)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentStatus::Succeeded => "success",
            DocumentStatus::SoftSuccess => "soft-success",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub job_name: String,
    pub path: PathBuf,
    pub scope: DocumentScope,
    pub status: DocumentStatus,
    pub state: ResolutionState,
    pub variant: BuildConfiguration,
    /// Compiles across all passes, retries included
    pub attempts: u32,
    pub unresolved: Vec<String>,
    pub artifact: Option<PathBuf>,
    /// SHA-256 of the promoted artifact
    pub digest: Option<String>,
    pub findings: Vec<Finding>,
}

impl DocumentReport {
    pub fn has_fatal(&self) -> bool {
        self.findings.iter().any(Finding::is_fatal)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub documents: Vec<DocumentReport>,
    pub passes: Vec<PassRecord>,
    pub verdict: Option<PassVerdict>,
    pub aborted: bool,
}

impl BuildReport {
    pub fn succeeded(&self) -> usize {
        self.documents.iter().filter(|d| d.status.is_success()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.documents.iter().all(|d| !d.has_fatal())
    }

    /// 0 iff no document ended with a fatal finding
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.documents.iter().flat_map(|d| d.findings.iter())
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}/{} documents succeeded",
            self.succeeded(),
            self.documents.len()
        )
    }
}

/// What a build would do, without doing it
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub root: PathBuf,
    pub aux_dir: PathBuf,
    pub output_dir: PathBuf,
    pub policy: PassPolicy,
    pub documents: Vec<DocumentPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPlan {
    pub job_name: String,
    pub path: PathBuf,
    pub scope: DocumentScope,
    pub variant: BuildConfiguration,
    pub dependencies: Vec<String>,
    pub citation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<Invocation>,
}
