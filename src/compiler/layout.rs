//! On-disk layout of build artifacts
//!
//! Every per-document file lives in the shared auxiliary directory under the
//! document's job name; only the promoted rendered artifact lives in the
//! output directory.

use serde::Serialize;
use std::path::{Path, PathBuf};

pub const FINDING_LOG_NAME: &str = "findings.jsonl";

/// Extensions of intermediate files a compile leaves in the aux dir
pub const TRANSIENT_EXTENSIONS: &[&str] = &[
    "aux",
    "log",
    "out",
    "toc",
    "lof",
    "lot",
    "bbl",
    "blg",
    "fls",
    "fdb_latexmk",
    "synctex.gz",
    "nav",
    "snm",
    "console.log",
    "pdf",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLayout {
    pub aux_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(aux_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            aux_dir,
            output_dir,
        }
    }

    fn aux_file(&self, job_name: &str, extension: &str) -> PathBuf {
        self.aux_dir.join(format!("{}.{}", job_name, extension))
    }

    /// Toolchain log
    pub fn log(&self, job_name: &str) -> PathBuf {
        self.aux_file(job_name, "log")
    }

    /// Captured stdout/stderr of the compiler process
    pub fn console_log(&self, job_name: &str) -> PathBuf {
        self.aux_file(job_name, "console.log")
    }

    /// Cross-reference state file
    pub fn aux(&self, job_name: &str) -> PathBuf {
        self.aux_file(job_name, "aux")
    }

    pub fn bibliography_log(&self, job_name: &str) -> PathBuf {
        self.aux_file(job_name, "blg")
    }

    /// Rendered artifact as written by the compiler, before promotion
    pub fn intermediate_artifact(&self, job_name: &str) -> PathBuf {
        self.aux_file(job_name, "pdf")
    }

    pub fn final_artifact(&self, job_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", job_name))
    }

    pub fn finding_log(&self) -> PathBuf {
        self.aux_dir.join(FINDING_LOG_NAME)
    }

    /// Every transient file a document may own, the aux state file included
    pub fn transient_files(&self, job_name: &str) -> Vec<PathBuf> {
        TRANSIENT_EXTENSIONS
            .iter()
            .map(|ext| self.aux_file(job_name, ext))
            .collect()
    }

    pub fn is_final_artifact(&self, path: &Path, job_name: &str) -> bool {
        path == self.final_artifact(job_name)
    }
}
