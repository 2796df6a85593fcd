//! Compiler invocation adapter
//!
//! One call of the external document compiler for one document. The resolved
//! [`BuildConfiguration`] reaches the toolchain only through the environment
//! built by [`toolchain_environment`]; the adapter never consults global state.

mod command;
pub mod layout;

pub use command::CommandCompiler;
pub use layout::ArtifactLayout;

use crate::variant::BuildConfiguration;
use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompilerError {
    pub fn help_message(&self) -> String {
        match self {
            CompilerError::Spawn { program, .. } => format!(
                "Error: {}\n\n\
                Help: Make sure '{}' is installed and on PATH, or point\n\
                PASSBUILD_COMPILER / PASSBUILD_BIBTOOL at the right program.",
                self, program
            ),
            CompilerError::Io { .. } => format!(
                "Error: {}\n\n\
                Help: Check that the auxiliary directory is writable.",
                self
            ),
        }
    }
}

/// Everything needed to compile one document once
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub job_name: String,
    pub source: PathBuf,
    pub project_root: PathBuf,
    pub config: BuildConfiguration,
    pub layout: ArtifactLayout,
}

impl CompileRequest {
    pub fn source_dir(&self) -> &Path {
        self.source.parent().unwrap_or(self.project_root.as_path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationStatus {
    Success,
    /// Non-zero exit, but the rendered artifact was produced
    SoftSuccess,
    Failed,
    TimedOut,
}

impl InvocationStatus {
    pub fn produced_artifact(&self) -> bool {
        matches!(self, InvocationStatus::Success | InvocationStatus::SoftSuccess)
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationStatus::Success => "success",
            InvocationStatus::SoftSuccess => "soft-success",
            InvocationStatus::Failed => "failed",
            InvocationStatus::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompilerInvocationResult {
    pub job_name: String,
    /// `None` when the process was killed
    pub exit_code: Option<i32>,
    pub status: InvocationStatus,
    pub artifact: Option<PathBuf>,
    pub log_path: PathBuf,
    pub console_path: PathBuf,
    pub aux_path: PathBuf,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// A fully described process invocation, used for dry runs and logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(cd {} && ", self.cwd.display())?;
        for (key, value) in &self.env {
            if key.starts_with("PASSBUILD_") {
                write!(f, "{}={} ", key, value)?;
            }
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

#[async_trait]
pub trait Compiler: Send + Sync {
    /// Runs one compile of the requested document
    async fn compile(&self, request: &CompileRequest)
        -> Result<CompilerInvocationResult, CompilerError>;

    /// Runs the bibliography processor, `Ok(None)` when none is configured
    async fn process_bibliography(
        &self,
        request: &CompileRequest,
    ) -> Result<Option<CompilerInvocationResult>, CompilerError>;

    /// Describes the compile without running it
    fn describe(&self, request: &CompileRequest) -> Invocation;

    fn name(&self) -> &str;
}

/// Environment encoding a resolved configuration for the toolchain
///
/// `existing_texinputs` / `existing_bibinputs` are appended after the project
/// paths; a trailing separator keeps the toolchain's default search path.
pub fn toolchain_environment(
    request: &CompileRequest,
    existing_texinputs: Option<OsString>,
    existing_bibinputs: Option<OsString>,
) -> Vec<(String, String)> {
    let config = &request.config;
    let suppress: Vec<&str> = config
        .suppression_rules()
        .iter()
        .map(|r| r.as_str())
        .collect();

    let search_path = |existing: Option<OsString>| {
        format!(
            "{}:{}:{}:{}",
            request.source_dir().display(),
            request.project_root.display(),
            request.layout.aux_dir.display(),
            existing
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default()
        )
    };

    vec![
        ("PASSBUILD_LENGTH".to_string(), config.length.to_string()),
        ("PASSBUILD_FORMAT".to_string(), config.format.to_string()),
        ("PASSBUILD_CONTEXT".to_string(), config.context.to_string()),
        (
            "PASSBUILD_APPENDIX".to_string(),
            config.appendix_mode.to_string(),
        ),
        (
            "PASSBUILD_BIBLIOGRAPHY".to_string(),
            if config.include_bibliography() {
                "include"
            } else {
                "omit"
            }
            .to_string(),
        ),
        (
            "PASSBUILD_HIDDEN_CONTENT".to_string(),
            if config.process_hidden_content {
                "process"
            } else {
                "skip"
            }
            .to_string(),
        ),
        ("PASSBUILD_SUPPRESS".to_string(), suppress.join(",")),
        ("TEXINPUTS".to_string(), search_path(existing_texinputs)),
        ("BIBINPUTS".to_string(), search_path(existing_bibinputs)),
    ]
}
