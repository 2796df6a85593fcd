//! Multi-pass build orchestration
//!
//! [`BuildOrchestrator`] drives discovery, variant resolution, the
//! fixed-point pass loop, classification, recovery, promotion and cleanup.

pub mod finding_log;
pub mod orchestrator;
pub mod passes;
pub mod references;
pub mod report;

pub use finding_log::FindingLog;
pub use orchestrator::{BuildOptions, BuildOrchestrator, BuildPlan};
pub use passes::{ConvergenceTracker, PassPolicy, PassRecord, PassVerdict};
pub use references::{LabelSnapshot, LabelTable};
pub use report::{BuildReport, DocumentPlan, DocumentReport, DocumentStatus, PlanReport};

use crate::compiler::CompilerError;
use crate::config::ConfigError;
use crate::diagnostics::ClassifierError;
use crate::document::DiscoveryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Compiler(#[from] CompilerError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("Build aborted after fatal findings in {document}")]
    Aborted { document: String },

    #[error("{failed} of {total} documents ended with fatal findings")]
    Failed { failed: usize, total: usize },

    #[error("{0:#}")]
    Io(#[from] anyhow::Error),
}

impl BuildError {
    pub fn help_message(&self) -> String {
        match self {
            BuildError::Config(e) => format!(
                "Error: {}\n\n\
                Help: Check the PASSBUILD_* environment variables and command-line flags.",
                e
            ),
            BuildError::Discovery(e) => e.help_message(),
            BuildError::Compiler(e) => e.help_message(),
            BuildError::Classifier(e) => format!(
                "Error: {}\n\n\
                Help: The compiler wrote neither a log nor console output. Run the\n\
                invocation shown by --dry-run by hand to see what happened.",
                e
            ),
            BuildError::Aborted { .. } => format!(
                "Error: {}\n\n\
                Help: Fix the fatal findings listed above, or rerun with --interactive\n\
                to retry or skip documents one by one. Auxiliary state was kept.",
                self
            ),
            BuildError::Failed { .. } => format!(
                "Error: {}\n\n\
                Help: The finding breakdown above lists a remediation for each fatal finding.",
                self
            ),
            BuildError::Io(_) => format!(
                "Error: {}\n\n\
                Help: Check permissions on the auxiliary and output directories.",
                self
            ),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Config(_) | BuildError::Discovery(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        let config = BuildError::from(ConfigError::ValidationFailed("jobs".into()));
        assert_eq!(config.exit_code(), 2);

        let discovery = BuildError::from(DiscoveryError::RootNotFound(PathBuf::from("/nope")));
        assert_eq!(discovery.exit_code(), 2);

        let aborted = BuildError::Aborted {
            document: "main".into(),
        };
        assert_eq!(aborted.exit_code(), 1);
        assert!(aborted.help_message().contains("--interactive"));
    }

    #[test]
    fn test_io_error_keeps_context_chain() {
        let err = BuildError::from(
            anyhow::anyhow!("permission denied").context("Failed to promote main.pdf"),
        );
        let text = err.to_string();
        assert!(text.contains("Failed to promote main.pdf"));
        assert!(text.contains("permission denied"));
    }
}
