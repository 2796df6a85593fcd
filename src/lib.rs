//! passbuild - multi-pass document build orchestrator
//!
//! Compiles a set of interdependent documents (a main paper, standalone
//! sub-documents, figure and table fragments) with an external compiler,
//! repeating passes until cross-document references reach a fixed point.
//!
//! # Core Concepts
//!
//! - **Discovery**: enumerates compilable documents per scope and scans them
//!   for labels, references, external documents and includes
//! - **Variants**: length mode, output format and compilation context are
//!   resolved into one [`BuildConfiguration`] per document, including the
//!   decision whether a reference list is emitted
//! - **Passes**: the [`BuildOrchestrator`] compiles the work list until the
//!   [`ConvergenceTracker`] reports convergence, a stall or an exhausted budget
//! - **Findings**: compiler logs are classified into fatal, warning and
//!   benign [`Finding`]s that drive recovery and the exit code
//!
//! # Example Usage
//!
//! ```ignore
//! use passbuild::{BuildOptions, BuildOrchestrator, CommandCompiler, PassbuildConfig};
//! use passbuild::fs::RealFileSystem;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! async fn build(root: &Path) -> anyhow::Result<i32> {
//!     let config = PassbuildConfig::default();
//!     let compiler = CommandCompiler::new(
//!         config.compiler.clone(),
//!         config.compiler_args.clone(),
//!         config.bibliography_tool.clone(),
//!         config.timeout(),
//!     );
//!     let orchestrator =
//!         BuildOrchestrator::new(config, Arc::new(RealFileSystem::new()), Arc::new(compiler));
//!     let report = orchestrator.build(root, &BuildOptions::default()).await?;
//!     println!("{}", report.summary_line());
//!     Ok(report.exit_code())
//! }
//! ```

pub mod bibliography;
pub mod build;
pub mod cleanup;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod fs;
pub mod progress;
pub mod recovery;
pub mod util;
pub mod variant;

pub use bibliography::{include_bibliography, BibliographyDecision, CitationScanner};
pub use build::{
    BuildError, BuildOptions, BuildOrchestrator, BuildReport, ConvergenceTracker, PassPolicy,
    PassVerdict,
};
pub use cleanup::{CleanupManager, CleanupSummary};
pub use compiler::{CommandCompiler, CompileRequest, Compiler, CompilerError, CompilerInvocationResult};
pub use config::{ConfigError, PassbuildConfig};
pub use diagnostics::{DiagnosticClassifier, Finding, FindingKind, Severity};
pub use document::{DocumentScope, ResolutionState, ScopeSelector, SourceDocument};
pub use recovery::{RecoveryAction, RecoveryController};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use variant::{BuildConfiguration, BuildParameters, VariantResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
