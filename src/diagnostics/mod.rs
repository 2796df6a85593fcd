//! Diagnostic classification of compiler output

pub mod classifier;
pub mod finding;
pub mod log_parser;

pub use classifier::{ClassifierError, DiagnosticClassifier};
pub use finding::{dedup, Finding, FindingKind, Severity};
pub use log_parser::{HIDDEN_BEGIN_MARKER, HIDDEN_END_MARKER};
