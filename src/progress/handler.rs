//! Progress handler trait and events

use crate::build::PassVerdict;
use crate::compiler::InvocationStatus;
use crate::recovery::RecoveryAction;
use std::time::Duration;

/// Events emitted while a build runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Discovery finished and the pass loop is about to start
    Started { root: String, documents: usize },

    /// A pass started
    PassStarted {
        pass: u32,
        compiling: usize,
        skipped: usize,
    },

    /// One compile attempt of one document finished and was classified
    DocumentCompiled {
        document: String,
        pass: u32,
        attempt: u32,
        status: InvocationStatus,
        fatal: usize,
        action: RecoveryAction,
        elapsed: Duration,
    },

    /// All compilations of a pass finished
    PassCompleted {
        pass: u32,
        unresolved: usize,
        verdict: PassVerdict,
    },

    /// A rendered artifact was promoted to the output directory
    Promoted { document: String, artifact: String },

    /// Build finished
    Completed {
        succeeded: usize,
        total: usize,
        passes: u32,
        total_time: Duration,
    },

    /// Build failed or was aborted
    Failed { error: String },
}

/// Trait for handling progress events during a build
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
