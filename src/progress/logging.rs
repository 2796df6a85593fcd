//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use crate::build::PassVerdict;
use crate::compiler::InvocationStatus;
use tracing::{debug, error, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { root, documents } => {
                info!(root = %root, documents, "Starting build");
            }
            ProgressEvent::PassStarted {
                pass,
                compiling,
                skipped,
            } => {
                info!(pass, compiling, skipped, "Starting pass");
            }
            ProgressEvent::DocumentCompiled {
                document,
                pass,
                attempt,
                status,
                fatal,
                action,
                elapsed,
            } => match status {
                InvocationStatus::Success if *fatal == 0 => {
                    debug!(
                        document = %document,
                        pass,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        "Compiled"
                    );
                }
                InvocationStatus::SoftSuccess if *fatal == 0 => {
                    warn!(
                        document = %document,
                        pass,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        "Compiler exited non-zero but produced an artifact"
                    );
                }
                _ => {
                    error!(
                        document = %document,
                        pass,
                        attempt,
                        status = %status,
                        fatal,
                        action = %action,
                        "Compile failed"
                    );
                }
            },
            ProgressEvent::PassCompleted {
                pass,
                unresolved,
                verdict,
            } => match verdict {
                PassVerdict::Continue => {
                    debug!(pass, unresolved, "Pass complete, continuing");
                }
                PassVerdict::Converged => {
                    info!(pass, "Cross-references converged");
                }
                PassVerdict::Stalled | PassVerdict::BudgetExhausted => {
                    warn!(pass, unresolved, verdict = %verdict, "Pass loop stopped with unresolved references");
                }
            },
            ProgressEvent::Promoted { document, artifact } => {
                debug!(document = %document, artifact = %artifact, "Promoted artifact");
            }
            ProgressEvent::Completed {
                succeeded,
                total,
                passes,
                total_time,
            } => {
                info!(
                    succeeded,
                    total,
                    passes,
                    total_time_ms = total_time.as_millis(),
                    "Build complete"
                );
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Build failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryAction;
    use std::time::Duration;

    #[test]
    fn test_logging_all_events() {
        let handler = LoggingHandler;

        let events = vec![
            ProgressEvent::Started {
                root: "/paper".to_string(),
                documents: 3,
            },
            ProgressEvent::PassStarted {
                pass: 1,
                compiling: 3,
                skipped: 0,
            },
            ProgressEvent::DocumentCompiled {
                document: "main".to_string(),
                pass: 1,
                attempt: 1,
                status: InvocationStatus::Success,
                fatal: 0,
                action: RecoveryAction::Proceed,
                elapsed: Duration::from_millis(800),
            },
            ProgressEvent::DocumentCompiled {
                document: "slides".to_string(),
                pass: 1,
                attempt: 1,
                status: InvocationStatus::SoftSuccess,
                fatal: 0,
                action: RecoveryAction::Proceed,
                elapsed: Duration::from_millis(900),
            },
            ProgressEvent::DocumentCompiled {
                document: "irf".to_string(),
                pass: 1,
                attempt: 1,
                status: InvocationStatus::TimedOut,
                fatal: 1,
                action: RecoveryAction::Abort,
                elapsed: Duration::from_secs(300),
            },
            ProgressEvent::PassCompleted {
                pass: 1,
                unresolved: 1,
                verdict: PassVerdict::Continue,
            },
            ProgressEvent::PassCompleted {
                pass: 2,
                unresolved: 1,
                verdict: PassVerdict::Stalled,
            },
            ProgressEvent::Promoted {
                document: "main".to_string(),
                artifact: "/paper/main.pdf".to_string(),
            },
            ProgressEvent::Completed {
                succeeded: 2,
                total: 3,
                passes: 2,
                total_time: Duration::from_secs(12),
            },
            ProgressEvent::Failed {
                error: "aborted".to_string(),
            },
        ];

        for event in events {
            handler.on_progress(&event);
        }
    }
}
