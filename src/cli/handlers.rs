//! Command handlers
//!
//! Each handler returns the process exit code: 0 on success, 1 when the
//! build failed or was aborted, 2 for configuration and usage errors.

use super::commands::{BuildArgs, CleanArgs, ListArgs};
use super::output::OutputFormatter;
use crate::build::{BuildError, BuildOptions, BuildOrchestrator, BuildReport, DocumentStatus};
use crate::compiler::CommandCompiler;
use crate::config::PassbuildConfig;
use crate::document::DiscoveryError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::progress::LoggingHandler;
use crate::recovery::{stdin_is_interactive, RecoveryController, StdinPrompter};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn handle_build(args: &BuildArgs, quiet: bool) -> i32 {
    match run_build(args, quiet).await {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

pub fn handle_list(args: &ListArgs) -> i32 {
    match run_list(args) {
        Ok(()) => 0,
        Err(e) => report_error(&e),
    }
}

pub fn handle_clean(args: &CleanArgs, quiet: bool) -> i32 {
    match run_clean(args, quiet) {
        Ok(()) => 0,
        Err(e) => report_error(&e),
    }
}

fn report_error(error: &BuildError) -> i32 {
    eprintln!("{}", error.help_message());
    error.exit_code()
}

fn resolve_root(root: Option<&Path>) -> Result<PathBuf, BuildError> {
    let root = match root {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    root.canonicalize()
        .map_err(|_| BuildError::Discovery(DiscoveryError::RootNotFound(root)))
}

fn orchestrator(config: &PassbuildConfig) -> BuildOrchestrator {
    let compiler = CommandCompiler::new(
        config.compiler.clone(),
        config.compiler_args.clone(),
        config.bibliography_tool.clone(),
        config.timeout(),
    );
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
    BuildOrchestrator::new(config.clone(), fs, Arc::new(compiler))
        .with_progress_handler(Arc::new(LoggingHandler))
}

fn write_output(text: &str, output: Option<&Path>) -> Result<(), BuildError> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            debug!(path = %path.display(), "Report written");
        }
        None => print!("{}", text),
    }
    Ok(())
}

async fn run_build(args: &BuildArgs, quiet: bool) -> Result<i32, BuildError> {
    let mut config = PassbuildConfig::default();
    args.apply_to(&mut config);
    config.validate()?;
    debug!("{}", config);

    let root = resolve_root(args.root.as_deref())?;
    let mut orchestrator = orchestrator(&config);
    if args.interactive {
        if stdin_is_interactive() {
            orchestrator = orchestrator.with_recovery(RecoveryController::interactive(
                config.max_attempts,
                Arc::new(StdinPrompter),
            ));
        } else {
            warn!("stdin is not a terminal, ignoring --interactive");
        }
    }

    let options = BuildOptions {
        selector: args.scope.into(),
        single: args.single.clone(),
        params: args.parameters(),
        policy: None,
        clean_first: args.clean,
        keep_intermediates: args.keep_intermediates,
    };
    let formatter = OutputFormatter::new(args.report.into());

    if args.dry_run {
        let plan = orchestrator.plan(&root, &options)?;
        let report = orchestrator.plan_report(&plan, orchestrator.policy(), true);
        write_output(&formatter.format_plan(&report)?, args.output.as_deref())?;
        return Ok(0);
    }

    let report = orchestrator.build(&root, &options).await?;
    // A quiet successful build prints only its warnings unless a report file was requested
    if quiet && report.is_success() && args.output.is_none() {
        if let Some(summary) = formatter.format_quiet_summary(&report) {
            eprint!("{}", summary);
        }
    } else {
        write_output(&formatter.format_report(&report)?, args.output.as_deref())?;
    }

    if let Some(error) = failure(&report) {
        eprintln!("{}", error.help_message());
    }
    Ok(report.exit_code())
}

/// The error describing why a finished build did not succeed
fn failure(report: &BuildReport) -> Option<BuildError> {
    if report.is_success() {
        return None;
    }
    if report.aborted {
        let document = report
            .documents
            .iter()
            .find(|d| d.status == DocumentStatus::Failed)
            .map(|d| d.job_name.clone())
            .unwrap_or_default();
        return Some(BuildError::Aborted { document });
    }
    Some(BuildError::Failed {
        failed: report.documents.iter().filter(|d| d.has_fatal()).count(),
        total: report.documents.len(),
    })
}

fn run_list(args: &ListArgs) -> Result<(), BuildError> {
    let config = PassbuildConfig::default();
    let root = resolve_root(args.root.as_deref())?;
    let orchestrator = orchestrator(&config);

    let options = BuildOptions {
        selector: args.scope.into(),
        params: args.parameters(),
        ..Default::default()
    };
    let plan = orchestrator.plan(&root, &options)?;
    let report = orchestrator.plan_report(&plan, orchestrator.policy(), false);
    let formatter = OutputFormatter::new(args.report.into());
    write_output(&formatter.format_plan(&report)?, None)
}

fn run_clean(args: &CleanArgs, quiet: bool) -> Result<(), BuildError> {
    let config = PassbuildConfig::default();
    let root = resolve_root(args.root.as_deref())?;
    let orchestrator = orchestrator(&config);

    let options = BuildOptions {
        selector: args.scope.into(),
        ..Default::default()
    };
    let summary = orchestrator.clean(&root, &options)?;
    if !quiet {
        let formatter = OutputFormatter::new(args.report.into());
        write_output(&formatter.format_cleanup(&summary)?, None)?;
    }
    Ok(())
}
