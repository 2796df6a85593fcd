//! Build driver
//!
//! One build runs discovery and variant resolution, then compiles the work
//! list pass by pass until the [`ConvergenceTracker`] reaches a final
//! verdict. Compilations inside a pass run concurrently up to the configured
//! job count and only see the auxiliary state of earlier passes. Each compile
//! is classified and handed to the [`RecoveryController`]. After the loop the
//! rendered artifacts are promoted into the output directory and transient
//! state is cleaned up.

use super::finding_log::FindingLog;
use super::passes::{ConvergenceTracker, PassPolicy, PassRecord, PassVerdict};
use super::references::LabelSnapshot;
use super::report::{BuildReport, DocumentPlan, DocumentReport, DocumentStatus, PlanReport};
use super::BuildError;
use crate::bibliography::CitationScanner;
use crate::cleanup::{CleanupManager, CleanupSummary};
use crate::compiler::{
    ArtifactLayout, CompileRequest, Compiler, CompilerInvocationResult, InvocationStatus,
};
use crate::config::PassbuildConfig;
use crate::diagnostics::{dedup, DiagnosticClassifier, Finding, FindingKind};
use crate::document::discovery::ScopeDirectories;
use crate::document::{
    DependencyGraph, Discovery, ResolutionState, ScopeSelector, SourceDocument,
};
use crate::fs::FileSystem;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::recovery::{RecoveryAction, RecoveryController};
use crate::variant::{
    BuildConfiguration, BuildParameters, CompilationContext, LengthMode, OutputFormat,
    VariantResolver,
};
use anyhow::Context;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Residual references listed per finding before the rest is elided
const MAX_LISTED_REFERENCES: usize = 10;

/// Per-invocation build options, layered over [`PassbuildConfig`]
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub selector: ScopeSelector,
    /// Build only this document, as a one-element set
    pub single: Option<PathBuf>,
    pub params: BuildParameters,
    /// Replaces the configured pass budget
    pub policy: Option<PassPolicy>,
    /// Full cleanup before the first pass
    pub clean_first: bool,
    pub keep_intermediates: bool,
}

/// Discovered and resolved work list of one build
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub root: PathBuf,
    pub layout: ArtifactLayout,
    pub documents: Vec<SourceDocument>,
    pub variants: HashMap<String, BuildConfiguration>,
}

impl BuildPlan {
    pub fn variant(&self, doc: &SourceDocument) -> BuildConfiguration {
        self.variants.get(&doc.job_name).cloned().unwrap_or_else(|| {
            BuildConfiguration::new(
                LengthMode::default(),
                OutputFormat::default(),
                CompilationContext::default(),
                doc.citation_count,
            )
        })
    }

    pub fn request(&self, doc: &SourceDocument) -> CompileRequest {
        CompileRequest {
            job_name: doc.job_name.clone(),
            source: doc.path.clone(),
            project_root: self.root.clone(),
            config: self.variant(doc),
            layout: self.layout.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Active,
    Skipped,
    Failed,
}

/// Everything the build learned about one document so far
#[derive(Debug)]
struct DocumentProgress {
    disposition: Disposition,
    attempts: u32,
    last: Option<CompilerInvocationResult>,
    /// Findings of the latest compile
    findings: Vec<Finding>,
    /// Findings of the bibliography run, kept across passes
    bibliography_findings: Vec<Finding>,
    residual: Option<Finding>,
}

impl Default for DocumentProgress {
    fn default() -> Self {
        Self {
            disposition: Disposition::Active,
            attempts: 0,
            last: None,
            findings: Vec::new(),
            bibliography_findings: Vec::new(),
            residual: None,
        }
    }
}

impl DocumentProgress {
    fn is_active(&self) -> bool {
        self.disposition == Disposition::Active
    }

    fn final_findings(&self) -> Vec<Finding> {
        let mut findings = self.findings.clone();
        findings.extend(self.bibliography_findings.iter().cloned());
        findings.extend(self.residual.iter().cloned());
        dedup(findings)
    }
}

/// Result of compiling one document within one pass, retries included
#[derive(Debug)]
struct DocumentOutcome {
    job_name: String,
    /// `None` when the build was aborting before the compile started
    result: Option<CompilerInvocationResult>,
    findings: Vec<Finding>,
    bibliography_findings: Option<Vec<Finding>>,
    attempts: u32,
    action: RecoveryAction,
}

impl DocumentOutcome {
    fn cancelled(job_name: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            result: None,
            findings: Vec::new(),
            bibliography_findings: None,
            attempts: 0,
            action: RecoveryAction::Abort,
        }
    }
}

pub struct BuildOrchestrator {
    config: PassbuildConfig,
    fs: Arc<dyn FileSystem>,
    compiler: Arc<dyn Compiler>,
    classifier: DiagnosticClassifier,
    recovery: RecoveryController,
    progress_handler: Option<Arc<dyn ProgressHandler>>,
    /// Serializes interactive prompts across concurrent compilations
    prompt: Mutex<()>,
}

impl BuildOrchestrator {
    pub fn new(
        config: PassbuildConfig,
        fs: Arc<dyn FileSystem>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        let classifier = DiagnosticClassifier::new(config.hidden_label_prefix.clone());
        let recovery = RecoveryController::non_interactive(config.max_attempts);
        Self {
            config,
            fs,
            compiler,
            classifier,
            recovery,
            progress_handler: None,
            prompt: Mutex::new(()),
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryController) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_progress_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &PassbuildConfig {
        &self.config
    }

    /// Pass budget from the configuration
    pub fn policy(&self) -> PassPolicy {
        PassPolicy::new(self.config.min_passes, self.config.max_passes)
    }

    pub fn layout_for(&self, root: &Path) -> ArtifactLayout {
        ArtifactLayout::new(self.config.aux_dir_for(root), self.config.output_dir_for(root))
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    fn scope_directories(&self) -> ScopeDirectories {
        ScopeDirectories {
            figures: self.config.figures_dir.clone(),
            tables: self.config.tables_dir.clone(),
            subsections: self.config.subsections_dir.clone(),
        }
    }

    /// Discovers the work list, annotates dependencies and resolves variants
    pub fn plan(&self, root: &Path, options: &BuildOptions) -> Result<BuildPlan, BuildError> {
        self.config.validate()?;

        let citations = CitationScanner::new(&self.config.citation_markers);
        let discovery = Discovery::new(
            self.fs.clone(),
            root.to_path_buf(),
            self.scope_directories(),
            citations,
        );
        let mut documents = match &options.single {
            Some(path) => vec![discovery.discover_single(path)?],
            None => discovery.discover(options.selector)?,
        };

        let graph = DependencyGraph::build(&documents);
        graph.annotate(&mut documents);
        let variants = VariantResolver::new(options.params, &graph).resolve_all(&documents);

        for doc in &documents {
            if let Some(variant) = variants.get(&doc.job_name) {
                debug!(
                    document = %doc.job_name,
                    scope = %doc.scope,
                    variant = %variant,
                    dependencies = doc.dependencies.len(),
                    "Planned"
                );
            }
        }

        Ok(BuildPlan {
            root: root.to_path_buf(),
            layout: self.layout_for(root),
            documents,
            variants,
        })
    }

    /// Describes a plan, with the exact compiler invocations when `describe` is set
    pub fn plan_report(&self, plan: &BuildPlan, policy: PassPolicy, describe: bool) -> PlanReport {
        let documents = plan
            .documents
            .iter()
            .map(|doc| {
                let request = plan.request(doc);
                DocumentPlan {
                    job_name: doc.job_name.clone(),
                    path: doc.path.clone(),
                    scope: doc.scope,
                    invocation: describe.then(|| self.compiler.describe(&request)),
                    variant: request.config,
                    dependencies: doc.dependencies.iter().cloned().collect(),
                    citation_count: doc.citation_count,
                }
            })
            .collect();

        PlanReport {
            root: plan.root.clone(),
            aux_dir: plan.layout.aux_dir.clone(),
            output_dir: plan.layout.output_dir.clone(),
            policy,
            documents,
        }
    }

    /// Removes all transient state of the selected documents
    pub fn clean(&self, root: &Path, options: &BuildOptions) -> Result<CleanupSummary, BuildError> {
        let plan = self.plan(root, options)?;
        let cleanup = CleanupManager::new(self.fs.clone(), plan.layout.clone());
        Ok(cleanup.full_clean(&plan.documents)?)
    }

    pub async fn build(&self, root: &Path, options: &BuildOptions) -> Result<BuildReport, BuildError> {
        let result = self.run(root, options).await;
        match &result {
            Ok(report) if report.aborted => self.emit(ProgressEvent::Failed {
                error: "build aborted after fatal findings".to_string(),
            }),
            Ok(report) => self.emit(ProgressEvent::Completed {
                succeeded: report.succeeded(),
                total: report.documents.len(),
                passes: report.passes.len() as u32,
                total_time: std::time::Duration::from_millis(report.duration_ms),
            }),
            Err(e) => self.emit(ProgressEvent::Failed {
                error: e.to_string(),
            }),
        }
        result
    }

    async fn run(&self, root: &Path, options: &BuildOptions) -> Result<BuildReport, BuildError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut plan = self.plan(root, options)?;
        let policy = options.policy.unwrap_or_else(|| self.policy());
        info!(
            root = %plan.root.display(),
            documents = plan.documents.len(),
            min_passes = policy.min_passes,
            max_passes = policy.max_passes,
            jobs = self.config.jobs,
            "Starting build"
        );
        self.emit(ProgressEvent::Started {
            root: plan.root.display().to_string(),
            documents: plan.documents.len(),
        });

        let cleanup = CleanupManager::new(self.fs.clone(), plan.layout.clone());
        if options.clean_first {
            cleanup.full_clean(&plan.documents)?;
        }
        let finding_log = FindingLog::new(plan.layout.finding_log());

        let mut progress: BTreeMap<String, DocumentProgress> = plan
            .documents
            .iter()
            .map(|d| (d.job_name.clone(), DocumentProgress::default()))
            .collect();
        let mut tracker = ConvergenceTracker::new(policy);
        let mut verdict = PassVerdict::Continue;
        let mut aborted_by: Option<String> = None;
        let abort = AtomicBool::new(false);

        while !verdict.is_final() {
            let index = tracker.next_index();
            let before = LabelSnapshot::capture(self.fs.as_ref(), &plan.layout, &plan.documents);

            let mut record = PassRecord::new(index);
            let mut queue = Vec::new();
            for doc in &plan.documents {
                if !progress.get(&doc.job_name).map_or(false, DocumentProgress::is_active) {
                    continue;
                }
                if tracker.can_skip(&doc.job_name, doc.dependencies.iter().map(String::as_str)) {
                    record.skipped.push(doc.job_name.clone());
                } else {
                    record.compiled.push(doc.job_name.clone());
                    queue.push(doc);
                }
            }
            if queue.is_empty() {
                debug!(pass = index, "Nothing left to compile");
                break;
            }

            self.emit(ProgressEvent::PassStarted {
                pass: index,
                compiling: queue.len(),
                skipped: record.skipped.len(),
            });

            let outcomes: Vec<Result<DocumentOutcome, BuildError>> = stream::iter(
                queue
                    .into_iter()
                    .map(|doc| self.compile_document(&plan, doc, index, &finding_log, &cleanup, &abort)),
            )
            .buffer_unordered(self.config.jobs.max(1))
            .collect()
            .await;

            let after = LabelSnapshot::capture(self.fs.as_ref(), &plan.layout, &plan.documents);

            for outcome in outcomes {
                let outcome = outcome?;
                let Some(state) = progress.get_mut(&outcome.job_name) else {
                    continue;
                };
                let Some(result) = outcome.result else {
                    continue;
                };

                state.attempts += outcome.attempts;
                state.findings = outcome.findings;
                state.last = Some(result);
                if let Some(findings) = outcome.bibliography_findings {
                    state.bibliography_findings = findings;
                    // The bibliography run rewrote the citation state the next compile reads
                    record.changed.insert(outcome.job_name.clone());
                }

                match outcome.action {
                    RecoveryAction::Proceed => {}
                    RecoveryAction::Skip => {
                        warn!(document = %outcome.job_name, "Skipping document for the rest of the build");
                        state.disposition = Disposition::Skipped;
                    }
                    RecoveryAction::Retry | RecoveryAction::Abort => {
                        error!(document = %outcome.job_name, "Aborting build");
                        state.disposition = Disposition::Failed;
                        aborted_by.get_or_insert(outcome.job_name);
                    }
                }
            }

            record.changed.extend(after.changed_since(&before));

            let first_counts: HashMap<String, usize> = plan
                .documents
                .iter()
                .filter_map(|d| {
                    tracker
                        .history(&d.job_name)
                        .first()
                        .map(|&count| (d.job_name.clone(), count))
                })
                .collect();
            for doc in plan.documents.iter_mut() {
                if !progress.get(&doc.job_name).map_or(false, DocumentProgress::is_active) {
                    continue;
                }
                let unresolved = before.unresolved(doc);
                let fewer = first_counts
                    .get(&doc.job_name)
                    .map_or(false, |&first| unresolved.len() < first);
                if fewer || after.table(&doc.job_name).is_some() {
                    doc.advance(ResolutionState::PartiallyResolved);
                }
                record.unresolved.insert(doc.job_name.clone(), unresolved);
            }

            let unresolved = record.total_unresolved();
            verdict = tracker.record(record);
            debug!(pass = index, unresolved, verdict = %verdict, "Pass complete");
            self.emit(ProgressEvent::PassCompleted {
                pass: index,
                unresolved,
                verdict,
            });

            if aborted_by.is_some() {
                break;
            }
        }

        let aborted = aborted_by.is_some();
        if !aborted {
            self.settle(&mut plan, &mut progress, &tracker, verdict, &finding_log)
                .await?;
        }

        let mut promoted: HashMap<String, (PathBuf, String)> = HashMap::new();
        if !aborted {
            for doc in &plan.documents {
                let Some(state) = progress.get(&doc.job_name) else {
                    continue;
                };
                let produced = state.last.as_ref().map_or(false, |r| r.artifact.is_some());
                if state.is_active() && produced {
                    let (artifact, digest) = self.promote(&plan.layout, &doc.job_name).await?;
                    self.emit(ProgressEvent::Promoted {
                        document: doc.job_name.clone(),
                        artifact: artifact.display().to_string(),
                    });
                    promoted.insert(doc.job_name.clone(), (artifact, digest));
                }
            }
        }

        if aborted {
            warn!("Build aborted, auxiliary state kept for inspection");
        } else if options.keep_intermediates {
            debug!("Keeping intermediate files");
        } else {
            let finalized: Vec<&str> = plan
                .documents
                .iter()
                .filter(|d| {
                    progress
                        .get(&d.job_name)
                        .map_or(false, |s| s.disposition != Disposition::Failed)
                })
                .map(|d| d.job_name.as_str())
                .collect();
            cleanup.finalize(&plan.documents, finalized)?;
        }

        let last = tracker.last().cloned().unwrap_or_default();
        let documents = plan
            .documents
            .iter()
            .map(|doc| {
                let state = progress.get(&doc.job_name);
                let (artifact, digest) = match promoted.remove(&doc.job_name) {
                    Some((artifact, digest)) => (Some(artifact), Some(digest)),
                    None => (None, None),
                };
                let status = match state.map(|s| s.disposition) {
                    _ if aborted && artifact.is_none() && state.map_or(false, DocumentProgress::is_active) => {
                        DocumentStatus::Skipped
                    }
                    Some(Disposition::Active) => match state.and_then(|s| s.last.as_ref()).map(|r| r.status) {
                        Some(InvocationStatus::SoftSuccess) => DocumentStatus::SoftSuccess,
                        _ => DocumentStatus::Succeeded,
                    },
                    Some(Disposition::Skipped) => DocumentStatus::Skipped,
                    Some(Disposition::Failed) | None => DocumentStatus::Failed,
                };
                DocumentReport {
                    job_name: doc.job_name.clone(),
                    path: doc.path.clone(),
                    scope: doc.scope,
                    status,
                    state: doc.state(),
                    variant: plan.variant(doc),
                    attempts: state.map_or(0, |s| s.attempts),
                    unresolved: last
                        .unresolved
                        .get(&doc.job_name)
                        .map(|refs| refs.iter().cloned().collect())
                        .unwrap_or_default(),
                    artifact,
                    digest,
                    findings: state.map(DocumentProgress::final_findings).unwrap_or_default(),
                }
            })
            .collect();

        let passes = tracker.into_records();
        let report = BuildReport {
            root: plan.root.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
            documents,
            verdict: (!passes.is_empty()).then_some(verdict),
            passes,
            aborted,
        };
        info!(
            succeeded = report.succeeded(),
            total = report.documents.len(),
            passes = report.passes.len(),
            aborted,
            "Build finished"
        );
        Ok(report)
    }

    /// Marks converged documents and reports residual references after the last pass
    async fn settle(
        &self,
        plan: &mut BuildPlan,
        progress: &mut BTreeMap<String, DocumentProgress>,
        tracker: &ConvergenceTracker,
        verdict: PassVerdict,
        finding_log: &FindingLog,
    ) -> Result<(), BuildError> {
        let Some(last) = tracker.last() else {
            return Ok(());
        };

        for doc in plan.documents.iter_mut() {
            let Some(state) = progress.get_mut(&doc.job_name) else {
                continue;
            };
            let Some(references) = last.unresolved.get(&doc.job_name) else {
                continue;
            };
            if !state.is_active() {
                continue;
            }

            if references.is_empty() {
                if verdict == PassVerdict::Converged {
                    doc.advance(ResolutionState::Converged);
                }
                continue;
            }

            let mut listed: Vec<&str> = references
                .iter()
                .take(MAX_LISTED_REFERENCES)
                .map(String::as_str)
                .collect();
            if references.len() > MAX_LISTED_REFERENCES {
                listed.push("...");
            }
            let finding = Finding::new(
                FindingKind::ResidualUnresolvedReference,
                doc.job_name.as_str(),
                format!(
                    "{} unresolved reference(s) after {} pass(es) ({}): {}",
                    references.len(),
                    last.index,
                    verdict,
                    listed.join(", ")
                ),
            );
            warn!(
                document = %doc.job_name,
                unresolved = references.len(),
                verdict = %verdict,
                "Residual unresolved references"
            );
            finding_log
                .append(last.index, state.attempts, std::slice::from_ref(&finding))
                .await?;
            state.residual = Some(finding);
        }
        Ok(())
    }

    async fn compile_document(
        &self,
        plan: &BuildPlan,
        doc: &SourceDocument,
        pass: u32,
        finding_log: &FindingLog,
        cleanup: &CleanupManager,
        abort: &AtomicBool,
    ) -> Result<DocumentOutcome, BuildError> {
        if abort.load(Ordering::SeqCst) {
            debug!(document = %doc.job_name, "Build aborting, compile not started");
            return Ok(DocumentOutcome::cancelled(&doc.job_name));
        }

        let request = plan.request(doc);
        let mut attempt = 1;
        loop {
            debug!(document = %request.job_name, pass, attempt, variant = %request.config, "Compiling");
            let result = self.compiler.compile(&request).await?;
            let findings = self.classifier.classify(self.fs.as_ref(), &result)?;

            let mut bibliography_findings = None;
            if pass == 1
                && request.config.include_bibliography()
                && result.status.produced_artifact()
            {
                if let Some(bibliography) = self.compiler.process_bibliography(&request).await? {
                    bibliography_findings = Some(
                        self.classifier
                            .classify_bibliography(self.fs.as_ref(), &bibliography)?,
                    );
                }
            }

            let mut all = findings.clone();
            all.extend(bibliography_findings.iter().flatten().cloned());
            finding_log.append(pass, attempt, &all).await?;

            let mut action = self.decide(&request.job_name, &all, attempt).await;
            if action == RecoveryAction::Retry && attempt >= self.config.max_attempts {
                action = RecoveryAction::Abort;
            }

            self.emit(ProgressEvent::DocumentCompiled {
                document: request.job_name.clone(),
                pass,
                attempt,
                status: result.status,
                fatal: all.iter().filter(|f| f.is_fatal()).count(),
                action,
                elapsed: result.elapsed,
            });

            match action {
                RecoveryAction::Retry => {
                    info!(document = %request.job_name, pass, attempt, "Clearing transient state and retrying");
                    cleanup.clear_for_retry(&request.job_name)?;
                    attempt += 1;
                }
                _ => {
                    if action == RecoveryAction::Abort {
                        abort.store(true, Ordering::SeqCst);
                    }
                    return Ok(DocumentOutcome {
                        job_name: request.job_name,
                        result: Some(result),
                        findings,
                        bibliography_findings,
                        attempts: attempt,
                        action,
                    });
                }
            }
        }
    }

    async fn decide(&self, document: &str, findings: &[Finding], attempt: u32) -> RecoveryAction {
        if !self.recovery.is_interactive() || !findings.iter().any(Finding::is_fatal) {
            return self.recovery.decide(document, findings, attempt);
        }

        // The prompt blocks on stdin
        let _prompt = self.prompt.lock().await;
        let recovery = self.recovery.clone();
        let name = document.to_string();
        let findings = findings.to_vec();
        match tokio::task::spawn_blocking(move || recovery.decide(&name, &findings, attempt)).await {
            Ok(action) => action,
            Err(e) => {
                warn!(document, error = %e, "Recovery prompt failed, aborting");
                RecoveryAction::Abort
            }
        }
    }

    /// Moves the intermediate artifact into the output directory via a staging file
    async fn promote(&self, layout: &ArtifactLayout, job_name: &str) -> anyhow::Result<(PathBuf, String)> {
        let source = layout.intermediate_artifact(job_name);
        let target = layout.final_artifact(job_name);

        let bytes = tokio::fs::read(&source)
            .await
            .with_context(|| format!("Failed to read artifact {}", source.display()))?;
        let digest = hex::encode(Sha256::digest(&bytes));
        if source == target {
            return Ok((target, digest));
        }

        tokio::fs::create_dir_all(&layout.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", layout.output_dir.display()))?;
        let staging = layout
            .output_dir
            .join(format!(".{}.{}.tmp", job_name, Uuid::new_v4()));
        tokio::fs::write(&staging, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e).with_context(|| format!("Failed to move artifact to {}", target.display()));
        }

        debug!(document = job_name, artifact = %target.display(), digest = %digest, "Promoted");
        Ok((target, digest))
    }
}
