//! Shared fixtures for build tests
//!
//! [`FakeCompiler`] stands in for the toolchain: it writes one `\newlabel`
//! per `\label` of the source into the aux state, a log, and a deterministic
//! artifact. Source lines starting with `%log ` are copied into the log
//! verbatim so tests can inject warnings and errors.
//!
//! Citations behave like LaTeX: a compile writes `\citation` entries, the
//! bibliography run turns them into a `.bbl`, the next compile turns the
//! `.bbl` into `\bibcite` entries, and only the compile after that renders
//! the citations resolved.

#![allow(dead_code)]

use async_trait::async_trait;
use passbuild::compiler::{
    CompileRequest, Compiler, CompilerError, CompilerInvocationResult, Invocation,
    InvocationStatus,
};
use passbuild::document::SourceScan;
use passbuild::fs::RealFileSystem;
use passbuild::progress::{ProgressEvent, ProgressHandler};
use passbuild::{BuildOrchestrator, PassbuildConfig};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn passbuild_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_passbuild"))
}

pub const ARTICLE: &str = "\\documentclass{article}\n\\begin{document}\nBody.\n\\end{document}\n";

/// A throwaway project directory
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn file(self, relative: &str, content: &str) -> Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content).expect("Failed to write source");
        self
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn aux(&self, name: &str) -> PathBuf {
        self.root().join(".passbuild").join(name)
    }
}

/// Configuration with fixed values, independent of the environment
pub fn test_config() -> PassbuildConfig {
    let mut config = PassbuildConfig::default();
    config.timeout_secs = 60;
    config.min_passes = 3;
    config.max_passes = 5;
    config.max_attempts = 3;
    config.jobs = 2;
    config.aux_dir = PathBuf::from(".passbuild");
    config.output_dir = None;
    config.figures_dir = PathBuf::from("Figures");
    config.tables_dir = PathBuf::from("Tables");
    config.subsections_dir = PathBuf::from("Subfiles");
    config.hidden_label_prefix = "hidden:".to_string();
    config.citation_markers = vec!["\\cite".to_string(), "\\citet".to_string(), "\\citep".to_string()];
    config.log_level = "info".to_string();
    config
}

pub fn orchestrator(compiler: Arc<FakeCompiler>) -> BuildOrchestrator {
    orchestrator_with(test_config(), compiler)
}

pub fn orchestrator_with(config: PassbuildConfig, compiler: Arc<FakeCompiler>) -> BuildOrchestrator {
    BuildOrchestrator::new(config, Arc::new(RealFileSystem::new()), compiler)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    /// Killed at the time limit without writing anything
    Timeout,
    /// First attempt trips over half-written aux state, later ones succeed
    TransientOnce,
}

#[derive(Default)]
pub struct FakeCompiler {
    behaviors: HashMap<String, Behavior>,
    compiles: Mutex<Vec<(String, String)>>,
    bibliography_runs: Mutex<Vec<String>>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, job_name: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(job_name.to_string(), behavior);
        self
    }

    /// `(job name, variant)` of every compile, in call order
    pub fn compiles(&self) -> Vec<(String, String)> {
        self.compiles.lock().unwrap().clone()
    }

    pub fn compile_count(&self, job_name: &str) -> usize {
        self.compiles().iter().filter(|(name, _)| name == job_name).count()
    }

    pub fn bibliography_runs(&self) -> Vec<String> {
        self.bibliography_runs.lock().unwrap().clone()
    }

    fn behavior(&self, job_name: &str) -> Behavior {
        self.behaviors.get(job_name).copied().unwrap_or(Behavior::Normal)
    }

    fn result(request: &CompileRequest, status: InvocationStatus) -> CompilerInvocationResult {
        let layout = &request.layout;
        let job = request.job_name.as_str();
        CompilerInvocationResult {
            job_name: job.to_string(),
            exit_code: match status {
                InvocationStatus::Success => Some(0),
                InvocationStatus::TimedOut => None,
                _ => Some(1),
            },
            status,
            artifact: status
                .produced_artifact()
                .then(|| layout.intermediate_artifact(job)),
            log_path: layout.log(job),
            console_path: layout.console_log(job),
            aux_path: layout.aux(job),
            elapsed: Duration::from_millis(5),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CompilerError {
    CompilerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write(path: &Path, content: &str) -> Result<(), CompilerError> {
    fs::write(path, content).map_err(|e| io_error(path, e))
}

/// Values of `\<command>{..}` entries, comma lists split
fn entries(text: &str, command: &str) -> Vec<String> {
    let re = Regex::new(&format!(r"\\{}\*?(?:\[[^\]]*\])*\{{([^}}]+)\}}", command)).unwrap();
    let mut keys = Vec::new();
    for cap in re.captures_iter(text) {
        for key in cap[1].split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

fn bbl_path(request: &CompileRequest) -> PathBuf {
    request
        .layout
        .aux_dir
        .join(format!("{}.bbl", request.job_name))
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<CompilerInvocationResult, CompilerError> {
        let job = request.job_name.as_str();
        let attempt = {
            let mut compiles = self.compiles.lock().unwrap();
            compiles.push((job.to_string(), request.config.to_string()));
            compiles.iter().filter(|(name, _)| name == job).count()
        };

        let layout = &request.layout;
        fs::create_dir_all(&layout.aux_dir).map_err(|e| io_error(&layout.aux_dir, e))?;

        match self.behavior(job) {
            Behavior::Timeout => return Ok(Self::result(request, InvocationStatus::TimedOut)),
            Behavior::TransientOnce if attempt == 1 => {
                write(
                    &layout.log(job),
                    "This is FakeTeX\n! File ended while scanning use of \\@newl@bel.\nl.3 \\newlabel{sec:a}{{1}\n",
                )?;
                return Ok(Self::result(request, InvocationStatus::Failed));
            }
            _ => {}
        }

        let source = fs::read_to_string(&request.source).map_err(|e| io_error(&request.source, e))?;
        let scan = SourceScan::from_source(&source);

        let cited = entries(&source, "cite[a-z]*");
        let previous_aux = fs::read_to_string(layout.aux(job)).unwrap_or_default();
        let known = entries(&previous_aux, "bibcite");
        let undefined: Vec<&String> = cited.iter().filter(|k| !known.contains(k)).collect();
        let bbl = fs::read_to_string(bbl_path(request)).unwrap_or_default();

        let mut aux = String::from("\\relax\n");
        for key in &cited {
            aux.push_str(&format!("\\citation{{{}}}\n", key));
        }
        for label in &scan.labels {
            aux.push_str(&format!("\\newlabel{{{}}}{{{{1}}{{1}}}}\n", label));
        }
        if request.config.include_bibliography() {
            aux.push_str("\\bibdata{refs}\n");
        }
        for (n, key) in entries(&bbl, "bibitem").iter().enumerate() {
            aux.push_str(&format!("\\bibcite{{{}}}{{{}}}\n", key, n + 1));
        }
        write(&layout.aux(job), &aux)?;

        let mut log = format!("This is FakeTeX, job {}\n", job);
        for line in source.lines() {
            if let Some(injected) = line.strip_prefix("%log ") {
                log.push_str(injected);
                log.push('\n');
            }
        }
        for key in &undefined {
            log.push_str(&format!(
                "LaTeX Warning: Citation `{}' on page 1 undefined on input line 2.\n",
                key
            ));
        }
        log.push_str(&format!("Output written on {}.pdf (1 page).\n", job));
        write(&layout.log(job), &log)?;

        let artifact = format!(
            "%PDF-fake\n{}\n{}\n{}\ncited {}/{}\n",
            job,
            request.config,
            scan.labels.len(),
            cited.len() - undefined.len(),
            cited.len()
        );
        write(&layout.intermediate_artifact(job), &artifact)?;

        Ok(Self::result(request, InvocationStatus::Success))
    }

    async fn process_bibliography(
        &self,
        request: &CompileRequest,
    ) -> Result<Option<CompilerInvocationResult>, CompilerError> {
        let job = request.job_name.as_str();
        self.bibliography_runs.lock().unwrap().push(job.to_string());

        let layout = &request.layout;
        let aux = fs::read_to_string(layout.aux(job)).map_err(|e| io_error(&layout.aux(job), e))?;
        let mut bbl = String::from("\\begin{thebibliography}{1}\n");
        for key in entries(&aux, "citation") {
            bbl.push_str(&format!("\\bibitem{{{}}} Entry.\n", key));
        }
        bbl.push_str("\\end{thebibliography}\n");
        write(&bbl_path(request), &bbl)?;
        write(
            &layout.bibliography_log(job),
            "This is FakeBibTeX\nDatabase file #1: refs.bib\n",
        )?;
        let mut result = Self::result(request, InvocationStatus::Success);
        result.log_path = layout.bibliography_log(job);
        Ok(Some(result))
    }

    fn describe(&self, request: &CompileRequest) -> Invocation {
        Invocation {
            program: "faketex".to_string(),
            args: vec![request.source.display().to_string()],
            cwd: request.project_root.clone(),
            env: Vec::new(),
        }
    }

    fn name(&self) -> &str {
        "faketex"
    }
}

/// Records every progress event
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
