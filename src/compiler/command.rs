//! Subprocess-backed compiler

use super::{
    toolchain_environment, CompileRequest, Compiler, CompilerError, CompilerInvocationResult,
    Invocation, InvocationStatus,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Runs a TeX engine (and optionally a bibliography processor) as a child process
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    bibliography_tool: Option<String>,
    timeout: Duration,
}

enum ProcessOutcome {
    Exited(Output),
    TimedOut,
}

impl CommandCompiler {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        bibliography_tool: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            bibliography_tool,
            timeout,
        }
    }

    fn environment(request: &CompileRequest) -> Vec<(String, String)> {
        toolchain_environment(
            request,
            std::env::var_os("TEXINPUTS"),
            std::env::var_os("BIBINPUTS"),
        )
    }

    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutcome, CompilerError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %invocation, "Spawning");
        let child = command.spawn().map_err(|e| CompilerError::Spawn {
            program: invocation.program.clone(),
            source: e,
        })?;

        // Dropping the future on timeout drops the child, which kills it
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutcome::Exited(output)),
            Ok(Err(e)) => Err(CompilerError::Spawn {
                program: invocation.program.clone(),
                source: e,
            }),
            Err(_) => {
                error!(
                    program = %invocation.program,
                    timeout_secs = self.timeout.as_secs(),
                    "Invocation timed out, process killed"
                );
                Ok(ProcessOutcome::TimedOut)
            }
        }
    }

    fn bibliography_invocation(&self, tool: &str, request: &CompileRequest) -> Invocation {
        Invocation {
            program: tool.to_string(),
            args: vec![request.job_name.clone()],
            cwd: request.layout.aux_dir.clone(),
            env: Self::environment(request),
        }
    }

    fn timeout_note(&self) -> Vec<u8> {
        format!(
            "\npassbuild: invocation timed out after {}s and was terminated\n",
            self.timeout.as_secs()
        )
        .into_bytes()
    }
}

async fn ensure_dir(path: &Path) -> Result<(), CompilerError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| CompilerError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn remove_stale(path: &Path) -> Result<(), CompilerError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CompilerError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

async fn write_capture(path: &Path, stdout: &[u8], stderr: &[u8]) -> Result<(), CompilerError> {
    let mut capture = Vec::with_capacity(stdout.len() + stderr.len());
    capture.extend_from_slice(stdout);
    capture.extend_from_slice(stderr);
    tokio::fs::write(path, capture)
        .await
        .map_err(|e| CompilerError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn status_of(success: bool, produced: bool) -> InvocationStatus {
    match (success, produced) {
        (true, _) => InvocationStatus::Success,
        (false, true) => InvocationStatus::SoftSuccess,
        (false, false) => InvocationStatus::Failed,
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(
        &self,
        request: &CompileRequest,
    ) -> Result<CompilerInvocationResult, CompilerError> {
        let layout = &request.layout;
        let job = request.job_name.as_str();
        let artifact = layout.intermediate_artifact(job);

        ensure_dir(&layout.aux_dir).await?;
        remove_stale(&artifact).await?;
        remove_stale(&layout.log(job)).await?;

        let invocation = self.describe(request);
        let start = Instant::now();
        let outcome = self.run(&invocation).await?;
        let elapsed = start.elapsed();

        let console_path = layout.console_log(job);
        let (exit_code, status, produced) = match outcome {
            ProcessOutcome::Exited(output) => {
                write_capture(&console_path, &output.stdout, &output.stderr).await?;
                let produced = file_exists(&artifact).await;
                let status = status_of(output.status.success(), produced);
                if status == InvocationStatus::SoftSuccess {
                    warn!(
                        document = %job,
                        exit_code = ?output.status.code(),
                        "Compiler exited with an error but produced an artifact"
                    );
                }
                (output.status.code(), status, produced)
            }
            ProcessOutcome::TimedOut => {
                write_capture(&console_path, &self.timeout_note(), &[]).await?;
                (None, InvocationStatus::TimedOut, false)
            }
        };

        debug!(
            document = %job,
            status = %status,
            elapsed_ms = elapsed.as_millis(),
            "Compile finished"
        );

        Ok(CompilerInvocationResult {
            job_name: request.job_name.clone(),
            exit_code,
            status,
            artifact: produced.then_some(artifact),
            log_path: layout.log(job),
            console_path,
            aux_path: layout.aux(job),
            elapsed,
        })
    }

    async fn process_bibliography(
        &self,
        request: &CompileRequest,
    ) -> Result<Option<CompilerInvocationResult>, CompilerError> {
        let Some(tool) = self.bibliography_tool.as_deref() else {
            return Ok(None);
        };

        let layout = &request.layout;
        let job = request.job_name.as_str();
        let blg = layout.bibliography_log(job);
        let bbl: PathBuf = layout.aux_dir.join(format!("{}.bbl", job));
        ensure_dir(&layout.aux_dir).await?;
        remove_stale(&blg).await?;
        remove_stale(&bbl).await?;

        let invocation = self.bibliography_invocation(tool, request);
        let start = Instant::now();
        let outcome = self.run(&invocation).await?;
        let elapsed = start.elapsed();
        let (exit_code, status) = match outcome {
            ProcessOutcome::Exited(output) => {
                // Tools that do not write their own log still get classified
                if !file_exists(&blg).await {
                    write_capture(&blg, &output.stdout, &output.stderr).await?;
                }
                let status = status_of(output.status.success(), file_exists(&bbl).await);
                (output.status.code(), status)
            }
            ProcessOutcome::TimedOut => {
                write_capture(&blg, &self.timeout_note(), &[]).await?;
                (None, InvocationStatus::TimedOut)
            }
        };
        let bbl_written = file_exists(&bbl).await;

        debug!(document = %job, tool, status = %status, "Bibliography processed");

        Ok(Some(CompilerInvocationResult {
            job_name: request.job_name.clone(),
            exit_code,
            status,
            artifact: bbl_written.then_some(bbl),
            log_path: blg,
            console_path: layout.console_log(job),
            aux_path: layout.aux(job),
            elapsed,
        }))
    }

    fn describe(&self, request: &CompileRequest) -> Invocation {
        let mut args = self.args.clone();
        args.push(format!("-jobname={}", request.job_name));
        args.push(format!(
            "-output-directory={}",
            request.layout.aux_dir.display()
        ));
        args.push(request.source.display().to_string());

        Invocation {
            program: self.program.clone(),
            args,
            cwd: request.source_dir().to_path_buf(),
            env: Self::environment(request),
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ArtifactLayout;
    use crate::diagnostics::DiagnosticClassifier;
    use crate::fs::RealFileSystem;
    use crate::variant::{BuildConfiguration, CompilationContext, LengthMode, OutputFormat};
    use std::fs;
    use tempfile::TempDir;

    fn request_in(dir: &TempDir) -> CompileRequest {
        let root = dir.path().to_path_buf();
        fs::write(root.join("main.tex"), "\\documentclass{article}").unwrap();
        CompileRequest {
            job_name: "main".to_string(),
            source: root.join("main.tex"),
            project_root: root.clone(),
            config: BuildConfiguration::new(
                LengthMode::Long,
                OutputFormat::Print,
                CompilationContext::Standalone,
                0,
            ),
            layout: ArtifactLayout::new(root.join(".passbuild"), root),
        }
    }

    fn shell(script: &str, timeout: Duration) -> CommandCompiler {
        // `sh -c script name args...`: the compiler arguments land in $1..$n
        CommandCompiler::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "fake-tex".to_string()],
            None,
            timeout,
        )
    }

    #[test]
    fn test_describe() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let compiler = CommandCompiler::new(
            "pdflatex",
            vec!["-interaction=nonstopmode".to_string()],
            Some("bibtex".to_string()),
            Duration::from_secs(300),
        );

        let invocation = compiler.describe(&request);
        assert_eq!(invocation.program, "pdflatex");
        assert_eq!(invocation.args[0], "-interaction=nonstopmode");
        assert_eq!(invocation.args[1], "-jobname=main");
        assert!(invocation.args[2].starts_with("-output-directory="));
        assert!(invocation.args[3].ends_with("main.tex"));
        assert_eq!(invocation.cwd, dir.path());
        assert!(invocation.env.iter().any(|(k, v)| k == "PASSBUILD_LENGTH" && v == "long"));
        assert_eq!(compiler.name(), "pdflatex");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_writes_console_capture() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let script = format!(
            r#"echo "length=$PASSBUILD_LENGTH"; touch "{}/main.pdf"; echo oops >&2"#,
            request.layout.aux_dir.display()
        );
        let compiler = shell(&script, Duration::from_secs(10));

        let result = compiler.compile(&request).await.unwrap();
        assert_eq!(result.status, InvocationStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.artifact.is_some());

        let console = fs::read_to_string(&result.console_path).unwrap();
        assert!(console.contains("length=long"));
        assert!(console.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_soft_success_when_artifact_exists() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let script = format!(
            r#"touch "{}/main.pdf"; exit 1"#,
            request.layout.aux_dir.display()
        );
        let result = shell(&script, Duration::from_secs(10))
            .compile(&request)
            .await
            .unwrap();

        assert_eq!(result.status, InvocationStatus::SoftSuccess);
        assert_eq!(result.exit_code, Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_artifact_does_not_count() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        fs::create_dir_all(&request.layout.aux_dir).unwrap();
        fs::write(request.layout.intermediate_artifact("main"), "old").unwrap();

        let result = shell("exit 1", Duration::from_secs(10))
            .compile(&request)
            .await
            .unwrap();

        assert_eq!(result.status, InvocationStatus::Failed);
        assert!(result.artifact.is_none());
        assert!(!request.layout.intermediate_artifact("main").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_from_earlier_run_is_not_classified() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        fs::create_dir_all(&request.layout.aux_dir).unwrap();
        fs::write(
            request.layout.log("main"),
            "! Undefined control sequence.\nl.3 \\oops\n",
        )
        .unwrap();

        let result = shell("exit 0", Duration::from_secs(10))
            .compile(&request)
            .await
            .unwrap();

        assert_eq!(result.status, InvocationStatus::Success);
        assert!(!result.log_path.exists());
        let findings = DiagnosticClassifier::new("hidden:")
            .classify(&RealFileSystem::new(), &result)
            .unwrap();
        assert!(findings.is_empty(), "findings: {:?}", findings);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bibliography_log_from_earlier_run_is_replaced() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        fs::create_dir_all(&request.layout.aux_dir).unwrap();
        fs::write(
            request.layout.bibliography_log("main"),
            "I couldn't open database file old.bib\n",
        )
        .unwrap();
        let compiler = CommandCompiler::new(
            "true",
            Vec::new(),
            Some("echo".to_string()),
            Duration::from_secs(5),
        );

        compiler.process_bibliography(&request).await.unwrap().unwrap();

        let blg = fs::read_to_string(request.layout.bibliography_log("main")).unwrap();
        assert_eq!(blg.trim(), "main");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);

        let start = Instant::now();
        let result = shell("sleep 30", Duration::from_millis(200))
            .compile(&request)
            .await
            .unwrap();

        assert_eq!(result.status, InvocationStatus::TimedOut);
        assert!(result.exit_code.is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
        let console = fs::read_to_string(&result.console_path).unwrap();
        assert!(console.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let compiler = CommandCompiler::new(
            "passbuild-no-such-compiler",
            Vec::new(),
            None,
            Duration::from_secs(5),
        );

        let err = compiler.compile(&request).await.unwrap_err();
        assert!(matches!(err, CompilerError::Spawn { .. }));
        assert!(err.help_message().contains("PASSBUILD_COMPILER"));
    }

    #[tokio::test]
    async fn test_no_bibliography_tool() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let result = shell("true", Duration::from_secs(5))
            .process_bibliography(&request)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bibliography_output_captured_as_log() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        fs::create_dir_all(&request.layout.aux_dir).unwrap();
        let compiler = CommandCompiler::new(
            "true",
            Vec::new(),
            Some("echo".to_string()),
            Duration::from_secs(5),
        );

        let result = compiler
            .process_bibliography(&request)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.status, InvocationStatus::Success);
        let blg = fs::read_to_string(request.layout.bibliography_log("main")).unwrap();
        assert_eq!(blg.trim(), "main");
    }
}
