//! Output formatting for multiple formats
//!
//! Build reports, plans and cleanup summaries render as JSON, YAML, or
//! human-readable text.
//!
//! # Example
//!
//! ```ignore
//! use passbuild::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! let output = formatter.format_report(&report)?;
//! println!("{}", output);
//! ```

use anyhow::{Context, Result};

use crate::build::{BuildReport, PlanReport};
use crate::cleanup::CleanupSummary;
use crate::diagnostics::{Finding, Severity};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of a build
    pub fn format_report(&self, report: &BuildReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize build report to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize build report to YAML")
            }
            OutputFormat::Human => Ok(self.format_report_human(report)),
        }
    }

    /// Formats a document listing or dry-run plan
    pub fn format_plan(&self, plan: &PlanReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(plan).context("Failed to serialize plan to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(plan).context("Failed to serialize plan to YAML")
            }
            OutputFormat::Human => Ok(self.format_plan_human(plan)),
        }
    }

    pub fn format_cleanup(&self, summary: &CleanupSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary)
                .context("Failed to serialize cleanup summary to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(summary)
                .context("Failed to serialize cleanup summary to YAML"),
            OutputFormat::Human => {
                let mut output = format!("Removed {} file(s)\n", summary.removed.len());
                for path in &summary.removed {
                    output.push_str(&format!("  - {}\n", path.display()));
                }
                Ok(output)
            }
        }
    }

    fn format_report_human(&self, report: &BuildReport) -> String {
        let mut output = String::new();

        if report.is_success() {
            output.push_str("\u{2713} Build Result\n");
        } else if report.aborted {
            output.push_str("\u{2717} Build Result (Aborted)\n");
        } else {
            output.push_str("\u{2717} Build Result (Failed)\n");
        }
        output.push_str(RULE);
        output.push_str("\n\n");

        if report.is_empty() {
            output.push_str("Nothing to build\n");
            return output;
        }

        output.push_str(&Self::document_lines(report));
        output.push('\n');

        match report.verdict {
            Some(verdict) => output.push_str(&format!(
                "Passes: {} ({})\n",
                report.passes.len(),
                verdict
            )),
            None => output.push_str("Passes: 0\n"),
        }

        let findings: Vec<&Finding> = report.findings().collect();
        if !findings.is_empty() {
            output.push_str("\nFindings:\n");
            for severity in [Severity::Fatal, Severity::Warning, Severity::Benign] {
                for finding in findings.iter().filter(|f| f.severity == severity) {
                    output.push_str(&format!("  {}\n", finding));
                    if let Some(context) = &finding.context {
                        for line in context.lines() {
                            output.push_str(&format!("      | {}\n", line));
                        }
                    }
                    if finding.is_fatal() {
                        output.push_str(&format!("    hint: {}\n", finding.remediation));
                    }
                }
            }
        }

        output.push_str(&format!(
            "\n{}\nProcessed in {}ms\n",
            report.summary_line(),
            report.duration_ms
        ));
        output
    }

    /// Condensed text for `--quiet` builds
    ///
    /// Returns `None` unless some document carries a warning; warnings are
    /// shown whatever the verbosity.
    pub fn format_quiet_summary(&self, report: &BuildReport) -> Option<String> {
        let warnings: Vec<&Finding> = report
            .findings()
            .filter(|f| f.severity == Severity::Warning)
            .collect();
        if warnings.is_empty() {
            return None;
        }

        let mut output = Self::document_lines(report);
        output.push_str("\nWarnings:\n");
        for finding in warnings {
            output.push_str(&format!("  {}\n", finding));
        }
        output.push_str(&format!("\n{}\n", report.summary_line()));
        Some(output)
    }

    fn document_lines(report: &BuildReport) -> String {
        let width = report
            .documents
            .iter()
            .map(|d| d.job_name.len())
            .max()
            .unwrap_or(0);
        let mut output = String::new();
        for doc in &report.documents {
            let mut line = format!(
                "{:<width$}  {:<12}  {}",
                doc.job_name,
                doc.status.to_string(),
                doc.variant,
                width = width
            );
            if let Some(artifact) = &doc.artifact {
                line.push_str(&format!("  \u{2192} {}", artifact.display()));
            }
            output.push_str(&line);
            output.push('\n');
        }
        output
    }

    fn format_plan_human(&self, plan: &PlanReport) -> String {
        let mut output = String::new();

        output.push_str(&format!("Build Plan for {}\n", plan.root.display()));
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!("Aux dir:     {}\n", plan.aux_dir.display()));
        output.push_str(&format!("Output dir:  {}\n", plan.output_dir.display()));
        output.push_str(&format!(
            "Passes:      {}..={}\n\n",
            plan.policy.min_passes, plan.policy.max_passes
        ));

        for doc in &plan.documents {
            output.push_str(&format!("{} ({})\n", doc.job_name, doc.scope));
            output.push_str(&format!("\u{251C}\u{2500} Source:        {}\n", doc.path.display()));
            output.push_str(&format!("\u{251C}\u{2500} Variant:       {}\n", doc.variant));
            output.push_str(&format!(
                "\u{251C}\u{2500} Bibliography:  {} ({} citation(s))\n",
                if doc.variant.include_bibliography() {
                    "include"
                } else {
                    "omit"
                },
                doc.citation_count
            ));
            let dependencies = if doc.dependencies.is_empty() {
                "(none)".to_string()
            } else {
                doc.dependencies.join(", ")
            };
            match &doc.invocation {
                Some(invocation) => {
                    output.push_str(&format!("\u{251C}\u{2500} Depends on:    {}\n", dependencies));
                    output.push_str(&format!("\u{2514}\u{2500} Command:       {}\n", invocation));
                }
                None => {
                    output.push_str(&format!("\u{2514}\u{2500} Depends on:    {}\n", dependencies));
                }
            }
            output.push('\n');
        }

        output.push_str(&format!("{} document(s)\n", plan.documents.len()));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{DocumentPlan, DocumentReport, DocumentStatus, PassPolicy, PassVerdict};
    use crate::diagnostics::FindingKind;
    use crate::document::{DocumentScope, ResolutionState};
    use crate::variant::{BuildConfiguration, CompilationContext, LengthMode, OutputFormat as Format};
    use chrono::Utc;
    use std::path::PathBuf;

    fn variant(citations: usize) -> BuildConfiguration {
        BuildConfiguration::new(
            LengthMode::Long,
            Format::Print,
            CompilationContext::Standalone,
            citations,
        )
    }

    fn create_test_report() -> BuildReport {
        let now = Utc::now();
        BuildReport {
            root: PathBuf::from("/paper"),
            started_at: now,
            finished_at: now,
            duration_ms: 4321,
            documents: vec![
                DocumentReport {
                    job_name: "main".to_string(),
                    path: PathBuf::from("/paper/main.tex"),
                    scope: DocumentScope::Root,
                    status: DocumentStatus::Succeeded,
                    state: ResolutionState::Converged,
                    variant: variant(12),
                    attempts: 2,
                    unresolved: Vec::new(),
                    artifact: Some(PathBuf::from("/paper/main.pdf")),
                    digest: Some("ab12".to_string()),
                    findings: vec![Finding::new(
                        FindingKind::BibliographyEntryIssue,
                        "main",
                        "No database entry for \"kaplan2018\"",
                    )],
                },
                DocumentReport {
                    job_name: "irf".to_string(),
                    path: PathBuf::from("/paper/Figures/irf.tex"),
                    scope: DocumentScope::Figures,
                    status: DocumentStatus::Failed,
                    state: ResolutionState::Unresolved,
                    variant: variant(0),
                    attempts: 1,
                    unresolved: Vec::new(),
                    artifact: None,
                    digest: None,
                    findings: vec![Finding::new(
                        FindingKind::MissingInputArtifact,
                        "irf",
                        "File `irf_data.csv' not found",
                    )
                    .with_line(Some(7))],
                },
            ],
            passes: Vec::new(),
            verdict: Some(PassVerdict::Converged),
            aborted: true,
        }
    }

    #[test]
    fn test_json_format() {
        let report = create_test_report();
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_report(&report).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["documents"][0]["status"], "succeeded");
        assert_eq!(parsed["documents"][1]["findings"][0]["kind"], "MissingInputArtifact");
        assert_eq!(parsed["verdict"], "converged");
        assert_eq!(parsed["aborted"], true);
    }

    #[test]
    fn test_yaml_format() {
        let report = create_test_report();
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format_report(&report).unwrap();

        let parsed: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
        assert_eq!(parsed["documents"][1]["job_name"].as_str(), Some("irf"));
    }

    #[test]
    fn test_human_format() {
        let report = create_test_report();
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_report(&report).unwrap();

        assert!(output.contains("Build Result (Aborted)"));
        assert!(output.contains("main"));
        assert!(output.contains("success"));
        assert!(output.contains("failed"));
        assert!(output.contains("/paper/main.pdf"));
        assert!(output.contains("kaplan2018"), "non-fatal findings are always listed");
        assert!(output.contains("hint:"));
        assert!(output.contains("1/2 documents succeeded"));
        assert!(output.contains("4321ms"));

        // Fatal findings come first
        let fatal = output.find("irf_data.csv").unwrap();
        let warning = output.find("kaplan2018").unwrap();
        assert!(fatal < warning);
    }

    #[test]
    fn test_human_format_nothing_to_build() {
        let mut report = create_test_report();
        report.documents.clear();
        report.aborted = false;
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_report(&report)
            .unwrap();
        assert!(output.contains("Nothing to build"));
    }

    #[test]
    fn test_quiet_summary_lists_warnings() {
        let mut report = create_test_report();
        report.aborted = false;
        report.documents.truncate(1);

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let summary = formatter.format_quiet_summary(&report).unwrap();
        assert!(summary.contains("main"));
        assert!(summary.contains("success"));
        assert!(summary.contains("kaplan2018"));
        assert!(summary.contains("1/1 documents succeeded"));
        assert!(!summary.contains("{"), "always plain text");
    }

    #[test]
    fn test_quiet_summary_silent_without_warnings() {
        let mut report = create_test_report();
        report.documents.truncate(1);
        report.documents[0].findings.clear();

        let formatter = OutputFormatter::new(OutputFormat::Human);
        assert!(formatter.format_quiet_summary(&report).is_none());
    }

    #[test]
    fn test_plan_format_human() {
        let plan = PlanReport {
            root: PathBuf::from("/paper"),
            aux_dir: PathBuf::from("/paper/.passbuild"),
            output_dir: PathBuf::from("/paper"),
            policy: PassPolicy::default(),
            documents: vec![DocumentPlan {
                job_name: "Appendix".to_string(),
                path: PathBuf::from("/paper/Subfiles/Appendix.tex"),
                scope: DocumentScope::Subsections,
                variant: variant(3),
                dependencies: vec!["main".to_string()],
                citation_count: 3,
                invocation: None,
            }],
        };

        let output = OutputFormatter::new(OutputFormat::Human)
            .format_plan(&plan)
            .unwrap();
        assert!(output.contains("Appendix (subsections)"));
        assert!(output.contains("Depends on:    main"));
        assert!(output.contains("include (3 citation(s))"));
        assert!(output.contains("1 document(s)"));
        assert!(!output.contains("Command:"));
    }
}
