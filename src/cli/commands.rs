use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::PassbuildConfig;
use crate::document::ScopeSelector;
use crate::variant::{BuildParameters, CompilationContext, LengthMode, OutputFormat};

/// Multi-pass document build orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "passbuild",
    about = "Multi-pass document build orchestrator",
    version,
    author,
    long_about = "passbuild compiles a set of interdependent documents (a main paper, \
                  standalone sub-documents, figure and table fragments) with an external \
                  compiler, iterating passes until cross-references reach a fixed point. \
                  It classifies compiler diagnostics, decides per document whether a \
                  reference list is emitted, and cleans up transient state."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Verbose output (debug logging)")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build documents until cross-references converge",
        long_about = "Discovers the documents in scope, resolves their variants and compiles \
                      them pass by pass until cross-references converge or the pass budget \
                      runs out. Exits 0 iff no document ends with a fatal finding.\n\n\
                      Examples:\n  \
                      passbuild build\n  \
                      passbuild build --scope all --length short --format web\n  \
                      passbuild build --single Figures/irf.tex --quick\n  \
                      passbuild build --dry-run --report json"
    )]
    Build(BuildArgs),

    #[command(
        about = "List documents, variants and dependencies",
        long_about = "Shows the discovered work list with each document's resolved variant, \
                      bibliography decision and declared dependencies, without compiling.\n\n\
                      Examples:\n  \
                      passbuild list\n  \
                      passbuild list --scope all --report yaml"
    )]
    List(ListArgs),

    #[command(
        about = "Remove transient build state",
        long_about = "Removes logs, auxiliary state and intermediate artifacts of every \
                      document in scope, plus the aggregate finding log. Rendered artifacts \
                      in the output directory are kept.\n\n\
                      Examples:\n  \
                      passbuild clean\n  \
                      passbuild clean --scope all"
    )]
    Clean(CleanArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "ROOT", help = "Project root (defaults to current directory)")]
    pub root: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "root", help = "Documents to build")]
    pub scope: ScopeArg,

    #[arg(long, value_enum, help = "Length mode (default: long)")]
    pub length: Option<LengthArg>,

    #[arg(long, value_enum, help = "Output format (default: print)")]
    pub format: Option<FormatArg>,

    #[arg(long, value_enum, help = "Compilation context (default: derived per document)")]
    pub context: Option<ContextArg>,

    #[arg(long, help = "Remove all transient state before building")]
    pub clean: bool,

    #[arg(long, conflicts_with_all = ["max_passes", "min_passes"], help = "Single pass, accept whatever state it leaves")]
    pub quick: bool,

    #[arg(long, help = "Print the planned invocations without running them")]
    pub dry_run: bool,

    #[arg(long, value_name = "DOCUMENT", help = "Build only this document")]
    pub single: Option<PathBuf>,

    #[arg(long, value_name = "N", help = "Pass budget (default: 5)")]
    pub max_passes: Option<u32>,

    #[arg(long, value_name = "N", help = "Passes required while label tables still change (default: 3)")]
    pub min_passes: Option<u32>,

    #[arg(long, value_name = "SECONDS", help = "Per-invocation timeout (default: 300)")]
    pub timeout: Option<u64>,

    #[arg(short = 'j', long, value_name = "N", help = "Concurrent compilations per pass (default: 1)")]
    pub jobs: Option<usize>,

    #[arg(long, help = "Prompt for retry/skip/abort after fatal findings")]
    pub interactive: bool,

    #[arg(long, help = "Keep logs and auxiliary state after the build")]
    pub keep_intermediates: bool,

    #[arg(long, value_enum, default_value = "human", help = "Report format")]
    pub report: ReportFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the report to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

impl BuildArgs {
    pub fn parameters(&self) -> BuildParameters {
        BuildParameters {
            length: self.length.map(Into::into),
            format: self.format.map(Into::into),
            context: self.context.map(Into::into),
        }
    }

    /// Layers the command-line overrides over the loaded configuration
    pub fn apply_to(&self, config: &mut PassbuildConfig) {
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.quick {
            config.min_passes = 1;
            config.max_passes = 1;
            return;
        }
        if let Some(max_passes) = self.max_passes {
            config.max_passes = max_passes;
            config.min_passes = config.min_passes.min(max_passes);
        }
        if let Some(min_passes) = self.min_passes {
            config.min_passes = min_passes;
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    #[arg(value_name = "ROOT", help = "Project root (defaults to current directory)")]
    pub root: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "all", help = "Documents to list")]
    pub scope: ScopeArg,

    #[arg(long, value_enum, help = "Length mode used for variant resolution")]
    pub length: Option<LengthArg>,

    #[arg(long, value_enum, help = "Output format used for variant resolution")]
    pub format: Option<FormatArg>,

    #[arg(long, value_enum, help = "Compilation context used for variant resolution")]
    pub context: Option<ContextArg>,

    #[arg(long, value_enum, default_value = "human", help = "Report format")]
    pub report: ReportFormatArg,
}

impl ListArgs {
    pub fn parameters(&self) -> BuildParameters {
        BuildParameters {
            length: self.length.map(Into::into),
            format: self.format.map(Into::into),
            context: self.context.map(Into::into),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CleanArgs {
    #[arg(value_name = "ROOT", help = "Project root (defaults to current directory)")]
    pub root: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "all", help = "Documents to clean")]
    pub scope: ScopeArg,

    #[arg(long, value_enum, default_value = "human", help = "Report format")]
    pub report: ReportFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeArg {
    Root,
    All,
    Figures,
    Tables,
    Subsections,
}

impl From<ScopeArg> for ScopeSelector {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Root => ScopeSelector::Root,
            ScopeArg::All => ScopeSelector::All,
            ScopeArg::Figures => ScopeSelector::Figures,
            ScopeArg::Tables => ScopeSelector::Tables,
            ScopeArg::Subsections => ScopeSelector::Subsections,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthArg {
    Short,
    Long,
}

impl From<LengthArg> for LengthMode {
    fn from(arg: LengthArg) -> Self {
        match arg {
            LengthArg::Short => LengthMode::Short,
            LengthArg::Long => LengthMode::Long,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Print,
    Web,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Print => OutputFormat::Print,
            FormatArg::Web => OutputFormat::Web,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextArg {
    Standalone,
    Integrated,
}

impl From<ContextArg> for CompilationContext {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Standalone => CompilationContext::Standalone,
            ContextArg::Integrated => CompilationContext::Integrated,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<ReportFormatArg> for super::output::OutputFormat {
    fn from(arg: ReportFormatArg) -> Self {
        match arg {
            ReportFormatArg::Json => super::output::OutputFormat::Json,
            ReportFormatArg::Yaml => super::output::OutputFormat::Yaml,
            ReportFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
