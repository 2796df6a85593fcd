//! Configuration management for passbuild
//!
//! Settings are loaded once from environment variables with sensible defaults,
//! then overridden by command-line flags. The resulting [`PassbuildConfig`] is
//! passed explicitly to every component; nothing downstream reads the
//! environment on its own.
//!
//! # Environment Variables
//!
//! - `PASSBUILD_COMPILER`: Compiler program - default: "pdflatex"
//! - `PASSBUILD_COMPILER_ARGS`: Whitespace-separated compiler arguments -
//!   default: "-interaction=nonstopmode -file-line-error"
//! - `PASSBUILD_BIBTOOL`: Bibliography processor, or "none" - default: "bibtex"
//! - `PASSBUILD_TIMEOUT`: Per-invocation timeout in seconds - default: "300"
//! - `PASSBUILD_MIN_PASSES`: Minimum passes before a zero-unresolved state is
//!   accepted - default: "3"
//! - `PASSBUILD_MAX_PASSES`: Pass budget - default: "5"
//! - `PASSBUILD_MAX_ATTEMPTS`: Compile attempts per document including
//!   retries - default: "3"
//! - `PASSBUILD_JOBS`: Concurrent compilations within a pass - default: "1"
//! - `PASSBUILD_AUX_DIR`: Shared auxiliary-state directory - default: ".passbuild"
//! - `PASSBUILD_OUTPUT_DIR`: Rendered artifact directory - default: project root
//! - `PASSBUILD_FIGURES_DIR` / `PASSBUILD_TABLES_DIR` / `PASSBUILD_SUBSECTIONS_DIR`:
//!   Auxiliary scope directories - defaults: "Figures", "Tables", "Subfiles"
//! - `PASSBUILD_CITATION_MARKERS`: Comma-separated citation directives
//! - `PASSBUILD_HIDDEN_PREFIX`: Label prefix of hidden structural content -
//!   default: "hidden:"
//! - `PASSBUILD_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use passbuild::PassbuildConfig;
//!
//! let config = PassbuildConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config);
//! ```

use crate::bibliography::DEFAULT_CITATION_MARKERS;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_COMPILER: &str = "pdflatex";
const DEFAULT_COMPILER_ARGS: &str = "-interaction=nonstopmode -file-line-error";
const DEFAULT_BIBLIOGRAPHY_TOOL: &str = "bibtex";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MIN_PASSES: u32 = 3;
const DEFAULT_MAX_PASSES: u32 = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_JOBS: usize = 1;
const DEFAULT_AUX_DIR: &str = ".passbuild";
const DEFAULT_FIGURES_DIR: &str = "Figures";
const DEFAULT_TABLES_DIR: &str = "Tables";
const DEFAULT_SUBSECTIONS_DIR: &str = "Subfiles";
const DEFAULT_HIDDEN_PREFIX: &str = "hidden:";
const DEFAULT_LOG_LEVEL: &str = "info";

const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_PASS_BUDGET: u32 = 20;
const MAX_JOBS: usize = 64;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Main configuration structure for passbuild
#[derive(Debug, Clone)]
pub struct PassbuildConfig {
    /// Compiler program invoked once per document per pass
    pub compiler: String,

    /// Arguments placed before the job name, output directory and source
    pub compiler_args: Vec<String>,

    /// Bibliography processor run after the first pass, `None` to disable
    pub bibliography_tool: Option<String>,

    /// Wall-clock limit for a single invocation
    pub timeout_secs: u64,

    /// Passes required before a zero-unresolved state is accepted while
    /// label tables are still changing
    pub min_passes: u32,

    /// Pass budget for the fixed-point iteration
    pub max_passes: u32,

    /// Compile attempts per document, retries included
    pub max_attempts: u32,

    /// Concurrent compilations within one pass
    pub jobs: usize,

    /// Shared auxiliary-state directory, relative to the project root unless absolute
    pub aux_dir: PathBuf,

    /// Rendered artifact directory, the project root when unset
    pub output_dir: Option<PathBuf>,

    pub figures_dir: PathBuf,
    pub tables_dir: PathBuf,
    pub subsections_dir: PathBuf,

    /// Control words counted as citation directives
    pub citation_markers: Vec<String>,

    /// Labels with this prefix belong to hidden structural content
    pub hidden_label_prefix: String,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Environment values that failed to parse, reported by `validate`
    env_errors: Vec<(String, String)>,
}

impl Default for PassbuildConfig {
    /// Loads configuration from `PASSBUILD_*` environment variables with defaults
    fn default() -> Self {
        let mut env_errors = Vec::new();
        let compiler = env::var("PASSBUILD_COMPILER")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COMPILER.to_string());

        let compiler_args = env::var("PASSBUILD_COMPILER_ARGS")
            .unwrap_or_else(|_| DEFAULT_COMPILER_ARGS.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let bibliography_tool =
            match env::var("PASSBUILD_BIBTOOL").unwrap_or_else(|_| DEFAULT_BIBLIOGRAPHY_TOOL.into()) {
                tool if tool.trim().is_empty() || tool.eq_ignore_ascii_case("none") => None,
                tool => Some(tool),
            };

        let timeout_secs = env_parsed("PASSBUILD_TIMEOUT", &mut env_errors).unwrap_or(DEFAULT_TIMEOUT_SECS);
        let min_passes = env_parsed("PASSBUILD_MIN_PASSES", &mut env_errors).unwrap_or(DEFAULT_MIN_PASSES);
        let max_passes = env_parsed("PASSBUILD_MAX_PASSES", &mut env_errors).unwrap_or(DEFAULT_MAX_PASSES);
        let max_attempts = env_parsed("PASSBUILD_MAX_ATTEMPTS", &mut env_errors).unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let jobs = env_parsed("PASSBUILD_JOBS", &mut env_errors).unwrap_or(DEFAULT_JOBS);

        let aux_dir = env::var("PASSBUILD_AUX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_AUX_DIR));
        let output_dir = env::var("PASSBUILD_OUTPUT_DIR").ok().map(PathBuf::from);

        let figures_dir = env_path("PASSBUILD_FIGURES_DIR", DEFAULT_FIGURES_DIR);
        let tables_dir = env_path("PASSBUILD_TABLES_DIR", DEFAULT_TABLES_DIR);
        let subsections_dir = env_path("PASSBUILD_SUBSECTIONS_DIR", DEFAULT_SUBSECTIONS_DIR);

        let citation_markers = env::var("PASSBUILD_CITATION_MARKERS")
            .ok()
            .map(|v| parse_markers(&v))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_CITATION_MARKERS
                    .iter()
                    .map(|m| m.to_string())
                    .collect()
            });

        let hidden_label_prefix = env::var("PASSBUILD_HIDDEN_PREFIX")
            .unwrap_or_else(|_| DEFAULT_HIDDEN_PREFIX.to_string());

        let log_level = env::var("PASSBUILD_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            compiler,
            compiler_args,
            bibliography_tool,
            timeout_secs,
            min_passes,
            max_passes,
            max_attempts,
            jobs,
            aux_dir,
            output_dir,
            figures_dir,
            tables_dir,
            subsections_dir,
            citation_markers,
            hidden_label_prefix,
            log_level,
            env_errors,
        }
    }
}

/// Reads and parses `key`; a malformed value is recorded and the default applies
fn env_parsed<T>(key: &str, errors: &mut Vec<(String, String)>) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push((key.to_string(), format!("'{}' ({})", raw, e)));
            None
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Parses a comma-separated marker list, adding the leading backslash when omitted
pub fn parse_markers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| {
            if m.starts_with('\\') {
                m.to_string()
            } else {
                format!("\\{}", m)
            }
        })
        .collect()
}

impl PassbuildConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` if a numeric environment value was
    /// malformed, `ConfigError::ValidationFailed` if any value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((field, error)) = self.env_errors.first() {
            return Err(ConfigError::ParseError {
                field: field.clone(),
                error: error.clone(),
            });
        }

        if self.compiler.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Compiler program must not be empty".to_string(),
            ));
        }

        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(format!(
                "Timeout must be between 1 and {} seconds, got {}",
                MAX_TIMEOUT_SECS, self.timeout_secs
            )));
        }

        if self.max_passes == 0 || self.max_passes > MAX_PASS_BUDGET {
            return Err(ConfigError::ValidationFailed(format!(
                "Max passes must be between 1 and {}, got {}",
                MAX_PASS_BUDGET, self.max_passes
            )));
        }

        if self.min_passes == 0 || self.min_passes > self.max_passes {
            return Err(ConfigError::ValidationFailed(format!(
                "Min passes must be between 1 and max passes ({}), got {}",
                self.max_passes, self.min_passes
            )));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max attempts must be at least 1".to_string(),
            ));
        }

        if self.jobs == 0 || self.jobs > MAX_JOBS {
            return Err(ConfigError::ValidationFailed(format!(
                "Jobs must be between 1 and {}, got {}",
                MAX_JOBS, self.jobs
            )));
        }

        if self.citation_markers.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "At least one citation marker is required".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Shared auxiliary-state directory for a project root
    pub fn aux_dir_for(&self, root: &Path) -> PathBuf {
        resolve_under(root, &self.aux_dir)
    }

    /// Rendered artifact directory for a project root
    pub fn output_dir_for(&self, root: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => resolve_under(root, dir),
            None => root.to_path_buf(),
        }
    }
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

impl fmt::Display for PassbuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Passbuild Configuration:")?;
        writeln!(
            f,
            "  Compiler: {} {}",
            self.compiler,
            self.compiler_args.join(" ")
        )?;
        writeln!(
            f,
            "  Bibliography Tool: {}",
            self.bibliography_tool.as_deref().unwrap_or("none")
        )?;
        writeln!(f, "  Timeout: {}s", self.timeout_secs)?;
        writeln!(f, "  Passes: {}..={}", self.min_passes, self.max_passes)?;
        writeln!(f, "  Max Attempts: {}", self.max_attempts)?;
        writeln!(f, "  Jobs: {}", self.jobs)?;
        writeln!(f, "  Aux Dir: {}", self.aux_dir.display())?;
        if let Some(ref dir) = self.output_dir {
            writeln!(f, "  Output Dir: {}", dir.display())?;
        }
        writeln!(
            f,
            "  Scope Dirs: {}, {}, {}",
            self.figures_dir.display(),
            self.tables_dir.display(),
            self.subsections_dir.display()
        )?;
        writeln!(f, "  Citation Markers: {}", self.citation_markers.len())?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::set("PASSBUILD_COMPILER", DEFAULT_COMPILER),
            EnvGuard::set("PASSBUILD_TIMEOUT", "300"),
            EnvGuard::set("PASSBUILD_LOG_LEVEL", DEFAULT_LOG_LEVEL),
        ];

        let config = PassbuildConfig::default();

        assert_eq!(config.compiler, DEFAULT_COMPILER);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("PASSBUILD_COMPILER", "lualatex"),
            EnvGuard::set("PASSBUILD_COMPILER_ARGS", "-interaction=batchmode  -shell-escape"),
            EnvGuard::set("PASSBUILD_BIBTOOL", "none"),
            EnvGuard::set("PASSBUILD_TIMEOUT", "60"),
            EnvGuard::set("PASSBUILD_MIN_PASSES", "2"),
            EnvGuard::set("PASSBUILD_MAX_PASSES", "4"),
            EnvGuard::set("PASSBUILD_JOBS", "3"),
            EnvGuard::set("PASSBUILD_AUX_DIR", "build/aux"),
            EnvGuard::set("PASSBUILD_CITATION_MARKERS", "cite, \\citep"),
            EnvGuard::set("PASSBUILD_LOG_LEVEL", "DEBUG"),
        ];

        let config = PassbuildConfig::default();

        assert_eq!(config.compiler, "lualatex");
        assert_eq!(
            config.compiler_args,
            vec!["-interaction=batchmode", "-shell-escape"]
        );
        assert!(config.bibliography_tool.is_none());
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.min_passes, 2);
        assert_eq!(config.max_passes, 4);
        assert_eq!(config.jobs, 3);
        assert_eq!(config.aux_dir, PathBuf::from("build/aux"));
        assert_eq!(config.citation_markers, vec!["\\cite", "\\citep"]);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_unparseable_numbers_are_rejected() {
        let _guards = vec![
            EnvGuard::set("PASSBUILD_LOG_LEVEL", "info"),
            EnvGuard::set("PASSBUILD_TIMEOUT", "300"),
            EnvGuard::set("PASSBUILD_MAX_PASSES", "ten"),
        ];

        let config = PassbuildConfig::default();
        assert_eq!(config.max_passes, DEFAULT_MAX_PASSES);

        match config.validate() {
            Err(ConfigError::ParseError { field, error }) => {
                assert_eq!(field, "PASSBUILD_MAX_PASSES");
                assert!(error.contains("ten"));
            }
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_negative_count_is_a_parse_error() {
        let _guards = vec![
            EnvGuard::set("PASSBUILD_LOG_LEVEL", "info"),
            EnvGuard::set("PASSBUILD_TIMEOUT", "300"),
            EnvGuard::set("PASSBUILD_JOBS", "-1"),
        ];

        let err = PassbuildConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("PASSBUILD_JOBS"));
    }

    #[test]
    #[serial]
    fn test_validation_rejects_bad_ranges() {
        let mut config = PassbuildConfig::default();
        config.log_level = "info".to_string();
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.timeout_secs = 0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.min_passes = 6;
        bad.max_passes = 5;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.jobs = 0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.log_level = "loud".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config;
        bad.citation_markers.clear();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_parse_markers() {
        assert_eq!(
            parse_markers("cite,\\nocite,, textcite "),
            vec!["\\cite", "\\nocite", "\\textcite"]
        );
        assert!(parse_markers(" , ").is_empty());
    }

    #[test]
    #[serial]
    fn test_directories_resolve_under_root() {
        let mut config = PassbuildConfig::default();
        config.aux_dir = PathBuf::from(".passbuild");
        config.output_dir = None;

        let root = Path::new("/paper");
        assert_eq!(config.aux_dir_for(root), PathBuf::from("/paper/.passbuild"));
        assert_eq!(config.output_dir_for(root), PathBuf::from("/paper"));

        config.output_dir = Some(PathBuf::from("/tmp/out"));
        assert_eq!(config.output_dir_for(root), PathBuf::from("/tmp/out"));
    }

    #[test]
    #[serial]
    fn test_config_display() {
        let config = PassbuildConfig::default();
        let display = format!("{}", config);
        assert!(display.contains("Passbuild Configuration:"));
        assert!(display.contains("Compiler:"));
    }
}
