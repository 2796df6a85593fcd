//! Static scan of document sources
//!
//! Extracts the cross-reference structure of a source file without running the
//! compiler: label definitions, label references, external-document
//! declarations and include directives. Commented-out text is ignored.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\label\s*\{([^}]+)\}").unwrap())
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\(?:ref|eqref|pageref|autoref|nameref|vref|cref|Cref|cpageref|Cpageref)\*?\s*\{([^}]+)\}")
            .unwrap()
    })
}

fn external_document_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\externaldocument\s*(?:\[([^\]]*)\])?\s*\{([^}]+)\}").unwrap()
    })
}

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\(?:input|include|subfile|subfileinclude)\s*\{([^}]+)\}").unwrap()
    })
}

fn document_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\documentclass\s*[\[{]").unwrap())
}

/// An `\externaldocument[prefix]{name}` declaration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ExternalDocument {
    pub job_name: String,
    pub prefix: Option<String>,
}

impl ExternalDocument {
    /// Maps a local reference to the label it names in the external document
    pub fn local_to_external<'a>(&self, reference: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(prefix) => reference.strip_prefix(prefix.as_str()),
            None => Some(reference),
        }
    }
}

/// Cross-reference structure of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceScan {
    pub has_document_class: bool,
    pub labels: BTreeSet<String>,
    pub references: BTreeSet<String>,
    pub external_documents: BTreeSet<ExternalDocument>,
    /// Job names of included files
    pub includes: BTreeSet<String>,
}

impl SourceScan {
    pub fn from_source(source: &str) -> Self {
        let text = strip_comments(source);
        let mut scan = SourceScan {
            has_document_class: document_class_re().is_match(&text),
            ..Default::default()
        };

        for cap in label_re().captures_iter(&text) {
            scan.labels.insert(cap[1].trim().to_string());
        }

        for cap in reference_re().captures_iter(&text) {
            // \cref and friends accept comma-separated lists
            for key in cap[1].split(',').map(str::trim).filter(|k| !k.is_empty()) {
                scan.references.insert(key.to_string());
            }
        }

        for cap in external_document_re().captures_iter(&text) {
            let prefix = cap
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .filter(|p| !p.is_empty());
            scan.external_documents.insert(ExternalDocument {
                job_name: job_name_of(cap[2].trim()),
                prefix,
            });
        }

        for cap in include_re().captures_iter(&text) {
            scan.includes.insert(job_name_of(cap[1].trim()));
        }

        scan
    }

    /// References that no label in this source satisfies
    pub fn external_references(&self) -> impl Iterator<Item = &String> {
        self.references
            .iter()
            .filter(|r| !self.labels.contains(r.as_str()))
    }
}

/// Job name (file stem) of a path as written in a directive
pub fn job_name_of(raw: &str) -> String {
    let path = Path::new(raw);
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Removes TeX comments: everything after an unescaped `%` on a line
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        out.push_str(strip_line_comment(line));
        out.push('\n');
    }
    out
}

fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut backslashes = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'%' && backslashes % 2 == 0 {
            return &line[..i];
        }
        if b == b'\\' {
            backslashes += 1;
        } else {
            backslashes = 0;
        }
    }
    line
}
