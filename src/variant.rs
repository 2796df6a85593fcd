//! Variant resolution
//!
//! Resolves the three conditional axes of a build (length mode, output
//! format, compilation context) into a concrete [`BuildConfiguration`] per
//! document. The configuration is a plain value: it is handed to the compiler
//! adapter and nothing downstream consults ambient state to recover it.

use crate::bibliography::BibliographyDecision;
use crate::document::{DependencyGraph, DocumentScope, SourceDocument};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthMode {
    Short,
    #[default]
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Print,
    Web,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilationContext {
    #[default]
    Standalone,
    Integrated,
}

/// How appendix material is treated by the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppendixMode {
    Render,
    LabelsOnly,
}

macro_rules! env_value_display {
    ($($ty:ty => { $($variant:path => $text:literal),+ $(,)? }),+ $(,)?) => {
        $(
            impl $ty {
                pub fn as_str(&self) -> &'static str {
                    match self {
                        $($variant => $text),+
                    }
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

env_value_display! {
    LengthMode => { LengthMode::Short => "short", LengthMode::Long => "long" },
    OutputFormat => { OutputFormat::Print => "print", OutputFormat::Web => "web" },
    CompilationContext => {
        CompilationContext::Standalone => "standalone",
        CompilationContext::Integrated => "integrated",
    },
    AppendixMode => { AppendixMode::Render => "render", AppendixMode::LabelsOnly => "labels-only" },
}

/// Rules telling the document which content to leave out of the rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuppressionRule {
    Bibliography,
    HiddenContent,
    PrintOnly,
    WebLinks,
}

impl SuppressionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionRule::Bibliography => "bibliography",
            SuppressionRule::HiddenContent => "hidden-content",
            SuppressionRule::PrintOnly => "print-only",
            SuppressionRule::WebLinks => "web-links",
        }
    }
}

/// Global, user-supplied build parameters; `None` means "not specified"
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildParameters {
    pub length: Option<LengthMode>,
    pub format: Option<OutputFormat>,
    pub context: Option<CompilationContext>,
}

/// Fully resolved configuration for compiling one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfiguration {
    pub length: LengthMode,
    pub format: OutputFormat,
    pub context: CompilationContext,
    /// Hidden structural content is processed for label extraction but not rendered
    pub process_hidden_content: bool,
    pub appendix_mode: AppendixMode,
    pub bibliography: BibliographyDecision,
    /// Job name of the document this one inherited its variant from
    pub parent: Option<String>,
}

impl BuildConfiguration {
    pub fn new(
        length: LengthMode,
        format: OutputFormat,
        context: CompilationContext,
        citation_count: usize,
    ) -> Self {
        let process_hidden_content = length == LengthMode::Short;
        Self {
            length,
            format,
            context,
            process_hidden_content,
            appendix_mode: if process_hidden_content {
                AppendixMode::LabelsOnly
            } else {
                AppendixMode::Render
            },
            bibliography: BibliographyDecision::decide(citation_count, context),
            parent: None,
        }
    }

    pub fn include_bibliography(&self) -> bool {
        self.bibliography.include
    }

    pub fn suppression_rules(&self) -> Vec<SuppressionRule> {
        let mut rules = Vec::new();
        if !self.bibliography.include {
            rules.push(SuppressionRule::Bibliography);
        }
        if self.process_hidden_content {
            rules.push(SuppressionRule::HiddenContent);
        }
        rules.push(match self.format {
            OutputFormat::Web => SuppressionRule::PrintOnly,
            OutputFormat::Print => SuppressionRule::WebLinks,
        });
        rules
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.length, self.format, self.context)?;
        if self.bibliography.include {
            write!(f, " +bib")?;
        }
        if let Some(parent) = &self.parent {
            write!(f, " (from {})", parent)?;
        }
        Ok(())
    }
}

/// Resolves every document of a work list against the global parameters
pub struct VariantResolver<'a> {
    params: BuildParameters,
    graph: &'a DependencyGraph,
}

impl<'a> VariantResolver<'a> {
    pub fn new(params: BuildParameters, graph: &'a DependencyGraph) -> Self {
        Self { params, graph }
    }

    fn effective_context(&self, doc: &SourceDocument) -> CompilationContext {
        if let Some(context) = self.params.context {
            return context;
        }
        match doc.scope {
            DocumentScope::Root => CompilationContext::Standalone,
            _ if self.graph.parent_of(&doc.job_name).is_some() => CompilationContext::Integrated,
            _ => CompilationContext::Standalone,
        }
    }

    fn standalone_values(&self) -> (LengthMode, OutputFormat) {
        (
            self.params.length.unwrap_or_default(),
            self.params.format.unwrap_or_default(),
        )
    }

    /// Resolves a whole work list, parents before the documents inheriting from them
    pub fn resolve_all(&self, documents: &[SourceDocument]) -> HashMap<String, BuildConfiguration> {
        let by_name: HashMap<&str, &SourceDocument> = documents
            .iter()
            .map(|d| (d.job_name.as_str(), d))
            .collect();

        let mut resolved = HashMap::new();
        for doc in documents {
            self.resolve_into(doc, &by_name, &mut resolved, 0);
        }
        resolved
    }

    fn resolve_into(
        &self,
        doc: &SourceDocument,
        by_name: &HashMap<&str, &SourceDocument>,
        resolved: &mut HashMap<String, BuildConfiguration>,
        depth: usize,
    ) -> BuildConfiguration {
        if let Some(config) = resolved.get(&doc.job_name) {
            return config.clone();
        }

        let context = self.effective_context(doc);
        let (mut length, mut format) = self.standalone_values();
        let mut parent_name = None;

        if context == CompilationContext::Integrated {
            let parent = self
                .graph
                .parent_of(&doc.job_name)
                .and_then(|name| by_name.get(name).copied());
            // Include cycles fall back to the global values
            if let Some(parent) = parent.filter(|_| depth < by_name.len()) {
                let inherited = self.resolve_into(parent, by_name, resolved, depth + 1);
                length = inherited.length;
                format = inherited.format;
                parent_name = Some(parent.job_name.clone());
            }
        }

        let mut config = BuildConfiguration::new(length, format, context, doc.citation_count);
        config.parent = parent_name;
        debug!(document = %doc.job_name, variant = %config, "Resolved variant");

        resolved.insert(doc.job_name.clone(), config.clone());
        config
    }
}
