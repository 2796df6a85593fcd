//! Declared dependency graph between documents
//!
//! Edges come from the static scan: a document depends on another when it
//! declares it with `\externaldocument` or references a label that only the
//! other document defines. Include directives give the parent relation used
//! for integrated-context variant inheritance.

use super::SourceDocument;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: BTreeMap<String, BTreeSet<String>>,
    parents: BTreeMap<String, String>,
}

impl DependencyGraph {
    /// Builds the graph over one work list, in discovery order
    pub fn build(documents: &[SourceDocument]) -> Self {
        let mut label_owners: BTreeMap<&str, &str> = BTreeMap::new();
        for doc in documents {
            for label in &doc.scan.labels {
                label_owners.entry(label.as_str()).or_insert(doc.job_name.as_str());
            }
        }

        let mut graph = DependencyGraph::default();
        for doc in documents {
            let mut deps: BTreeSet<String> = doc
                .scan
                .external_documents
                .iter()
                .map(|ext| ext.job_name.clone())
                .collect();

            for reference in doc.scan.external_references() {
                if let Some(owner) = label_owners.get(reference.as_str()) {
                    deps.insert(owner.to_string());
                }
            }
            deps.remove(&doc.job_name);

            if !deps.is_empty() {
                debug!(document = %doc.job_name, dependencies = ?deps, "Declared dependencies");
            }
            graph.dependencies.insert(doc.job_name.clone(), deps);
        }

        for doc in documents {
            for included in &doc.scan.includes {
                if included != &doc.job_name && graph.dependencies.contains_key(included) {
                    graph
                        .parents
                        .entry(included.clone())
                        .or_insert_with(|| doc.job_name.clone());
                }
            }
        }

        graph
    }

    /// Copies each document's dependency set onto the document
    pub fn annotate(&self, documents: &mut [SourceDocument]) {
        for doc in documents.iter_mut() {
            doc.dependencies = self
                .dependencies
                .get(&doc.job_name)
                .cloned()
                .unwrap_or_default();
        }
    }

    pub fn dependencies_of(&self, job_name: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(job_name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Documents declaring a dependency on `job_name`
    pub fn dependents_of<'a>(&'a self, job_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.dependencies
            .iter()
            .filter(move |(_, deps)| deps.contains(job_name))
            .map(|(name, _)| name.as_str())
    }

    /// The first discovered document that includes `job_name`
    pub fn parent_of(&self, job_name: &str) -> Option<&str> {
        self.parents.get(job_name).map(String::as_str)
    }

    pub fn has_cycle_through(&self, job_name: &str) -> bool {
        let mut stack: Vec<&str> = self.dependencies_of(job_name).collect();
        let mut visited = BTreeSet::new();
        while let Some(next) = stack.pop() {
            if next == job_name {
                return true;
            }
            if visited.insert(next) {
                stack.extend(self.dependencies_of(next));
            }
        }
        false
    }
}
