//! Fixed-point pass control
//!
//! Tracks per-pass unresolved reference counts and decides after each pass
//! whether the document set has converged, stalled, exhausted its budget, or
//! needs another pass.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Pass budget and convergence threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassPolicy {
    pub min_passes: u32,
    pub max_passes: u32,
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            min_passes: 3,
            max_passes: 5,
        }
    }
}

impl PassPolicy {
    pub fn new(min_passes: u32, max_passes: u32) -> Self {
        let max_passes = max_passes.max(1);
        Self {
            min_passes: min_passes.clamp(1, max_passes),
            max_passes,
        }
    }

    /// A single pass, accepting whatever state it leaves
    pub fn quick() -> Self {
        Self::new(1, 1)
    }
}

/// Outcome of one pass over the document set
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassRecord {
    pub index: u32,
    pub compiled: Vec<String>,
    pub skipped: Vec<String>,
    /// Unresolved references per active document after the pass
    pub unresolved: BTreeMap<String, BTreeSet<String>>,
    /// Documents whose cross-reference state changed during the pass
    pub changed: BTreeSet<String>,
}

impl PassRecord {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn unresolved_count(&self, job_name: &str) -> usize {
        self.unresolved.get(job_name).map_or(0, BTreeSet::len)
    }

    pub fn total_unresolved(&self) -> usize {
        self.unresolved.values().map(BTreeSet::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassVerdict {
    Continue,
    Converged,
    /// No reduction in unresolved references between two passes
    Stalled,
    BudgetExhausted,
}

impl PassVerdict {
    pub fn is_final(&self) -> bool {
        !matches!(self, PassVerdict::Continue)
    }
}

impl fmt::Display for PassVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassVerdict::Continue => "continue",
            PassVerdict::Converged => "converged",
            PassVerdict::Stalled => "stalled",
            PassVerdict::BudgetExhausted => "budget exhausted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    policy: PassPolicy,
    records: Vec<PassRecord>,
}

impl ConvergenceTracker {
    pub fn new(policy: PassPolicy) -> Self {
        Self {
            policy,
            records: Vec::new(),
        }
    }

    pub fn into_records(self) -> Vec<PassRecord> {
        self.records
    }

    pub fn last(&self) -> Option<&PassRecord> {
        self.records.last()
    }

    pub fn next_index(&self) -> u32 {
        self.records.len() as u32 + 1
    }

    /// Stores a finished pass and evaluates the verdict
    pub fn record(&mut self, record: PassRecord) -> PassVerdict {
        self.records.push(record);
        self.verdict()
    }

    pub fn verdict(&self) -> PassVerdict {
        let Some(current) = self.records.last() else {
            return PassVerdict::Continue;
        };
        let n = current.index;
        let total = current.total_unresolved();
        let previous = self
            .records
            .len()
            .checked_sub(2)
            .map(|i| self.records[i].total_unresolved());

        if total == 0 && current.changed.is_empty() {
            return PassVerdict::Converged;
        }
        if total == 0 && n >= self.policy.min_passes {
            return PassVerdict::Converged;
        }
        if let Some(previous) = previous {
            if total > 0 && total >= previous {
                return PassVerdict::Stalled;
            }
        }
        if n >= self.policy.max_passes {
            return if total == 0 {
                PassVerdict::Converged
            } else {
                PassVerdict::BudgetExhausted
            };
        }
        PassVerdict::Continue
    }

    /// Whether `job_name` can sit out the next pass
    ///
    /// It must have had nothing unresolved, and neither its own state nor the
    /// state of anything it depends on may have changed in the last pass.
    pub fn can_skip<'a>(&self, job_name: &str, dependencies: impl IntoIterator<Item = &'a str>) -> bool {
        let Some(last) = self.records.last() else {
            return false;
        };
        last.unresolved.contains_key(job_name)
            && last.unresolved_count(job_name) == 0
            && !last.changed.contains(job_name)
            && dependencies.into_iter().all(|dep| !last.changed.contains(dep))
    }

    /// Per-document unresolved counts across all passes, in pass order
    pub fn history(&self, job_name: &str) -> Vec<usize> {
        self.records
            .iter()
            .filter(|r| r.unresolved.contains_key(job_name))
            .map(|r| r.unresolved_count(job_name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, unresolved: &[(&str, &[&str])], changed: &[&str]) -> PassRecord {
        PassRecord {
            index,
            compiled: unresolved.iter().map(|(d, _)| d.to_string()).collect(),
            skipped: Vec::new(),
            unresolved: unresolved
                .iter()
                .map(|(doc, refs)| {
                    (
                        doc.to_string(),
                        refs.iter().map(|r| r.to_string()).collect(),
                    )
                })
                .collect(),
            changed: changed.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_no_references_converges_in_one_pass() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::default());
        let verdict = tracker.record(record(1, &[("main", &[]), ("slides", &[])], &[]));
        assert_eq!(verdict, PassVerdict::Converged);
    }

    #[test]
    fn test_forward_reference_resolves_in_second_pass() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::default());
        assert_eq!(
            tracker.record(record(
                1,
                &[("main", &[]), ("Appendix", &["sec:model"])],
                &["main", "Appendix"]
            )),
            PassVerdict::Continue
        );
        assert_eq!(
            tracker.record(record(2, &[("main", &[]), ("Appendix", &[])], &[])),
            PassVerdict::Converged
        );
        assert_eq!(tracker.history("Appendix"), vec![1, 0]);
    }

    #[test]
    fn test_zero_unresolved_with_changing_tables_waits_for_min_passes() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::new(3, 5));
        assert_eq!(
            tracker.record(record(1, &[("main", &[])], &["main"])),
            PassVerdict::Continue
        );
        // New bibliography keys arrived, the next compile still has to read them
        assert_eq!(
            tracker.record(record(2, &[("main", &[])], &["main"])),
            PassVerdict::Continue
        );
        assert_eq!(
            tracker.record(record(3, &[("main", &[])], &["main"])),
            PassVerdict::Converged
        );
    }

    #[test]
    fn test_zero_unresolved_converges_once_tables_settle() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::new(3, 5));
        tracker.record(record(1, &[("survey", &[])], &["survey"]));
        tracker.record(record(2, &[("survey", &[])], &["survey"]));
        assert_eq!(tracker.history("survey"), vec![0, 0]);
        assert_eq!(
            tracker.record(record(3, &[("survey", &[])], &[])),
            PassVerdict::Converged
        );
    }

    #[test]
    fn test_min_passes_reached() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::new(1, 5));
        assert_eq!(
            tracker.record(record(1, &[("main", &[])], &["main"])),
            PassVerdict::Converged
        );
    }

    #[test]
    fn test_stall_detected() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::default());
        tracker.record(record(1, &[("main", &["ghost"])], &["main"]));
        assert_eq!(
            tracker.record(record(2, &[("main", &["ghost"])], &[])),
            PassVerdict::Stalled
        );
    }

    #[test]
    fn test_budget_exhausted() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::new(1, 2));
        tracker.record(record(1, &[("main", &["a", "b"])], &["main"]));
        assert_eq!(
            tracker.record(record(2, &[("main", &["b"])], &["main"])),
            PassVerdict::BudgetExhausted
        );
    }

    #[test]
    fn test_quick_policy() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::quick());
        assert_eq!(
            tracker.record(record(1, &[("main", &["a"])], &["main"])),
            PassVerdict::BudgetExhausted
        );
    }

    #[test]
    fn test_policy_is_normalized() {
        assert_eq!(PassPolicy::new(9, 4), PassPolicy::new(4, 4));
        assert_eq!(PassPolicy::new(0, 0), PassPolicy::quick());
    }

    #[test]
    fn test_skip_rule() {
        let mut tracker = ConvergenceTracker::new(PassPolicy::default());
        assert!(!tracker.can_skip("irf", []));

        tracker.record(record(
            1,
            &[("main", &[]), ("irf", &[]), ("Appendix", &["sec:model"])],
            &["main", "Appendix"],
        ));

        assert!(tracker.can_skip("irf", []));
        assert!(!tracker.can_skip("main", []), "own table changed");
        assert!(!tracker.can_skip("Appendix", ["main"]), "has unresolved references");
        assert!(!tracker.can_skip("irf", ["main"]), "a dependency changed");
        assert!(!tracker.can_skip("unknown", []));
    }
}
