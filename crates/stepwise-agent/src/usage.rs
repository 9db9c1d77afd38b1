//! Hierarchical token usage accounting.
//!
//! A [`TokenUsage`] tree records every model call made by a run
//! (`completion`), the usage reported by each tool, and the full usage tree
//! of every nested agent the run delegated to (`children`).  The cached
//! `total` always equals the sum of the completion records plus the
//! recursively summed children, so a run's total composes correctly across
//! arbitrary delegation depth.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Totals and records
// ---------------------------------------------------------------------------

/// Summed input/output token counts.  Addition saturates at `u64::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    /// Prompt tokens.
    pub input: u64,
    /// Generated tokens.
    pub output: u64,
}

impl TokenTotals {
    /// Create totals from raw counts.
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Input plus output.
    pub fn sum(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

impl Add for TokenTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input: self.input.saturating_add(rhs.input),
            output: self.output.saturating_add(rhs.output),
        }
    }
}

impl AddAssign for TokenTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Token counts reported for a single model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The model that served the call.
    pub model_id: String,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
}

impl UsageRecord {
    /// Create a usage record.
    pub fn new(model_id: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            model_id: model_id.into(),
            input_tokens,
            output_tokens,
        }
    }

    /// This record as totals.
    pub fn totals(&self) -> TokenTotals {
        TokenTotals::new(self.input_tokens, self.output_tokens)
    }
}

fn sum_records(records: &[UsageRecord]) -> TokenTotals {
    records
        .iter()
        .fold(TokenTotals::default(), |acc, r| acc + r.totals())
}

// ---------------------------------------------------------------------------
// Child usage
// ---------------------------------------------------------------------------

/// Usage attributed to one tool or nested agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildUsage {
    /// Records reported directly by a tool.
    #[serde(default)]
    pub usage: Vec<UsageRecord>,

    /// Full usage tree of a nested agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<TokenUsage>>,
}

impl ChildUsage {
    /// Sum of the direct records and the nested tree's total.
    pub fn totals(&self) -> TokenTotals {
        let nested = self
            .details
            .as_ref()
            .map(|d| d.total())
            .unwrap_or_default();
        sum_records(&self.usage) + nested
    }

    fn merge(&mut self, other: ChildUsage) {
        self.usage.extend(other.usage);
        if let Some(theirs) = other.details {
            match self.details.as_mut() {
                Some(mine) => mine.merge(*theirs),
                None => self.details = Some(theirs),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Token usage tree
// ---------------------------------------------------------------------------

/// Hierarchical, mergeable token usage for a run and its delegations.
///
/// Fields are private so the cached total cannot drift from its parts; use
/// the mutators to record usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TokenUsageRepr")]
pub struct TokenUsage {
    total: TokenTotals,
    completion: Vec<UsageRecord>,
    children: BTreeMap<String, ChildUsage>,
}

/// Wire form; the total is recomputed on deserialization.
#[derive(Deserialize)]
struct TokenUsageRepr {
    #[serde(default)]
    completion: Vec<UsageRecord>,
    #[serde(default)]
    children: BTreeMap<String, ChildUsage>,
}

impl From<TokenUsageRepr> for TokenUsage {
    fn from(repr: TokenUsageRepr) -> Self {
        let mut usage = Self {
            total: TokenTotals::default(),
            completion: repr.completion,
            children: repr.children,
        };
        usage.total = usage.computed_total();
        usage
    }
}

impl TokenUsage {
    /// An empty usage tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached total across the whole tree.
    pub fn total(&self) -> TokenTotals {
        self.total
    }

    /// Input plus output across the whole tree.
    pub fn total_tokens(&self) -> u64 {
        self.total.sum()
    }

    /// Records for model calls made directly by this run, in call order.
    pub fn completion(&self) -> &[UsageRecord] {
        &self.completion
    }

    /// Usage attributed to tools and nested agents, keyed by name.
    pub fn children(&self) -> &BTreeMap<String, ChildUsage> {
        &self.children
    }

    /// Usage attributed to one tool or nested agent.
    pub fn child(&self, name: &str) -> Option<&ChildUsage> {
        self.children.get(name)
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.completion.is_empty() && self.children.is_empty()
    }

    /// Record one model call made by this run.
    pub fn push_completion(&mut self, record: UsageRecord) {
        self.total += record.totals();
        self.completion.push(record);
    }

    /// Shorthand for [`push_completion`](Self::push_completion).
    pub fn record(&mut self, model_id: impl Into<String>, input: u64, output: u64) {
        self.push_completion(UsageRecord::new(model_id, input, output));
    }

    /// Attribute a record to a tool.
    pub fn add_child_usage(&mut self, name: impl Into<String>, record: UsageRecord) {
        self.total += record.totals();
        self.children
            .entry(name.into())
            .or_default()
            .usage
            .push(record);
    }

    /// Fold a nested agent's usage tree under `name`.
    pub fn add_child_details(&mut self, name: impl Into<String>, details: TokenUsage) {
        self.merge_child(
            name.into(),
            ChildUsage {
                usage: Vec::new(),
                details: Some(Box::new(details)),
            },
        );
    }

    /// Merge another tree into this one.
    ///
    /// Totals are associative and commutative; list order only matters for
    /// the audit trail.
    pub fn merge(&mut self, other: TokenUsage) {
        self.total += other.total;
        self.completion.extend(other.completion);
        for (name, child) in other.children {
            self.children.entry(name).or_default().merge(child);
        }
    }

    /// Recompute the total from the parts.
    pub fn computed_total(&self) -> TokenTotals {
        let children = self
            .children
            .values()
            .fold(TokenTotals::default(), |acc, c| acc + c.totals());
        sum_records(&self.completion) + children
    }

    fn merge_child(&mut self, name: String, child: ChildUsage) {
        self.total += child.totals();
        self.children.entry(name).or_default().merge(child);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(model: &str, calls: &[(u64, u64)]) -> TokenUsage {
        let mut usage = TokenUsage::new();
        for (input, output) in calls {
            usage.record(model, *input, *output);
        }
        usage
    }


    #[test]
    fn totals_saturate_instead_of_overflowing() {
        let mut totals = TokenTotals::new(u64::MAX, 1);
        totals += TokenTotals::new(1, 1);
        assert_eq!(totals, TokenTotals::new(u64::MAX, 2));
        assert_eq!(TokenTotals::new(u64::MAX, u64::MAX).sum(), u64::MAX);

        let mut usage = TokenUsage::new();
        usage.record("m", u64::MAX, 0);
        usage.record("m", 5, 0);
        assert_eq!(usage.total().input, u64::MAX);
        assert_eq!(usage.total(), usage.computed_total());
    }
    #[test]
    fn total_tracks_completion_records() {
        let usage = sample("m", &[(10, 2), (20, 5)]);
        assert_eq!(usage.total(), TokenTotals::new(30, 7));
        assert_eq!(usage.completion().len(), 2);
        assert_eq!(usage.total(), usage.computed_total());
    }

    #[test]
    fn total_includes_tools_and_nested_agents() {
        let mut usage = sample("parent", &[(100, 10)]);
        usage.add_child_usage("search", UsageRecord::new("embed", 7, 0));

        let mut nested = sample("child", &[(40, 4)]);
        nested.add_child_usage("lookup", UsageRecord::new("embed", 3, 1));
        usage.add_child_details("researcher", nested);

        assert_eq!(usage.total(), TokenTotals::new(150, 15));
        assert_eq!(usage.total(), usage.computed_total());

        let researcher = usage.child("researcher").unwrap();
        let details = researcher.details.as_ref().unwrap();
        assert_eq!(details.total(), TokenTotals::new(43, 5));
        assert!(researcher.usage.is_empty());
    }

    #[test]
    fn merge_is_commutative_on_totals() {
        let mut a = sample("x", &[(1, 2)]);
        a.add_child_usage("tool", UsageRecord::new("y", 3, 4));
        let mut b = sample("z", &[(5, 6)]);
        b.add_child_details("agent", sample("w", &[(7, 8)]));

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab.total(), ba.total());
        assert_eq!(ab.total(), TokenTotals::new(16, 20));
        assert_eq!(ab.total(), ab.computed_total());
    }

    #[test]
    fn merge_is_associative_on_totals() {
        let a = sample("a", &[(1, 1)]);
        let b = sample("b", &[(2, 2)]);
        let mut c = TokenUsage::new();
        c.add_child_details("nested", sample("c", &[(3, 3)]));

        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut bc = b;
        bc.merge(c);
        let mut right = a;
        right.merge(bc);

        assert_eq!(left.total(), right.total());
    }

    #[test]
    fn repeated_child_details_merge_recursively() {
        let mut usage = TokenUsage::new();
        usage.add_child_details("helper", sample("h", &[(10, 1)]));
        usage.add_child_details("helper", sample("h", &[(20, 2)]));

        let details = usage.child("helper").unwrap().details.as_ref().unwrap();
        assert_eq!(details.completion().len(), 2);
        assert_eq!(details.total(), TokenTotals::new(30, 3));
        assert_eq!(usage.total(), TokenTotals::new(30, 3));
    }

    #[test]
    fn deserialization_recomputes_total() {
        let json = serde_json::json!({
            "total": {"input": 999, "output": 999},
            "completion": [{"model_id": "m", "input_tokens": 4, "output_tokens": 2}],
            "children": {
                "tool": {"usage": [{"model_id": "m", "input_tokens": 1, "output_tokens": 1}]}
            }
        });

        let usage: TokenUsage = serde_json::from_value(json).unwrap();
        assert_eq!(usage.total(), TokenTotals::new(5, 3));
    }
}
