//! Aggregation of streamed tool-call fragments
//!
//! The agent reports tool invocations as a series of partial events that share
//! a stream-assigned `index`. The name usually arrives with the first fragment
//! and the arguments arrive as a JSON string split across many fragments.

use serde::{Deserialize, Serialize};

/// A tool invocation reported by the assistant mid-response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Stream-assigned index; not necessarily contiguous or zero-based
    pub index: i64,
    /// Tool name, empty until a fragment carries one
    pub name: String,
    /// Concatenated argument fragments in arrival order
    pub args: String,
}

/// One partial tool-call event as decoded from the stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    /// Index the fragment belongs to; `None` means plain-text channel
    pub index: Option<i64>,
    /// Tool name, if this fragment carries one
    pub name: Option<String>,
    /// Argument text fragment
    pub args: Option<String>,
}

/// Merges [`ToolCallFragment`]s into complete [`ToolInvocation`] records
///
/// Records are kept in first-seen order of their index, which is the order the
/// assistant started each invocation.
///
/// # Examples
///
/// ```
/// use travai::tool_calls::{ToolCallAggregator, ToolCallFragment};
///
/// let mut aggregator = ToolCallAggregator::new();
/// aggregator.apply(&ToolCallFragment { index: Some(0), name: Some("search".into()), args: None });
/// aggregator.apply(&ToolCallFragment { index: Some(0), name: None, args: Some("Bang".into()) });
/// aggregator.apply(&ToolCallFragment { index: Some(0), name: None, args: Some("kok".into()) });
///
/// let records = aggregator.records();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].name, "search");
/// assert_eq!(records[0].args, "Bangkok");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ToolCallAggregator {
    records: Vec<ToolInvocation>,
}

impl ToolCallAggregator {
    /// Creates an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one fragment into the records
    ///
    /// Returns `false` when the fragment has no index and was ignored.
    pub fn apply(&mut self, fragment: &ToolCallFragment) -> bool {
        let Some(index) = fragment.index else {
            return false;
        };

        let position = match self.records.iter().position(|r| r.index == index) {
            Some(position) => position,
            None => {
                self.records.push(ToolInvocation {
                    index,
                    ..ToolInvocation::default()
                });
                self.records.len() - 1
            }
        };
        let record = &mut self.records[position];

        if let Some(name) = fragment.name.as_deref().filter(|n| !n.is_empty()) {
            record.name = name.to_string();
        }
        if let Some(args) = fragment.args.as_deref() {
            record.args.push_str(args);
        }
        true
    }

    /// Current records in first-seen order
    pub fn records(&self) -> &[ToolInvocation] {
        &self.records
    }

    /// Snapshot of the records for publishing onto a message
    pub fn snapshot(&self) -> Vec<ToolInvocation> {
        self.records.clone()
    }

    /// Returns true when no fragment has been applied since the last reset
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops all records
    pub fn reset(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(index: Option<i64>, name: Option<&str>, args: Option<&str>) -> ToolCallFragment {
        ToolCallFragment {
            index,
            name: name.map(str::to_string),
            args: args.map(str::to_string),
        }
    }

    #[test]
    fn test_fragments_merge_into_one_record() {
        let mut aggregator = ToolCallAggregator::new();
        aggregator.apply(&fragment(Some(0), Some("search"), None));
        aggregator.apply(&fragment(Some(0), None, Some("Bang")));
        aggregator.apply(&fragment(Some(0), None, Some("kok")));

        assert_eq!(
            aggregator.records(),
            &[ToolInvocation {
                index: 0,
                name: "search".to_string(),
                args: "Bangkok".to_string(),
            }]
        );
    }

    #[test]
    fn test_fragment_without_index_is_ignored() {
        let mut aggregator = ToolCallAggregator::new();
        assert!(!aggregator.apply(&fragment(None, Some("search"), Some("x"))));
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_name_is_last_non_empty_write() {
        let mut aggregator = ToolCallAggregator::new();
        aggregator.apply(&fragment(Some(2), Some("lookup"), None));
        aggregator.apply(&fragment(Some(2), Some(""), Some("{")));
        aggregator.apply(&fragment(Some(2), None, Some("}")));
        assert_eq!(aggregator.records()[0].name, "lookup");

        aggregator.apply(&fragment(Some(2), Some("guide_search"), None));
        assert_eq!(aggregator.records()[0].name, "guide_search");
        assert_eq!(aggregator.records()[0].args, "{}");
    }

    #[test]
    fn test_name_may_arrive_after_args() {
        let mut aggregator = ToolCallAggregator::new();
        aggregator.apply(&fragment(Some(1), None, Some("{\"q\":")));
        assert_eq!(aggregator.records()[0].name, "");
        aggregator.apply(&fragment(Some(1), Some("search"), Some("\"temples\"}")));
        assert_eq!(aggregator.records()[0].name, "search");
        assert_eq!(aggregator.records()[0].args, "{\"q\":\"temples\"}");
    }

    #[test]
    fn test_records_keep_first_seen_order() {
        let mut aggregator = ToolCallAggregator::new();
        aggregator.apply(&fragment(Some(7), Some("weather"), None));
        aggregator.apply(&fragment(Some(3), Some("search"), None));
        aggregator.apply(&fragment(Some(7), None, Some("{}")));

        let indices: Vec<i64> = aggregator.records().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![7, 3]);
    }

    #[test]
    fn test_reset_clears_records() {
        let mut aggregator = ToolCallAggregator::new();
        aggregator.apply(&fragment(Some(0), Some("search"), None));
        aggregator.reset();
        assert!(aggregator.is_empty());
        assert!(aggregator.snapshot().is_empty());
    }
}
