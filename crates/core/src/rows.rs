use std::collections::HashSet;

use serde::Serialize;

use crate::filter::FilterResult;
use crate::tree::{NodeId, Trace};

/// One line of the rendered span tree.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    Span {
        id: NodeId,
        depth: usize,
        matched: bool,
        collapsed: bool,
        /// Spans elided below a collapsed row.
        hidden_descendants: usize,
    },
    /// A run of consecutive spans removed by the filter.
    Filtered { count: usize },
}

/// Lays out display rows for `trace`.
///
/// Row order and depth always follow the tree; filtering only removes rows.
/// Subtrees under ids in `collapsed` are skipped entirely.
pub fn layout_rows(trace: &Trace, filter: &FilterResult, collapsed: &HashSet<NodeId>) -> Vec<Row> {
    let nodes = trace.nodes();
    let mut rows = Vec::new();
    let mut hidden_run = 0usize;
    let mut i = 0usize;

    while i < nodes.len() {
        let node = &nodes[i];
        if !filter.is_visible(node.id) {
            hidden_run += 1;
            i += 1;
            continue;
        }
        if hidden_run > 0 {
            rows.push(Row::Filtered { count: hidden_run });
            hidden_run = 0;
        }

        let is_collapsed = collapsed.contains(&node.id) && node.descendant_count > 0;
        rows.push(Row::Span {
            id: node.id,
            depth: node.depth,
            matched: filter.is_matched(node.id),
            collapsed: is_collapsed,
            hidden_descendants: if is_collapsed { node.descendant_count } else { 0 },
        });
        i += 1;
        if is_collapsed {
            i += node.descendant_count;
        }
    }
    if hidden_run > 0 {
        rows.push(Row::Filtered { count: hidden_run });
    }
    rows
}
