use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanTreeError};
use crate::model::span::Span;

pub const SYNTHETIC_ROOT_OP: &str = "transaction";
const FALLBACK_ROOT_ID: &str = "root";

/// Index of a node inside a [`Trace`].
///
/// Ids are handed out in display order: the root is always `0` and every
/// node's subtree occupies the contiguous range that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpanTreeNode {
    pub id: NodeId,
    pub span: Span,
    /// Set on the root node fabricated when the payload carries no root span.
    pub synthetic: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: usize,
    pub relative_start: f64,
    pub relative_end: f64,
    pub descendant_count: usize,
}

/// A span tree built from one transaction's spans.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Trace {
    pub trace_id: Option<String>,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    nodes: Vec<SpanTreeNode>,
}

impl Trace {
    pub fn root(&self) -> &SpanTreeNode {
        &self.nodes[NodeId::ROOT.0]
    }

    pub fn node(&self, id: NodeId) -> &SpanTreeNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&SpanTreeNode> {
        self.nodes.get(id.0)
    }

    /// All nodes in display order.
    pub fn nodes(&self) -> &[SpanTreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_timestamp - self.start_timestamp).max(0.0)
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn find(&self, span_id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| !n.synthetic && n.span.span_id == span_id)
            .map(|n| n.id)
    }

    /// Walks from `id`'s parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, |p| self.node(*p).parent)
    }

    /// Ids strictly below `id`, in display order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + use<> {
        let count = self.nodes[id.0].descendant_count;
        (id.0 + 1..=id.0 + count).map(NodeId)
    }
}

/// Builds a trace whose root is always synthetic.
pub fn build(spans: Vec<Span>) -> Result<Trace> {
    TraceBuilder::new().build(spans)
}

#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    trace_id: Option<String>,
    root: Option<Span>,
    max_spans: Option<usize>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Uses `root` as the top of the tree instead of fabricating one.
    pub fn root(mut self, root: Span) -> Self {
        self.root = Some(root);
        self
    }

    pub fn max_spans(mut self, limit: usize) -> Self {
        self.max_spans = Some(limit);
        self
    }

    pub fn build(self, spans: Vec<Span>) -> Result<Trace> {
        if spans.is_empty() && self.root.is_none() {
            return Err(SpanTreeError::EmptyTrace);
        }
        if let Some(limit) = self.max_spans
            && spans.len() > limit
        {
            return Err(SpanTreeError::TooManySpans {
                count: spans.len(),
                limit,
            });
        }
        for span in self.root.iter().chain(spans.iter()) {
            validate_timestamps(span)?;
        }

        let trace_id = self
            .trace_id
            .or_else(|| self.root.as_ref().and_then(|r| r.trace_id.clone()))
            .or_else(|| spans.iter().find_map(|s| s.trace_id.clone()));

        // Slot 0 is the root; input span `i` lives in slot `i + 1`.
        let slots = spans.len() + 1;
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(slots);
        if let Some(root) = &self.root {
            index.insert(root.span_id.as_str(), 0);
        }
        for (i, span) in spans.iter().enumerate() {
            if index.insert(span.span_id.as_str(), i + 1).is_some() {
                return Err(SpanTreeError::DuplicateSpanId(span.span_id.clone()));
            }
        }

        let mut parent_of: Vec<Option<usize>> = vec![None; slots];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); slots];
        let (mut lo, mut hi) = match &self.root {
            Some(root) => (root.start_timestamp, root.end_timestamp),
            None => (f64::INFINITY, f64::NEG_INFINITY),
        };
        for (i, span) in spans.iter().enumerate() {
            let slot = i + 1;
            lo = lo.min(span.start_timestamp);
            hi = hi.max(span.end_timestamp);

            let parent = span
                .parent_span_id
                .as_deref()
                .and_then(|p| index.get(p).copied())
                .unwrap_or_else(|| {
                    if let Some(missing) = &span.parent_span_id {
                        tracing::debug!(
                            span_id = %span.span_id,
                            parent_span_id = %missing,
                            "parent not in trace, attaching span to root"
                        );
                    }
                    0
                });
            parent_of[slot] = Some(parent);
            children[parent].push(slot);
        }

        let depth = assign_depths(&children, &parent_of, &spans)?;

        for list in &mut children {
            // `-0.0` and `0.0` must tie so input order survives; NaN was rejected above.
            list.sort_by(|a, b| {
                spans[*a - 1]
                    .start_timestamp
                    .partial_cmp(&spans[*b - 1].start_timestamp)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let synthetic = self.root.is_none();
        let root_span = match self.root {
            Some(root) => root,
            None => synthetic_root(trace_id.as_deref(), lo, hi),
        };

        let mut nodes = emit_preorder(root_span, spans, &children, &depth, lo, hi);
        nodes[NodeId::ROOT.0].synthetic = synthetic;
        let trace = Trace {
            trace_id,
            start_timestamp: lo,
            end_timestamp: hi,
            nodes,
        };
        tracing::debug!(
            nodes = trace.len(),
            max_depth = trace.max_depth(),
            "built span tree"
        );
        Ok(trace)
    }
}

fn validate_timestamps(span: &Span) -> Result<()> {
    let reason = if !span.start_timestamp.is_finite() || !span.end_timestamp.is_finite() {
        "timestamp is not a finite number"
    } else if span.end_timestamp < span.start_timestamp {
        "span ends before it starts"
    } else {
        return Ok(());
    };
    Err(SpanTreeError::InvalidTimestamp {
        span_id: span.span_id.clone(),
        reason: reason.to_string(),
    })
}

fn synthetic_root(trace_id: Option<&str>, start: f64, end: f64) -> Span {
    let mut root = Span::new(
        trace_id.unwrap_or(FALLBACK_ROOT_ID),
        None,
        SYNTHETIC_ROOT_OP,
        start,
        end,
    );
    root.trace_id = trace_id.map(str::to_string);
    root
}

/// Breadth-first depth assignment from the root. Slots never reached hang
/// off a parent cycle.
fn assign_depths(
    children: &[Vec<usize>],
    parent_of: &[Option<usize>],
    spans: &[Span],
) -> Result<Vec<usize>> {
    let mut depth = vec![0usize; children.len()];
    let mut visited = vec![false; children.len()];
    let mut queue = VecDeque::from([0usize]);
    visited[0] = true;

    while let Some(slot) = queue.pop_front() {
        for &child in &children[slot] {
            if visited[child] {
                return Err(SpanTreeError::CyclicParent(
                    spans[child - 1].span_id.clone(),
                ));
            }
            visited[child] = true;
            depth[child] = depth[slot] + 1;
            queue.push_back(child);
        }
    }

    if let Some(unreached) = visited.iter().position(|v| !v) {
        let on_cycle = find_cycle_member(unreached, parent_of);
        return Err(SpanTreeError::CyclicParent(
            spans[on_cycle - 1].span_id.clone(),
        ));
    }
    Ok(depth)
}

fn find_cycle_member(start: usize, parent_of: &[Option<usize>]) -> usize {
    let mut seen = HashSet::new();
    let mut current = start;
    while seen.insert(current) {
        match parent_of[current] {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}

fn emit_preorder(
    root: Span,
    spans: Vec<Span>,
    children: &[Vec<usize>],
    depth: &[usize],
    lo: f64,
    hi: f64,
) -> Vec<SpanTreeNode> {
    let mut pending: Vec<Option<Span>> = std::iter::once(Some(root))
        .chain(spans.into_iter().map(Some))
        .collect();

    let mut nodes: Vec<SpanTreeNode> = Vec::with_capacity(pending.len());
    let mut stack: Vec<(usize, Option<NodeId>)> = vec![(0, None)];

    while let Some((slot, parent)) = stack.pop() {
        let Some(span) = pending[slot].take() else {
            continue;
        };
        let id = NodeId(nodes.len());
        let (relative_start, relative_end) = relative_offsets(&span, lo, hi);
        nodes.push(SpanTreeNode {
            id,
            span,
            synthetic: false,
            parent,
            children: Vec::with_capacity(children[slot].len()),
            depth: depth[slot],
            relative_start,
            relative_end,
            descendant_count: 0,
        });
        if let Some(parent) = parent {
            nodes[parent.0].children.push(id);
        }
        for &child in children[slot].iter().rev() {
            stack.push((child, Some(id)));
        }
    }

    for i in (1..nodes.len()).rev() {
        if let Some(parent) = nodes[i].parent {
            let below = nodes[i].descendant_count + 1;
            nodes[parent.0].descendant_count += below;
        }
    }
    nodes
}

fn relative_offsets(span: &Span, lo: f64, hi: f64) -> (f64, f64) {
    let duration = hi - lo;
    if duration <= 0.0 {
        return (0.0, 0.0);
    }
    let start = ((span.start_timestamp - lo) / duration).clamp(0.0, 1.0);
    let end = ((span.end_timestamp - lo) / duration).clamp(start, 1.0);
    (start, end)
}
