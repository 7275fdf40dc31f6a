use std::collections::BTreeSet;

use glob::Pattern;
use serde::Serialize;

use crate::error::{Result, SpanTreeError};
use crate::model::span::Span;
use crate::tree::{NodeId, Trace};

/// Restricts matches to spans whose tag `key` matches a glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pattern: Pattern,
}

impl TagFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let (key, value_glob) = input
            .split_once('=')
            .ok_or_else(|| SpanTreeError::Parse(format!("invalid tag filter: {input}")))?;

        if key.trim().is_empty() || value_glob.trim().is_empty() {
            return Err(SpanTreeError::Parse(format!("invalid tag filter: {input}")));
        }
        let pattern = Pattern::new(value_glob.trim())
            .map_err(|e| SpanTreeError::Parse(format!("invalid tag glob {value_glob}: {e}")))?;

        Ok(Self {
            key: key.trim().to_string(),
            pattern,
        })
    }

    pub fn value_glob(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, value: &str) -> bool {
        self.pattern.matches(value)
    }
}

/// A parsed span search: every term and every tag filter must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanQuery {
    pub terms: Vec<String>,
    pub tag_filters: Vec<TagFilter>,
}

impl SpanQuery {
    pub fn parse(input: &str) -> Self {
        Self {
            terms: input.split_whitespace().map(str::to_lowercase).collect(),
            tag_filters: Vec::new(),
        }
    }

    pub fn with_tag_filter(mut self, filter: TagFilter) -> Self {
        self.tag_filters.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.tag_filters.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FilterResult {
    /// False when the query was empty and nothing was filtered.
    pub active: bool,
    pub matched: BTreeSet<NodeId>,
    pub visible: BTreeSet<NodeId>,
}

impl FilterResult {
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.visible.contains(&id)
    }

    pub fn is_matched(&self, id: NodeId) -> bool {
        self.matched.contains(&id)
    }

    pub fn hidden_count(&self, trace: &Trace) -> usize {
        trace.len() - self.visible.len()
    }
}

pub fn filter(trace: &Trace, query: &str) -> FilterResult {
    filter_with(trace, &SpanQuery::parse(query))
}

pub fn filter_with(trace: &Trace, query: &SpanQuery) -> FilterResult {
    if query.is_empty() {
        return FilterResult {
            active: false,
            matched: BTreeSet::new(),
            visible: trace.nodes().iter().map(|n| n.id).collect(),
        };
    }

    let mut matched = BTreeSet::new();
    let mut visible = BTreeSet::new();
    let mut has_visible_child = vec![false; trace.len()];

    // Ids are pre-order, so walking them backwards sees children before parents.
    for node in trace.nodes().iter().rev() {
        let is_match = !node.synthetic && span_matches(&node.span, &query.terms, &query.tag_filters);
        if is_match {
            matched.insert(node.id);
        }
        if is_match || has_visible_child[node.id.index()] {
            visible.insert(node.id);
            if let Some(parent) = node.parent {
                has_visible_child[parent.index()] = true;
            }
        }
    }

    tracing::debug!(
        terms = query.terms.len(),
        matched = matched.len(),
        visible = visible.len(),
        "filtered span tree"
    );
    FilterResult {
        active: true,
        matched,
        visible,
    }
}

fn span_matches(span: &Span, terms: &[String], tag_filters: &[TagFilter]) -> bool {
    let tags_ok = tag_filters.iter().all(|f| {
        span.tags
            .get(&f.key)
            .is_some_and(|value| f.matches(value))
    });
    if !tags_ok {
        return false;
    }
    if terms.is_empty() {
        return true;
    }

    let operation = span.operation.to_lowercase();
    let description = span
        .description
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    let tags = if span.tags.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&span.tags)
            .unwrap_or_default()
            .to_lowercase()
    };

    terms.iter().all(|term| {
        operation.contains(term.as_str())
            || description.contains(term.as_str())
            || tags.contains(term.as_str())
    })
}
