use serde::Deserialize;

use crate::error::{Result, SpanTreeError};
use crate::ids::TraceId;
use crate::model::span::Span;
use crate::time::deserialize_opt_timestamp;
use crate::tree::{Trace, TraceBuilder};

const DEFAULT_ROOT_OP: &str = "default";

/// The parts of a transaction event needed to build its span tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub event_id: Option<String>,
    pub transaction: Option<String>,
    pub trace_id: Option<TraceId>,
    /// The transaction's own span, when the event carries enough to build it.
    pub root: Option<Span>,
    pub spans: Vec<Span>,
}

impl TransactionEvent {
    pub fn into_trace(self, builder: TraceBuilder) -> Result<Trace> {
        let mut builder = builder;
        if let Some(trace_id) = self.trace_id {
            builder = builder.trace_id(trace_id.into_string());
        }
        if let Some(root) = self.root {
            builder = builder.root(root);
        }
        builder.build(self.spans)
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    start_timestamp: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    timestamp: Option<f64>,
    #[serde(default)]
    contexts: Option<RawContexts>,
    #[serde(default)]
    entries: Vec<RawEntry>,
    #[serde(default)]
    spans: Option<Vec<Span>>,
}

#[derive(Debug, Deserialize)]
struct RawContexts {
    #[serde(default)]
    trace: Option<RawTraceContext>,
}

#[derive(Debug, Deserialize)]
struct RawTraceContext {
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    span_id: Option<String>,
    #[serde(default)]
    parent_span_id: Option<String>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parses an event document, or a bare JSON array of spans.
pub fn parse_event(input: &str) -> Result<TransactionEvent> {
    let value: serde_json::Value = serde_json::from_str(input)
        .map_err(|e| SpanTreeError::Parse(format!("invalid event json: {e}")))?;

    if value.is_array() {
        let spans = serde_json::from_value(value)
            .map_err(|e| SpanTreeError::Parse(format!("invalid span list: {e}")))?;
        return Ok(TransactionEvent {
            event_id: None,
            transaction: None,
            trace_id: None,
            root: None,
            spans,
        });
    }

    let raw: RawEvent = serde_json::from_value(value)
        .map_err(|e| SpanTreeError::Parse(format!("invalid event: {e}")))?;
    from_raw(raw)
}

fn from_raw(raw: RawEvent) -> Result<TransactionEvent> {
    let mut spans = None;
    for entry in raw.entries {
        if entry.kind == "spans" {
            let parsed: Vec<Span> = serde_json::from_value(entry.data)
                .map_err(|e| SpanTreeError::Parse(format!("invalid spans entry: {e}")))?;
            spans = Some(parsed);
            break;
        }
    }
    let spans = spans.or(raw.spans).unwrap_or_default();

    let context = raw.contexts.and_then(|c| c.trace);
    let trace_id = context
        .as_ref()
        .and_then(|c| c.trace_id.as_deref())
        .map(TraceId::parse)
        .transpose()?;

    let root = match (context, raw.start_timestamp, raw.timestamp) {
        (Some(ctx), Some(start), Some(end)) => match ctx.span_id {
            Some(span_id) => Some(Span {
                span_id,
                parent_span_id: ctx.parent_span_id,
                trace_id: trace_id.as_ref().map(|t| t.as_str().to_string()),
                operation: ctx.op.unwrap_or_else(|| DEFAULT_ROOT_OP.to_string()),
                description: ctx.description.or_else(|| raw.transaction.clone()),
                status: ctx.status,
                start_timestamp: start,
                end_timestamp: end,
                tags: Default::default(),
                data: Default::default(),
            }),
            None => None,
        },
        _ => None,
    };
    if root.is_none() {
        tracing::debug!("event has no usable trace context, root will be synthetic");
    }

    Ok(TransactionEvent {
        event_id: raw.event_id,
        transaction: raw.transaction,
        trace_id,
        root,
        spans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const API_EVENT: &str = r#"{
        "eventID": "ignored",
        "event_id": "e1",
        "transaction": "/api/orders",
        "start_timestamp": 1000.0,
        "timestamp": "1970-01-01T00:16:50Z",
        "contexts": {
            "trace": {
                "trace_id": "4BF92F3577B34DA6A3CE929D0E0E4736",
                "span_id": "aaaaaaaaaaaaaaaa",
                "op": "http.server",
                "status": "ok"
            }
        },
        "entries": [
            {"type": "breadcrumbs", "data": {"values": []}},
            {"type": "spans", "data": [
                {"span_id": "bbbbbbbbbbbbbbbb", "parent_span_id": "aaaaaaaaaaaaaaaa",
                 "op": "db", "start_timestamp": 1001.0, "timestamp": 1004.0},
                {"span_id": "cccccccccccccccc", "parent_span_id": "ffffffffffffffff",
                 "op": "cache", "start_timestamp": 1005.0, "timestamp": 1006.0}
            ]}
        ]
    }"#;

    #[test]
    fn parses_api_event() {
        let event = parse_event(API_EVENT).unwrap();
        assert_eq!(event.event_id.as_deref(), Some("e1"));
        assert_eq!(
            event.trace_id.as_ref().map(TraceId::as_str),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );

        let root = event.root.clone().unwrap();
        assert_eq!(root.span_id, "aaaaaaaaaaaaaaaa");
        assert_eq!(root.operation, "http.server");
        assert_eq!(root.description.as_deref(), Some("/api/orders"));
        assert_eq!((root.start_timestamp, root.end_timestamp), (1000.0, 1010.0));
        assert_eq!(event.spans.len(), 2);

        let trace = event.into_trace(TraceBuilder::new()).unwrap();
        assert_eq!(trace.len(), 3);
        assert!(!trace.root().synthetic);
        assert_eq!(
            trace.trace_id.as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
        let db = trace.node(trace.find("bbbbbbbbbbbbbbbb").unwrap());
        assert_eq!((db.relative_start, db.relative_end), (0.1, 0.4));
        // Unknown parent falls back to the transaction root.
        let cache = trace.node(trace.find("cccccccccccccccc").unwrap());
        assert_eq!(cache.parent, Some(trace.root().id));
    }

    #[test]
    fn parses_ingest_form() {
        let event = parse_event(
            r#"{"spans": [{"span_id": "1", "start_timestamp": 0, "timestamp": 1}]}"#,
        )
        .unwrap();
        assert_eq!(event.root, None);
        assert_eq!(event.trace_id, None);
        assert_eq!(event.spans.len(), 1);

        let trace = event.into_trace(TraceBuilder::new()).unwrap();
        assert!(trace.root().synthetic);
    }

    #[test]
    fn parses_bare_span_list() {
        let event = parse_event(
            r#"[{"span_id": "1", "start_timestamp": 0, "timestamp": 1},
                {"span_id": "2", "parent_span_id": "1", "start_timestamp": 0, "timestamp": 1}]"#,
        )
        .unwrap();
        assert_eq!(event.spans.len(), 2);
    }

    #[test]
    fn trace_context_without_timestamps_is_synthetic() {
        let event = parse_event(
            r#"{"contexts": {"trace": {"trace_id": "4bf92f3577b34da6a3ce929d0e0e4736",
                "span_id": "aaaaaaaaaaaaaaaa"}},
                "spans": [{"span_id": "1", "start_timestamp": 0, "timestamp": 1}]}"#,
        )
        .unwrap();
        assert_eq!(event.root, None);

        let trace = event.into_trace(TraceBuilder::new()).unwrap();
        assert!(trace.root().synthetic);
        assert_eq!(
            trace.root().span.span_id,
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_event("{"), Err(SpanTreeError::Parse(_))));
        assert!(matches!(
            parse_event(r#"{"contexts": {"trace": {"trace_id": "xyz"}}}"#),
            Err(SpanTreeError::Parse(_))
        ));
        assert!(matches!(
            parse_event(r#"{"entries": [{"type": "spans", "data": [{"op": "db"}]}]}"#),
            Err(SpanTreeError::Parse(_))
        ));
    }

    #[test]
    fn event_without_spans_or_root_is_empty() {
        let event = parse_event("{}").unwrap();
        assert_eq!(
            event.into_trace(TraceBuilder::new()),
            Err(SpanTreeError::EmptyTrace)
        );
    }
}
