use serde_json::json;
use spantree_core::model::span::Span;

pub const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const ROOT_SPAN_ID: &str = "a000000000000000";

/// Spans of a checkout request: a handler with a database query and a
/// cache lookup, plus one span whose parent was never sent.
pub fn sample_spans() -> Vec<Span> {
    vec![
        Span::new("b000000000000000", Some(ROOT_SPAN_ID), "http.handler", 100.0, 109.0)
            .with_description("POST /checkout"),
        Span::new("c000000000000000", Some("b000000000000000"), "db.query", 101.0, 104.0)
            .with_description("SELECT * FROM orders WHERE id = %s")
            .with_tag("db.system", "postgres"),
        Span::new("d000000000000000", Some("b000000000000000"), "cache.get", 105.0, 105.5)
            .with_tag("peer", "redis:6379"),
        Span::new("e000000000000000", Some("ffffffffffffffff"), "serialize", 109.0, 110.0),
    ]
}

pub fn sample_event() -> serde_json::Value {
    json!({
        "event_id": "f1e2d3c4b5a69788f1e2d3c4b5a69788",
        "transaction": "/checkout",
        "start_timestamp": 100.0,
        "timestamp": 110.0,
        "contexts": {
            "trace": {
                "trace_id": TRACE_ID,
                "span_id": ROOT_SPAN_ID,
                "op": "http.server",
                "status": "ok"
            }
        },
        "entries": [
            {"type": "spans", "data": sample_spans()}
        ]
    })
}

pub fn sample_event_json() -> String {
    sample_event().to_string()
}
