use std::time::Duration;

use owo_colors::OwoColorize;
use serde::Serialize;
use spantree_core::filter::FilterResult;
use spantree_core::rows::Row;
use spantree_core::time::seconds_to_rfc3339;
use spantree_core::tree::{SpanTreeNode, Trace};

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub bar_width: usize,
    pub indent_width: usize,
    pub slow_span: Duration,
    pub color: bool,
}

#[derive(Serialize)]
pub struct ShowOutput<'a> {
    pub trace: &'a Trace,
    pub filter: &'a FilterResult,
    pub rows: &'a [Row],
}

#[derive(Serialize)]
pub struct CheckOutput<'a> {
    pub trace_id: Option<&'a str>,
    pub nodes: usize,
    pub max_depth: usize,
    pub duration_ms: f64,
    pub synthetic_root: bool,
}

impl<'a> CheckOutput<'a> {
    pub fn new(trace: &'a Trace) -> Self {
        Self {
            trace_id: trace.trace_id.as_deref(),
            nodes: trace.len(),
            max_depth: trace.max_depth(),
            duration_ms: trace.duration_secs() * 1_000.0,
            synthetic_root: trace.root().synthetic,
        }
    }
}

pub fn print_trace_human(trace: &Trace, filter: &FilterResult, rows: &[Row], opts: &RenderOptions) {
    println!("{}", trace_header(trace, filter));
    for row in rows {
        println!("{}", format_row(trace, row, opts));
    }
}

pub fn print_check_human(v: &CheckOutput<'_>) {
    println!(
        "OK trace={} spans={} depth={} duration={:.3}ms synthetic_root={}",
        v.trace_id.unwrap_or("-"),
        v.nodes,
        v.max_depth,
        v.duration_ms,
        v.synthetic_root
    );
}

fn trace_header(trace: &Trace, filter: &FilterResult) -> String {
    let started = seconds_to_rfc3339(trace.start_timestamp).unwrap_or_else(|| "-".to_string());
    let mut header = format!(
        "TRACE {} start={} duration={:.3}ms spans={}",
        trace.trace_id.as_deref().unwrap_or("-"),
        started,
        trace.duration_secs() * 1_000.0,
        trace.len()
    );
    if filter.active {
        header.push_str(&format!(
            " matched={} hidden={}",
            filter.matched.len(),
            filter.hidden_count(trace)
        ));
    }
    header
}

pub fn format_row(trace: &Trace, row: &Row, opts: &RenderOptions) -> String {
    match row {
        Row::Filtered { count } => {
            let noun = if *count == 1 { "span" } else { "spans" };
            let text = format!("{count} {noun} filtered out");
            format!(
                "{} {}",
                " ".repeat(opts.bar_width),
                paint(&text, opts.color, |s| s.dimmed().to_string())
            )
        }
        Row::Span {
            id,
            depth,
            matched,
            hidden_descendants,
            ..
        } => {
            let node = trace.node(*id);
            let bar = render_bar(node.relative_start, node.relative_end, opts.bar_width);
            let indent = " ".repeat(depth * opts.indent_width);
            let mut label = span_label(node);
            if *matched {
                label = paint(&label, opts.color, |s| s.yellow().bold().to_string());
            }
            let duration_ms = node.span.duration_ms();
            let mut duration = format!("({duration_ms:.3}ms)");
            if duration_ms >= opts.slow_span.as_secs_f64() * 1_000.0 {
                duration = paint(&duration, opts.color, |s| s.red().to_string());
            }
            let mut line = format!("{bar} {indent}{label} {duration}");
            if *hidden_descendants > 0 {
                line.push_str(&format!(" [+{hidden_descendants}]"));
            }
            line
        }
    }
}

fn span_label(node: &SpanTreeNode) -> String {
    let op = if node.span.operation.is_empty() {
        "<unknown op>"
    } else {
        node.span.operation.as_str()
    };
    match node.span.description.as_deref() {
        Some(desc) if !desc.is_empty() => format!("{op} - {desc}"),
        _ => op.to_string(),
    }
}

fn paint(text: &str, color: bool, style: impl Fn(&str) -> String) -> String {
    if color { style(text) } else { text.to_string() }
}

/// Draws `[start, end]` (fractions of the trace) as a bar `width` columns
/// wide. Zero-length spans still occupy one column.
pub fn render_bar(start: f64, end: f64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let scale = width as f64;
    let mut from = ((start * scale).floor() as usize).min(width - 1);
    let mut to = ((end * scale).ceil() as usize).min(width);
    if to <= from {
        to = from + 1;
    }
    if to > width {
        from = width - 1;
        to = width;
    }
    (0..width)
        .map(|col| if (from..to).contains(&col) { '#' } else { '.' })
        .collect()
}
