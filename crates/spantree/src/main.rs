mod output;
mod telemetry;

use std::collections::HashSet;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use spantree_core::config::{ColorMode, Config};
use spantree_core::event::parse_event;
use spantree_core::filter::{SpanQuery, TagFilter, filter_with};
use spantree_core::rows::layout_rows;
use spantree_core::time::parse_duration_str;
use spantree_core::tree::{NodeId, Trace, TraceBuilder};

use crate::output::{
    CheckOutput, RenderOptions, ShowOutput, print_check_human, print_trace_human,
};
use crate::telemetry::{LogFormat, init_cli_tracing};

#[derive(Parser, Debug)]
#[command(name = "spantree")]
#[command(about = "Build, filter and print transaction span trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "auto, always or never")]
    color: Option<String>,

    #[arg(long, global = true, help = "Reject events with more spans than this")]
    max_spans: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Print the span tree of a transaction event")]
    Show {
        #[arg(help = "Event JSON file, or - for stdin")]
        input: PathBuf,
        #[arg(short = 'q', long, help = "Free-text span filter")]
        query: Option<String>,
        #[arg(long = "where", help = "Tag filter, e.g. db.system=post*")]
        where_filters: Vec<String>,
        #[arg(long, help = "Span id whose subtree is folded away")]
        collapse: Vec<String>,
        #[arg(long)]
        bar_width: Option<usize>,
        #[arg(long, help = "Highlight spans at least this long, e.g. 250ms")]
        slow: Option<String>,
    },
    #[command(about = "Validate an event and summarize its span tree")]
    Check {
        #[arg(help = "Event JSON file, or - for stdin")]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    init_cli_tracing(LogFormat::from_env());
    let cli = Cli::parse();

    let mut cfg = Config::load().context("failed loading config")?;
    if let Some(max_spans) = cli.max_spans {
        cfg.max_spans = max_spans;
    }
    if let Some(color) = &cli.color {
        cfg.color = color.parse()?;
    }

    match cli.command {
        Commands::Show {
            input,
            query,
            where_filters,
            collapse,
            bar_width,
            slow,
        } => {
            if let Some(width) = bar_width {
                anyhow::ensure!(width > 0, "--bar-width must be positive");
                cfg.bar_width = width;
            }
            if let Some(slow) = slow {
                cfg.slow_span = parse_duration_str(&slow)?;
            }

            let trace = load_trace(&input, &cfg)?;
            let mut span_query = SpanQuery::parse(query.as_deref().unwrap_or_default());
            for raw in &where_filters {
                span_query = span_query.with_tag_filter(TagFilter::parse(raw)?);
            }
            let collapsed = resolve_collapsed(&trace, &collapse)?;

            let result = filter_with(&trace, &span_query);
            let rows = layout_rows(&trace, &result, &collapsed);

            if cli.json {
                let out = ShowOutput {
                    trace: &trace,
                    filter: &result,
                    rows: &rows,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                let opts = RenderOptions {
                    bar_width: cfg.bar_width,
                    indent_width: cfg.indent_width,
                    slow_span: cfg.slow_span,
                    color: use_color(cfg.color),
                };
                print_trace_human(&trace, &result, &rows, &opts);
            }
        }
        Commands::Check { input } => {
            let trace = load_trace(&input, &cfg)?;
            let summary = CheckOutput::new(&trace);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_check_human(&summary);
            }
        }
    }

    Ok(())
}

fn load_trace(input: &Path, cfg: &Config) -> anyhow::Result<Trace> {
    let raw = read_input(input)?;
    let event = parse_event(&raw).with_context(|| format!("reading {}", input.display()))?;
    tracing::debug!(
        event_id = event.event_id.as_deref().unwrap_or("-"),
        spans = event.spans.len(),
        "parsed event"
    );
    let trace = event
        .into_trace(TraceBuilder::new().max_spans(cfg.max_spans))
        .with_context(|| format!("building span tree from {}", input.display()))?;
    Ok(trace)
}

fn read_input(input: &Path) -> anyhow::Result<String> {
    if input.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed reading stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(input).with_context(|| format!("failed reading {}", input.display()))
}

fn resolve_collapsed(trace: &Trace, span_ids: &[String]) -> anyhow::Result<HashSet<NodeId>> {
    span_ids
        .iter()
        .map(|id| {
            trace
                .find(id)
                .with_context(|| format!("--collapse: span {id} is not in the trace"))
        })
        .collect()
}

fn use_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    }
}
