pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod ids;
pub mod model;
pub mod rows;
pub mod time;
pub mod tree;

pub use error::{Result, SpanTreeError};
pub use filter::{FilterResult, SpanQuery, filter, filter_with};
pub use model::span::Span;
pub use rows::{Row, layout_rows};
pub use tree::{NodeId, SpanTreeNode, Trace, TraceBuilder, build};
