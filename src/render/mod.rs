//! Serializing a [`GraphModel`](crate::graph::GraphModel) and handing the
//! result to whatever draws it.

mod dot;
mod sink;

pub use dot::{Dot, DotStyle};
pub use sink::{CommandSink, FileSink, GraphSink, RenderError, WriterSink};
