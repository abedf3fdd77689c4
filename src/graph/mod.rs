//! The pointer graph: one node holding every head, one node per chunk, and
//! edges between named ports on those nodes.

mod builder;

pub use builder::build;

use std::{
    fmt,
    io::{self, Write},
};

use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use serde::Serialize;

use crate::model::{Chunk, HeadTable};

/// The id of the single node carrying every head.
pub const HEADS_NODE: &str = "heads";

/// A named row on a node that an edge can start or end at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Port {
    /// A row of the heads node, named after the head
    Head(String),
    /// The structural start of a chunk
    PrevSize,
    SizeFlags,
    FdPtr,
    BkPtr,
    Data,
}

impl Port {
    pub fn name(&self) -> &str {
        match self {
            Port::Head(name) => name,
            Port::PrevSize => "prevSize",
            Port::SizeFlags => "size",
            Port::FdPtr => "fdPtr",
            Port::BkPtr => "bkPtr",
            Port::Data => "data",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    Normal,
    /// Layout hint only; drawn invisibly and means nothing about the heap
    Invisible,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerEdge {
    pub from: Port,
    pub to: Port,
    pub style: EdgeStyle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Its rows live in [`GraphModel::heads`]
    Heads,
    Chunk(Chunk),
}

impl Node {
    /// Stable id used when the graph is written out: `heads`, or
    /// `<list>_<index>` for a chunk.
    pub fn id(&self) -> String {
        match self {
            Node::Heads => HEADS_NODE.to_owned(),
            Node::Chunk(chunk) => chunk_id(chunk),
        }
    }

    pub fn as_chunk(&self) -> Option<&Chunk> {
        match self {
            Node::Chunk(chunk) => Some(chunk),
            Node::Heads => None,
        }
    }
}

/// `<list>_<index>`
pub fn chunk_id(chunk: &Chunk) -> String {
    format!("{}_{}", chunk.bin, chunk.index)
}

/// An edge with both of its endpoints resolved.
#[derive(Clone, Copy, Debug)]
pub struct EdgeView<'a> {
    pub source: &'a Node,
    pub target: &'a Node,
    pub edge: &'a PointerEdge,
}

impl fmt::Display for EdgeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source.id(),
            self.edge.from,
            self.target.id(),
            self.edge.to
        )?;
        if self.edge.style == EdgeStyle::Invisible {
            write!(f, " (hint)")?;
        }
        Ok(())
    }
}

/// One tick's finished graph. Nothing in here outlives the tick.
#[derive(Debug)]
pub struct GraphModel {
    pub(crate) graph: DiGraph<Node, PointerEdge>,
    pub(crate) heads: HeadTable,
    pub(crate) heads_node: NodeIndex,
}

impl GraphModel {
    pub fn heads(&self) -> &HeadTable {
        &self.heads
    }

    pub fn heads_node(&self) -> &Node {
        &self.graph[self.heads_node]
    }

    /// Every chunk, in list order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.graph.node_weights().filter_map(Node::as_chunk)
    }

    pub fn nr_chunks(&self) -> usize {
        self.graph.node_count() - 1
    }

    /// Chunks grouped by their label, groups in order of first appearance.
    /// Lists with no chunks don't show up at all.
    pub fn lists(&self) -> Vec<(&str, Vec<&Chunk>)> {
        let mut lists: Vec<(&str, Vec<&Chunk>)> = Vec::new();
        for chunk in self.chunks() {
            match lists.iter_mut().find(|(name, _)| *name == chunk.bin) {
                Some((_, members)) => members.push(chunk),
                None => lists.push((chunk.bin.as_str(), vec![chunk])),
            }
        }
        lists
    }

    /// Every edge in the order it was generated.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.graph.edge_references().map(|e| EdgeView {
            source: &self.graph[e.source()],
            target: &self.graph[e.target()],
            edge: e.weight(),
        })
    }

    pub fn nr_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Dump heads, chunks (with annotations) and edges as JSON.
    pub fn write_json<W>(&self, writer: W) -> io::Result<()>
    where
        W: Write,
    {
        #[derive(Serialize)]
        struct JsonEdge {
            from: String,
            from_port: String,
            to: String,
            to_port: String,
            style: EdgeStyle,
        }

        #[derive(Serialize)]
        struct JsonGraph<'a> {
            heads: &'a HeadTable,
            chunks: Vec<&'a Chunk>,
            edges: Vec<JsonEdge>,
        }

        let view = JsonGraph {
            heads: self.heads(),
            chunks: self.chunks().collect(),
            edges: self
                .edges()
                .map(|e| JsonEdge {
                    from: e.source.id(),
                    from_port: e.edge.from.to_string(),
                    to: e.target.id(),
                    to_port: e.edge.to.to_string(),
                    style: e.edge.style,
                })
                .collect(),
        };
        serde_json::to_writer_pretty(writer, &view).map_err(io::Error::from)
    }
}
