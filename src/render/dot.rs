//! Graphviz `dot` output.
//!
//! Every node is an HTML-like table so edges can land on individual rows
//! (`prevSize`, `fdPtr`, ...). Output is fully determined by the
//! [`GraphModel`]; writing it never touches the model.

use std::fmt::{self, Display, Write};

use crate::{
    graph::{chunk_id, EdgeStyle, GraphModel, HEADS_NODE},
    model::{Chunk, Color},
};

/// Colours and graph-level layout settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DotStyle {
    pub background: Color,
    pub node_background: Color,
    pub title_background: Color,
    pub border: Color,
    pub name: Color,
    pub edge: Color,
    /// Minimum gap between nodes, in inches
    pub node_sep: f32,
}

impl Default for DotStyle {
    fn default() -> Self {
        Self {
            background: Color::rgb(0x0b, 0x0d, 0x0e),
            node_background: Color::rgb(0x1b, 0x1e, 0x25),
            title_background: Color::rgb(0x0b, 0x0d, 0x0e),
            border: Color::rgb(0x4c, 0x50, 0x5c),
            name: Color::WARNING,
            edge: Color::rgb(0x92, 0x97, 0xa9),
            node_sep: 0.2,
        }
    }
}

/// `Dot::new(&graph).to_string()` renders the whole graph.
pub struct Dot<'a> {
    graph: &'a GraphModel,
    style: DotStyle,
}

impl<'a> Dot<'a> {
    pub fn new(graph: &'a GraphModel) -> Self {
        Self::with_style(graph, DotStyle::default())
    }

    pub fn with_style(graph: &'a GraphModel, style: DotStyle) -> Self {
        Self { graph, style }
    }

    fn write_heads(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.style;
        writeln!(f, "    // heads")?;
        writeln!(
            f,
            "    {} [label=<<table border=\"0\" color=\"{}\" bgcolor=\"{}\" cellspacing=\"0\">",
            quote(HEADS_NODE),
            s.border,
            s.node_background
        )?;
        for (name, value) in self.graph.heads().rows() {
            writeln!(
                f,
                "        <tr><td port=\"{}\" border=\"1\"><font color=\"{}\">{}</font>: {}</td></tr>",
                Html(name),
                s.name,
                Html(name),
                Html(&value)
            )?;
        }
        writeln!(f, "    </table>>];")
    }

    fn write_chunk(&self, f: &mut fmt::Formatter<'_>, id: &str, chunk: &Chunk) -> fmt::Result {
        let s = &self.style;
        let background = chunk.annotations.background.unwrap_or(s.node_background);
        writeln!(
            f,
            "        {} [label=<<table border=\"0\" color=\"{}\" bgcolor=\"{}\" cellspacing=\"0\">",
            quote(id),
            s.border,
            background
        )?;
        writeln!(
            f,
            "            <tr><td colspan=\"4\" bgcolor=\"{}\" border=\"1\"><font color=\"{}\">{}[{}]</font>: {}</td></tr>",
            s.title_background,
            s.name,
            Html(&chunk.bin),
            chunk.index,
            chunk.address
        )?;
        writeln!(
            f,
            "            <tr><td port=\"prevSize\" colspan=\"4\" border=\"1\">{}</td></tr>",
            chunk.prev_size
        )?;
        write!(
            f,
            "            <tr><td port=\"size\" border=\"1\">{}</td>",
            chunk.chunk_size
        )?;
        for (flag, bit) in [('A', chunk.a), ('M', chunk.m), ('P', chunk.p)] {
            write!(
                f,
                "<td border=\"1\"><font color=\"{}\">{}({})</font></td>",
                Color::for_bit(bit),
                flag,
                bit as u8
            )?;
        }
        writeln!(f, "</tr>")?;
        writeln!(
            f,
            "            <tr><td port=\"fdPtr\" colspan=\"4\" border=\"1\">{}</td></tr>",
            chunk.fd
        )?;
        writeln!(
            f,
            "            <tr><td port=\"bkPtr\" colspan=\"4\" border=\"1\">{}</td></tr>",
            chunk.bk
        )?;
        writeln!(
            f,
            "            <tr><td port=\"data\" colspan=\"4\" border=\"1\">.....</td></tr>"
        )?;
        for row in &chunk.annotations.rows {
            writeln!(
                f,
                "            <tr><td colspan=\"4\" bgcolor=\"{}\" border=\"1\"><font color=\"{}\">{}</font></td></tr>",
                s.title_background,
                row.color,
                Html(&row.text)
            )?;
        }
        writeln!(f, "        </table>>];")
    }

    fn write_lists(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.style;
        for (list, chunks) in self.graph.lists() {
            writeln!(f, "    // {} chunks", Comment(list))?;
            writeln!(f, "    subgraph {} {{", quote(&format!("cluster_{list}")))?;
            writeln!(
                f,
                "        label={}; fontcolor=\"{}\"; color=\"{}\";",
                quote(list),
                s.name,
                s.border
            )?;
            for chunk in chunks {
                self.write_chunk(f, &chunk_id(chunk), chunk)?;
            }
            writeln!(f, "    }}")?;
        }
        Ok(())
    }

    fn write_edges(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    // edges")?;
        for e in self.graph.edges() {
            write!(
                f,
                "    {}:{} -> {}:{}",
                quote(&e.source.id()),
                quote(e.edge.from.name()),
                quote(&e.target.id()),
                quote(e.edge.to.name())
            )?;
            match e.edge.style {
                EdgeStyle::Normal => writeln!(f, ";")?,
                EdgeStyle::Invisible => writeln!(f, " [style=invis];")?,
            }
        }
        Ok(())
    }
}

impl Display for Dot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.style;
        writeln!(f, "digraph heap {{")?;
        writeln!(
            f,
            "    graph [bgcolor=\"{}\", rankdir=LR, nodesep={}, newrank=true];",
            s.background, s.node_sep
        )?;
        writeln!(f, "    node [shape=none, fontcolor=white];")?;
        writeln!(f, "    edge [color=\"{}\"];", s.edge)?;
        writeln!(f)?;
        self.write_heads(f)?;
        writeln!(f)?;
        self.write_lists(f)?;
        writeln!(f)?;
        self.write_edges(f)?;
        writeln!(f, "}}")
    }
}

/// A double-quoted `dot` id.
fn quote(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 2);
    out.push('"');
    for c in id.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Text escaped for an HTML-like label.
struct Html<'a>(&'a str);

impl Display for Html<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Text safe to put after `//` on a single line.
struct Comment<'a>(&'a str);

impl Display for Comment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            f.write_char(if c == '\n' || c == '\r' { ' ' } else { c })?;
        }
        Ok(())
    }
}
