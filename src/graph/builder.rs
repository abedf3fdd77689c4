use hashbrown::HashMap;
use log::debug;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::{
    addr::Address,
    analyze::{Analyzer, ChunkVisit, HeadVisit, PairVisit},
    config::{Conventions, EngineConfig},
    model::{Annotations, Chunk},
    reconcile::HeapModel,
};

use super::{EdgeStyle, GraphModel, Node, PointerEdge, Port};

#[derive(Clone, Copy)]
enum End {
    Heads,
    Chunk(usize),
}

struct PendingEdge {
    source: End,
    target: End,
    edge: PointerEdge,
}

/// The port an incoming pointer to `chunk` lands on. Cached lists link
/// through the first word of the data area, so their recorded pointers equal
/// the `fd` slot, not the chunk's structural start.
pub(crate) fn anchor(conventions: &Conventions, chunk: &Chunk) -> Port {
    if conventions.is_cached(&chunk.bin) {
        Port::FdPtr
    } else {
        Port::PrevSize
    }
}

/// Turn a reconciled model into a [`GraphModel`], running every check in
/// `analyzer` along the way.
///
/// Edges come out in this order:
///
/// 1. head -> chunk, for every head whose pointer equals a chunk's address
/// 2. per chunk: an invisible hint to the previous allocated chunk of the
///    same size (if hints are on), then `fd` and `bk` links to every chunk
///    they point at
pub fn build(model: HeapModel, analyzer: &Analyzer, config: &EngineConfig) -> GraphModel {
    let HeapModel { heads, chunks, .. } = model;
    let conventions = &config.conventions;
    let mut notes: Vec<Annotations> = chunks.iter().map(|c| c.annotations.clone()).collect();
    let mut pending: Vec<PendingEdge> = Vec::new();

    for (head, ptr) in heads.iter() {
        for k in 0..chunks.len() {
            let visit = HeadVisit {
                heads: &heads,
                head,
                ptr,
                chunks: &chunks,
                chunk: k,
            };
            analyzer.on_head(&visit, &mut notes[k]);
            if ptr == chunks[k].address {
                pending.push(PendingEdge {
                    source: End::Heads,
                    target: End::Chunk(k),
                    edge: PointerEdge {
                        from: Port::Head(head.to_owned()),
                        to: anchor(conventions, &chunks[k]),
                        style: EdgeStyle::Normal,
                    },
                });
            }
        }
    }

    let mut last_by_size: HashMap<Address, usize> = HashMap::new();
    for i in 0..chunks.len() {
        analyzer.on_chunk(
            &ChunkVisit {
                chunks: &chunks,
                current: i,
            },
            &mut notes[i],
        );

        if config.layout_hints && chunks[i].is_allocated() {
            if let Some(prev) = last_by_size.insert(chunks[i].chunk_size, i) {
                pending.push(PendingEdge {
                    source: End::Chunk(prev),
                    target: End::Chunk(i),
                    edge: PointerEdge {
                        from: Port::FdPtr,
                        to: Port::FdPtr,
                        style: EdgeStyle::Invisible,
                    },
                });
            }
        }

        for j in 0..chunks.len() {
            analyzer.on_pair(
                &PairVisit {
                    chunks: &chunks,
                    current: i,
                    candidate: j,
                },
                &mut notes[i],
            );
            let (current, candidate) = (&chunks[i], &chunks[j]);
            for (ptr, from) in [(current.fd, Port::FdPtr), (current.bk, Port::BkPtr)] {
                if ptr == candidate.address {
                    pending.push(PendingEdge {
                        source: End::Chunk(i),
                        target: End::Chunk(j),
                        edge: PointerEdge {
                            from,
                            to: anchor(conventions, candidate),
                            style: EdgeStyle::Normal,
                        },
                    });
                }
            }
        }
    }

    let mut graph: DiGraph<Node, PointerEdge> =
        DiGraph::with_capacity(chunks.len() + 1, pending.len());
    let heads_node = graph.add_node(Node::Heads);
    let chunk_nodes: Vec<NodeIndex> = chunks
        .into_iter()
        .zip(notes)
        .map(|(mut chunk, annotations)| {
            chunk.annotations = annotations;
            graph.add_node(Node::Chunk(chunk))
        })
        .collect();
    let resolve = |end: End| match end {
        End::Heads => heads_node,
        End::Chunk(i) => chunk_nodes[i],
    };
    for PendingEdge {
        source,
        target,
        edge,
    } in pending
    {
        graph.add_edge(resolve(source), resolve(target), edge);
    }

    debug!(
        "built graph: {} chunks, {} edges",
        chunk_nodes.len(),
        graph.edge_count()
    );

    GraphModel {
        graph,
        heads,
        heads_node,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        analyze::Check,
        model::{HeadTable, ALLOCATED},
        reconcile::ReconcileStats,
        snapshot::RawChunk,
    };

    fn chunk(list: &str, index: u64, address: u64, size: u64, fd: u64, bk: u64) -> Chunk {
        Chunk::from_raw(
            list,
            &RawChunk {
                index,
                address: Address(address),
                prev_size: Address(0),
                chunk_size: Address(size),
                a: false,
                m: false,
                p: true,
                fd: Address(fd),
                bk: Address(bk),
                allocated: None,
            },
        )
    }

    fn model(heads: &[(&str, u64)], chunks: Vec<Chunk>) -> HeapModel {
        let heads: Vec<(String, Address)> = heads
            .iter()
            .map(|&(name, ptr)| (name.to_owned(), Address(ptr)))
            .collect();
        let allocated = chunks.iter().filter(|c| c.is_allocated()).count();
        HeapModel {
            heads: HeadTable::new(&heads, allocated),
            chunks,
            stats: ReconcileStats::default(),
        }
    }

    fn edge_strings(graph: &GraphModel) -> Vec<String> {
        graph.edges().map(|e| e.to_string()).collect()
    }

    #[test]
    fn anchors_depend_on_destination_list() {
        let graph = build(
            model(
                &[("tcachebinshead1", 0x602010), ("fastbinshead1", 0x602100)],
                vec![
                    chunk("tcachebins1", 0, 0x602010, 0x20, 0x602100, 0),
                    chunk("fastbins1", 0, 0x602100, 0x20, 0x602010, 0),
                ],
            ),
            &Analyzer::new(),
            &EngineConfig::default(),
        );
        assert_eq!(
            edge_strings(&graph),
            [
                "heads:tcachebinshead1 -> tcachebins1_0:fdPtr",
                "heads:fastbinshead1 -> fastbins1_0:prevSize",
                "tcachebins1_0:fdPtr -> fastbins1_0:prevSize",
                "fastbins1_0:fdPtr -> tcachebins1_0:fdPtr",
            ]
        );
    }

    #[test]
    fn doubly_linked_lists_get_both_directions() {
        let graph = build(
            model(
                &[("unsortedbinshead1", 0x603000)],
                vec![
                    chunk("unsortedbins1", 0, 0x603000, 0x90, 0x604000, 0x604000),
                    chunk("unsortedbins1", 1, 0x604000, 0x90, 0x603000, 0x603000),
                ],
            ),
            &Analyzer::new(),
            &EngineConfig::default(),
        );
        assert_eq!(
            edge_strings(&graph),
            [
                "heads:unsortedbinshead1 -> unsortedbins1_0:prevSize",
                "unsortedbins1_0:fdPtr -> unsortedbins1_1:prevSize",
                "unsortedbins1_0:bkPtr -> unsortedbins1_1:prevSize",
                "unsortedbins1_1:fdPtr -> unsortedbins1_0:prevSize",
                "unsortedbins1_1:bkPtr -> unsortedbins1_0:prevSize",
            ]
        );
    }

    #[test]
    fn every_match_is_emitted() {
        // two chunks share nothing but both point at the third
        let graph = build(
            model(
                &[],
                vec![
                    chunk("fastbins1", 0, 0x1000, 0x20, 0x3000, 0),
                    chunk("fastbins2", 0, 0x2000, 0x20, 0x3000, 0),
                    chunk("fastbins3", 0, 0x3000, 0x20, 0, 0),
                ],
            ),
            &Analyzer::new(),
            &EngineConfig::default(),
        );
        assert_eq!(graph.nr_edges(), 2);
    }

    #[test]
    fn layout_hints_chain_same_size_allocated_chunks() {
        let chunks = vec![
            chunk(ALLOCATED, 0, 0x1000, 0x20, 0, 0),
            chunk(ALLOCATED, 1, 0x1020, 0x30, 0, 0),
            chunk(ALLOCATED, 2, 0x1050, 0x20, 0, 0),
            chunk("fastbins1", 0, 0x1070, 0x20, 0, 0),
            chunk(ALLOCATED, 4, 0x1090, 0x20, 0, 0),
        ];
        let graph = build(
            model(&[], chunks.clone()),
            &Analyzer::new(),
            &EngineConfig::default(),
        );
        assert_eq!(
            edge_strings(&graph),
            [
                "allocated_0:fdPtr -> allocated_2:fdPtr (hint)",
                "allocated_2:fdPtr -> allocated_4:fdPtr (hint)",
            ]
        );

        let graph = build(
            model(&[], chunks),
            &Analyzer::new(),
            &EngineConfig::default().with_layout_hints(false),
        );
        assert_eq!(graph.nr_edges(), 0);
    }

    /// Counts (head, init, pair) hook calls and tags every pair it sees.
    struct Counting(Arc<Mutex<(usize, usize, usize)>>);

    impl Check for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn on_head(&self, _: &HeadVisit<'_>, _: &mut Annotations) {
            self.0.lock().unwrap().0 += 1;
        }

        fn on_chunk(&self, _: &ChunkVisit<'_>, _: &mut Annotations) {
            self.0.lock().unwrap().1 += 1;
        }

        fn on_pair(&self, _: &PairVisit<'_>, notes: &mut Annotations) {
            self.0.lock().unwrap().2 += 1;
            notes.push("seen", crate::model::Color::WARNING);
        }
    }

    #[test]
    fn hooks_run_for_every_pair_and_never_change_edges() {
        let chunks = vec![
            chunk("fastbins1", 0, 0x1000, 0x20, 0x2000, 0),
            chunk("fastbins1", 1, 0x2000, 0x20, 0, 0),
            chunk(ALLOCATED, 0, 0x3000, 0x20, 0, 0),
        ];
        let heads = [("fastbinshead1", 0x1000), ("smallbinshead1", 0x9000)];
        let counts = Arc::new(Mutex::new((0, 0, 0)));
        let analyzer = Analyzer::new().with(Counting(counts.clone()));

        let plain = build(
            model(&heads, chunks.clone()),
            &Analyzer::new(),
            &EngineConfig::default(),
        );
        let checked = build(model(&heads, chunks), &analyzer, &EngineConfig::default());

        assert_eq!(*counts.lock().unwrap(), (2 * 3, 3, 3 * 3));
        assert_eq!(edge_strings(&plain), edge_strings(&checked));
        assert!(checked.chunks().all(|c| c.annotations.rows.len() == 3));
    }
}
