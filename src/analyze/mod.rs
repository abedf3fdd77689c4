//! Heuristic integrity checks, run as a side channel while the pointer graph
//! is built.
//!
//! A [`Check`] gets a read-only view of what the builder is looking at and a
//! mutable handle to one chunk's [`Annotations`]. It can't see or change the
//! edges, so adding a check never changes the shape of the graph.
//!
//! These are hints, not a verifier: the built-ins only follow `fd` links.

mod checks;

pub use checks::{DoubleFree, DuplicateLink, FdOverlap};

use crate::{
    addr::Address,
    model::{Annotations, Chunk, HeadTable},
};

/// A head being compared against a chunk.
pub struct HeadVisit<'a> {
    pub heads: &'a HeadTable,
    pub head: &'a str,
    pub ptr: Address,
    pub chunks: &'a [Chunk],
    /// Index of the chunk in `chunks` being compared
    pub chunk: usize,
}

impl HeadVisit<'_> {
    pub fn target(&self) -> &Chunk {
        &self.chunks[self.chunk]
    }
}

/// A chunk about to have its outgoing links resolved.
pub struct ChunkVisit<'a> {
    pub chunks: &'a [Chunk],
    pub current: usize,
}

impl ChunkVisit<'_> {
    pub fn target(&self) -> &Chunk {
        &self.chunks[self.current]
    }
}

/// An ordered `(current, candidate)` pair. `current == candidate` is visited
/// too.
pub struct PairVisit<'a> {
    pub chunks: &'a [Chunk],
    pub current: usize,
    pub candidate: usize,
}

impl PairVisit<'_> {
    pub fn current(&self) -> &Chunk {
        &self.chunks[self.current]
    }

    pub fn candidate(&self) -> &Chunk {
        &self.chunks[self.candidate]
    }

    pub fn is_self(&self) -> bool {
        self.current == self.candidate
    }
}

/// One heuristic. Every hook defaults to doing nothing, so a check only
/// implements the ones it needs. Hooks must not fail; finding nothing simply
/// means writing nothing.
pub trait Check {
    fn name(&self) -> &'static str;

    /// Once per `(head, chunk)` pair. `notes` belongs to the chunk.
    fn on_head(&self, _visit: &HeadVisit<'_>, _notes: &mut Annotations) {}

    /// Once per chunk, before any of its pairs. `notes` belongs to
    /// `visit.current`.
    fn on_chunk(&self, _visit: &ChunkVisit<'_>, _notes: &mut Annotations) {}

    /// Once per ordered chunk pair. `notes` belongs to `visit.current`.
    fn on_pair(&self, _visit: &PairVisit<'_>, _notes: &mut Annotations) {}
}

/// The registry of checks run for every tick.
#[derive(Default)]
pub struct Analyzer {
    checks: Vec<Box<dyn Check + Send>>,
}

impl Analyzer {
    /// No checks at all
    pub fn new() -> Self {
        Self::default()
    }

    /// [`DoubleFree`], [`FdOverlap`] and [`DuplicateLink`]
    pub fn with_builtin() -> Self {
        Self::new()
            .with(DoubleFree)
            .with(FdOverlap)
            .with(DuplicateLink)
    }

    pub fn with<C>(mut self, check: C) -> Self
    where
        C: Check + Send + 'static,
    {
        self.register(check);
        self
    }

    pub fn register<C>(&mut self, check: C)
    where
        C: Check + Send + 'static,
    {
        self.checks.push(Box::new(check));
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().map(|c| c.name())
    }

    pub fn on_head(&self, visit: &HeadVisit<'_>, notes: &mut Annotations) {
        for check in &self.checks {
            check.on_head(visit, notes);
        }
    }

    pub fn on_chunk(&self, visit: &ChunkVisit<'_>, notes: &mut Annotations) {
        for check in &self.checks {
            check.on_chunk(visit, notes);
        }
    }

    pub fn on_pair(&self, visit: &PairVisit<'_>, notes: &mut Annotations) {
        for check in &self.checks {
            check.on_pair(visit, notes);
        }
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
