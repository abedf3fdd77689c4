use crate::model::{Annotations, Color};

use super::{Check, ChunkVisit, PairVisit};

/// A free chunk whose `fd` points back at itself: walking the list loops
/// forever, which is what freeing the same chunk twice in a row leaves behind.
pub struct DoubleFree;

impl Check for DoubleFree {
    fn name(&self) -> &'static str {
        "double-free"
    }

    fn on_chunk(&self, visit: &ChunkVisit<'_>, notes: &mut Annotations) {
        let chunk = visit.target();
        if chunk.fd == chunk.address {
            notes.alert("Infinite loop, possible double free");
        }
    }
}

/// `fd` lands strictly inside another chunk's `[address, address + size)`.
/// Pointing exactly at the start is an ordinary link.
pub struct FdOverlap;

impl Check for FdOverlap {
    fn name(&self) -> &'static str {
        "fd-overlap"
    }

    fn on_pair(&self, visit: &PairVisit<'_>, notes: &mut Annotations) {
        if visit.is_self() {
            return;
        }
        let (current, candidate) = (visit.current(), visit.candidate());
        if candidate
            .address
            .strictly_contains(candidate.chunk_size, current.fd)
        {
            notes.alert(format!(
                "Possible overlap, fd points inside chunk {}",
                candidate.key()
            ));
        }
    }
}

/// The same address was reported by more than one list.
pub struct DuplicateLink;

impl Check for DuplicateLink {
    fn name(&self) -> &'static str {
        "duplicate-link"
    }

    fn on_chunk(&self, visit: &ChunkVisit<'_>, notes: &mut Annotations) {
        for alias in &visit.target().aliases {
            notes.push(format!("Also linked from {alias}"), Color::WARNING);
        }
    }
}
