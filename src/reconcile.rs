//! Sorting the raw chunk walk into allocated and free chunks.
//!
//! The collector sends every chunk on the heap twice over: once in the walk
//! list (in address order, no idea what's free) and once more in whichever
//! free list it currently sits on. A walk entry that also shows up on a free
//! list is dropped in favour of the free-list record; everything left over is
//! allocated.

use hashbrown::HashMap;
use log::{debug, warn};

use crate::{
    addr::Address,
    config::{Conventions, EngineConfig, ReconcileStrategy},
    model::{Chunk, ChunkKey, HeadTable, ALLOCATED},
    snapshot::{HeapSnapshot, RawChunk},
};

/// How the walk list was split up this tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub walk_total: usize,
    /// Walk entries kept and relabelled [`ALLOCATED`]
    pub retained: usize,
    /// Walk entries dropped because a free list (or an earlier walk entry)
    /// already accounts for them
    pub discarded: usize,
    /// Records of any list folded into an earlier record at the same address
    pub folded: usize,
}

/// The per-tick model the graph is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapModel {
    pub heads: HeadTable,
    /// Final chunks in list order; no two share an address
    pub chunks: Vec<Chunk>,
    pub stats: ReconcileStats,
}

/// Test if walk entry `walk` and free-list entry `free` describe the same
/// chunk. Cached lists record the data address, which sits `cached_offset`
/// bytes past the chunk start, so only `free - offset` is tried, never
/// `free + offset`.
pub fn same_chunk(walk: Address, free: Address, free_is_cached: bool, cached_offset: u64) -> bool {
    walk == free || (free_is_cached && free.checked_sub(cached_offset) == Some(walk))
}

/// Build this tick's [`HeapModel`]. Pure: the snapshot is only read, and the
/// same snapshot always gives the same model.
pub fn reconcile(snapshot: &HeapSnapshot, config: &EngineConfig) -> HeapModel {
    let conventions = &config.conventions;
    let walk = snapshot.walk(conventions);
    let keep = match config.strategy {
        ReconcileStrategy::Computed => computed_allocated(snapshot, conventions, walk, |_| None),
        ReconcileStrategy::Trust => {
            computed_allocated(snapshot, conventions, walk, |raw| raw.allocated)
        }
    };

    let mut stats = ReconcileStats {
        walk_total: walk.len(),
        ..ReconcileStats::default()
    };

    // every surviving record in list order, flagged if it's a kept walk entry
    let mut entries: Vec<(Chunk, bool)> = Vec::with_capacity(snapshot.nr_chunks());
    let mut walk_seen = false;
    for (list, raws) in snapshot.bins.iter() {
        // a repeated walk list name can't happen (keys are folded on decode),
        // but only the first one is ever the walk
        let is_walk = conventions.is_walk_list(list) && !walk_seen;
        walk_seen |= is_walk;
        for (i, raw) in raws.iter().enumerate() {
            if !is_walk {
                entries.push((Chunk::from_raw(list.as_str(), raw), false));
            } else if keep[i] {
                entries.push((Chunk::from_raw(ALLOCATED, raw), true));
            } else {
                stats.discarded += 1;
            }
        }
    }

    // Which record owns each address. A kept walk entry beats any free-list
    // record, so the outcome doesn't depend on the order lists were sent in.
    let mut owner: HashMap<Address, usize> = HashMap::new();
    for (i, (chunk, from_walk)) in entries.iter().enumerate() {
        match owner.get(&chunk.address) {
            Some(&o) if *from_walk && !entries[o].1 => {
                owner.insert(chunk.address, i);
            }
            Some(_) => {}
            None => {
                owner.insert(chunk.address, i);
            }
        }
    }

    let mut aliases: HashMap<usize, Vec<ChunkKey>> = HashMap::new();
    for (i, (chunk, from_walk)) in entries.iter().enumerate() {
        let o = owner[&chunk.address];
        if o == i {
            continue;
        }
        warn!(
            "{} shares address {} with {}, folding",
            chunk.key(),
            chunk.address,
            entries[o].0.key()
        );
        stats.folded += 1;
        if *from_walk {
            stats.discarded += 1;
        }
        aliases.entry(o).or_default().push(chunk.key());
    }

    let mut chunks: Vec<Chunk> = Vec::with_capacity(owner.len());
    for (i, (mut chunk, from_walk)) in entries.into_iter().enumerate() {
        if owner[&chunk.address] != i {
            continue;
        }
        if from_walk {
            stats.retained += 1;
        }
        chunk.aliases = aliases.remove(&i).unwrap_or_default();
        chunks.push(chunk);
    }

    debug!(
        "reconciled {} walk entries: {} allocated, {} discarded, {} folded",
        stats.walk_total, stats.retained, stats.discarded, stats.folded
    );

    HeapModel {
        heads: HeadTable::new(&snapshot.heads, stats.retained),
        chunks,
        stats,
    }
}

/// For each walk entry, decide whether it stays (`true`) as an allocated
/// chunk. `preset` can short-circuit the decision for a single entry;
/// otherwise the entry stays unless some free-list entry is the same chunk.
///
/// This is O(walk * free), which is fine at debugging scale.
fn computed_allocated<F>(
    snapshot: &HeapSnapshot,
    conventions: &Conventions,
    walk: &[RawChunk],
    preset: F,
) -> Vec<bool>
where
    F: Fn(&RawChunk) -> Option<bool>,
{
    let free: Vec<(Address, bool)> = snapshot
        .bins
        .iter()
        .filter(|(list, _)| !conventions.is_walk_list(list))
        .flat_map(|(list, raws)| {
            let cached = conventions.is_cached(list);
            raws.iter().map(move |raw| (raw.address, cached))
        })
        .collect();

    walk.iter()
        .map(|w| {
            preset(w).unwrap_or_else(|| {
                !free.iter().any(|&(address, cached)| {
                    same_chunk(w.address, address, cached, conventions.cached_offset)
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(index: u64, address: u64, size: u64, fd: u64) -> RawChunk {
        RawChunk {
            index,
            address: Address(address),
            prev_size: Address(0),
            chunk_size: Address(size),
            a: false,
            m: false,
            p: true,
            fd: Address(fd),
            bk: Address(0),
            allocated: None,
        }
    }

    fn snapshot(bins: Vec<(&str, Vec<RawChunk>)>) -> HeapSnapshot {
        HeapSnapshot {
            heads: vec![("tcachebinshead1".to_owned(), Address(0x602010))],
            walk_head: Some("all".to_owned()),
            bins: bins
                .into_iter()
                .map(|(name, raws)| (name.to_owned(), raws))
                .collect(),
        }
    }

    #[test]
    fn cached_offset_only_goes_down() {
        assert!(same_chunk(Address(0x1000), Address(0x1000), false, 16));
        assert!(same_chunk(Address(0x1000), Address(0x1010), true, 16));
        assert!(!same_chunk(Address(0x1000), Address(0x1010), false, 16));
        assert!(!same_chunk(Address(0x1010), Address(0x1000), true, 16));
        assert!(!same_chunk(Address(0x0), Address(0x8), true, 16));
    }

    #[test]
    fn walk_entries_on_free_lists_are_discarded() {
        let snap = snapshot(vec![
            ("tcachebins1", vec![raw(0, 0x602010, 0x20, 0)]),
            ("fastbins1", vec![raw(0, 0x602040, 0x20, 0)]),
            (
                "allchunks",
                vec![
                    raw(0, 0x602000, 0x20, 0),
                    raw(1, 0x602020, 0x20, 0),
                    raw(2, 0x602040, 0x20, 0),
                ],
            ),
        ]);
        let model = reconcile(&snap, &EngineConfig::default());
        assert_eq!(model.stats.walk_total, 3);
        assert_eq!(model.stats.retained, 1);
        assert_eq!(model.stats.discarded, 2);
        assert_eq!(model.heads.allocated, 1);

        let labels: Vec<(&str, u64)> = model
            .chunks
            .iter()
            .map(|c| (c.bin.as_str(), c.address.get()))
            .collect();
        assert_eq!(
            labels,
            [
                ("tcachebins1", 0x602010),
                ("fastbins1", 0x602040),
                (ALLOCATED, 0x602020),
            ]
        );
    }

    #[test]
    fn non_cached_lists_never_use_the_offset() {
        let snap = snapshot(vec![
            ("smallbins1", vec![raw(0, 0x602010, 0x90, 0)]),
            ("allchunks", vec![raw(0, 0x602000, 0x20, 0)]),
        ]);
        let model = reconcile(&snap, &EngineConfig::default());
        assert_eq!(model.heads.allocated, 1);
        assert_eq!(model.chunks.len(), 2);
    }

    #[test]
    fn no_walk_means_zero_allocated() {
        let snap = snapshot(vec![("fastbins1", vec![raw(0, 0x602040, 0x20, 0)])]);
        let model = reconcile(&snap, &EngineConfig::default());
        assert_eq!(model.heads.allocated, 0);
        assert_eq!(model.stats, ReconcileStats::default());
        assert_eq!(model.chunks.len(), 1);
    }

    #[test]
    fn trust_uses_collector_flag_and_falls_back() {
        let mut on_list_but_allocated = raw(0, 0x602000, 0x20, 0);
        on_list_but_allocated.allocated = Some(true);
        let mut marked_free = raw(1, 0x602100, 0x20, 0);
        marked_free.allocated = Some(false);
        let unmarked = raw(2, 0x602200, 0x20, 0);
        let snap = snapshot(vec![
            ("unsortedbins1", vec![raw(0, 0x602300, 0x90, 0)]),
            (
                "allchunks",
                vec![on_list_but_allocated, marked_free, unmarked],
            ),
        ]);

        let config = EngineConfig::default().with_strategy(ReconcileStrategy::Trust);
        let model = reconcile(&snap, &config);
        let allocated: Vec<u64> = model
            .chunks
            .iter()
            .filter(|c| c.is_allocated())
            .map(|c| c.address.get())
            .collect();
        assert_eq!(allocated, [0x602000, 0x602200]);
        assert_eq!(model.heads.allocated, 2);
    }

    #[test]
    fn trusted_chunk_keeps_its_address_whatever_the_list_order() {
        let mut flagged = raw(0, 0x602000, 0x20, 0);
        flagged.allocated = Some(true);
        let free = raw(0, 0x602000, 0x20, 0);
        let config = EngineConfig::default().with_strategy(ReconcileStrategy::Trust);

        let free_first = reconcile(
            &snapshot(vec![
                ("fastbins1", vec![free.clone()]),
                ("allchunks", vec![flagged.clone()]),
            ]),
            &config,
        );
        let walk_first = reconcile(
            &snapshot(vec![
                ("allchunks", vec![flagged]),
                ("fastbins1", vec![free]),
            ]),
            &config,
        );

        for model in [&free_first, &walk_first] {
            assert_eq!(model.chunks.len(), 1);
            assert_eq!(model.chunks[0].bin, ALLOCATED);
            assert_eq!(model.chunks[0].aliases[0].to_string(), "fastbins1[0]");
            assert_eq!(model.heads.allocated, 1);
            assert_eq!(model.stats.retained, 1);
            assert_eq!(model.stats.discarded, 0);
            assert_eq!(model.stats.folded, 1);
        }
    }

    #[test]
    fn same_address_on_two_free_lists_is_folded() {
        let snap = snapshot(vec![
            ("fastbins1", vec![raw(0, 0x602040, 0x20, 0)]),
            ("unsortedbins1", vec![raw(0, 0x602040, 0x20, 0)]),
        ]);
        let model = reconcile(&snap, &EngineConfig::default());
        assert_eq!(model.chunks.len(), 1);
        assert_eq!(model.stats.folded, 1);
        assert_eq!(model.chunks[0].aliases[0].to_string(), "unsortedbins1[0]");
    }

    #[test]
    fn duplicate_walk_entries_keep_counts_consistent() {
        let snap = snapshot(vec![(
            "allchunks",
            vec![raw(0, 0x602000, 0x20, 0), raw(1, 0x602000, 0x20, 0)],
        )]);
        let model = reconcile(&snap, &EngineConfig::default());
        assert_eq!(model.stats.retained, 1);
        assert_eq!(model.stats.discarded, 1);
        assert_eq!(model.heads.allocated, 1);
    }

    #[test]
    fn is_idempotent() {
        let snap = snapshot(vec![
            ("tcachebins1", vec![raw(0, 0x602010, 0x20, 0x602010)]),
            ("allchunks", vec![raw(0, 0x602000, 0x20, 0), raw(1, 0x602020, 0x30, 0)]),
        ]);
        let config = EngineConfig::default();
        let before = snap.clone();
        assert_eq!(reconcile(&snap, &config), reconcile(&snap, &config));
        assert_eq!(snap, before);
    }
}
