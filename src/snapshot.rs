//! Decoding a collector snapshot into typed records.
//!
//! ```json
//! {
//!   "heads": { "tcachebinshead1": "0x602010", "allchunkshead": "all" },
//!   "bins": {
//!     "tcachebins1": [
//!       { "index": 0, "address": "0x602010", "prevSize": "0x0",
//!         "chunkSize": "0x20", "a": 0, "m": 0, "p": 1,
//!         "fd": "0x0", "bk": "0x0" }
//!     ],
//!     "allchunks": [ ... ]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    addr::{Address, AddressParseError},
    config::Conventions,
    model::ALLOCATED,
    serialize::{ordered, serde_bit, serde_hex, serde_index},
};

/// One chunk record exactly as the collector reported it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChunk {
    /// Position within its source list
    #[serde(with = "serde_index")]
    pub index: u64,
    #[serde(with = "serde_hex")]
    pub address: Address,
    /// Often left out by collectors; reads as zero
    #[serde(default, with = "serde_hex")]
    pub prev_size: Address,
    /// Size with the flag bits already masked off
    #[serde(with = "serde_hex")]
    pub chunk_size: Address,
    /// `NON_MAIN_ARENA`
    #[serde(with = "serde_bit")]
    pub a: bool,
    /// `IS_MMAPPED`
    #[serde(with = "serde_bit")]
    pub m: bool,
    /// `PREV_INUSE`
    #[serde(with = "serde_bit")]
    pub p: bool,
    #[serde(with = "serde_hex")]
    pub fd: Address,
    #[serde(with = "serde_hex")]
    pub bk: Address,
    /// Only present when the collector worked out allocation state itself
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serde_bit::serialize_option",
        deserialize_with = "serde_bit::deserialize_option"
    )]
    pub allocated: Option<bool>,
}

/// Wire shape: heads are kept as raw strings until we know which one is the
/// walk head, whose value is a placeholder rather than an address.
#[derive(Deserialize)]
struct Wire {
    #[serde(deserialize_with = "ordered::deserialize")]
    heads: Vec<(String, String)>,
    #[serde(deserialize_with = "ordered::deserialize")]
    bins: Vec<(String, Vec<RawChunk>)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapSnapshot {
    /// Head name -> pointer, in the collector's order, walk head excluded
    pub heads: Vec<(String, Address)>,
    /// The walk head's raw value, if the collector sent one
    pub walk_head: Option<String>,
    /// List name -> chunks, in the collector's order
    pub bins: Vec<(String, Vec<RawChunk>)>,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("head `{name}`: {source}")]
    InvalidHead {
        name: String,
        #[source]
        source: AddressParseError,
    },
    /// A head or list called `allocated` would collide with the derived
    /// allocated row and chunk ids.
    #[error("`{0}` is a reserved name")]
    ReservedName(String),
}

impl HeapSnapshot {
    /// Decode `payload`. Any missing field, wrongly shaped field or non-hex
    /// address fails the whole snapshot.
    pub fn parse(payload: &str, conventions: &Conventions) -> Result<Self, ParseError> {
        let wire: Wire = serde_json::from_str(payload)?;
        let mut heads = Vec::with_capacity(wire.heads.len());
        let mut walk_head = None;
        for (name, value) in wire.heads {
            if name == conventions.walk_head {
                walk_head = Some(value);
                continue;
            }
            if name == ALLOCATED {
                return Err(ParseError::ReservedName(name));
            }
            match value.parse::<Address>() {
                Ok(ptr) => heads.push((name, ptr)),
                Err(source) => return Err(ParseError::InvalidHead { name, source }),
            }
        }
        if let Some((name, _)) = wire
            .bins
            .iter()
            .find(|(name, _)| name == ALLOCATED && !conventions.is_walk_list(name))
        {
            return Err(ParseError::ReservedName(name.clone()));
        }
        Ok(Self {
            heads,
            walk_head,
            bins: wire.bins,
        })
    }

    /// The unfiltered chunk walk, or an empty slice when the collector didn't
    /// send one.
    pub fn walk<'a>(&'a self, conventions: &Conventions) -> &'a [RawChunk] {
        self.bins
            .iter()
            .find(|(name, _)| conventions.is_walk_list(name))
            .map(|(_, chunks)| chunks.as_slice())
            .unwrap_or(&[])
    }

    pub fn nr_chunks(&self) -> usize {
        self.bins.iter().map(|(_, chunks)| chunks.len()).sum()
    }
}
