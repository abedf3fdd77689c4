use std::fmt;

use serde::{Serialize, Serializer};

use crate::{
    addr::Address,
    serialize::serde_bit,
    snapshot::RawChunk,
};

/// Label given to walk entries that turned out not to be on any free list.
pub const ALLOCATED: &str = "allocated";

/// A 24-bit RGB colour, printed as `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color(u32);

impl Color {
    pub const ALERT: Self = Self::rgb(0xd0, 0x2d, 0x2d);
    pub const OK: Self = Self::rgb(0x44, 0xcc, 0x54);
    pub const WARNING: Self = Self::rgb(0xe4, 0x9f, 0x33);
    pub const ALERT_BACKGROUND: Self = Self::rgb(0x7e, 0x1e, 0x1e);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// The colour used to show a single flag bit
    pub const fn for_bit(bit: bool) -> Self {
        if bit {
            Self::OK
        } else {
            Self::ALERT
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub text: String,
    pub color: Color,
}

/// Extra rows drawn under a chunk, plus an optional background override.
/// Only integrity checks write these.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Annotations {
    pub rows: Vec<Annotation>,
    pub background: Option<Color>,
}

impl Annotations {
    pub fn push(&mut self, text: impl Into<String>, color: Color) {
        self.rows.push(Annotation {
            text: text.into(),
            color,
        });
    }

    /// Add a row in the alert colour and paint the whole node as alerted.
    pub fn alert(&mut self, text: impl Into<String>) {
        self.push(text, Color::ALERT);
        self.background = Some(Color::ALERT_BACKGROUND);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.background.is_none()
    }
}

/// Where a chunk record came from: `list[index]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChunkKey {
    pub list: String,
    pub index: u64,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.list, self.index)
    }
}

/// A reconciled chunk: the collector's record plus its final label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Source list name, or [`ALLOCATED`] for retained walk entries
    pub bin: String,
    pub index: u64,
    pub address: Address,
    pub prev_size: Address,
    pub chunk_size: Address,
    #[serde(serialize_with = "serde_bit::serialize")]
    pub a: bool,
    #[serde(serialize_with = "serde_bit::serialize")]
    pub m: bool,
    #[serde(serialize_with = "serde_bit::serialize")]
    pub p: bool,
    pub fd: Address,
    pub bk: Address,
    /// Other records at the same address that were folded into this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<ChunkKey>,
    pub annotations: Annotations,
}

impl Chunk {
    pub fn from_raw(bin: impl Into<String>, raw: &RawChunk) -> Self {
        Self {
            bin: bin.into(),
            index: raw.index,
            address: raw.address,
            prev_size: raw.prev_size,
            chunk_size: raw.chunk_size,
            a: raw.a,
            m: raw.m,
            p: raw.p,
            fd: raw.fd,
            bk: raw.bk,
            aliases: Vec::new(),
            annotations: Annotations::default(),
        }
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            list: self.bin.clone(),
            index: self.index,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.bin == ALLOCATED
    }
}

/// Head name -> pointer in display order, plus the derived allocated count.
/// The walk head is never in here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HeadTable {
    #[serde(with = "crate::serialize::ordered")]
    pub pointers: Vec<(String, Address)>,
    pub allocated: usize,
}

impl HeadTable {
    pub fn new(heads: &[(String, Address)], allocated: usize) -> Self {
        Self {
            pointers: heads.to_vec(),
            allocated,
        }
    }

    pub fn get(&self, name: &str) -> Option<Address> {
        self.pointers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ptr)| *ptr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.pointers.iter().map(|(name, ptr)| (name.as_str(), *ptr))
    }

    /// Every row, pointer heads first and the `allocated` count last.
    pub fn rows(&self) -> impl Iterator<Item = (&str, String)> {
        self.iter()
            .map(|(name, ptr)| (name, ptr.to_string()))
            .chain(std::iter::once((ALLOCATED, self.allocated.to_string())))
    }
}
