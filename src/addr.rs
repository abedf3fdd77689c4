use std::{fmt, num::ParseIntError, str::FromStr};

use serde::{Serialize, Serializer};

/// A 64-bit value read out of allocator metadata. Pointers, sizes and
/// `prev_size` fields all use this, so comparisons are always numeric and
/// never depend on how the collector happened to spell the hex string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("empty address")]
    Empty,
    #[error("`{value}` is not a hex address: {source}")]
    NotHex {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

impl Address {
    pub const NULL: Self = Self(0);

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `self - offset`, or `None` if that would wrap below zero.
    pub fn checked_sub(self, offset: u64) -> Option<Self> {
        self.0.checked_sub(offset).map(Self)
    }

    /// Test if `ptr` lands strictly inside `[self, self + size)`. A pointer
    /// equal to `self` is a normal link to the chunk, not an interior pointer,
    /// so it is excluded.
    pub fn strictly_contains(self, size: Address, ptr: Address) -> bool {
        // saturate so a garbage size at the top of the address space can't wrap
        let end = self.0.saturating_add(size.0);
        ptr.0 > self.0 && ptr.0 < end
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(AddressParseError::Empty);
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|source| AddressParseError::NotHex {
                value: s.to_owned(),
                source,
            })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Always written as a `0x`-prefixed hex string, matching what the collector
/// sends.
impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
