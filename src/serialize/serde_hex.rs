//! `#[serde(with = "serde_hex")]` for [`Address`] fields: the collector writes
//! every pointer and size as a `0x`-prefixed hex string, and anything else
//! (bare integers included) is rejected.

use std::fmt;

use serde::{de::Visitor, Deserializer, Serializer};

use crate::addr::Address;

pub fn serialize<S>(value: &Address, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    struct V;

    impl<'de> Visitor<'de> for V {
        type Value = Address;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a hex address string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            v.parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_str(V)
}
