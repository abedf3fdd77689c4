//! Single-bit chunk flags. Older collectors stringify everything, so `1`,
//! `"1"` and `true` all read as set.

use std::fmt;

use serde::{de::Visitor, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(*value as u8)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(BitVisitor)
}

pub fn serialize_option<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(bit) => serializer.serialize_some(&(*bit as u8)),
        None => serializer.serialize_none(),
    }
}

/// Missing and `null` both read as `None`; pair with `#[serde(default)]`.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Bit(bool);

    impl<'de> Deserialize<'de> for Bit {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(BitVisitor).map(Bit)
        }
    }

    Ok(Option::<Bit>::deserialize(deserializer)?.map(|bit| bit.0))
}

struct BitVisitor;

impl<'de> Visitor<'de> for BitVisitor {
    type Value = bool;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a flag bit (0 or 1)")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(v)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match v {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(E::custom(format_args!("flag bit out of range: {v}"))),
        }
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format_args!("flag bit out of range: {v}"))),
        }
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match v.trim() {
            "0" | "False" | "false" => Ok(false),
            "1" | "True" | "true" => Ok(true),
            other => Err(E::custom(format_args!("not a flag bit: {other:?}"))),
        }
    }
}
