//! Lenient deserializers for the loosely typed JSON the REST API returns.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// Accepts `true`, `1`, `"1"` and `"true"` as true; everything else is false.
pub fn bool_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<RawFlag>::deserialize(deserializer)? {
        Some(RawFlag::Bool(b)) => b,
        Some(RawFlag::Int(i)) => i != 0,
        Some(RawFlag::Str(s)) => matches!(s.as_str(), "1" | "true"),
        None => false,
    })
}

/// Reads an optional reference id where `0`, `""` and `null` mean "none".
pub fn optional_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<crate::RemoteId>, D::Error> {
    Ok(Option::<crate::RemoteId>::deserialize(deserializer)?
        .filter(|id| !id.as_str().is_empty() && id.as_str() != "0"))
}

/// Accepts a small integer either as a number or as a numeric string.
pub fn small_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    match RawFlag::deserialize(deserializer)? {
        RawFlag::Int(i) => u8::try_from(i).map_err(serde::de::Error::custom),
        RawFlag::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        RawFlag::Bool(b) => Ok(u8::from(b)),
    }
}
