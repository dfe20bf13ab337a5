//! Shared serde helpers.
//!
//! The persisted checkpoint stores every 256-bit quantity as a decimal
//! string (`"79228162514264337593543950336"`), not the hex form alloy's
//! own serde impls produce. `Decimal` is a thin wrapper enforcing that.

use std::fmt;

use alloy::primitives::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A `U256` serialized as a base-10 string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Decimal(pub U256);

impl From<U256> for Decimal {
    fn from(value: U256) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for U256 {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct DecimalVisitor;

impl Visitor<'_> for DecimalVisitor {
    type Value = Decimal;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a base-10 integer string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
        U256::from_str_radix(v, 10)
            .map(Decimal)
            .map_err(|e| E::custom(format!("invalid decimal integer {v:?}: {e}")))
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        deserializer.deserialize_str(DecimalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_roundtrip() {
        let value = Decimal(U256::from(2u8).pow(U256::from(96u8)));
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"79228162514264337593543950336\"");
        let back: Decimal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_decimal_rejects_hex() {
        let parsed: Result<Decimal, _> = serde_json::from_str("\"0x10\"");
        assert!(parsed.is_err());
    }
}
