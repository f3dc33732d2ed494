//! Serde helpers that carry `u128` token amounts as decimal strings.
//!
//! 18-decimal token amounts routinely exceed `u64`, and serde's buffered
//! (tagged-enum) path cannot hold 128-bit integers, so amounts never travel
//! as JSON numbers. Plain integers up to `u64::MAX` are still accepted on
//! input.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&amount.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    deserializer.deserialize_any(AmountVisitor)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer amount as a decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        v.trim().parse::<u128>().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(v as u128)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
        u128::try_from(v).map_err(E::custom)
    }
}

#[derive(Serialize, Deserialize)]
struct Wrapped(#[serde(with = "crate::amount")] u128);

/// Same encoding for maps of amounts keyed by anything serde can key a JSON
/// object with.
pub mod map {
    use super::*;

    pub fn serialize<K, S>(map: &BTreeMap<K, u128>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize + Ord,
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(k, v)| (k, Wrapped(*v))))
    }

    pub fn deserialize<'de, K, D>(deserializer: D) -> Result<BTreeMap<K, u128>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<K, Wrapped>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, Wrapped(v))| (k, v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "crate::amount")]
        amount: u128,
        #[serde(with = "crate::amount::map")]
        per_id: BTreeMap<u32, u128>,
    }

    #[test]
    fn test_amounts_travel_as_strings() {
        let mut per_id = BTreeMap::new();
        per_id.insert(7, u128::MAX);
        let h = Holder { amount: 10u128.pow(24), per_id };
        let json = serde_json::to_string(&h).unwrap();
        assert!(json.contains("\"1000000000000000000000000\""));
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_accepts_small_numbers() {
        let back: Holder = serde_json::from_str(r#"{"amount":42,"per_id":{"1":3}}"#).unwrap();
        assert_eq!(back.amount, 42);
        assert_eq!(back.per_id.get(&1), Some(&3));
    }

    #[test]
    fn test_rejects_negative() {
        assert!(serde_json::from_str::<Holder>(r#"{"amount":-1,"per_id":{}}"#).is_err());
        assert!(serde_json::from_str::<Holder>(r#"{"amount":"-1","per_id":{}}"#).is_err());
    }
}
