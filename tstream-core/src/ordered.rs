//! Order-preserving deserialization of JSON objects into `Vec<(String, T)>`.
//!
//! Property tables are ordered documents: declared order drives output order,
//! rename precedence and tag precedence.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

pub(crate) fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries: Vec<(String, T)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, T>()? {
                match entries.iter_mut().find(|entry| entry.0 == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

/// [`deserialize`] for an optional field; pair with `#[serde(default)]`.
pub(crate) fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<Vec<(String, T)>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Doc {
        #[serde(deserialize_with = "super::deserialize")]
        entries: Vec<(String, u32)>,
    }

    #[derive(Deserialize)]
    struct OptionalDoc {
        #[serde(default, deserialize_with = "super::deserialize_some")]
        entries: Option<Vec<(String, String)>>,
    }

    #[test]
    fn test_optional_entries() {
        let doc: OptionalDoc = json5::from_str("{ entries: { b: 'x', a: 'y' } }").unwrap();
        assert_eq!(
            doc.entries,
            Some(vec![("b".to_string(), "x".to_string()), ("a".to_string(), "y".to_string())])
        );

        let empty: OptionalDoc = json5::from_str("{}").unwrap();
        assert_eq!(empty.entries, None);
    }

    #[test]
    fn test_keeps_document_order() {
        let doc: Doc = json5::from_str("{ entries: { zeta: 1, alpha: 2, mid: 3 } }").unwrap();
        let keys: Vec<_> = doc.entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_key_keeps_first_position() {
        let doc: Doc = serde_json::from_str(r#"{"entries": {"a": 1, "b": 2, "a": 3}}"#).unwrap();
        assert_eq!(doc.entries, vec![("a".to_string(), 3), ("b".to_string(), 2)]);
    }
}
