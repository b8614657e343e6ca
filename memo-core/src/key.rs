//! Cache key derivation.
//!
//! A cache key is `<identifier>_<canonical JSON of the arguments>`. The JSON
//! is canonical in the sense that object members are always emitted in
//! lexicographic key order, so two structurally equal argument values
//! produce the same key regardless of how their maps were built, and the
//! same key is produced again after a process restart.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CodecError;
use crate::finite::ensure_finite;

/// Separator between the identifier and the rendered arguments.
pub const KEY_SEPARATOR: char = '_';

/// A cache key uniquely identifying one (identifier, arguments) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-derived key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty. Derived keys never are.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the key and return the owned string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives cache keys from an identifier and call arguments.
///
/// Implementations must be total and deterministic: equal inputs (by value,
/// including argument order) map to equal keys, and distinct inputs map to
/// distinct keys.
pub trait KeyCodec: Send + Sync {
    /// Derive the key for `identifier` called with `args`.
    ///
    /// Fails with [`CodecError::UnserializableArgument`] when the arguments
    /// cannot be structurally serialized.
    fn derive_key<A>(&self, identifier: &str, args: &A) -> Result<CacheKey, CodecError>
    where
        A: Serialize + ?Sized;
}

/// Default key codec: identifier, `_`, canonical compact JSON.
///
/// Multiple arguments are passed as a tuple, which renders as a JSON array:
/// `derive_key("sum", &(2, 3))` yields `sum_[2,3]`.
///
/// Arguments containing NaN or an infinite float are rejected as
/// unserializable, since JSON would render them as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonKeyCodec;

impl JsonKeyCodec {
    pub fn new() -> Self {
        Self
    }
}

impl KeyCodec for JsonKeyCodec {
    fn derive_key<A>(&self, identifier: &str, args: &A) -> Result<CacheKey, CodecError>
    where
        A: Serialize + ?Sized,
    {
        let unserializable = |reason: String| CodecError::UnserializableArgument {
            identifier: identifier.to_string(),
            reason,
        };

        ensure_finite(args).map_err(|e| unserializable(e.to_string()))?;
        let value = serde_json::to_value(args).map_err(|e| unserializable(e.to_string()))?;
        let rendered =
            serde_json::to_string(&canonicalize(value)).map_err(|e| unserializable(e.to_string()))?;

        let mut key = String::with_capacity(identifier.len() + 1 + rendered.len());
        key.push_str(identifier);
        key.push(KEY_SEPARATOR);
        key.push_str(&rendered);
        Ok(CacheKey(key))
    }
}

/// Rebuild every object with its members sorted by key.
///
/// `serde_json::Map` is already ordered unless the `preserve_order` feature
/// is unified into the build, in which case it keeps insertion order.
/// Sorting explicitly keeps keys stable under both.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::ser::Error as _;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_sum_key_format() {
        let key = JsonKeyCodec.derive_key("sum", &(2, 3)).unwrap();
        assert_eq!(key.as_str(), "sum_[2,3]");
    }

    #[test]
    fn test_single_argument_tuple_renders_as_array() {
        let key = JsonKeyCodec.derive_key("user", &("alice",)).unwrap();
        assert_eq!(key.as_str(), r#"user_["alice"]"#);
    }

    #[test]
    fn test_no_arguments() {
        let key = JsonKeyCodec.derive_key("now", &()).unwrap();
        assert_eq!(key.as_str(), "now_null");

        let empty: [u8; 0] = [];
        let key = JsonKeyCodec.derive_key("now", &empty).unwrap();
        assert_eq!(key.as_str(), "now_[]");
    }

    #[test]
    fn test_argument_order_matters() {
        let a = JsonKeyCodec.derive_key("sub", &(5, 3)).unwrap();
        let b = JsonKeyCodec.derive_key("sub", &(3, 5)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_identifier_distinguishes_keys() {
        let a = JsonKeyCodec.derive_key("sum", &(2, 3)).unwrap();
        let b = JsonKeyCodec.derive_key("product", &(2, 3)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_map_insertion_order_does_not_matter() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("field{i}"), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("field{i}"), i);
        }

        let a = JsonKeyCodec.derive_key("lookup", &(&first,)).unwrap();
        let b = JsonKeyCodec.derive_key("lookup", &(&second,)).unwrap();
        assert_eq!(a, b);

        let ordered: BTreeMap<_, _> = first.into_iter().collect();
        let c = JsonKeyCodec.derive_key("lookup", &(&ordered,)).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_nested_struct_fields_are_sorted() {
        #[derive(Serialize)]
        struct Query {
            zeta: u32,
            alpha: Vec<&'static str>,
        }

        let key = JsonKeyCodec
            .derive_key("search", &(Query { zeta: 1, alpha: vec!["x"] },))
            .unwrap();
        assert_eq!(key.as_str(), r#"search_[{"alpha":["x"],"zeta":1}]"#);
    }

    #[test]
    fn test_non_string_map_keys_are_unserializable() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");

        let err = JsonKeyCodec.derive_key("pairs", &(map,)).unwrap_err();
        match err {
            CodecError::UnserializableArgument { identifier, .. } => {
                assert_eq!(identifier, "pairs")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failing_serialize_impl_is_unserializable() {
        struct LiveHandle;

        impl Serialize for LiveHandle {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("live handles cannot be serialized"))
            }
        }

        let err = JsonKeyCodec.derive_key("open", &(1, LiveHandle)).unwrap_err();
        assert!(err.to_string().contains("live handles cannot be serialized"));
    }

    #[test]
    fn test_non_finite_floats_are_unserializable() {
        let absent = JsonKeyCodec.derive_key("describe", &(None::<f64>,)).unwrap();
        assert_eq!(absent.as_str(), "describe_[null]");

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = JsonKeyCodec.derive_key("describe", &(Some(bad),)).unwrap_err();
            assert!(matches!(
                err,
                CodecError::UnserializableArgument { ref identifier, .. } if identifier == "describe"
            ));
        }

        let nested = JsonKeyCodec.derive_key("mean", &(vec![1.0f32, f32::NAN],));
        assert!(nested.is_err());
    }

    #[test]
    fn test_cache_key_accessors() {
        let key = CacheKey::new("sum_[2,3]");
        assert_eq!(key.len(), 9);
        assert!(!key.is_empty());
        assert_eq!(key.to_string(), "sum_[2,3]");
        assert_eq!(key.as_ref(), "sum_[2,3]");
        assert_eq!(key.into_string(), "sum_[2,3]");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: derivation is deterministic for equal inputs.
        #[test]
        fn prop_derivation_is_deterministic(
            id in "[a-z_]{0,12}",
            a in any::<i64>(),
            b in ".{0,16}",
            c in proptest::collection::vec(any::<u32>(), 0..8),
        ) {
            let first = JsonKeyCodec.derive_key(&id, &(a, &b, &c)).unwrap();
            let second = JsonKeyCodec.derive_key(&id, &(a, b.clone(), c.clone())).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Property: the key always starts with the identifier and separator.
        #[test]
        fn prop_key_is_prefixed_by_identifier(id in ".{0,24}", n in any::<u64>()) {
            let key = JsonKeyCodec.derive_key(&id, &(n,)).unwrap();
            let prefix = format!("{id}_");
            prop_assert!(key.as_str().starts_with(&prefix));
        }
    }
}
