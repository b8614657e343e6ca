//! Result value encoding.
//!
//! Persisted results are encoded to bytes before they reach the store and
//! decoded on the way out. Decoding happens into the caller's result type,
//! so a record written for one shape and read back as another surfaces as
//! [`CodecError::Undecodable`], which the engine treats as a miss.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::finite::ensure_finite;

/// Bidirectional codec between result values and stored bytes.
///
/// For every value `v` the codec accepts, `decode(encode(v)) == v`.
pub trait ValueCodec: Send + Sync {
    /// Encode a result for storage.
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized;

    /// Decode a stored record into the caller's result type.
    fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned;
}

/// JSON value codec.
///
/// Floats round-trip exactly. Results containing NaN or an infinite float
/// are rejected with [`CodecError::UnserializableResult`] rather than stored
/// as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueCodec;

impl JsonValueCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ValueCodec for JsonValueCodec {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        let unserializable = |reason: String| CodecError::UnserializableResult { reason };

        ensure_finite(value).map_err(|e| unserializable(e.to_string()))?;
        serde_json::to_vec(value).map_err(|e| unserializable(e.to_string()))
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Undecodable {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        name: String,
        tags: Vec<String>,
        score: Option<f64>,
    }

    #[test]
    fn test_struct_round_trip() {
        let profile = Profile {
            id: 7,
            name: "ada".to_string(),
            tags: vec!["admin".to_string()],
            score: Some(0.1 + 0.2),
        };

        let bytes = JsonValueCodec.encode(&profile).unwrap();
        let decoded: Profile = JsonValueCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn test_absent_value_round_trips() {
        let bytes = JsonValueCodec.encode(&Option::<u32>::None).unwrap();
        assert_eq!(bytes, b"null");
        let decoded: Option<u32> = JsonValueCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_garbage_is_undecodable() {
        let err = JsonValueCodec.decode::<u32>(b"\x00\xffnot json").unwrap_err();
        assert!(matches!(err, CodecError::Undecodable { .. }));
    }

    #[test]
    fn test_shape_mismatch_is_undecodable() {
        let bytes = JsonValueCodec.encode(&"five").unwrap();
        let err = JsonValueCodec.decode::<u32>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Undecodable { .. }));
    }

    #[test]
    fn test_non_finite_float_is_unserializable() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = JsonValueCodec.encode(&bad).unwrap_err();
            assert!(matches!(err, CodecError::UnserializableResult { .. }));
        }

        let profile = Profile {
            id: 1,
            name: "nan".to_string(),
            tags: Vec::new(),
            score: Some(f64::NAN),
        };
        assert!(matches!(
            JsonValueCodec.encode(&profile),
            Err(CodecError::UnserializableResult { .. })
        ));
    }

    #[test]
    fn test_unserializable_result() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1u8);
        let err = JsonValueCodec.encode(&map).unwrap_err();
        assert!(matches!(err, CodecError::UnserializableResult { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        /// Property: decode(encode(v)) == v for finite floats.
        #[test]
        fn prop_float_round_trip(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
            let bytes = JsonValueCodec.encode(&f).unwrap();
            let decoded: f64 = JsonValueCodec.decode(&bytes).unwrap();
            prop_assert_eq!(decoded.to_bits(), f.to_bits());
        }

        /// Property: decode(encode(v)) == v for nested collections.
        #[test]
        fn prop_collection_round_trip(
            v in proptest::collection::vec(
                (any::<i64>(), ".{0,12}", proptest::option::of(any::<bool>())),
                0..16,
            )
        ) {
            let bytes = JsonValueCodec.encode(&v).unwrap();
            let decoded: Vec<(i64, String, Option<bool>)> = JsonValueCodec.decode(&bytes).unwrap();
            prop_assert_eq!(decoded, v);
        }
    }
}
