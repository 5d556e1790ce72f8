//! Property tests for value round-trips, key validation and path layout

mod common;

use common::TestCacheBuilder;
use filecache::paths::resolve;
use filecache::{CacheKey, CompressionAlgorithm, Ttl, Value, RESERVED_CHARACTERS};
use proptest::prelude::*;
use std::path::Path;

fn arb_key() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9._-]{1,64}"
}

fn arb_value(float: BoxedStrategy<f64>) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        float.prop_map(Value::Float),
        ".{0,40}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::vec(("[a-z]{1,8}", inner.clone()), 0..6).prop_map(Value::map),
            ("[A-Z][a-z]{0,8}", prop::collection::vec(("[a-z]{1,8}", inner), 0..4))
                .prop_map(|(class, fields)| Value::object(class, fields)),
        ]
    })
}

/// Any finite float; bincode stores the exact bits
fn native_value() -> impl Strategy<Value = Value> {
    arb_value(any::<f64>().prop_filter("finite", |f| f.is_finite()).boxed())
}

/// Floats whose decimal form parses back exactly
fn json_value() -> impl Strategy<Value = Value> {
    arb_value((-4096i32..4096).prop_map(|n| f64::from(n) / 8.0).boxed())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn native_round_trips_exactly(key in arb_key(), value in native_value()) {
        let (cache, _dir) = TestCacheBuilder::new().build();
        cache.set(&key, value.clone(), Ttl::Never).unwrap();
        prop_assert_eq!(cache.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn json_round_trips_objects_as_maps(key in arb_key(), value in json_value()) {
        let (cache, _dir) = TestCacheBuilder::new().json().build();
        cache.set(&key, value.clone(), Ttl::Never).unwrap();
        let expected = Value::from_json(value.to_json());
        prop_assert_eq!(cache.get(&key).unwrap(), Some(expected));
    }

    #[test]
    fn compressed_entries_round_trip(
        key in arb_key(),
        value in native_value(),
        gzip in any::<bool>(),
        min_size in 0usize..256,
    ) {
        let algorithm = if gzip { CompressionAlgorithm::Gzip } else { CompressionAlgorithm::Zstd };
        let (cache, _dir) = TestCacheBuilder::new()
            .sharded(2)
            .compressed(algorithm, min_size)
            .build();
        cache.set(&key, value.clone(), Ttl::Never).unwrap();
        prop_assert_eq!(cache.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn expired_writes_are_never_visible(key in arb_key(), ttl in -10_000i64..=0) {
        let (cache, _dir) = TestCacheBuilder::new().build();
        cache.set(&key, 1, ttl).unwrap();
        prop_assert!(!cache.has(&key).unwrap());
    }

    #[test]
    fn keys_with_reserved_characters_are_rejected(
        prefix in "[a-z]{0,10}",
        index in 0..RESERVED_CHARACTERS.len(),
        suffix in "[a-z]{0,10}",
    ) {
        let key = format!("{prefix}{}{suffix}", RESERVED_CHARACTERS[index]);
        prop_assert!(key.validate().is_err());
    }

    #[test]
    fn sharded_paths_are_deterministic(key in arb_key(), depth in 1usize..=4) {
        let root = Path::new("/cache");
        let first = resolve(root, &key, true, depth);
        prop_assert_eq!(&first, &resolve(root, &key, true, depth));

        let relative = first.strip_prefix(root).unwrap();
        prop_assert_eq!(relative.components().count(), depth + 1);
        let flat = resolve(root, &key, false, depth);
        prop_assert_eq!(first.file_name(), flat.file_name());
    }
}
