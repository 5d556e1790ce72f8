//! Basic read/write behavior of the public cache surface

mod common;

use common::{reopen, test_cache, TestCacheBuilder};
use filecache::{CacheError, Ttl, Value, MAX_KEY_LENGTH};
use walkdir::WalkDir;

fn entry_file_count(root: &std::path::Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("cache"))
        .count()
}

#[test]
fn test_user_profile_lifecycle() {
    let (cache, _dir) = test_cache();
    let profile = Value::map([("name", "Ann")]);

    assert!(cache.set("user:1", profile.clone(), Ttl::Default).is_err());
    assert!(cache.set("user.1", profile.clone(), Ttl::Default).unwrap());
    assert_eq!(cache.get("user.1").unwrap(), Some(profile));
    assert!(cache.touch("user.1", 10).unwrap());

    let metadata = cache.get_metadata("user.1").unwrap().unwrap();
    assert!(metadata.size > 0);
    assert_eq!(metadata.key, "user.1");

    assert!(cache.delete("user.1").unwrap());
    assert_eq!(cache.get_or("user.1", ()).unwrap(), Value::Null);
}

#[test]
fn test_has_before_set_and_after_delete() {
    let (cache, _dir) = test_cache();

    assert!(!cache.has("session").unwrap());
    cache.set("session", "abc", Ttl::Never).unwrap();
    assert!(cache.has("session").unwrap());
    assert!(cache.delete("session").unwrap());
    assert!(!cache.has("session").unwrap());
    assert!(!cache.delete("session").unwrap());
}

#[test]
fn test_non_positive_ttl_is_expired_on_write() {
    let (cache, _dir) = test_cache();

    cache.set("zero", 1, 0).unwrap();
    cache.set("negative", 1, -30).unwrap();

    assert!(!cache.has("zero").unwrap());
    assert!(!cache.has("negative").unwrap());
    assert_eq!(cache.get("negative").unwrap(), None);
}

#[test]
fn test_invalid_keys_never_touch_disk() {
    let (cache, dir) = test_cache();
    let long_key = "k".repeat(300);
    assert!(long_key.len() > MAX_KEY_LENGTH);

    for key in ["", "user{1}", long_key.as_str()] {
        let err = cache.set(key, 1, Ttl::Never).unwrap_err();
        assert!(
            matches!(err, CacheError::InvalidKey { .. }),
            "unexpected error for {key:?}: {err}"
        );
    }
    assert_eq!(entry_file_count(dir.path()), 0);
}

#[test]
fn test_set_multiple_rejects_batch_with_bad_key() {
    let (cache, dir) = test_cache();

    let result = cache.set_multiple([("good", 1), ("bad:key", 2)], Ttl::Never);
    assert!(result.is_err());
    assert_eq!(entry_file_count(dir.path()), 0);
}

#[test]
fn test_multiple_operations_keep_order() {
    let (cache, _dir) = test_cache();
    cache
        .set_multiple([("b", 2), ("a", 1)], Ttl::Never)
        .unwrap();

    let values = cache.get_multiple(["b", "missing", "a"]).unwrap();
    let keys: Vec<&str> = values.keys().map(String::as_str).collect();
    assert_eq!(keys, ["b", "missing", "a"]);
    assert_eq!(values["b"], Some(Value::Int(2)));
    assert_eq!(values["missing"], None);

    let present = cache.has_multiple(["a", "missing"]).unwrap();
    assert!(present["a"]);
    assert!(!present["missing"]);

    let deleted = cache.delete_multiple(["a", "missing"]).unwrap();
    assert!(deleted["a"]);
    assert!(!deleted["missing"]);
}

#[test]
fn test_default_ttl_applies_to_plain_set() {
    let (cache, _dir) = TestCacheBuilder::new().default_ttl(60).build();

    cache.set("defaulted", 1, Ttl::Default).unwrap();
    cache.forever("pinned", 1).unwrap();

    let remaining = cache.ttl("defaulted").unwrap().unwrap().unwrap();
    assert!((59..=60).contains(&remaining));
    assert_eq!(cache.ttl("pinned").unwrap(), Some(None));
    assert_eq!(cache.ttl("missing").unwrap(), None);
}

#[test]
fn test_overwrite_replaces_value() {
    let (cache, _dir) = test_cache();

    cache.set("config", "v1", Ttl::Never).unwrap();
    cache.set("config", "v2", Ttl::Never).unwrap();
    assert_eq!(cache.get("config").unwrap(), Some(Value::from("v2")));
}

#[test]
fn test_touch_on_missing_or_expired_key() {
    let (cache, _dir) = test_cache();

    assert!(!cache.touch("missing", 10).unwrap());
    cache.set("stale", 1, -1).unwrap();
    assert!(!cache.touch("stale", 10).unwrap());
    assert!(!cache.has("stale").unwrap());
}

#[test]
fn test_handles_share_one_root() {
    let (cache, _dir) = TestCacheBuilder::new().sharded(2).build();
    let other = reopen(&cache);

    cache.set("shared", 42, Ttl::Never).unwrap();
    assert_eq!(other.get("shared").unwrap(), Some(Value::Int(42)));
    assert!(other.delete("shared").unwrap());
    assert!(!cache.has("shared").unwrap());
}

#[test]
fn test_truncated_entry_reads_as_miss_and_heals() {
    let (cache, _dir) = test_cache();
    cache.set("fragile", "some payload", Ttl::Never).unwrap();

    let path = cache.get_path("fragile").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    assert_eq!(cache.get("fragile").unwrap(), None);
    assert!(!path.exists());
}

#[test]
fn test_health_check_reports_writable_root() {
    let (cache, dir) = test_cache();
    let report = cache.health_check();

    assert!(report.healthy());
    assert_eq!(report.root, dir.path());
}
