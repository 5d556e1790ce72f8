//! Lazy expiry and garbage collection of aged entries

mod common;

use common::{test_cache, TestCacheBuilder};
use filecache::{Ttl, Value};
use std::thread;
use std::time::Duration;

#[test]
fn test_short_ttl_entries_expire_and_are_collected() {
    let (cache, _dir) = TestCacheBuilder::new().sharded(1).build();

    for i in 0..3 {
        cache.set(&format!("short.{i}"), i, 1).unwrap();
    }
    cache.set("long", "kept", 3600).unwrap();
    cache.forever("pinned", "kept").unwrap();

    thread::sleep(Duration::from_millis(1100));

    for i in 0..3 {
        let key = format!("short.{i}");
        assert!(cache.is_expired(&key).unwrap());
        assert!(!cache.has(&key).unwrap());
    }

    assert!(cache.gc(true).unwrap() >= 3);
    assert_eq!(cache.get("long").unwrap(), Some(Value::from("kept")));
    assert_eq!(cache.get("pinned").unwrap(), Some(Value::from("kept")));
    assert_eq!(cache.get_item_count(), 2);
}

#[test]
fn test_expired_read_removes_the_file() {
    let (cache, _dir) = test_cache();
    cache.set("gone", 1, -1).unwrap();
    let path = cache.get_path("gone").unwrap();
    assert!(path.exists());
    assert!(cache.is_expired("gone").unwrap());

    assert_eq!(cache.get("gone").unwrap(), None);
    assert!(!path.exists());
    assert!(!cache.is_expired("gone").unwrap());
}

#[test]
fn test_touch_extends_lifetime() {
    let (cache, _dir) = test_cache();
    cache.set("session", "token", 1).unwrap();
    assert!(cache.touch("session", Ttl::Never).unwrap());

    thread::sleep(Duration::from_millis(1100));
    assert_eq!(cache.get("session").unwrap(), Some(Value::from("token")));
    assert_eq!(cache.ttl("session").unwrap(), Some(None));
}

#[test]
fn test_touch_keeps_value_and_tags() {
    let (cache, _dir) = test_cache();
    cache.tags(["sessions"]).set("session", "token", 60).unwrap();

    assert!(cache.touch("session", 120).unwrap());
    assert_eq!(cache.get("session").unwrap(), Some(Value::from("token")));
    assert_eq!(
        cache.get_tags("session").unwrap(),
        Some(vec!["sessions".to_string()])
    );
    let remaining = cache.ttl("session").unwrap().unwrap().unwrap();
    assert!(remaining > 60);
}

#[test]
fn test_duration_ttl() {
    let (cache, _dir) = test_cache();
    cache.set("report", 1, Duration::from_secs(300)).unwrap();

    let remaining = cache.ttl("report").unwrap().unwrap().unwrap();
    assert!((299..=300).contains(&remaining));
}

#[test]
fn test_gc_skips_live_entries() {
    let (cache, _dir) = test_cache();
    cache.set("a", 1, 60).unwrap();
    cache.set("b", 2, Ttl::Never).unwrap();

    assert_eq!(cache.gc(true).unwrap(), 0);
    assert_eq!(cache.get_item_count(), 2);
}
