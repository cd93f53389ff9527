use super::*;

#[test]
fn test_put_then_get() {
    let cache: LruTtlCache<String, String> = LruTtlCache::new(10, Duration::from_secs(60));

    cache.put("key1".to_string(), "value1".to_string());
    assert_eq!(cache.get(&"key1".to_string()), Some("value1".to_string()));
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_get_miss() {
    let cache: LruTtlCache<String, u32> = LruTtlCache::new(10, Duration::from_secs(60));
    assert_eq!(cache.get(&"nonexistent".to_string()), None);
}

#[test]
fn test_capacity_evicts_exactly_the_lru_entry() {
    let cache: LruTtlCache<String, u32> = LruTtlCache::new(3, Duration::from_secs(60));

    cache.put("key1".to_string(), 1);
    cache.put("key2".to_string(), 2);
    cache.put("key3".to_string(), 3);

    // Touch key1 so key2 becomes least-recently used
    assert_eq!(cache.get(&"key1".to_string()), Some(1));

    cache.put("key4".to_string(), 4);

    assert_eq!(cache.size(), 3);
    assert_eq!(cache.get(&"key2".to_string()), None);
    assert_eq!(cache.get(&"key1".to_string()), Some(1));
    assert_eq!(cache.get(&"key4".to_string()), Some(4));
}

#[test]
fn test_ttl_expiration() {
    let cache: LruTtlCache<String, u32> = LruTtlCache::new(10, Duration::from_millis(50));

    cache.put("key1".to_string(), 1);
    assert_eq!(cache.get(&"key1".to_string()), Some(1));

    std::thread::sleep(Duration::from_millis(80));

    // Expired entry reads as a miss and is removed
    assert_eq!(cache.get(&"key1".to_string()), None);
    assert_eq!(cache.size(), 0);
}

#[test]
fn test_cleanup_expired() {
    let cache: LruTtlCache<String, u32> = LruTtlCache::new(10, Duration::from_millis(50));

    cache.put("key1".to_string(), 1);
    cache.put("key2".to_string(), 2);

    std::thread::sleep(Duration::from_millis(80));
    cache.put("key3".to_string(), 3);

    let removed = cache.cleanup_expired();
    assert_eq!(removed, 2);
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.get(&"key3".to_string()), Some(3));
}

#[test]
fn test_clear() {
    let cache: LruTtlCache<String, u32> = LruTtlCache::new(10, Duration::from_secs(60));

    cache.put("key1".to_string(), 1);
    cache.put("key2".to_string(), 2);
    assert_eq!(cache.size(), 2);

    cache.clear();
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.get(&"key1".to_string()), None);
}

#[test]
fn test_put_overwrites_existing_key() {
    let cache: LruTtlCache<String, u32> = LruTtlCache::new(10, Duration::from_secs(60));

    cache.put("key1".to_string(), 1);
    cache.put("key1".to_string(), 2);

    assert_eq!(cache.size(), 1);
    assert_eq!(cache.get(&"key1".to_string()), Some(2));
}

#[test]
fn test_concurrent_access() {
    use std::sync::Arc;

    let cache: Arc<LruTtlCache<u32, u32>> = Arc::new(LruTtlCache::new(100, Duration::from_secs(60)));
    let mut handles = Vec::new();

    for t in 0..4 {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                let key = t * 50 + i;
                cache.put(key, key);
                assert_eq!(cache.get(&key), Some(key));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.size(), 100);
}
