//! Single-flight behavior of the keyed cache under real concurrency.

use pagefetch_runtime::config::CacheConfig;
use pagefetch_runtime::KeyedCache;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CALLERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_computation() {
    let cache: Arc<KeyedCache<String, String>> = Arc::new(KeyedCache::new(&CacheConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_compute("picnob:user:lisa:C1:html", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok("<div class=\"view\">detail</div>".to_string())
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(
            handle.await.unwrap().unwrap(),
            "<div class=\"view\">detail</div>"
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().computations, 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_is_shared_and_not_cached() {
    let cache: Arc<KeyedCache<String, String>> = Arc::new(KeyedCache::new(&CacheConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_compute("k", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err::<String, _>("navigation failed".to_string())
                    })
                    .await
            })
        })
        .collect();

    let mut errors = Vec::new();
    for handle in handles {
        errors.push(handle.await.unwrap().unwrap_err());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(errors.iter().all(|e| Arc::ptr_eq(e, &errors[0])));
    assert_eq!(*errors[0], "navigation failed");
    assert!(cache.is_empty());

    // The next call computes again.
    let value = cache
        .get_or_compute("k", || async { Ok("second try".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "second try");
    assert_eq!(cache.stats().computations, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_compute_independently() {
    let cache: Arc<KeyedCache<String, String>> = Arc::new(KeyedCache::new(&CacheConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                let key = format!("src:user:id:{}:html", i % 4);
                cache
                    .get_or_compute(&key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(format!("item-{}", i % 4))
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(cache.len(), 4);
}

#[tokio::test]
async fn test_compute_may_read_the_cache_it_fills() {
    let cache: Arc<KeyedCache<String, String>> = Arc::new(KeyedCache::new(&CacheConfig::default()));
    let inner = Arc::clone(&cache);

    let value = cache
        .get_or_compute("k", move || {
            // Runs while "k" is in flight; must not block on the entry.
            let seen = inner.get("k");
            let pending = inner.stats().pending;
            async move { Ok(format!("seen={seen:?} pending={pending}")) }
        })
        .await
        .unwrap();

    assert_eq!(value, "seen=None pending=1");
    assert_eq!(cache.get("k").as_deref(), Some("seen=None pending=1"));
}
