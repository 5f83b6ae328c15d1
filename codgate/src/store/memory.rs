//! In-memory object store.
//!
//! Holds objects in a map and counts every call, which makes it the store
//! of choice for tests that need to assert how often the gateway touched
//! the cache. Failures can be switched on per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use super::traits::{BoxFuture, ObjectStore, StoreError};

/// Object store kept entirely in memory.
pub struct MemoryObjectStore {
    base_url: String,
    objects: Mutex<HashMap<String, Bytes>>,
    heads: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
    fail_heads: AtomicBool,
    fail_puts: AtomicBool,
}

impl MemoryObjectStore {
    /// Create an empty store whose public URLs start with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            heads: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            fail_heads: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
        }
    }

    /// Seed an object without counting it as a put.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.objects.lock().insert(key.into(), body.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).cloned()
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Make every existence probe fail with a transport error.
    pub fn set_fail_heads(&self, fail: bool) {
        self.fail_heads.store(fail, Ordering::SeqCst);
    }

    /// Make every put fail with an HTTP 500.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

impl ObjectStore for MemoryObjectStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn head_exists(&self, key: &str, _bust_token: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_heads.load(Ordering::SeqCst) {
            Err(StoreError::Transport("simulated probe failure".to_string()))
        } else {
            Ok(self.contains(key))
        };
        Box::pin(async move { result })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Bytes, StoreError>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let result = self
            .object(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()));
        Box::pin(async move { result })
    }

    fn put(&self, key: &str, body: Bytes) -> BoxFuture<'_, Result<(), StoreError>> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_puts.load(Ordering::SeqCst) {
            Err(StoreError::Http {
                status: 500,
                url: self.public_url(key),
            })
        } else {
            self.insert(key, body);
            Ok(())
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryObjectStore::new("https://cache.test");
        store
            .put("level-1/abc_adm2.kml", Bytes::from_static(b"<kml/>"))
            .await
            .unwrap();

        assert!(store.head_exists("level-1/abc_adm2.kml", "t").await.unwrap());
        assert_eq!(
            store.get("level-1/abc_adm2.kml").await.unwrap(),
            Bytes::from_static(b"<kml/>")
        );
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.head_count(), 1);
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_is_not_counted() {
        let store = MemoryObjectStore::new("https://cache.test");
        store.insert("k", Bytes::from_static(b"v"));
        assert!(store.contains("k"));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let store = MemoryObjectStore::new("https://cache.test");
        store.set_fail_heads(true);
        store.set_fail_puts(true);

        assert!(store.head_exists("k", "t").await.is_err());
        assert!(store.put("k", Bytes::from_static(b"v")).await.is_err());
        assert!(!store.contains("k"));
    }

    #[test]
    fn test_public_url() {
        let store = MemoryObjectStore::new("https://cache.test/");
        assert_eq!(store.public_url("a/b.kml"), "https://cache.test/a/b.kml");
    }
}
