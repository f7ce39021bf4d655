//! In-memory storage backend implementation.
//!
//! [`MemoryBackend`] is an in-memory implementation of
//! [`StorageBackend`] suitable for testing and development.
//!
//! - **Thread-safe**: uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: keys live in a [`BTreeMap`] so prefix listing is an
//!   ordered range scan
//!
//! Data is not persisted; all data is lost when the process exits.

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{backend::StorageBackend, error::StorageResult};

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory storage backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the backend holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

/// Smallest key strictly greater than every key starting with `prefix`,
/// or `None` if the prefix is all 0xFF bytes (range is unbounded above).
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let data = self.data.read();
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write();
        data.insert(key, Bytes::from(value));
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let data = self.data.read();
        let lower = Bound::Included(prefix.to_vec());
        let upper = match prefix_upper_bound(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Ok(data.range((lower, upper)).map(|(k, _)| k.clone()).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_put_round_trip() {
        let backend = MemoryBackend::new();

        backend.put(b"greeting".to_vec(), b"hello".to_vec()).await.unwrap();
        let value = backend.get(b"greeting").await.unwrap();

        assert_eq!(value, Some(Bytes::from("hello")));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get(b"absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let backend = MemoryBackend::new();

        backend.put(b"k".to_vec(), b"v1".to_vec()).await.unwrap();
        backend.put(b"k".to_vec(), b"v2".to_vec()).await.unwrap();

        assert_eq!(backend.get(b"k").await.unwrap(), Some(Bytes::from("v2")));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = MemoryBackend::new();

        backend.put(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        backend.delete(b"k").await.unwrap();
        assert_eq!(backend.get(b"k").await.unwrap(), None);

        // Deleting again is not an error.
        backend.delete(b"k").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let backend = MemoryBackend::new();

        backend.put(b"role/alpha".to_vec(), b"1".to_vec()).await.unwrap();
        backend.put(b"role/beta".to_vec(), b"2".to_vec()).await.unwrap();
        backend.put(b"config/authority".to_vec(), b"3".to_vec()).await.unwrap();

        let keys = backend.list_prefix(b"role/").await.unwrap();
        assert_eq!(keys, vec![b"role/alpha".to_vec(), b"role/beta".to_vec()]);
    }

    #[tokio::test]
    async fn test_list_prefix_empty_prefix_returns_all() {
        let backend = MemoryBackend::new();

        backend.put(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        backend.put(b"b".to_vec(), b"2".to_vec()).await.unwrap();

        let keys = backend.list_prefix(b"").await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_list_prefix_excludes_adjacent_keys() {
        let backend = MemoryBackend::new();

        // "role0" sorts immediately after every "role/..." key ('0' > '/').
        backend.put(b"role/x".to_vec(), b"1".to_vec()).await.unwrap();
        backend.put(b"role0".to_vec(), b"2".to_vec()).await.unwrap();
        backend.put(b"rold".to_vec(), b"3".to_vec()).await.unwrap();

        let keys = backend.list_prefix(b"role/").await.unwrap();
        assert_eq!(keys, vec![b"role/x".to_vec()]);
    }

    #[tokio::test]
    async fn test_list_prefix_all_ff_prefix() {
        let backend = MemoryBackend::new();

        backend.put(vec![0xFF, 0xFF, 0x01], b"1".to_vec()).await.unwrap();
        backend.put(vec![0x01], b"2".to_vec()).await.unwrap();

        let keys = backend.list_prefix(&[0xFF, 0xFF]).await.unwrap();
        assert_eq!(keys, vec![vec![0xFF, 0xFF, 0x01]]);
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();

        backend.put(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        assert_eq!(clone.get(b"k").await.unwrap(), Some(Bytes::from("v")));
    }
}
