//! In-process [`DocumentStore`].

use std::collections::BTreeMap;
use std::future::{Future, ready};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::{Cas, Document, DocumentStore};
use crate::error::{Error, Result};

/// Shared in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, Document>,
    last_cas: u64,
    injected_conflicts: u32,
}

impl Inner {
    fn next_cas(&mut self) -> Cas {
        self.last_cas += 1;
        Cas(self.last_cas)
    }

    /// Consume one injected conflict, if any are queued.
    fn take_injected(&mut self, key: &str) -> Result<()> {
        if self.injected_conflicts > 0 {
            self.injected_conflicts -= 1;
            return Err(conflict(key));
        }
        Ok(())
    }
}

fn conflict(key: &str) -> Box<Error> {
    tracing::debug!(target: "netloc::store", { store.key = key }, "cas mismatch");
    Error::Conflict { key: key.to_string() }.boxed()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` conditional writes (insert, replace, remove
    /// with a token) fail with `Conflict`, as if another writer got there
    /// first.
    pub fn inject_conflicts(&self, count: u32) {
        self.inner.lock().unwrap().injected_conflicts += count;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Document>>> + Send {
        ready(Ok(self.inner.lock().unwrap().docs.get(key).cloned()))
    }

    fn insert(&self, key: &str, value: Bytes) -> impl Future<Output = Result<Cas>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = inner.take_injected(key).and_then(|()| {
            if inner.docs.contains_key(key) {
                return Err(conflict(key));
            }
            let cas = inner.next_cas();
            inner.docs.insert(key.to_string(), Document { value, cas });
            Ok(cas)
        });
        ready(result)
    }

    fn replace(&self, key: &str, value: Bytes, cas: Cas) -> impl Future<Output = Result<Cas>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = inner.take_injected(key).and_then(|()| {
            match inner.docs.get(key) {
                Some(doc) if doc.cas == cas => {}
                _ => return Err(conflict(key)),
            }
            let cas = inner.next_cas();
            inner.docs.insert(key.to_string(), Document { value, cas });
            Ok(cas)
        });
        ready(result)
    }

    fn upsert(&self, key: &str, value: Bytes) -> impl Future<Output = Result<Cas>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let cas = inner.next_cas();
        inner.docs.insert(key.to_string(), Document { value, cas });
        ready(Ok(cas))
    }

    fn remove(&self, key: &str, cas: Option<Cas>) -> impl Future<Output = Result<bool>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = match cas {
            None => Ok(inner.docs.remove(key).is_some()),
            Some(cas) => inner.take_injected(key).and_then(|()| match inner.docs.get(key) {
                None => Ok(false),
                Some(doc) if doc.cas == cas => Ok(inner.docs.remove(key).is_some()),
                Some(_) => Err(conflict(key)),
            }),
        };
        ready(result)
    }

    fn scan_prefix(&self, prefix: &str) -> impl Future<Output = Result<Vec<(String, Document)>>> + Send {
        let inner = self.inner.lock().unwrap();
        let found = inner
            .docs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect();
        ready(Ok(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cas_discipline() {
        let store = MemoryStore::new();
        let v1 = store.insert("k", Bytes::from_static(b"1")).await.unwrap();
        assert!(store.insert("k", Bytes::from_static(b"x")).await.unwrap_err().is_conflict());

        let v2 = store.replace("k", Bytes::from_static(b"2"), v1).await.unwrap();
        assert_ne!(v1, v2);
        assert!(store.replace("k", Bytes::from_static(b"3"), v1).await.unwrap_err().is_conflict());
        assert!(store.remove("k", Some(v1)).await.unwrap_err().is_conflict());

        let doc = store.get("k").await.unwrap().unwrap();
        assert_eq!((&doc.value[..], doc.cas), (&b"2"[..], v2));
        assert!(store.remove("k", Some(v2)).await.unwrap());
        assert!(store.replace("k", Bytes::new(), v2).await.unwrap_err().is_conflict());
        assert!(!store.remove("k", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix_in_key_order() {
        let store = MemoryStore::new();
        for key in ["swport-b", "macuser-x", "swport-a", "swportx"] {
            store.upsert(key, Bytes::new()).await.unwrap();
        }
        let keys: Vec<_> = store.scan_prefix("swport-").await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["swport-a", "swport-b"]);
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MemoryStore::new();
        store.inject_conflicts(1);
        assert!(store.insert("k", Bytes::new()).await.unwrap_err().is_conflict());
        assert!(store.insert("k", Bytes::new()).await.is_ok());
        store.upsert("k", Bytes::new()).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
