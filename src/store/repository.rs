//! Typed JSON documents over a [`DocumentStore`].

use std::future::Future;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Cas, Document, DocumentStore};
use crate::error::{Error, Result};
use crate::retry::Retry;

/// A decoded document and the version it was read at. `cas` is `None` for
/// a value that has never been stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub cas: Option<Cas>,
}

impl<T> Versioned<T> {
    pub fn new(value: T) -> Self {
        Self { value, cas: None }
    }

    pub fn is_stored(&self) -> bool {
        self.cas.is_some()
    }
}

/// JSON codec plus conflict retry over a store.
#[derive(Debug, Clone)]
pub struct Repository<S> {
    store: S,
    retry: Retry,
}

impl<S: DocumentStore> Repository<S> {
    pub fn new(store: S, retry: Retry) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Versioned<T>>> {
        match self.store.get(key).await? {
            Some(doc) => decode(key, doc).map(Some),
            None => Ok(None),
        }
    }

    /// The stored value, or `init()` marked as never stored.
    pub async fn get_or_else<T: DeserializeOwned>(&self, key: &str, init: impl FnOnce() -> T) -> Result<Versioned<T>> {
        Ok(self.get(key).await?.unwrap_or_else(|| Versioned::new(init())))
    }

    /// Write back a value read through this repository: insert when it was
    /// never stored, otherwise replace at the version it was read at.
    pub async fn save<T: Serialize>(&self, key: &str, doc: &Versioned<T>) -> Result<Cas> {
        let value = encode(key, &doc.value)?;
        match doc.cas {
            None => self.store.insert(key, value).await,
            Some(cas) => self.store.replace(key, value, cas).await,
        }
    }

    /// Unconditional write, for records with no read-modify-write.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<Cas> {
        self.store.upsert(key, encode(key, value)?).await
    }

    pub async fn remove(&self, key: &str, cas: Option<Cas>) -> Result<bool> {
        self.store.remove(key, cas).await
    }

    pub async fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<Versioned<T>>> {
        self.store
            .scan_prefix(prefix)
            .await?
            .into_iter()
            .map(|(key, doc)| decode(&key, doc))
            .collect()
    }

    /// Run a read-modify-write under the conflict-retry policy.
    pub async fn with_conflict_retry<T, F, Fut>(&self, key: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry.run(key, op).await
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Bytes> {
    serde_json::to_vec(value).map(Bytes::from).map_err(|source| {
        Error::Serialization {
            key: key.to_string(),
            source,
        }
        .boxed()
    })
}

fn decode<T: DeserializeOwned>(key: &str, doc: Document) -> Result<Versioned<T>> {
    let value = serde_json::from_slice(&doc.value).map_err(|source| {
        tracing::warn!(target: "netloc::store", { store.key = key, error = %source }, "undecodable document");
        Error::Serialization {
            key: key.to_string(),
            source,
        }
        .boxed()
    })?;
    Ok(Versioned {
        value,
        cas: Some(doc.cas),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        hits: u32,
    }

    fn repo() -> Repository<MemoryStore> {
        Repository::new(MemoryStore::new(), Retry::none())
    }

    #[tokio::test]
    async fn test_save_inserts_then_replaces() {
        let repo = repo();
        let mut doc = repo.get_or_else("count-1", || Counter { hits: 0 }).await.unwrap();
        assert!(!doc.is_stored());
        doc.value.hits += 1;
        repo.save("count-1", &doc).await.unwrap();

        let mut stored: Versioned<Counter> = repo.get("count-1").await.unwrap().unwrap();
        stored.value.hits += 1;
        repo.save("count-1", &stored).await.unwrap();

        // the stale copy lost the race
        assert!(repo.save("count-1", &stored).await.unwrap_err().is_conflict());
        assert!(repo.save("count-1", &doc).await.unwrap_err().is_conflict());
        let now: Versioned<Counter> = repo.get("count-1").await.unwrap().unwrap();
        assert_eq!(now.value.hits, 2);
    }

    #[tokio::test]
    async fn test_undecodable_document() {
        let repo = repo();
        repo.store().upsert("count-x", Bytes::from_static(b"not json")).await.unwrap();
        let err = repo.get::<Counter>("count-x").await.unwrap_err();
        assert!(matches!(&*err, Error::Serialization { key, .. } if key == "count-x"));
    }

    #[tokio::test]
    async fn test_conflict_retry_rereads() {
        let repo = Repository::new(MemoryStore::new(), Retry::fixed(3, std::time::Duration::ZERO));
        repo.put("count-2", &Counter { hits: 5 }).await.unwrap();
        repo.store().inject_conflicts(2);

        let hits = repo
            .with_conflict_retry("count-2", || async {
                let mut doc: Versioned<Counter> = repo.get_or_else("count-2", || Counter { hits: 0 }).await?;
                doc.value.hits += 1;
                repo.save("count-2", &doc).await?;
                Ok(doc.value.hits)
            })
            .await
            .unwrap();
        assert_eq!(hits, 6);
    }
}
