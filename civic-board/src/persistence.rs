//! Snapshot persistence for the in-memory stores
//!
//! Each store owns one collection and writes it as a whole under its own key.
//! Writes are debounced: a mutation marks the store dirty, and a background
//! task owned by that store saves one snapshot per burst of mutations after a
//! fixed delay. In-memory state stays authoritative; a failed save is logged
//! and retried after another debounce window. Changes made after the last successful
//! flush are lost if the process crashes, which is accepted for this system.

use async_trait::async_trait;
use civic_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const INCIDENTS_KEY: &str = "incidents";
pub const POLL_RESPONSES_KEY: &str = "poll_responses";
pub const USERS_KEY: &str = "users";

/// Whole-blob key/value storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns None when nothing was ever saved under `key`
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`, replaced atomically (temp + rename)
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl BlobStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(key);
        let temp = self.dir.join(format!("{}.json.tmp", key));
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &target).await?;
        debug!(key, bytes = bytes.len(), "Snapshot written to {}", target.display());
        Ok(())
    }
}

/// Volatile store for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }
}

/// Decode a whole blob; None when nothing is stored yet
pub async fn load_json<T: DeserializeOwned>(store: &dyn BlobStore, key: &str) -> Result<Option<T>> {
    match store.load(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Records decoded from a collection plus the raw values that no longer parse
#[derive(Debug)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    /// Kept verbatim and written back on every flush
    pub skipped: Vec<serde_json::Value>,
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Decode records one by one, setting aside those that no longer parse.
///
/// The outer shape must still be valid JSON; a corrupt blob is an error so
/// the next flush cannot silently overwrite it with an empty collection.
pub fn decode_records<T: DeserializeOwned>(key: &str, values: Vec<serde_json::Value>) -> Decoded<T> {
    let total = values.len();
    let mut decoded = Decoded::default();
    for (idx, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value.clone()) {
            Ok(record) => decoded.records.push(record),
            Err(e) => {
                warn!(key, index = idx, error = %e, "Keeping malformed persisted record aside");
                decoded.skipped.push(value);
            }
        }
    }

    if !decoded.skipped.is_empty() {
        warn!(key, kept = decoded.records.len(), total, "Some persisted records could not be loaded");
    }
    decoded
}

/// Load an array-shaped collection
pub async fn load_records<T: DeserializeOwned>(store: &dyn BlobStore, key: &str) -> Result<Decoded<T>> {
    let values: Vec<serde_json::Value> = load_json(store, key).await?.unwrap_or_default();
    Ok(decode_records(key, values))
}

/// Encode live records followed by the set-aside raw values
pub fn encode_records<T: Serialize>(records: &[T], skipped: &[serde_json::Value]) -> Result<Vec<serde_json::Value>> {
    let mut values = Vec::with_capacity(records.len() + skipped.len());
    for record in records {
        values.push(serde_json::to_value(record)?);
    }
    values.extend(skipped.iter().cloned());
    Ok(values)
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn BlobStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.save(key, bytes).await
}

// ============================================================================
// Debounced flushing
// ============================================================================

#[derive(Debug, Default)]
struct DirtyInner {
    dirty: AtomicBool,
    notify: Notify,
}

/// Mutation marker shared between a store and its flusher task
#[derive(Debug, Clone, Default)]
pub struct DirtyFlag {
    inner: Arc<DirtyInner>,
}

impl DirtyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation; wakes the flusher on the clean → dirty edge only
    pub fn mark(&self) {
        if !self.inner.dirty.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_one();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set
    fn take(&self) -> bool {
        self.inner.dirty.swap(false, Ordering::AcqRel)
    }

    async fn wait(&self) {
        self.inner.notify.notified().await;
    }
}

/// A store that can write its full snapshot
#[async_trait]
pub trait Flush: Send + Sync {
    fn collection(&self) -> &'static str;
    async fn flush(&self) -> Result<()>;
}

async fn flush_if_dirty<F: Flush + ?Sized>(target: &F, dirty: &DirtyFlag) {
    if !dirty.take() {
        return;
    }
    match target.flush().await {
        Ok(()) => debug!(collection = target.collection(), "Flushed"),
        Err(e) => {
            warn!(collection = target.collection(), error = %e, "Flush failed, keeping in-memory state");
            // Re-arm so the snapshot is retried after another debounce window
            dirty.mark();
        }
    }
}

/// Spawn the background flusher for one store.
///
/// After the first mutation of a burst the task waits `debounce`, then writes
/// one snapshot. Cancelling `shutdown` performs a final flush and ends the task.
pub fn spawn_flusher<F>(
    target: Arc<F>,
    dirty: DirtyFlag,
    debounce: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    F: Flush + ?Sized + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = dirty.wait() => {}
                _ = shutdown.cancelled() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(debounce) => {}
                _ = shutdown.cancelled() => {}
            }

            flush_if_dirty(target.as_ref(), &dirty).await;

            if shutdown.is_cancelled() {
                break;
            }
        }

        flush_if_dirty(target.as_ref(), &dirty).await;
        info!(collection = target.collection(), "Flusher stopped");
    })
}
