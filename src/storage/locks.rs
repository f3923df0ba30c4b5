//! Patient creation locks
//!
//! Creation for one phone number is serialized twice: an in-process keyed
//! mutex covers every backend, and on PostgreSQL a transaction-scoped
//! advisory lock extends the guarantee across processes.

use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::{ConnectionTrait, DatabaseTransaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;
use xxhash_rust::xxh64::xxh64;

use crate::errors::Result;

/// Advisory lock key for a normalized phone number
///
/// The namespace keeps our keys apart from other users of
/// `pg_advisory_xact_lock` on the same database.
pub fn advisory_key(namespace: &str, phone_key: &str) -> i64 {
    let mut material = String::with_capacity(namespace.len() + phone_key.len() + 1);
    material.push_str(namespace);
    material.push(':');
    material.push_str(phone_key);
    xxh64(material.as_bytes(), 0) as i64
}

/// Take `pg_advisory_xact_lock(key)` inside the transaction
///
/// Released automatically on commit or rollback.
pub async fn acquire_advisory_xact_lock(txn: &DatabaseTransaction, key: i64) -> Result<()> {
    txn.execute_unprepared(&format!("SELECT pg_advisory_xact_lock({})", key))
        .await?;
    trace!("Advisory lock {} acquired", key);
    Ok(())
}

/// In-process mutex per lock key
///
/// Entries are dropped once the last holder releases them, so the map only
/// holds keys with a creation in flight.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: i64) -> KeyedLockGuard {
        let mutex = self
            .inner
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyedLockGuard {
            key,
            guard: Some(guard),
            locks: self.inner.clone(),
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct KeyedLockGuard {
    key: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own Arc left means no holder and no waiter
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
