//! # In-Memory Store
//!
//! Process-local [`CoordinationStore`] adapter. Several handles cloned from
//! one `Arc<InMemoryStore>` behave like several processes sharing one
//! Redis instance, which is how the integration tests model a fleet.
//!
//! Expiry uses `tokio::time::Instant`, so tests running with paused time
//! observe TTLs deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::StoreError;
use tokio::time::Instant;
use tracing::trace;

use crate::CoordinationStore;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory coordination store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    /// Simulated outage switch.
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every command fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    /// Whether no live keys exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a key, `None` if absent or persistent.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn check_available(&self, command: &str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "in-memory store unavailable during {command}"
            )));
        }
        Ok(())
    }

    /// Run `f` on the live entry map (expired keys removed first).
    fn with_live<T>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            trace!(%key, "expired key evicted");
            entries.remove(key);
        }
        f(&mut entries)
    }
}

fn wrong_type(key: &str, expected: &str) -> StoreError {
    StoreError::InvalidValue {
        key: key.to_string(),
        value: format!("not a {expected}"),
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        self.check_available("INCR")?;
        self.with_live(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: StoredValue::Text("0".to_string()),
                expires_at: None,
            });
            let StoredValue::Text(current) = &entry.value else {
                return Err(wrong_type(key, "counter"));
            };
            let next = current
                .parse::<u64>()
                .map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    value: current.clone(),
                })?
                .checked_add(1)
                .ok_or_else(|| StoreError::command("INCR", "counter overflow"))?;
            entry.value = StoredValue::Text(next.to_string());
            Ok(next)
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available("SET NX")?;
        self.with_live(key, |entries| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::Text(value.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            Ok(true)
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available("GET")?;
        self.with_live(key, |entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: StoredValue::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check_available("SET")?;
        self.with_live(key, |entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::Text(value.to_string()),
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available("DEL")?;
        Ok(self.with_live(key, |entries| entries.remove(key).is_some()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_available("PEXPIRE")?;
        Ok(self.with_live(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }))
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.check_available("RPUSH")?;
        self.with_live(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: StoredValue::List(Vec::new()),
                expires_at: None,
            });
            let StoredValue::List(items) = &mut entry.value else {
                return Err(wrong_type(key, "list"));
            };
            items.push(value.to_string());
            Ok(items.len() as u64)
        })
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check_available("LRANGE")?;
        self.with_live(key, |entries| match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: StoredValue::List(items),
                ..
            }) => Ok(items.clone()),
            Some(_) => Err(wrong_type(key, "list")),
        })
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.check_available("EVAL compare-and-delete")?;
        Ok(self.with_live(key, |entries| {
            let matches = matches!(
                entries.get(key),
                Some(Entry { value: StoredValue::Text(current), .. }) if current == expected
            );
            if matches {
                entries.remove(key);
            }
            matches
        }))
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available("EVAL compare-and-expire")?;
        Ok(self.with_live(key, |entries| match entries.get_mut(key) {
            Some(entry) if matches!(&entry.value, StoredValue::Text(current) if current == expected) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            _ => false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_starts_at_one() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr("global_sequence").await.unwrap(), 1);
        assert_eq!(store.incr("global_sequence").await.unwrap(), 2);
        assert_eq!(store.get("global_sequence").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_incr_rejects_non_numeric() {
        let store = InMemoryStore::new();
        store.set("k", "abc", None).await.unwrap();
        assert!(matches!(
            store.incr("k").await,
            Err(StoreError::InvalidValue { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_ttl() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent("lock:r", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock:r", "b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(store.set_if_absent("lock:r", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock:r").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_extends_lifetime() {
        let store = InMemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.ttl("k").unwrap() <= Duration::from_secs(5));

        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_append_and_range() {
        let store = InMemoryStore::new();
        assert_eq!(store.list_append("dead_letter_queue", "a").await.unwrap(), 1);
        assert_eq!(store.list_append("dead_letter_queue", "b").await.unwrap(), 2);
        assert_eq!(
            store.list_range("dead_letter_queue").await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(store.list_range("empty").await.unwrap().is_empty());
        assert!(store.get("dead_letter_queue").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let store = InMemoryStore::new();
        store.set("lock:r", "token-a", None).await.unwrap();

        assert!(!store.delete_if_equals("lock:r", "token-b").await.unwrap());
        assert_eq!(store.get("lock:r").await.unwrap().as_deref(), Some("token-a"));

        assert!(store.delete_if_equals("lock:r", "token-a").await.unwrap());
        assert!(store.get("lock:r").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_if_equals() {
        let store = InMemoryStore::new();
        store
            .set_if_absent("lock:r", "token-a", Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!store
            .expire_if_equals("lock:r", "token-b", Duration::from_secs(30))
            .await
            .unwrap());
        assert!(store
            .expire_if_equals("lock:r", "token-a", Duration::from_secs(30))
            .await
            .unwrap());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(store.get("lock:r").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_outage_fails_every_command() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.incr("k").await,
            Err(StoreError::Connection(_))
        ));
        assert!(store.get("k").await.is_err());

        store.set_available(true);
        assert!(store.incr("k").await.is_ok());
    }
}
