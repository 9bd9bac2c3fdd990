//! API connections for the http kind.
//!
//! Connections are owned and resolved externally, keyed by project. The
//! executor caches resolved connections in a bounded map with expiry
//! checked on read; there is no global state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay every attempt.
    Fixed,
    /// Delay doubles per attempt, capped.
    #[default]
    Exponential,
}

/// Retry policy carried by a connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff strategy.
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.initial_delay_ms,
            Backoff::Exponential => self
                .initial_delay_ms
                .saturating_mul(1u64 << attempt.min(20)),
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Externally configured API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConnection {
    /// Connection name, unique per project.
    pub name: String,

    /// Base URL requests are resolved against.
    pub base_url: String,

    /// Headers applied to every request (node headers win on conflict).
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ApiConnection {
    /// Per-attempt timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Resolves named connections per project.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Look up a connection; `None` when the project has no such
    /// connection configured.
    async fn connection(
        &self,
        project_id: &str,
        name: &str,
    ) -> anyhow::Result<Option<ApiConnection>>;
}

struct CacheEntry {
    connection: ApiConnection,
    inserted_at: Instant,
}

/// Bounded in-process connection cache, TTL checked on read.
pub struct ConnectionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl ConnectionCache {
    /// Create a cache with the given entry lifetime and size bound.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Fetch a cached connection if present and fresh.
    pub async fn get(&self, project_id: &str, name: &str) -> Option<ApiConnection> {
        let key = cache_key(project_id, name);
        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                tracing::debug!("Connection cache HIT: {}", key);
                Some(entry.connection.clone())
            }
            Some(_) => {
                tracing::debug!("Connection cache EXPIRED: {}", key);
                None
            }
            None => {
                tracing::debug!("Connection cache MISS: {}", key);
                None
            }
        }
    }

    /// Store a resolved connection, evicting expired entries first and
    /// the oldest entry when still at capacity.
    pub async fn put(&self, project_id: &str, name: &str, connection: ApiConnection) {
        let key = cache_key(project_id, name);
        let mut entries = self.entries.write().await;

        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                connection,
                inserted_at: Instant::now(),
            },
        );
    }
}

fn cache_key(project_id: &str, name: &str) -> String {
    format!("{}/{}", project_id, name)
}

// ============================================================================
// In-memory provider
// ============================================================================

/// In-memory [`ConnectionProvider`] for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryConnectionProvider {
    connections: RwLock<HashMap<String, ApiConnection>>,
}

impl MemoryConnectionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a project. The connection's own `name`
    /// field is the lookup key.
    pub async fn put(&self, project_id: &str, connection: ApiConnection) {
        let key = cache_key(project_id, &connection.name);
        self.connections.write().await.insert(key, connection);
    }
}

#[async_trait]
impl ConnectionProvider for MemoryConnectionProvider {
    async fn connection(
        &self,
        project_id: &str,
        name: &str,
    ) -> anyhow::Result<Option<ApiConnection>> {
        let connections = self.connections.read().await;
        Ok(connections.get(&cache_key(project_id, name)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(name: &str) -> ApiConnection {
        ApiConnection {
            name: name.to_string(),
            base_url: "https://api.test".to_string(),
            default_headers: HashMap::new(),
            timeout_ms: 1000,
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn test_retry_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay_ms, 500);
        assert_eq!(policy.max_delay_ms, 10_000);
        assert_eq!(policy.backoff, Backoff::Exponential);
    }

    #[test]
    fn test_fixed_backoff_is_flat() {
        let policy = RetryPolicy {
            backoff: Backoff::Fixed,
            ..Default::default()
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(5), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        // 500 * 2^10 far exceeds the cap
        assert_eq!(policy.delay(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_connection_defaults_from_json() {
        let conn: ApiConnection = serde_json::from_value(serde_json::json!({
            "name": "crm",
            "base_url": "https://crm.example.com"
        }))
        .unwrap();
        assert_eq!(conn.timeout_ms, 30_000);
        assert_eq!(conn.retry.max_retries, 3);
    }

    #[tokio::test]
    async fn test_cache_hit_and_miss() {
        let cache = ConnectionCache::new(Duration::from_secs(60), 8);
        assert!(cache.get("p-1", "crm").await.is_none());

        cache.put("p-1", "crm", make_connection("crm")).await;
        let hit = cache.get("p-1", "crm").await.unwrap();
        assert_eq!(hit.name, "crm");

        // Same name under another project is a different entry.
        assert!(cache.get("p-2", "crm").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_expiry_on_read() {
        let cache = ConnectionCache::new(Duration::ZERO, 8);
        cache.put("p-1", "crm", make_connection("crm")).await;
        assert!(cache.get("p-1", "crm").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_capacity_evicts_oldest() {
        let cache = ConnectionCache::new(Duration::from_secs(60), 2);
        cache.put("p-1", "a", make_connection("a")).await;
        cache.put("p-1", "b", make_connection("b")).await;
        cache.put("p-1", "c", make_connection("c")).await;

        assert!(cache.get("p-1", "a").await.is_none());
        assert!(cache.get("p-1", "b").await.is_some());
        assert!(cache.get("p-1", "c").await.is_some());
    }

    #[tokio::test]
    async fn test_memory_provider_scoped_by_project() {
        let provider = MemoryConnectionProvider::new();
        provider.put("p-1", make_connection("crm")).await;

        let found = provider.connection("p-1", "crm").await.unwrap();
        assert_eq!(found.unwrap().name, "crm");
        assert!(provider.connection("p-2", "crm").await.unwrap().is_none());
    }
}
