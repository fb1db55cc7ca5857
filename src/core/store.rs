//! Key-value store abstraction
//!
//! Provides a unified interface over Redis and an in-process memory map.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │            KvBackend                │
//! │  ┌─────────────┬─────────────┐      │
//! │  │ RedisStore  │ MemoryStore │      │
//! │  │ (TCP / TLS) │  (HashMap)  │      │
//! │  └─────────────┴─────────────┘      │
//! └─────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Backend statistics reported by `info`
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendInfo {
    /// "redis" or "memory"
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_keys: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_in_seconds: Option<u64>,
}

/// Backend trait for key-value operations
///
/// Implemented by both RedisStore and MemoryStore
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Store a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Fetch a value; expired keys read as absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List live keys matching a `*` glob
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Check the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend statistics
    async fn info(&self) -> Result<BackendInfo>;

    /// Human-readable name
    fn name(&self) -> &str;
}

// ============== Memory ==============

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

/// In-memory fallback used when Redis is unavailable
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = match ttl {
            Some(ttl) => Some(Utc::now() + chrono::Duration::from_std(ttl)?),
            None => None,
        };
        let mut data = self.data.lock().await;
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut data = self.data.lock().await;
        let now = Utc::now();
        if data.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
            data.remove(key);
            return Ok(None);
        }
        Ok(data.get(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut data = self.data.lock().await;
        Ok(data.remove(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let data = self.data.lock().await;
        let now = Utc::now();
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(k, e)| !e.is_expired(now) && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn info(&self) -> Result<BackendInfo> {
        let data = self.data.lock().await;
        let now = Utc::now();
        Ok(BackendInfo {
            backend: "memory".to_string(),
            keys: Some(data.len()),
            expired_keys: Some(data.values().filter(|e| e.is_expired(now)).count()),
            ..Default::default()
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Match a key against a glob where `*` matches any run of characters
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !key.starts_with(first) || key.len() < first.len() + last.len() {
        return false;
    }

    let mut rest = &key[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

// ============== Redis ==============

/// Redis-backed store (plain TCP or TLS for `rediss://` URLs)
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect and verify with PING
    pub async fn connect(url: &str, connect_timeout: Duration, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("Invalid Redis URL: {}", redact_url(url)))?;

        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .context("Timed out connecting to Redis")?
            .context("Failed to connect to Redis")?;

        let store = Self { conn, op_timeout };
        store.ping().await?;
        info!(url = %redact_url(url), "Connected to Redis");
        Ok(store)
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .with_context(|| format!("Redis {} timed out", op))?
            .with_context(|| format!("Redis {} failed", op))
    }
}

#[async_trait]
impl KvBackend for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let _: () = self.bounded("SET", cmd.query_async(&mut conn)).await?;
        debug!(key, "SET");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.bounded("GET", cmd.query_async(&mut conn)).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.bounded("DEL", cmd.query_async(&mut conn)).await?;
        Ok(removed > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        let mut keys: Vec<String> = self.bounded("KEYS", cmd.query_async(&mut conn)).await?;
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("PING");
        let _: String = self.bounded("PING", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn info(&self) -> Result<BackendInfo> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("INFO");
        let raw: String = self.bounded("INFO", cmd.query_async(&mut conn)).await?;

        let mut conn = self.conn.clone();
        let cmd = redis::cmd("DBSIZE");
        let dbsize: i64 = self.bounded("DBSIZE", cmd.query_async(&mut conn)).await?;

        let mut info = parse_info(&raw);
        info.keys = Some(dbsize.max(0) as usize);
        Ok(info)
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// Parse the `key:value` lines of a Redis INFO reply
pub fn parse_info(raw: &str) -> BackendInfo {
    let fields: HashMap<&str, &str> = raw
        .lines()
        .filter(|l| !l.starts_with('#'))
        .filter_map(|l| l.trim_end().split_once(':'))
        .collect();

    BackendInfo {
        backend: "redis".to_string(),
        redis_version: Some(
            fields
                .get("redis_version")
                .unwrap_or(&"unknown")
                .to_string(),
        ),
        connected_clients: Some(
            fields
                .get("connected_clients")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        ),
        used_memory_human: Some(
            fields
                .get("used_memory_human")
                .unwrap_or(&"unknown")
                .to_string(),
        ),
        uptime_in_seconds: Some(
            fields
                .get("uptime_in_seconds")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        ),
        ..Default::default()
    }
}

/// Strip the password from a Redis URL before logging it
pub fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
