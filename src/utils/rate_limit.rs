use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rusqlite::{params, Connection};

/// Sliding-window admission control, keyed by a caller identity string.
///
/// `check` both records the attempt and evaluates it in one call: the window
/// is pruned to timestamps strictly newer than `now - window_ms`, the new
/// timestamp is appended, and admission is `count <= max_requests`. Backends
/// are selected by configuration, see [`limiter_from_env`].
pub trait RateLimit: Send + Sync {
    fn check(&self, key: &str, now_ms: i64) -> bool;
    /// Read-only count of hits inside the current window. Does not mutate.
    fn get_count(&self, key: &str, now_ms: i64) -> usize;
    /// Clears one key, or everything when `key` is `None`.
    fn reset(&self, key: Option<&str>);
}

/// In-memory backend. State is process-local and resets on restart; every
/// instance of the service keeps an independent budget.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window_ms: i64,
    hits: DashMap<String, Vec<i64>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window_ms: i64) -> Self {
        Self {
            max_requests,
            window_ms,
            hits: DashMap::new(),
        }
    }
}

impl RateLimit for SlidingWindowLimiter {
    fn check(&self, key: &str, now_ms: i64) -> bool {
        let cutoff = now_ms - self.window_ms;
        let mut entry = self.hits.entry(key.to_string()).or_default();
        entry.retain(|ts| *ts > cutoff);
        entry.push(now_ms);
        entry.len() <= self.max_requests
    }

    fn get_count(&self, key: &str, now_ms: i64) -> usize {
        let cutoff = now_ms - self.window_ms;
        self.hits
            .get(key)
            .map(|entry| entry.iter().filter(|ts| **ts > cutoff).count())
            .unwrap_or(0)
    }

    fn reset(&self, key: Option<&str>) {
        match key {
            Some(k) => {
                self.hits.remove(k);
            }
            None => self.hits.clear(),
        }
    }
}

/// Shared counter store over SQLite. Lets multiple processes on one host
/// share a budget through a common database file; same window discipline as
/// the in-memory backend, expressed in SQL.
pub struct SqliteWindowLimiter {
    max_requests: usize,
    window_ms: i64,
    conn: Mutex<Connection>,
}

impl SqliteWindowLimiter {
    pub fn open(path: &str, max_requests: usize, window_ms: i64) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open(path)?, max_requests, window_ms)
    }

    #[cfg(test)]
    pub fn in_memory(max_requests: usize, window_ms: i64) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, max_requests, window_ms)
    }

    fn with_connection(
        conn: Connection,
        max_requests: usize,
        window_ms: i64,
    ) -> rusqlite::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rate_hits (bucket TEXT NOT NULL, ts INTEGER NOT NULL);
             CREATE INDEX IF NOT EXISTS rate_hits_bucket_ts ON rate_hits (bucket, ts);",
        )?;
        Ok(Self {
            max_requests,
            window_ms,
            conn: Mutex::new(conn),
        })
    }

    fn count_in_window(conn: &Connection, key: &str, cutoff: i64) -> rusqlite::Result<usize> {
        conn.query_row(
            "SELECT COUNT(*) FROM rate_hits WHERE bucket = ?1 AND ts > ?2",
            params![key, cutoff],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
    }
}

impl RateLimit for SqliteWindowLimiter {
    fn check(&self, key: &str, now_ms: i64) -> bool {
        let cutoff = now_ms - self.window_ms;
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result: rusqlite::Result<usize> = (|| {
            conn.execute(
                "DELETE FROM rate_hits WHERE bucket = ?1 AND ts <= ?2",
                params![key, cutoff],
            )?;
            conn.execute(
                "INSERT INTO rate_hits (bucket, ts) VALUES (?1, ?2)",
                params![key, now_ms],
            )?;
            Self::count_in_window(&conn, key, cutoff)
        })();
        match result {
            Ok(count) => count <= self.max_requests,
            Err(e) => {
                // Fail open on store errors
                tracing::warn!("rate limit store error for key {}: {}", key, e);
                true
            }
        }
    }

    fn get_count(&self, key: &str, now_ms: i64) -> usize {
        let cutoff = now_ms - self.window_ms;
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        match Self::count_in_window(&conn, key, cutoff) {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("rate limit store error for key {}: {}", key, e);
                0
            }
        }
    }

    fn reset(&self, key: Option<&str>) {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = match key {
            Some(k) => conn.execute("DELETE FROM rate_hits WHERE bucket = ?1", params![k]),
            None => conn.execute("DELETE FROM rate_hits", []),
        };
        if let Err(e) = result {
            tracing::warn!("rate limit store reset failed: {}", e);
        }
    }
}

/// Picks the backend from `RATE_LIMIT_BACKEND` (`memory` is the default,
/// `sqlite` uses the shared store at `RATE_LIMIT_DB`). Budget comes from
/// `RATE_LIMIT_MAX` / `RATE_LIMIT_WINDOW_MS`, defaulting to 5 per 10 minutes.
pub fn limiter_from_env() -> Arc<dyn RateLimit> {
    let max_requests = std::env::var("RATE_LIMIT_MAX")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let window_ms = std::env::var("RATE_LIMIT_WINDOW_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(600_000);
    match std::env::var("RATE_LIMIT_BACKEND").as_deref() {
        Ok("sqlite") => {
            let path =
                std::env::var("RATE_LIMIT_DB").unwrap_or_else(|_| "leadgate-rate.db".to_string());
            match SqliteWindowLimiter::open(&path, max_requests, window_ms) {
                Ok(limiter) => {
                    tracing::info!("rate limiting via shared sqlite store at {}", path);
                    Arc::new(limiter)
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to open rate limit store {}: {}. Falling back to in-memory.",
                        path,
                        e
                    );
                    Arc::new(SlidingWindowLimiter::new(max_requests, window_ms))
                }
            }
        }
        _ => Arc::new(SlidingWindowLimiter::new(max_requests, window_ms)),
    }
}
