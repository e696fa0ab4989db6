use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const DEFAULT_TTL_SECONDS: i64 = 1800;

/// Hex SHA-256 of the filter's JSON. serde_json's default map keeps keys
/// sorted, so filters that differ only in key order hash the same.
pub fn filter_hash(filter: &Value) -> anyhow::Result<String> {
    let canonical = serde_json::to_vec(filter)?;
    let digest = Sha256::digest(&canonical);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub user_id: String,
    pub scope: String,
    pub filter_hash: String,
}

impl CacheKey {
    pub fn new(user_id: &str, scope: &str, filter: &Value) -> anyhow::Result<Self> {
        Ok(Self {
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            filter_hash: filter_hash(filter)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit {
        payload: Value,
        stored_at: DateTime<Utc>,
    },
    Miss,
    Expired,
}

/// Per-user snapshot cache living in the workspace database.
/// An entry older than `ttl` is never served.
pub struct FilterCache<'a> {
    conn: &'a Connection,
    ttl: Duration,
}

impl<'a> FilterCache<'a> {
    pub fn new(conn: &'a Connection, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    fn cutoff_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.ttl.num_milliseconds()
    }

    pub fn put(&self, key: &CacheKey, payload: &Value, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO filter_cache(user_id, scope, filter_hash, payload_json, stored_at_ms)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(user_id, scope, filter_hash) DO UPDATE SET
               payload_json = excluded.payload_json,
               stored_at_ms = excluded.stored_at_ms",
            (
                &key.user_id,
                &key.scope,
                &key.filter_hash,
                serde_json::to_string(payload)?,
                now.timestamp_millis(),
            ),
        )?;
        log::debug!("cache put user={} scope={}", key.user_id, key.scope);
        Ok(())
    }

    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> anyhow::Result<CacheLookup> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT payload_json, stored_at_ms FROM filter_cache
                 WHERE user_id = ? AND scope = ? AND filter_hash = ?",
                (&key.user_id, &key.scope, &key.filter_hash),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((payload_json, stored_at_ms)) = row else {
            log::debug!("cache miss user={} scope={}", key.user_id, key.scope);
            return Ok(CacheLookup::Miss);
        };

        let stored_at = Utc.timestamp_millis_opt(stored_at_ms).single();
        match stored_at {
            Some(stored_at) if stored_at_ms >= self.cutoff_ms(now) => {
                log::debug!("cache hit user={} scope={}", key.user_id, key.scope);
                Ok(CacheLookup::Hit {
                    payload: serde_json::from_str(&payload_json)?,
                    stored_at,
                })
            }
            _ => {
                self.conn.execute(
                    "DELETE FROM filter_cache WHERE user_id = ? AND scope = ? AND filter_hash = ?",
                    (&key.user_id, &key.scope, &key.filter_hash),
                )?;
                log::debug!("cache expired user={} scope={}", key.user_id, key.scope);
                Ok(CacheLookup::Expired)
            }
        }
    }

    /// Drops entries for one user (optionally one scope), or everything when no user is given.
    pub fn invalidate(&self, user_id: Option<&str>, scope: Option<&str>) -> anyhow::Result<usize> {
        let removed = match (user_id, scope) {
            (Some(user), Some(scope)) => self.conn.execute(
                "DELETE FROM filter_cache WHERE user_id = ? AND scope = ?",
                (user, scope),
            )?,
            (Some(user), None) => self
                .conn
                .execute("DELETE FROM filter_cache WHERE user_id = ?", [user])?,
            (None, Some(scope)) => self
                .conn
                .execute("DELETE FROM filter_cache WHERE scope = ?", [scope])?,
            (None, None) => self.conn.execute("DELETE FROM filter_cache", [])?,
        };
        log::debug!("cache invalidated {} entries", removed);
        Ok(removed)
    }

    /// Keeps only the entries that belong to `user_id`.
    pub fn switch_user(&self, user_id: &str) -> anyhow::Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM filter_cache WHERE user_id <> ?", [user_id])?;
        if removed > 0 {
            log::info!("dropped {} cached entries from a previous user", removed);
        }
        Ok(removed)
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM filter_cache WHERE stored_at_ms < ?",
            [self.cutoff_ms(now)],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = filter_hash(&json!({ "classId": "c1", "week": "2024-W03" })).expect("hash");
        let b = filter_hash(&json!({ "week": "2024-W03", "classId": "c1" })).expect("hash");
        let c = filter_hash(&json!({ "week": "2024-W04", "classId": "c1" })).expect("hash");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let conn = conn();
        let cache = FilterCache::new(&conn, Duration::seconds(60));
        let key = CacheKey::new("u1", "users", &json!({ "role": "teacher" })).expect("key");
        cache
            .put(&key, &json!(["a", "b"]), at("2024-01-17T10:00:00Z"))
            .expect("put");

        match cache.get(&key, at("2024-01-17T10:01:00Z")).expect("get") {
            CacheLookup::Hit { payload, stored_at } => {
                assert_eq!(payload, json!(["a", "b"]));
                assert_eq!(stored_at, at("2024-01-17T10:00:00Z"));
            }
            other => panic!("expected hit, got {:?}", other),
        }
        assert_eq!(
            cache.get(&key, at("2024-01-17T10:01:00.001Z")).expect("get"),
            CacheLookup::Expired
        );
        // Expired entries are removed on read.
        assert_eq!(
            cache.get(&key, at("2024-01-17T10:00:30Z")).expect("get"),
            CacheLookup::Miss
        );
    }

    #[test]
    fn keys_are_scoped_by_user() {
        let conn = conn();
        let cache = FilterCache::new(&conn, Duration::seconds(600));
        let now = at("2024-01-17T10:00:00Z");
        let filter = json!({ "week": "2024-W03" });
        let k1 = CacheKey::new("u1", "attendance", &filter).expect("key");
        let k2 = CacheKey::new("u2", "attendance", &filter).expect("key");
        cache.put(&k1, &json!(1), now).expect("put");
        assert_eq!(cache.get(&k2, now).expect("get"), CacheLookup::Miss);

        cache.put(&k2, &json!(2), now).expect("put");
        assert_eq!(cache.switch_user("u2").expect("switch"), 1);
        assert_eq!(cache.get(&k1, now).expect("get"), CacheLookup::Miss);
        assert!(matches!(cache.get(&k2, now).expect("get"), CacheLookup::Hit { .. }));
    }

    #[test]
    fn invalidate_and_purge() {
        let conn = conn();
        let cache = FilterCache::new(&conn, Duration::seconds(60));
        let old = at("2024-01-17T09:00:00Z");
        let now = at("2024-01-17T10:00:00Z");
        let filter = json!({});
        cache
            .put(&CacheKey::new("u1", "users", &filter).expect("key"), &json!(1), old)
            .expect("put");
        cache
            .put(&CacheKey::new("u1", "reports", &filter).expect("key"), &json!(2), now)
            .expect("put");
        cache
            .put(&CacheKey::new("u2", "users", &filter).expect("key"), &json!(3), now)
            .expect("put");

        assert_eq!(cache.purge_expired(now).expect("purge"), 1);
        assert_eq!(cache.invalidate(Some("u1"), Some("reports")).expect("invalidate"), 1);
        assert_eq!(cache.invalidate(None, None).expect("invalidate"), 1);
    }
}
