//! Cache Layer (C10). Two independent `moka::future::Cache` instances per
//! `DataMapper` handle — a bean cache keyed by primary key, and a query cache
//! keyed by a fingerprint of (SQL text, bound parameters, projection shape).
//! This module only provides the primitives; the invalidation table in
//! §4.10 is enforced by the call sites in [`crate::mapper`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::metadata::Entity;
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { max_capacity: 10_000, time_to_live: Duration::from_secs(300) }
    }
}

pub struct MapperCache<E: Entity> {
    bean: Cache<String, Arc<E>>,
    query: Cache<u64, Arc<Vec<E>>>,
}

impl<E: Entity> MapperCache<E> {
    pub fn new(config: &CacheConfig) -> Self {
        let build = || {
            Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.time_to_live)
                .build()
        };
        MapperCache { bean: build(), query: build() }
    }

    pub async fn get_bean(&self, pk: &Value) -> Option<Arc<E>> {
        self.bean.get(&pk.fingerprint()).await
    }

    pub async fn put_bean(&self, pk: &Value, value: Arc<E>) {
        self.bean.insert(pk.fingerprint(), value).await;
    }

    pub async fn evict_bean(&self, pk: &Value) {
        self.bean.invalidate(&pk.fingerprint()).await;
    }

    pub async fn get_query(&self, fingerprint: u64) -> Option<Arc<Vec<E>>> {
        self.query.get(&fingerprint).await
    }

    pub async fn put_query(&self, fingerprint: u64, rows: Arc<Vec<E>>) {
        self.query.insert(fingerprint, rows).await;
    }

    /// The `clear all` side of every invalidation-table row that touches the
    /// query cache — batch and predicate-based writes can't name a single
    /// affected key, so the whole query cache is dropped.
    pub fn clear_query_cache(&self) {
        self.query.invalidate_all();
    }

    pub fn clear_bean_cache(&self) {
        self.bean.invalidate_all();
    }

    pub fn clear_all(&self) {
        self.clear_bean_cache();
        self.clear_query_cache();
    }
}

/// A stable `u64` fingerprint of a rendered query, used as the query-cache
/// key. Two calls that render to the same SQL text, the same bound
/// parameters, and the same projection shape collide by design.
pub fn fingerprint_query(sql: &str, params: &[Value], projection: &[String]) -> u64 {
    let mut hasher = DefaultHasher::new();
    sql.hash(&mut hasher);
    for p in params {
        p.fingerprint().hash(&mut hasher);
    }
    for col in projection {
        col.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_order_sensitive() {
        let a = fingerprint_query("SELECT * FROM t WHERE x = ?", &[Value::I64(1)], &["id".into()]);
        let b = fingerprint_query("SELECT * FROM t WHERE x = ?", &[Value::I64(1)], &["id".into()]);
        let c = fingerprint_query("SELECT * FROM t WHERE x = ?", &[Value::I64(2)], &["id".into()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
