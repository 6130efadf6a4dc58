//! 记录缓存
//!
//! 以实体类型+主键为键的读通缓存，带TTL过期与统计计数。
//! 写路径（插入/更新/删除）必须在提交后失效对应键，
//! 查询构建器的结果集不进缓存，只有单条记录水合走这里。

use crate::connection::Row;
use dashmap::DashMap;
use rat_logger::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 缓存条目
struct CacheEntry {
    row: Row,
    inserted_at: Instant,
}

/// 缓存统计
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    pub invalidations: AtomicU64,
}

impl CacheStats {
    /// 命中率（无访问时为 0.0）
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

/// 单条记录的读通缓存
pub struct RecordCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    enabled: bool,
    stats: CacheStats,
}

impl RecordCache {
    pub fn new(ttl_secs: u64, enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
            enabled,
            stats: CacheStats::default(),
        }
    }

    /// 缓存键格式与前缀固定，便于按实体类型批量失效
    fn key(entity_type: &str, id: i64) -> String {
        format!("quickfield:{}:record:{}", entity_type, id)
    }

    /// 读取缓存行（过期条目当作未命中并顺手移除）
    pub fn get(&self, entity_type: &str, id: i64) -> Option<Row> {
        if !self.enabled {
            return None;
        }
        let key = Self::key(entity_type, id);
        if let Some(entry) = self.entries.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.row.clone());
            }
        }
        self.entries.remove(&key);
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// 写入缓存行
    pub fn put(&self, entity_type: &str, id: i64, row: Row) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            Self::key(entity_type, id),
            CacheEntry {
                row,
                inserted_at: Instant::now(),
            },
        );
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// 失效单条记录
    pub fn invalidate(&self, entity_type: &str, id: i64) {
        if !self.enabled {
            return;
        }
        if self.entries.remove(&Self::key(entity_type, id)).is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!("缓存失效: {}#{}", entity_type, id);
        }
    }

    /// 失效某实体类型的全部记录（批量写后调用）
    pub fn invalidate_entity_type(&self, entity_type: &str) {
        if !self.enabled {
            return;
        }
        let prefix = format!("quickfield:{}:record:", entity_type);
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            if self.entries.remove(&key).is_some() {
                self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 统计计数
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// 当前条目数（含尚未被惰性清除的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataValue;
    use std::collections::HashMap;

    fn sample_row() -> Row {
        let mut row = HashMap::new();
        row.insert("id".to_string(), DataValue::Int(1));
        row.insert("title".to_string(), DataValue::String("标题".into()));
        row
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = RecordCache::new(60, true);
        assert!(cache.get("node", 1).is_none());
        cache.put("node", 1, sample_row());
        assert!(cache.get("node", 1).is_some());
        cache.invalidate("node", 1);
        assert!(cache.get("node", 1).is_none());
        assert_eq!(cache.stats().invalidations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = RecordCache::new(60, false);
        cache.put("node", 1, sample_row());
        assert!(cache.get("node", 1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_entity_type_scoped() {
        let cache = RecordCache::new(60, true);
        cache.put("node", 1, sample_row());
        cache.put("node", 2, sample_row());
        cache.put("user", 1, sample_row());
        cache.invalidate_entity_type("node");
        assert!(cache.get("node", 1).is_none());
        assert!(cache.get("node", 2).is_none());
        assert!(cache.get("user", 1).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = RecordCache::new(0, true);
        cache.put("node", 1, sample_row());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("node", 1).is_none());
    }
}
