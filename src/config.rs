//! 存储配置
//!
//! 支持代码内构建与TOML文件加载两种途径，缺省值面向本地SQLite场景。

use crate::error::QuickFieldResult;
use crate::quick_error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 连接URL（`sqlite::memory:` 或 `sqlite://path?mode=rwc`）
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// 是否启用记录缓存
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// 条目存活秒数
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    /// 字段值的默认语言码
    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_language() -> String {
    crate::storage::DEFAULT_LANGUAGE.to_string()
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheSettings::default(),
            default_language: default_language(),
        }
    }

    /// 内存数据库配置（测试常用）
    pub fn in_memory() -> Self {
        Self::new()
    }

    /// 文件数据库配置
    pub fn with_file(mut self, path: &str) -> Self {
        self.database.url = format!("sqlite://{}?mode=rwc", path);
        self
    }

    pub fn with_database_url(mut self, url: &str) -> Self {
        self.database.url = url.to_string();
        self
    }

    pub fn with_cache(mut self, enabled: bool, ttl_secs: u64) -> Self {
        self.cache.enabled = enabled;
        self.cache.ttl_secs = ttl_secs;
        self
    }

    pub fn with_default_language(mut self, language: &str) -> Self {
        self.default_language = language.to_string();
        self
    }

    /// 从TOML文本解析
    pub fn from_toml_str(content: &str) -> QuickFieldResult<Self> {
        toml::from_str(content)
            .map_err(|e| quick_error!(serialization, format!("配置解析失败: {}", e)))
    }

    /// 从TOML文件加载
    pub fn from_toml_file(path: &Path) -> QuickFieldResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| quick_error!(connection, format!("配置文件读取失败: {}", e)))?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert!(config.cache.enabled);
        assert_eq!(config.default_language, "und");
    }

    #[test]
    fn test_toml_partial_override() {
        let config = StoreConfig::from_toml_str(
            r#"
            default_language = "zh-hans"

            [database]
            url = "sqlite:///var/lib/app/data.db?mode=rwc"

            [cache]
            ttl_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.default_language, "zh-hans");
        assert_eq!(config.database.url, "sqlite:///var/lib/app/data.db?mode=rwc");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 60);
    }

    #[test]
    fn test_invalid_toml_reports_error() {
        assert!(StoreConfig::from_toml_str("database = 不是表").is_err());
    }
}
