//! quickfield - 通用实体持久化与动态字段存储引擎
//!
//! 声明属性走实体自身的表，动态字段走 EAV 值表，两者由统一的
//! 存储上下文装配。查询参数化、脏检测、软删除、修订快照与
//! 值级多语言开箱即用。

// 导出所有公共模块
pub mod cache;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod field;
pub mod manager;
pub mod query;
pub mod repository;
pub mod storage;
pub mod store;
pub mod types;

// 重新导出常用类型
pub use cache::{CacheStats, RecordCache};
pub use config::{CacheSettings, DatabaseConfig, StoreConfig};
pub use connection::{ExecResult, RelationalConnection, Row, SqlBuilder, SqliteConnection};
pub use entity::{
    AttributeDefinition, Entity, EntityEvent, EntitySchema, EntitySchemaBuilder, EventDispatcher,
};
pub use error::{QuickFieldError, QuickFieldResult};
pub use field::{
    FieldAttachment, FieldCategory, FieldDefinition, FieldKind, FieldRepository, RuleKind,
    ValidationRule, ValueColumn, ValueKind,
};
pub use manager::EntityManager;
pub use query::{EntityQuery, Paginated};
pub use repository::EntityRepository;
pub use storage::{FieldValueStorage, RevisionInfo, DEFAULT_LANGUAGE};
pub use store::Store;
pub use types::{
    CastKind, ConditionNode, DataValue, LogicalOperator, QueryCondition, QueryOperator,
    SortConfig, SortDirection,
};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 初始化quickfield库
///
/// 注意：日志系统由调用者自行初始化，本库不自动初始化日志
pub fn init() {
    // 日志系统由调用者负责初始化
}

/// 获取库信息
pub fn get_info() -> String {
    format!("{} v{}", NAME, VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_info() {
        let info = get_info();
        assert!(info.contains("quickfield"));
        assert!(info.contains(VERSION));
    }
}
