//! 关系型连接抽象
//!
//! 核心只消费一个窄接口：参数化语句的准备与执行、最近生成的自增ID、
//! 以及 begin/commit/rollback 事务控制。不依赖具体方言，适配器负责
//! 把 DataValue 绑定到驱动参数上。

pub mod query_builder;
pub mod schema;
pub mod sqlite;

use crate::error::QuickFieldResult;
use crate::types::DataValue;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

pub use query_builder::SqlBuilder;
pub use sqlite::SqliteConnection;

/// 一行查询结果：列名到值的映射
pub type Row = HashMap<String, DataValue>;

/// 写语句的执行结果
#[derive(Debug, Clone, Copy)]
pub struct ExecResult {
    /// 受影响的行数
    pub rows_affected: u64,
    /// 最近生成的自增ID（无自增时为 0）
    pub last_insert_id: i64,
}

/// 关系型连接抽象
///
/// 所有语句必须参数化执行，值永不拼接进SQL文本。
#[async_trait]
pub trait RelationalConnection: Send + Sync {
    /// 执行写语句（INSERT/UPDATE/DELETE/DDL）
    async fn execute(&self, sql: &str, params: &[DataValue]) -> QuickFieldResult<ExecResult>;

    /// 查询多行
    async fn fetch_all(&self, sql: &str, params: &[DataValue]) -> QuickFieldResult<Vec<Row>>;

    /// 查询至多一行
    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DataValue],
    ) -> QuickFieldResult<Option<Row>>;

    /// 开启事务（嵌套调用使用保存点）
    async fn begin(&self) -> QuickFieldResult<()>;

    /// 提交事务
    async fn commit(&self) -> QuickFieldResult<()>;

    /// 回滚事务
    async fn rollback(&self) -> QuickFieldResult<()>;
}

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("标识符正则必然合法"));

/// 校验字段名/表名标识符的安全性
///
/// 标识符无法绑定为参数，只能经白名单校验后进入SQL文本。
pub fn validate_identifier(name: &str) -> QuickFieldResult<&str> {
    if name.is_empty() {
        return Err(crate::quick_error!(validation, "identifier", "标识符不能为空"));
    }
    if name.len() > 64 {
        return Err(crate::quick_error!(
            validation,
            name,
            "标识符长度不能超过64个字符"
        ));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(crate::quick_error!(
            validation,
            name,
            "标识符只允许字母、数字与下划线，且不能以数字开头"
        ));
    }
    Ok(name)
}
