//! SQLite 连接实现
//!
//! 基于 sqlx 的单连接池：min=max=1 且禁用空闲回收，保证内存库与
//! 未提交事务不会因连接重建而丢失。事务控制直接走 BEGIN/COMMIT/
//! ROLLBACK 语句，嵌套层级用保存点表达。

use crate::connection::{ExecResult, RelationalConnection, Row};
use crate::error::{QuickFieldError, QuickFieldResult};
use crate::types::DataValue;
use async_trait::async_trait;
use parking_lot::Mutex;
use rat_logger::debug;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Pool, Row as _, Sqlite};

/// 日期时间的存储格式（TEXT 列，UTC）
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite 连接
pub struct SqliteConnection {
    pool: Pool<Sqlite>,
    /// 当前事务嵌套深度，0 表示不在事务中
    txn_depth: Mutex<u32>,
}

impl SqliteConnection {
    /// 按连接串建立连接
    ///
    /// 内存库使用 `sqlite::memory:`，文件库使用 `sqlite://路径?mode=rwc`。
    pub async fn connect(url: &str) -> QuickFieldResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(|e| QuickFieldError::ConnectionError {
                message: format!("建立SQLite连接失败: {}", e),
            })?;
        debug!("SQLite连接已建立: {}", url);
        Ok(Self {
            pool,
            txn_depth: Mutex::new(0),
        })
    }

    /// 打开内存库
    pub async fn memory() -> QuickFieldResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// 打开文件库（不存在则创建）
    pub async fn open_file(path: &str) -> QuickFieldResult<Self> {
        Self::connect(&format!("sqlite://{}?mode=rwc", path)).await
    }

    /// 将参数绑定到查询上
    fn bind_params<'q>(
        mut query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        params: &'q [DataValue],
    ) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        for param in params {
            query = match param {
                DataValue::String(s) => query.bind(s),
                DataValue::Int(i) => query.bind(*i),
                DataValue::Float(f) => query.bind(*f),
                // SQLite使用整数表示布尔值
                DataValue::Bool(b) => query.bind(i64::from(*b)),
                DataValue::Bytes(bytes) => query.bind(bytes.as_slice()),
                DataValue::DateTime(dt) => query.bind(dt.format(DATETIME_FORMAT).to_string()),
                DataValue::Json(json) => query.bind(json.to_string()),
                DataValue::Array(_) => query.bind(param.to_json_value().to_string()),
                DataValue::Null => query.bind(Option::<String>::None),
            };
        }
        query
    }

    /// 将sqlx的行转换为DataValue映射
    ///
    /// 按值的实际存储类别逐个尝试解码，不依赖列声明类型。
    fn row_to_map(row: &SqliteRow) -> Row {
        let mut map = Row::new();
        for column in row.columns() {
            let name = column.name();
            let value = if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
                v.map(DataValue::Int).unwrap_or(DataValue::Null)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
                v.map(DataValue::Float).unwrap_or(DataValue::Null)
            } else if let Ok(v) = row.try_get::<Option<String>, _>(name) {
                v.map(DataValue::String).unwrap_or(DataValue::Null)
            } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(name) {
                v.map(DataValue::Bytes).unwrap_or(DataValue::Null)
            } else {
                DataValue::Null
            };
            map.insert(name.to_string(), value);
        }
        map
    }

    async fn execute_raw(&self, sql: &str) -> QuickFieldResult<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| QuickFieldError::TransactionError {
                message: format!("执行事务控制语句失败 [{}]: {}", sql, e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl RelationalConnection for SqliteConnection {
    async fn execute(&self, sql: &str, params: &[DataValue]) -> QuickFieldResult<ExecResult> {
        debug!("执行SQLite写语句: {}", sql);
        let query = Self::bind_params(sqlx::query(sql), params);
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| QuickFieldError::QueryError {
                message: format!("执行SQLite写语句失败: {}", e),
            })?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        })
    }

    async fn fetch_all(&self, sql: &str, params: &[DataValue]) -> QuickFieldResult<Vec<Row>> {
        debug!("执行SQLite查询: {}", sql);
        let query = Self::bind_params(sqlx::query(sql), params);
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QuickFieldError::QueryError {
                message: format!("执行SQLite查询失败: {}", e),
            })?;
        Ok(rows.iter().map(Self::row_to_map).collect())
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DataValue],
    ) -> QuickFieldResult<Option<Row>> {
        debug!("执行SQLite单行查询: {}", sql);
        let query = Self::bind_params(sqlx::query(sql), params);
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QuickFieldError::QueryError {
                message: format!("执行SQLite单行查询失败: {}", e),
            })?;
        Ok(row.as_ref().map(Self::row_to_map))
    }

    async fn begin(&self) -> QuickFieldResult<()> {
        let sql = {
            let mut depth = self.txn_depth.lock();
            let sql = if *depth == 0 {
                "BEGIN IMMEDIATE".to_string()
            } else {
                format!("SAVEPOINT qf_sp_{}", *depth)
            };
            *depth += 1;
            sql
        };
        if let Err(e) = self.execute_raw(&sql).await {
            *self.txn_depth.lock() -= 1;
            return Err(e);
        }
        Ok(())
    }

    async fn commit(&self) -> QuickFieldResult<()> {
        let sql = {
            let mut depth = self.txn_depth.lock();
            if *depth == 0 {
                return Err(crate::quick_error!(transaction, "没有可提交的事务"));
            }
            *depth -= 1;
            if *depth == 0 {
                "COMMIT".to_string()
            } else {
                format!("RELEASE SAVEPOINT qf_sp_{}", *depth)
            }
        };
        self.execute_raw(&sql).await
    }

    async fn rollback(&self) -> QuickFieldResult<()> {
        let sqls = {
            let mut depth = self.txn_depth.lock();
            if *depth == 0 {
                return Err(crate::quick_error!(transaction, "没有可回滚的事务"));
            }
            *depth -= 1;
            if *depth == 0 {
                vec!["ROLLBACK".to_string()]
            } else {
                vec![
                    format!("ROLLBACK TO SAVEPOINT qf_sp_{}", *depth),
                    format!("RELEASE SAVEPOINT qf_sp_{}", *depth),
                ]
            }
        };
        for sql in sqls {
            self.execute_raw(&sql).await?;
        }
        Ok(())
    }
}
