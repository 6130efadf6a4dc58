//! 表结构管理
//!
//! 根据实体模式描述符创建实体表，以及创建引擎自身的四张字段表。
//! 这里只生成引擎运行所需的最小DDL，不承担通用迁移职责。

use crate::connection::{RelationalConnection, validate_identifier};
use crate::entity::schema::EntitySchema;
use crate::error::QuickFieldResult;
use crate::types::{CastKind, DataValue};
use rat_logger::debug;

/// 按转换类别映射SQLite列类型
fn column_type(cast: CastKind) -> &'static str {
    match cast {
        CastKind::Int => "INTEGER",
        CastKind::Float => "REAL",
        CastKind::Bool => "INTEGER",
        CastKind::String => "TEXT",
        CastKind::Json => "TEXT",
        CastKind::Date => "TEXT",
        CastKind::DateTime => "TEXT",
    }
}

/// 根据实体模式创建实体表（已存在则跳过）
pub async fn create_entity_table(
    conn: &dyn RelationalConnection,
    schema: &EntitySchema,
) -> QuickFieldResult<()> {
    validate_identifier(&schema.table)?;
    validate_identifier(&schema.primary_key)?;
    let mut columns = vec![format!(
        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
        schema.primary_key
    )];
    for attr in &schema.attributes {
        validate_identifier(&attr.name)?;
        if attr.transient {
            continue;
        }
        columns.push(format!("{} {}", attr.name, column_type(attr.cast)));
    }
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        schema.table,
        columns.join(", ")
    );
    conn.execute(&sql, &[]).await?;
    debug!("实体表 {} 已就绪", schema.table);
    Ok(())
}

/// 创建字段引擎的四张表：字段定义、字段挂载、字段值与字段修订
pub async fn create_field_tables(conn: &dyn RelationalConnection) -> QuickFieldResult<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS field_definitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            machine_name TEXT NOT NULL UNIQUE,
            field_type TEXT NOT NULL,
            required INTEGER NOT NULL DEFAULT 0,
            multiple INTEGER NOT NULL DEFAULT 0,
            cardinality INTEGER NOT NULL DEFAULT 1,
            default_value TEXT,
            settings TEXT,
            validation TEXT,
            widget_settings TEXT,
            weight INTEGER NOT NULL DEFAULT 0,
            searchable INTEGER NOT NULL DEFAULT 0,
            translatable INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT
        )",
        "CREATE TABLE IF NOT EXISTS field_attachments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            field_id INTEGER NOT NULL,
            entity_type TEXT NOT NULL,
            bundle_id INTEGER,
            weight INTEGER NOT NULL DEFAULT 0,
            settings TEXT,
            UNIQUE(field_id, entity_type, bundle_id)
        )",
        "CREATE TABLE IF NOT EXISTS field_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            field_id INTEGER NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            bundle_id INTEGER,
            language_code TEXT NOT NULL DEFAULT 'und',
            position INTEGER NOT NULL DEFAULT 0,
            value_string TEXT,
            value_text TEXT,
            value_int INTEGER,
            value_decimal REAL,
            value_boolean INTEGER,
            value_date TEXT,
            value_datetime TEXT,
            value_json TEXT,
            value_blob BLOB,
            UNIQUE(field_id, entity_type, entity_id, language_code, position)
        )",
        "CREATE TABLE IF NOT EXISTS field_revisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            revision_id TEXT NOT NULL,
            field_value_id INTEGER,
            field_id INTEGER NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            bundle_id INTEGER,
            language_code TEXT NOT NULL DEFAULT 'und',
            position INTEGER NOT NULL DEFAULT 0,
            value_string TEXT,
            value_text TEXT,
            value_int INTEGER,
            value_decimal REAL,
            value_boolean INTEGER,
            value_date TEXT,
            value_datetime TEXT,
            value_json TEXT,
            value_blob BLOB,
            created_at TEXT NOT NULL,
            created_by TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_field_values_entity
            ON field_values (entity_type, entity_id, language_code)",
        "CREATE INDEX IF NOT EXISTS idx_field_revisions_revision
            ON field_revisions (entity_type, entity_id, revision_id)",
        "CREATE INDEX IF NOT EXISTS idx_field_attachments_entity
            ON field_attachments (entity_type, bundle_id)",
    ];
    for sql in statements {
        conn.execute(sql, &[]).await?;
    }
    debug!("字段引擎表已就绪");
    Ok(())
}

/// 检查表是否存在
pub async fn table_exists(
    conn: &dyn RelationalConnection,
    table: &str,
) -> QuickFieldResult<bool> {
    let row = conn
        .fetch_optional(
            "SELECT name FROM sqlite_master WHERE type='table' AND name=?",
            &[DataValue::String(table.to_string())],
        )
        .await?;
    Ok(row.is_some())
}

/// 删除表
pub async fn drop_table(conn: &dyn RelationalConnection, table: &str) -> QuickFieldResult<()> {
    validate_identifier(table)?;
    conn.execute(&format!("DROP TABLE IF EXISTS {}", table), &[])
        .await?;
    Ok(())
}
