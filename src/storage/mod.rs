//! 字段值存储引擎
//!
//! field_values 表按 (field_id, entity_type, entity_id, language_code,
//! position) 唯一定位一行，一行只填充与字段类型对应的那一个类型列。
//! 写入使用单条原子 upsert，类型变更时其余类型列一并清空。
//! 多值字段分解为 position 0..n-1 的连续行，写入后删除更高位置的残留行。
//!
//! 修订是不可变快照：创建修订把当前行整体复制进 field_revisions，
//! 恢复分覆盖与替换两种语义。

use crate::connection::sqlite::DATETIME_FORMAT;
use crate::connection::{RelationalConnection, Row, SqlBuilder};
use crate::error::QuickFieldResult;
use crate::field::{FieldDefinition, ValueColumn};
use crate::quick_error;
use crate::types::{cast, CastKind, DataValue, QueryCondition, SortDirection};
use chrono::Utc;
use rat_logger::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 语言中性值使用的语言码
pub const DEFAULT_LANGUAGE: &str = "und";

const VALUE_COLUMNS: [&str; 9] = [
    "value_string",
    "value_text",
    "value_int",
    "value_decimal",
    "value_boolean",
    "value_date",
    "value_datetime",
    "value_json",
    "value_blob",
];

/// 修订摘要
#[derive(Debug, Clone)]
pub struct RevisionInfo {
    pub revision_id: String,
    pub created_at: String,
    pub created_by: Option<String>,
    pub value_count: u64,
}

/// 字段值存储
pub struct FieldValueStorage {
    conn: Arc<dyn RelationalConnection>,
}

impl FieldValueStorage {
    pub fn new(conn: Arc<dyn RelationalConnection>) -> Self {
        Self { conn }
    }

    /// 写入字段值
    ///
    /// 多值字段要求值为数组，按位置分解写入；单值字段写入位置 0
    /// 并清除历史残留的更高位置行。值为空时删除该字段的全部行。
    pub async fn set_value(
        &self,
        field: &FieldDefinition,
        entity_type: &str,
        entity_id: i64,
        language: &str,
        value: &DataValue,
    ) -> QuickFieldResult<()> {
        let field_id = self.require_field_id(field)?;
        if value.is_empty() {
            self.delete_field_values(field_id, entity_type, entity_id, language)
                .await?;
            return Ok(());
        }
        if field.multiple {
            let items: Vec<DataValue> = match value {
                DataValue::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            for (position, item) in items.iter().enumerate() {
                self.upsert_row(field, field_id, entity_type, entity_id, language, position as i64, item)
                    .await?;
            }
            // 清除超出新基数的残留行
            self.conn
                .execute(
                    "DELETE FROM field_values WHERE field_id = ? AND entity_type = ? \
                     AND entity_id = ? AND language_code = ? AND position >= ?",
                    &[
                        DataValue::Int(field_id),
                        DataValue::String(entity_type.to_string()),
                        DataValue::Int(entity_id),
                        DataValue::String(language.to_string()),
                        DataValue::Int(items.len() as i64),
                    ],
                )
                .await?;
        } else {
            self.upsert_row(field, field_id, entity_type, entity_id, language, 0, value)
                .await?;
            self.conn
                .execute(
                    "DELETE FROM field_values WHERE field_id = ? AND entity_type = ? \
                     AND entity_id = ? AND language_code = ? AND position > 0",
                    &[
                        DataValue::Int(field_id),
                        DataValue::String(entity_type.to_string()),
                        DataValue::Int(entity_id),
                        DataValue::String(language.to_string()),
                    ],
                )
                .await?;
        }
        debug!(
            "写入字段值: {} -> {}#{}",
            field.machine_name, entity_type, entity_id
        );
        Ok(())
    }

    /// 单事务批量写入多个字段的值
    pub async fn set_values(
        &self,
        pairs: &[(&FieldDefinition, DataValue)],
        entity_type: &str,
        entity_id: i64,
        language: &str,
    ) -> QuickFieldResult<()> {
        self.conn.begin().await?;
        for (field, value) in pairs {
            if let Err(e) = self
                .set_value(field, entity_type, entity_id, language, value)
                .await
            {
                self.conn.rollback().await?;
                return Err(e);
            }
        }
        self.conn.commit().await
    }

    /// 读取字段值
    ///
    /// 单值字段返回标量（无行时为 Null），多值字段按位置排序返回数组。
    pub async fn get_value(
        &self,
        field: &FieldDefinition,
        entity_type: &str,
        entity_id: i64,
        language: &str,
    ) -> QuickFieldResult<DataValue> {
        let field_id = self.require_field_id(field)?;
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("field_values")
            .where_conditions(&[
                QueryCondition::eq("field_id", DataValue::Int(field_id)),
                QueryCondition::eq("entity_type", DataValue::String(entity_type.to_string())),
                QueryCondition::eq("entity_id", DataValue::Int(entity_id)),
                QueryCondition::eq("language_code", DataValue::String(language.to_string())),
            ])
            .order_by("position", SortDirection::Asc)
            .build()?;
        let rows = self.conn.fetch_all(&sql, &params).await?;
        if field.multiple {
            let values = rows
                .iter()
                .map(|row| deserialize_value(field, row))
                .collect::<QuickFieldResult<Vec<_>>>()?;
            Ok(DataValue::Array(values))
        } else {
            match rows.first() {
                Some(row) => deserialize_value(field, row),
                None => Ok(DataValue::Null),
            }
        }
    }

    /// 一次查询读取实体的全部字段值，按机器名索引
    pub async fn get_entity_values(
        &self,
        fields: &[Arc<FieldDefinition>],
        entity_type: &str,
        entity_id: i64,
        language: &str,
    ) -> QuickFieldResult<HashMap<String, DataValue>> {
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("field_values")
            .where_conditions(&[
                QueryCondition::eq("entity_type", DataValue::String(entity_type.to_string())),
                QueryCondition::eq("entity_id", DataValue::Int(entity_id)),
                QueryCondition::eq("language_code", DataValue::String(language.to_string())),
            ])
            .order_by("field_id", SortDirection::Asc)
            .order_by("position", SortDirection::Asc)
            .build()?;
        let rows = self.conn.fetch_all(&sql, &params).await?;

        let mut grouped: HashMap<i64, Vec<&Row>> = HashMap::new();
        for row in &rows {
            if let Some(DataValue::Int(field_id)) = row.get("field_id") {
                grouped.entry(*field_id).or_default().push(row);
            }
        }

        let mut values = HashMap::new();
        for field in fields {
            let field_id = self.require_field_id(field)?;
            let value = match grouped.get(&field_id) {
                Some(rows) if field.multiple => DataValue::Array(
                    rows.iter()
                        .map(|row| deserialize_value(field, row))
                        .collect::<QuickFieldResult<Vec<_>>>()?,
                ),
                Some(rows) => deserialize_value(field, rows[0])?,
                None if field.multiple => DataValue::Array(Vec::new()),
                None => DataValue::Null,
            };
            values.insert(field.machine_name.clone(), value);
        }
        Ok(values)
    }

    /// 删除实体的全部字段值（实体物理删除时调用）
    pub async fn delete_entity_values(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> QuickFieldResult<u64> {
        let result = self
            .conn
            .execute(
                "DELETE FROM field_values WHERE entity_type = ? AND entity_id = ?",
                &[
                    DataValue::String(entity_type.to_string()),
                    DataValue::Int(entity_id),
                ],
            )
            .await?;
        Ok(result.rows_affected)
    }

    /// 删除实体上某个字段某语言的全部值
    pub async fn delete_field_values(
        &self,
        field_id: i64,
        entity_type: &str,
        entity_id: i64,
        language: &str,
    ) -> QuickFieldResult<u64> {
        let result = self
            .conn
            .execute(
                "DELETE FROM field_values WHERE field_id = ? AND entity_type = ? \
                 AND entity_id = ? AND language_code = ?",
                &[
                    DataValue::Int(field_id),
                    DataValue::String(entity_type.to_string()),
                    DataValue::Int(entity_id),
                    DataValue::String(language.to_string()),
                ],
            )
            .await?;
        Ok(result.rows_affected)
    }

    /// 创建不可变修订快照，返回修订ID
    ///
    /// 把实体当前全部字段值行整体复制进 field_revisions。
    pub async fn create_revision(
        &self,
        entity_type: &str,
        entity_id: i64,
        created_by: Option<&str>,
    ) -> QuickFieldResult<String> {
        let revision_id = Uuid::new_v4().to_string();
        let created_at = Utc::now().format(DATETIME_FORMAT).to_string();
        let sql = format!(
            "INSERT INTO field_revisions (revision_id, field_value_id, field_id, entity_type, \
             entity_id, bundle_id, language_code, position, {cols}, created_at, created_by) \
             SELECT ?, id, field_id, entity_type, entity_id, bundle_id, language_code, position, \
             {cols}, ?, ? FROM field_values WHERE entity_type = ? AND entity_id = ?",
            cols = VALUE_COLUMNS.join(", ")
        );
        self.conn
            .execute(
                &sql,
                &[
                    DataValue::String(revision_id.clone()),
                    DataValue::String(created_at),
                    match created_by {
                        Some(user) => DataValue::String(user.to_string()),
                        None => DataValue::Null,
                    },
                    DataValue::String(entity_type.to_string()),
                    DataValue::Int(entity_id),
                ],
            )
            .await?;
        info!(
            "创建字段值修订 {} ({}#{})",
            revision_id, entity_type, entity_id
        );
        Ok(revision_id)
    }

    /// 实体的修订列表，按创建时间倒序
    pub async fn list_revisions(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> QuickFieldResult<Vec<RevisionInfo>> {
        let rows = self
            .conn
            .fetch_all(
                "SELECT revision_id, created_at, created_by, COUNT(*) AS value_count \
                 FROM field_revisions WHERE entity_type = ? AND entity_id = ? \
                 GROUP BY revision_id, created_at, created_by ORDER BY created_at DESC",
                &[
                    DataValue::String(entity_type.to_string()),
                    DataValue::Int(entity_id),
                ],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| RevisionInfo {
                revision_id: match row.get("revision_id") {
                    Some(DataValue::String(s)) => s.clone(),
                    _ => String::new(),
                },
                created_at: match row.get("created_at") {
                    Some(DataValue::String(s)) => s.clone(),
                    _ => String::new(),
                },
                created_by: match row.get("created_by") {
                    Some(DataValue::String(s)) => Some(s.clone()),
                    _ => None,
                },
                value_count: match row.get("value_count") {
                    Some(DataValue::Int(n)) => *n as u64,
                    _ => 0,
                },
            })
            .collect())
    }

    /// 覆盖式恢复修订
    ///
    /// 只替换修订中出现的字段：这些字段的当前值被修订值取代，
    /// 修订之后新增的其他字段的值保持不动。
    pub async fn restore_revision(
        &self,
        entity_type: &str,
        entity_id: i64,
        revision_id: &str,
    ) -> QuickFieldResult<()> {
        self.ensure_revision_exists(entity_type, entity_id, revision_id)
            .await?;
        self.conn.begin().await?;
        let result = async {
            self.conn
                .execute(
                    "DELETE FROM field_values WHERE entity_type = ? AND entity_id = ? \
                     AND field_id IN (SELECT field_id FROM field_revisions \
                     WHERE entity_type = ? AND entity_id = ? AND revision_id = ?)",
                    &[
                        DataValue::String(entity_type.to_string()),
                        DataValue::Int(entity_id),
                        DataValue::String(entity_type.to_string()),
                        DataValue::Int(entity_id),
                        DataValue::String(revision_id.to_string()),
                    ],
                )
                .await?;
            self.copy_revision_rows(entity_type, entity_id, revision_id).await
        }
        .await;
        match result {
            Ok(()) => {
                self.conn.commit().await?;
                info!(
                    "覆盖式恢复修订 {} ({}#{})",
                    revision_id, entity_type, entity_id
                );
                Ok(())
            }
            Err(e) => {
                self.conn.rollback().await?;
                Err(e)
            }
        }
    }

    /// 替换式恢复修订：实体当前全部字段值先清空，再整体写入修订内容
    pub async fn restore_revision_replace(
        &self,
        entity_type: &str,
        entity_id: i64,
        revision_id: &str,
    ) -> QuickFieldResult<()> {
        self.ensure_revision_exists(entity_type, entity_id, revision_id)
            .await?;
        self.conn.begin().await?;
        let result = async {
            self.conn
                .execute(
                    "DELETE FROM field_values WHERE entity_type = ? AND entity_id = ?",
                    &[
                        DataValue::String(entity_type.to_string()),
                        DataValue::Int(entity_id),
                    ],
                )
                .await?;
            self.copy_revision_rows(entity_type, entity_id, revision_id).await
        }
        .await;
        match result {
            Ok(()) => {
                self.conn.commit().await?;
                info!(
                    "替换式恢复修订 {} ({}#{})",
                    revision_id, entity_type, entity_id
                );
                Ok(())
            }
            Err(e) => {
                self.conn.rollback().await?;
                Err(e)
            }
        }
    }

    async fn copy_revision_rows(
        &self,
        entity_type: &str,
        entity_id: i64,
        revision_id: &str,
    ) -> QuickFieldResult<()> {
        let sql = format!(
            "INSERT INTO field_values (field_id, entity_type, entity_id, bundle_id, \
             language_code, position, {cols}) \
             SELECT field_id, entity_type, entity_id, bundle_id, language_code, position, {cols} \
             FROM field_revisions WHERE entity_type = ? AND entity_id = ? AND revision_id = ?",
            cols = VALUE_COLUMNS.join(", ")
        );
        self.conn
            .execute(
                &sql,
                &[
                    DataValue::String(entity_type.to_string()),
                    DataValue::Int(entity_id),
                    DataValue::String(revision_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn ensure_revision_exists(
        &self,
        entity_type: &str,
        entity_id: i64,
        revision_id: &str,
    ) -> QuickFieldResult<()> {
        let row = self
            .conn
            .fetch_optional(
                "SELECT COUNT(*) AS total FROM field_revisions \
                 WHERE entity_type = ? AND entity_id = ? AND revision_id = ?",
                &[
                    DataValue::String(entity_type.to_string()),
                    DataValue::Int(entity_id),
                    DataValue::String(revision_id.to_string()),
                ],
            )
            .await?;
        let total = match row.as_ref().and_then(|r| r.get("total")) {
            Some(DataValue::Int(n)) => *n,
            _ => 0,
        };
        if total == 0 {
            return Err(crate::error::QuickFieldError::NotFound {
                entity_type: entity_type.to_string(),
                id: format!("{}@{}", entity_id, revision_id),
            });
        }
        Ok(())
    }

    /// 单条原子 upsert，非承载列显式写 NULL 以覆盖类型变更前的残值
    async fn upsert_row(
        &self,
        field: &FieldDefinition,
        field_id: i64,
        entity_type: &str,
        entity_id: i64,
        language: &str,
        position: i64,
        value: &DataValue,
    ) -> QuickFieldResult<()> {
        let (column, stored) = serialize_value(field, value)?;
        let update_clauses: Vec<String> = VALUE_COLUMNS
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        let sql = format!(
            "INSERT INTO field_values (field_id, entity_type, entity_id, language_code, \
             position, {cols}) VALUES (?, ?, ?, ?, ?, {placeholders}) \
             ON CONFLICT(field_id, entity_type, entity_id, language_code, position) \
             DO UPDATE SET {updates}",
            cols = VALUE_COLUMNS.join(", "),
            placeholders = VALUE_COLUMNS.map(|_| "?").join(", "),
            updates = update_clauses.join(", ")
        );
        let mut params = vec![
            DataValue::Int(field_id),
            DataValue::String(entity_type.to_string()),
            DataValue::Int(entity_id),
            DataValue::String(language.to_string()),
            DataValue::Int(position),
        ];
        for col in VALUE_COLUMNS {
            if col == column.column_name() {
                params.push(stored.clone());
            } else {
                params.push(DataValue::Null);
            }
        }
        self.conn.execute(&sql, &params).await?;
        Ok(())
    }

    fn require_field_id(&self, field: &FieldDefinition) -> QuickFieldResult<i64> {
        field.id.ok_or_else(|| {
            quick_error!(
                invariant,
                format!("字段定义尚未持久化: {}", field.machine_name)
            )
        })
    }
}

/// 把输入值规整为承载列的存储表示
///
/// 转换永不报类型错：无法规整的值按宽松转换规则降级，
/// 例如字符串 "19.99" 写入 Decimal 列时规整为 19.99。
pub fn serialize_value(
    field: &FieldDefinition,
    value: &DataValue,
) -> QuickFieldResult<(ValueColumn, DataValue)> {
    let column = field.kind.storage_column();
    let stored = match column {
        ValueColumn::String_ | ValueColumn::Text => cast(CastKind::String, value.clone()),
        ValueColumn::Int => cast(CastKind::Int, value.clone()),
        ValueColumn::Decimal => cast(CastKind::Float, value.clone()),
        ValueColumn::Boolean => cast(CastKind::Bool, value.clone()),
        ValueColumn::Date => match cast(CastKind::Date, value.clone()) {
            DataValue::DateTime(dt) => DataValue::String(dt.format("%Y-%m-%d").to_string()),
            other => other,
        },
        ValueColumn::DateTime => match cast(CastKind::DateTime, value.clone()) {
            DataValue::DateTime(dt) => DataValue::String(dt.format(DATETIME_FORMAT).to_string()),
            other => other,
        },
        ValueColumn::Json => match value {
            DataValue::String(s) => {
                // 字符串先尝试按JSON文本解析，失败则按JSON字符串字面量存储
                match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(_) => DataValue::String(s.clone()),
                    Err(_) => DataValue::String(serde_json::Value::String(s.clone()).to_string()),
                }
            }
            other => DataValue::String(other.to_json_value().to_string()),
        },
        ValueColumn::Blob => match value {
            DataValue::Bytes(b) => DataValue::Bytes(b.clone()),
            DataValue::String(s) => DataValue::Bytes(s.clone().into_bytes()),
            _ => DataValue::Null,
        },
    };
    Ok((column, stored))
}

/// 从承载列还原值
pub fn deserialize_value(field: &FieldDefinition, row: &Row) -> QuickFieldResult<DataValue> {
    let column = field.kind.storage_column();
    let raw = row
        .get(column.column_name())
        .cloned()
        .unwrap_or(DataValue::Null);
    let value = match column {
        ValueColumn::String_ | ValueColumn::Text => raw,
        ValueColumn::Int => cast(CastKind::Int, raw),
        ValueColumn::Decimal => cast(CastKind::Float, raw),
        ValueColumn::Boolean => cast(CastKind::Bool, raw),
        ValueColumn::Date | ValueColumn::DateTime => raw,
        ValueColumn::Json => match raw {
            DataValue::String(s) => {
                let parsed: serde_json::Value = serde_json::from_str(&s)?;
                DataValue::from_json_value(parsed)
            }
            other => other,
        },
        ValueColumn::Blob => raw,
    };
    Ok(value)
}
