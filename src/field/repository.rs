//! 字段定义仓储
//!
//! 字段定义的持久化与进程内缓存。定义变更频率远低于读取，
//! 按ID缓存 Arc，机器名索引单独维护；任何写操作同步更新两个索引。

use crate::connection::sqlite::DATETIME_FORMAT;
use crate::connection::{RelationalConnection, SqlBuilder};
use crate::error::QuickFieldResult;
use crate::field::definition::{FieldAttachment, FieldDefinition};
use crate::quick_error;
use crate::types::{DataValue, QueryCondition, SortDirection};
use chrono::Utc;
use dashmap::DashMap;
use rat_logger::{debug, info};
use std::sync::Arc;

/// 字段定义仓储
pub struct FieldRepository {
    conn: Arc<dyn RelationalConnection>,
    by_id: DashMap<i64, Arc<FieldDefinition>>,
    by_name: DashMap<String, i64>,
}

impl FieldRepository {
    pub fn new(conn: Arc<dyn RelationalConnection>) -> Self {
        Self {
            conn,
            by_id: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// 保存字段定义（机器名全局唯一，冲突报校验错误）
    pub async fn save(&self, field: &mut FieldDefinition) -> QuickFieldResult<i64> {
        let existing = self.lookup_id_by_name(&field.machine_name).await?;
        match (field.id, existing) {
            (Some(id), Some(other)) if id != other => {
                return Err(quick_error!(
                    validation,
                    "machine_name",
                    format!("机器名已被占用: {}", field.machine_name)
                ));
            }
            (None, Some(_)) => {
                return Err(quick_error!(
                    validation,
                    "machine_name",
                    format!("机器名已被占用: {}", field.machine_name)
                ));
            }
            _ => {}
        }

        let now = Utc::now().format(DATETIME_FORMAT).to_string();
        let mut row = field.to_row()?;
        row.insert("updated_at".to_string(), DataValue::String(now.clone()));

        let id = match field.id {
            Some(id) => {
                let (sql, params) = SqlBuilder::new()
                    .update(row)
                    .from("field_definitions")
                    .where_conditions(&[QueryCondition::eq("id", DataValue::Int(id))])
                    .build()?;
                self.conn.execute(&sql, &params).await?;
                debug!("更新字段定义: {}", field.machine_name);
                id
            }
            None => {
                row.insert("created_at".to_string(), DataValue::String(now));
                let (sql, params) = SqlBuilder::new()
                    .insert(row)
                    .from("field_definitions")
                    .build()?;
                let result = self.conn.execute(&sql, &params).await?;
                field.id = Some(result.last_insert_id);
                info!(
                    "创建字段定义: {} (#{})",
                    field.machine_name, result.last_insert_id
                );
                result.last_insert_id
            }
        };

        let shared = Arc::new(field.clone());
        self.by_id.insert(id, shared);
        self.by_name.insert(field.machine_name.clone(), id);
        Ok(id)
    }

    /// 按ID查找（优先进程内缓存）
    pub async fn find(&self, id: i64) -> QuickFieldResult<Option<Arc<FieldDefinition>>> {
        if let Some(field) = self.by_id.get(&id) {
            return Ok(Some(field.clone()));
        }
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("field_definitions")
            .where_conditions(&[QueryCondition::eq("id", DataValue::Int(id))])
            .build()?;
        match self.conn.fetch_optional(&sql, &params).await? {
            Some(row) => {
                let field = Arc::new(FieldDefinition::from_row(&row)?);
                self.by_id.insert(id, field.clone());
                self.by_name.insert(field.machine_name.clone(), id);
                Ok(Some(field))
            }
            None => Ok(None),
        }
    }

    /// 按机器名查找
    pub async fn find_by_machine_name(
        &self,
        machine_name: &str,
    ) -> QuickFieldResult<Option<Arc<FieldDefinition>>> {
        if let Some(id) = self.by_name.get(machine_name) {
            return self.find(*id).await;
        }
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("field_definitions")
            .where_conditions(&[QueryCondition::eq(
                "machine_name",
                DataValue::String(machine_name.to_string()),
            )])
            .build()?;
        match self.conn.fetch_optional(&sql, &params).await? {
            Some(row) => {
                let field = Arc::new(FieldDefinition::from_row(&row)?);
                if let Some(id) = field.id {
                    self.by_id.insert(id, field.clone());
                    self.by_name.insert(field.machine_name.clone(), id);
                }
                Ok(Some(field))
            }
            None => Ok(None),
        }
    }

    /// 全部字段定义，按权重与机器名排序
    pub async fn find_all(&self) -> QuickFieldResult<Vec<Arc<FieldDefinition>>> {
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("field_definitions")
            .order_by("weight", SortDirection::Asc)
            .order_by("machine_name", SortDirection::Asc)
            .build()?;
        let rows = self.conn.fetch_all(&sql, &params).await?;
        let mut fields = Vec::with_capacity(rows.len());
        for row in &rows {
            let field = Arc::new(FieldDefinition::from_row(row)?);
            if let Some(id) = field.id {
                self.by_id.insert(id, field.clone());
                self.by_name.insert(field.machine_name.clone(), id);
            }
            fields.push(field);
        }
        Ok(fields)
    }

    /// 字段定义总数
    pub async fn count(&self) -> QuickFieldResult<i64> {
        let rows = self
            .conn
            .fetch_all("SELECT COUNT(*) AS total FROM field_definitions", &[])
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(|value| match value {
                DataValue::Int(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0))
    }

    /// 删除字段定义，级联清除挂载、值与修订
    pub async fn delete(&self, id: i64) -> QuickFieldResult<()> {
        self.conn.begin().await?;
        let result = async {
            for table in ["field_revisions", "field_values", "field_attachments"] {
                let (sql, params) = SqlBuilder::new()
                    .delete()
                    .from(table)
                    .where_conditions(&[QueryCondition::eq("field_id", DataValue::Int(id))])
                    .build()?;
                self.conn.execute(&sql, &params).await?;
            }
            let (sql, params) = SqlBuilder::new()
                .delete()
                .from("field_definitions")
                .where_conditions(&[QueryCondition::eq("id", DataValue::Int(id))])
                .build()?;
            self.conn.execute(&sql, &params).await
        }
        .await;
        match result {
            Ok(_) => {
                self.conn.commit().await?;
                if let Some((_, field)) = self.by_id.remove(&id) {
                    self.by_name.remove(&field.machine_name);
                }
                info!("删除字段定义: #{}", id);
                Ok(())
            }
            Err(e) => {
                self.conn.rollback().await?;
                Err(e)
            }
        }
    }

    /// 挂载字段到实体类型（同键挂载更新权重与设置）
    pub async fn attach_to_entity(&self, attachment: &FieldAttachment) -> QuickFieldResult<i64> {
        let mut conditions = vec![
            QueryCondition::eq("field_id", DataValue::Int(attachment.field_id)),
            QueryCondition::eq(
                "entity_type",
                DataValue::String(attachment.entity_type.clone()),
            ),
        ];
        match attachment.bundle_id {
            Some(bundle) => conditions.push(QueryCondition::eq("bundle_id", DataValue::Int(bundle))),
            None => conditions.push(QueryCondition::new(
                "bundle_id",
                crate::types::QueryOperator::IsNull,
                DataValue::Null,
            )),
        }
        let (sql, params) = SqlBuilder::new()
            .select(&["id"])
            .from("field_attachments")
            .where_conditions(&conditions)
            .build()?;
        if let Some(row) = self.conn.fetch_optional(&sql, &params).await? {
            let existing_id = match row.get("id") {
                Some(DataValue::Int(id)) => *id,
                _ => 0,
            };
            let mut values = attachment.to_row();
            values.remove("field_id");
            values.remove("entity_type");
            values.remove("bundle_id");
            let (sql, params) = SqlBuilder::new()
                .update(values)
                .from("field_attachments")
                .where_conditions(&[QueryCondition::eq("id", DataValue::Int(existing_id))])
                .build()?;
            self.conn.execute(&sql, &params).await?;
            return Ok(existing_id);
        }
        let (sql, params) = SqlBuilder::new()
            .insert(attachment.to_row())
            .from("field_attachments")
            .build()?;
        let result = self.conn.execute(&sql, &params).await?;
        debug!(
            "挂载字段 #{} 到 {}",
            attachment.field_id, attachment.entity_type
        );
        Ok(result.last_insert_id)
    }

    /// 解除挂载并清除该实体类型下的字段值
    pub async fn detach_from_entity(
        &self,
        field_id: i64,
        entity_type: &str,
    ) -> QuickFieldResult<()> {
        self.conn.begin().await?;
        let result = async {
            for table in ["field_attachments", "field_values"] {
                let (sql, params) = SqlBuilder::new()
                    .delete()
                    .from(table)
                    .where_conditions(&[
                        QueryCondition::eq("field_id", DataValue::Int(field_id)),
                        QueryCondition::eq(
                            "entity_type",
                            DataValue::String(entity_type.to_string()),
                        ),
                    ])
                    .build()?;
                self.conn.execute(&sql, &params).await?;
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => self.conn.commit().await,
            Err(e) => {
                self.conn.rollback().await?;
                Err(e)
            }
        }
    }

    /// 某实体类型挂载的全部字段，按挂载权重排序
    pub async fn find_by_entity_type(
        &self,
        entity_type: &str,
        bundle_id: Option<i64>,
    ) -> QuickFieldResult<Vec<Arc<FieldDefinition>>> {
        // 指定束时同时包含挂载到全部束（bundle_id 为 NULL）的字段
        let (sql, params) = if let Some(bundle) = bundle_id {
            (
                "SELECT * FROM field_attachments WHERE entity_type = ? \
                 AND (bundle_id = ? OR bundle_id IS NULL) ORDER BY weight ASC"
                    .to_string(),
                vec![
                    DataValue::String(entity_type.to_string()),
                    DataValue::Int(bundle),
                ],
            )
        } else {
            (
                "SELECT * FROM field_attachments WHERE entity_type = ? ORDER BY weight ASC"
                    .to_string(),
                vec![DataValue::String(entity_type.to_string())],
            )
        };
        let rows = self.conn.fetch_all(&sql, &params).await?;
        let mut fields = Vec::with_capacity(rows.len());
        for row in &rows {
            let attachment = FieldAttachment::from_row(row);
            if let Some(field) = self.find(attachment.field_id).await? {
                fields.push(field);
            }
        }
        Ok(fields)
    }

    /// 某实体类型的挂载记录，按权重排序
    pub async fn attachments_for(
        &self,
        entity_type: &str,
    ) -> QuickFieldResult<Vec<FieldAttachment>> {
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("field_attachments")
            .where_conditions(&[QueryCondition::eq(
                "entity_type",
                DataValue::String(entity_type.to_string()),
            )])
            .order_by("weight", SortDirection::Asc)
            .build()?;
        let rows = self.conn.fetch_all(&sql, &params).await?;
        Ok(rows.iter().map(FieldAttachment::from_row).collect())
    }

    /// 清空进程内缓存（测试与热更新场景）
    pub fn clear_cache(&self) {
        self.by_id.clear();
        self.by_name.clear();
    }

    async fn lookup_id_by_name(&self, machine_name: &str) -> QuickFieldResult<Option<i64>> {
        let (sql, params) = SqlBuilder::new()
            .select(&["id"])
            .from("field_definitions")
            .where_conditions(&[QueryCondition::eq(
                "machine_name",
                DataValue::String(machine_name.to_string()),
            )])
            .build()?;
        Ok(self
            .conn
            .fetch_optional(&sql, &params)
            .await?
            .and_then(|row| match row.get("id") {
                Some(DataValue::Int(id)) => Some(*id),
                _ => None,
            }))
    }
}

impl std::fmt::Debug for FieldRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRepository")
            .field("cached", &self.by_id.len())
            .finish()
    }
}
