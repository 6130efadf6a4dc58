//! 实体管理器
//!
//! 持久化流程的唯一入口：插入、更新、删除、恢复、批量写、事务辅助。
//! 管理器按实体类型维护模式注册表，单条查找走读通缓存，
//! 任何写路径在落库后失效对应缓存键。
//!
//! 生命周期事件固定顺序：PreSave -> PreInsert/PreUpdate -> 落库 ->
//! PostInsert/PostUpdate -> PostSave；删除为 PreDelete -> 落库 -> PostDelete。

use crate::cache::RecordCache;
use crate::connection::{RelationalConnection, Row, SqlBuilder};
use crate::entity::{Entity, EntityEvent, EntitySchema, EventDispatcher};
use crate::error::{QuickFieldError, QuickFieldResult};
use crate::query::EntityQuery;
use crate::quick_error;
use crate::types::{DataValue, QueryCondition, QueryOperator};
use chrono::Utc;
use dashmap::DashMap;
use rat_logger::{debug, info};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// 实体管理器
pub struct EntityManager {
    conn: Arc<dyn RelationalConnection>,
    schemas: DashMap<String, Arc<EntitySchema>>,
    cache: Arc<RecordCache>,
    events: Arc<EventDispatcher>,
}

impl EntityManager {
    pub fn new(conn: Arc<dyn RelationalConnection>, cache: Arc<RecordCache>) -> Self {
        Self {
            conn,
            schemas: DashMap::new(),
            cache,
            events: Arc::new(EventDispatcher::new()),
        }
    }

    /// 注册实体模式（同名覆盖）
    pub fn register_schema(&self, schema: Arc<EntitySchema>) {
        debug!("注册实体模式: {} -> {}", schema.entity_type, schema.table);
        self.schemas.insert(schema.entity_type.clone(), schema);
    }

    /// 查找已注册的模式
    pub fn schema(&self, entity_type: &str) -> QuickFieldResult<Arc<EntitySchema>> {
        self.schemas
            .get(entity_type)
            .map(|s| s.clone())
            .ok_or_else(|| quick_error!(invariant, format!("实体类型未注册: {}", entity_type)))
    }

    /// 底层连接
    pub fn connection(&self) -> &Arc<dyn RelationalConnection> {
        &self.conn
    }

    /// 记录缓存
    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    /// 注册生命周期监听器
    pub fn on<F>(&self, event: EntityEvent, listener: F)
    where
        F: Fn(&mut Entity) -> QuickFieldResult<()> + Send + Sync + 'static,
    {
        self.events.on(event, listener);
    }

    /// 创建未持久化的空实体
    pub fn new_entity(&self, entity_type: &str) -> QuickFieldResult<Entity> {
        Ok(Entity::new(self.schema(entity_type)?))
    }

    /// 从原始输入创建并填充实体（可填充白名单在实体内强制执行）
    pub fn make(
        &self,
        entity_type: &str,
        data: &HashMap<String, DataValue>,
    ) -> QuickFieldResult<Entity> {
        Ok(Entity::from_input(self.schema(entity_type)?, data))
    }

    /// 按主键查找（软删除实体视为不存在）
    pub async fn find(&self, entity_type: &str, id: i64) -> QuickFieldResult<Option<Entity>> {
        let schema = self.schema(entity_type)?;
        match self.find_row(&schema, id).await? {
            Some(row) => {
                if schema.supports_soft_delete() {
                    if let Some(deleted) = row.get("deleted_at") {
                        if !deleted.is_null() {
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(Entity::from_storage(schema, &row)))
            }
            None => Ok(None),
        }
    }

    /// 按主键查找，包含软删除实体
    pub async fn find_with_trashed(
        &self,
        entity_type: &str,
        id: i64,
    ) -> QuickFieldResult<Option<Entity>> {
        let schema = self.schema(entity_type)?;
        Ok(self
            .find_row(&schema, id)
            .await?
            .map(|row| Entity::from_storage(schema.clone(), &row)))
    }

    /// 读通缓存的行级查找
    async fn find_row(&self, schema: &Arc<EntitySchema>, id: i64) -> QuickFieldResult<Option<Row>> {
        if let Some(row) = self.cache.get(&schema.entity_type, id) {
            return Ok(Some(row));
        }
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from(&schema.table)
            .where_conditions(&[QueryCondition::eq(&schema.primary_key, DataValue::Int(id))])
            .build()?;
        let row = self.conn.fetch_optional(&sql, &params).await?;
        if let Some(ref row) = row {
            self.cache.put(&schema.entity_type, id, row.clone());
        }
        Ok(row)
    }

    /// 保存实体：未持久化走插入，已持久化走更新
    ///
    /// 返回 true 表示产生了写操作；已持久化且无脏属性时为 false。
    pub async fn save(&self, entity: &mut Entity) -> QuickFieldResult<bool> {
        if entity.exists() {
            self.update(entity).await
        } else {
            self.insert(entity).await.map(|_| true)
        }
    }

    /// 插入实体并回填自增主键
    pub async fn insert(&self, entity: &mut Entity) -> QuickFieldResult<i64> {
        let schema = entity.schema().clone();
        self.events.dispatch(EntityEvent::PreSave, entity)?;
        self.events.dispatch(EntityEvent::PreInsert, entity)?;

        let now = Utc::now();
        if schema.supports_timestamps() {
            if entity.get("created_at").is_null() {
                entity.set("created_at", DataValue::DateTime(now));
            }
            entity.set("updated_at", DataValue::DateTime(now));
        }
        if schema.supports_revisions() {
            entity.set("revision", DataValue::Int(1));
        }

        let values = entity.to_storage();
        let (sql, params) = SqlBuilder::new().insert(values).from(&schema.table).build()?;
        let result = self.conn.execute(&sql, &params).await?;
        entity.set_id(result.last_insert_id);
        entity.sync();
        self.cache.invalidate(&schema.entity_type, result.last_insert_id);
        info!(
            "插入实体: {}#{}",
            schema.entity_type, result.last_insert_id
        );

        self.events.dispatch(EntityEvent::PostInsert, entity)?;
        self.events.dispatch(EntityEvent::PostSave, entity)?;
        Ok(result.last_insert_id)
    }

    /// 更新实体（只写脏列）
    ///
    /// 模式带修订能力时以修订号做比较交换：语句带 `AND revision = 期望值`
    /// 谓词，零行受影响即并发冲突。无脏属性时静默跳过，返回 false。
    pub async fn update(&self, entity: &mut Entity) -> QuickFieldResult<bool> {
        let schema = entity.schema().clone();
        if !entity.exists() {
            return Err(quick_error!(
                invariant,
                format!("不能更新未持久化的实体: {}", schema.entity_type)
            ));
        }
        let id = entity.id().ok_or_else(|| {
            quick_error!(invariant, format!("实体缺少主键: {}", schema.entity_type))
        })?;

        self.events.dispatch(EntityEvent::PreSave, entity)?;
        self.events.dispatch(EntityEvent::PreUpdate, entity)?;

        // 先判脏再盖时间戳，无实际变更时不产生写操作
        if !entity.is_dirty() {
            debug!("跳过无变更的更新: {}#{}", schema.entity_type, id);
            return Ok(false);
        }

        if schema.supports_timestamps() {
            entity.set("updated_at", DataValue::DateTime(Utc::now()));
        }
        let expected_revision = if schema.supports_revisions() {
            let current = entity.get_i64("revision").unwrap_or(0);
            entity.set("revision", DataValue::Int(current + 1));
            Some(current)
        } else {
            None
        };

        let mut values = entity.get_dirty();
        values.remove(&schema.primary_key);
        for attr in &schema.attributes {
            if attr.transient {
                values.remove(&attr.name);
            }
        }
        if values.is_empty() {
            return Ok(false);
        }

        let mut conditions = vec![QueryCondition::eq(&schema.primary_key, DataValue::Int(id))];
        if let Some(expected) = expected_revision {
            conditions.push(QueryCondition::eq("revision", DataValue::Int(expected)));
        }
        let (sql, params) = SqlBuilder::new()
            .update(values)
            .from(&schema.table)
            .where_conditions(&conditions)
            .build()?;
        let result = self.conn.execute(&sql, &params).await?;
        if result.rows_affected == 0 {
            if let Some(expected) = expected_revision {
                return Err(QuickFieldError::RevisionConflict {
                    entity_type: schema.entity_type.clone(),
                    id: id.to_string(),
                    expected,
                });
            }
            return Err(QuickFieldError::NotFound {
                entity_type: schema.entity_type.clone(),
                id: id.to_string(),
            });
        }

        entity.sync();
        self.cache.invalidate(&schema.entity_type, id);
        debug!("更新实体: {}#{}", schema.entity_type, id);

        self.events.dispatch(EntityEvent::PostUpdate, entity)?;
        self.events.dispatch(EntityEvent::PostSave, entity)?;
        Ok(true)
    }

    /// 删除实体：模式带软删除能力时标记 deleted_at，否则物理删除
    pub async fn delete(&self, entity: &mut Entity) -> QuickFieldResult<()> {
        let schema = entity.schema().clone();
        if schema.supports_soft_delete() {
            let id = self.require_id(entity)?;
            self.events.dispatch(EntityEvent::PreDelete, entity)?;
            entity.set("deleted_at", DataValue::DateTime(Utc::now()));
            if schema.supports_timestamps() {
                entity.set("updated_at", DataValue::DateTime(Utc::now()));
            }
            self.write_columns(&schema, id, entity.get_dirty()).await?;
            entity.sync();
            self.cache.invalidate(&schema.entity_type, id);
            info!("软删除实体: {}#{}", schema.entity_type, id);
            self.events.dispatch(EntityEvent::PostDelete, entity)?;
            Ok(())
        } else {
            self.force_delete(entity).await
        }
    }

    /// 物理删除（无视软删除能力）
    pub async fn force_delete(&self, entity: &mut Entity) -> QuickFieldResult<()> {
        let schema = entity.schema().clone();
        let id = self.require_id(entity)?;
        self.events.dispatch(EntityEvent::PreDelete, entity)?;
        let (sql, params) = SqlBuilder::new()
            .delete()
            .from(&schema.table)
            .where_conditions(&[QueryCondition::eq(&schema.primary_key, DataValue::Int(id))])
            .build()?;
        self.conn.execute(&sql, &params).await?;
        entity.mark_removed();
        self.cache.invalidate(&schema.entity_type, id);
        info!("物理删除实体: {}#{}", schema.entity_type, id);
        self.events.dispatch(EntityEvent::PostDelete, entity)?;
        Ok(())
    }

    /// 恢复软删除的实体（清空 deleted_at）
    pub async fn restore(&self, entity: &mut Entity) -> QuickFieldResult<()> {
        let schema = entity.schema().clone();
        if !schema.supports_soft_delete() {
            return Err(quick_error!(
                invariant,
                format!("实体类型不支持软删除恢复: {}", schema.entity_type)
            ));
        }
        let id = self.require_id(entity)?;
        entity.set("deleted_at", DataValue::Null);
        if schema.supports_timestamps() {
            entity.set("updated_at", DataValue::DateTime(Utc::now()));
        }
        self.write_columns(&schema, id, entity.get_dirty()).await?;
        entity.sync();
        self.cache.invalidate(&schema.entity_type, id);
        info!("恢复实体: {}#{}", schema.entity_type, id);
        Ok(())
    }

    /// 单事务批量插入，任何一条失败整体回滚
    pub async fn insert_many(
        &self,
        entity_type: &str,
        records: Vec<HashMap<String, DataValue>>,
    ) -> QuickFieldResult<Vec<Entity>> {
        // 先在事务外构建实体，避免类型未注册时留下悬挂事务
        let mut entities = Vec::with_capacity(records.len());
        for data in &records {
            entities.push(self.make(entity_type, data)?);
        }
        self.conn.begin().await?;
        for entity in &mut entities {
            if let Err(e) = self.insert(entity).await {
                self.conn.rollback().await?;
                return Err(e);
            }
        }
        self.conn.commit().await?;
        Ok(entities)
    }

    /// 按条件批量更新，返回受影响的行数
    pub async fn update_by(
        &self,
        entity_type: &str,
        conditions: &[QueryCondition],
        values: HashMap<String, DataValue>,
    ) -> QuickFieldResult<u64> {
        let schema = self.schema(entity_type)?;
        let (sql, params) = SqlBuilder::new()
            .update(values)
            .from(&schema.table)
            .where_conditions(conditions)
            .build()?;
        let result = self.conn.execute(&sql, &params).await?;
        self.cache.invalidate_entity_type(entity_type);
        Ok(result.rows_affected)
    }

    /// 按条件批量物理删除，返回受影响的行数
    pub async fn delete_by(
        &self,
        entity_type: &str,
        conditions: &[QueryCondition],
    ) -> QuickFieldResult<u64> {
        let schema = self.schema(entity_type)?;
        let (sql, params) = SqlBuilder::new()
            .delete()
            .from(&schema.table)
            .where_conditions(conditions)
            .build()?;
        let result = self.conn.execute(&sql, &params).await?;
        self.cache.invalidate_entity_type(entity_type);
        Ok(result.rows_affected)
    }

    /// 按单字段等值条件查找全部匹配
    pub async fn find_by(
        &self,
        entity_type: &str,
        field: &str,
        value: DataValue,
    ) -> QuickFieldResult<Vec<Entity>> {
        self.query(entity_type)?
            .where_op(field, QueryOperator::Eq, value)
            .get()
            .await
    }

    /// 按单字段等值条件查找第一条
    pub async fn first_by(
        &self,
        entity_type: &str,
        field: &str,
        value: DataValue,
    ) -> QuickFieldResult<Option<Entity>> {
        self.query(entity_type)?
            .where_op(field, QueryOperator::Eq, value)
            .first()
            .await
    }

    /// 构建查询
    pub fn query(&self, entity_type: &str) -> QuickFieldResult<EntityQuery> {
        Ok(EntityQuery::new(self.conn.clone(), self.schema(entity_type)?))
    }

    /// 事务辅助：闭包成功则提交，出错则回滚并原样传播
    ///
    /// 嵌套调用由连接层的保存点机制承接。
    pub async fn transaction<T, F, Fut>(&self, f: F) -> QuickFieldResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QuickFieldResult<T>>,
    {
        self.conn.begin().await?;
        match f().await {
            Ok(value) => {
                self.conn.commit().await?;
                Ok(value)
            }
            Err(e) => {
                self.conn.rollback().await?;
                Err(e)
            }
        }
    }

    fn require_id(&self, entity: &Entity) -> QuickFieldResult<i64> {
        entity.id().ok_or_else(|| {
            quick_error!(
                invariant,
                format!("实体缺少主键: {}", entity.schema().entity_type)
            )
        })
    }

    /// 直写指定列（删除/恢复内部使用，不走事件与修订检查）
    async fn write_columns(
        &self,
        schema: &Arc<EntitySchema>,
        id: i64,
        mut values: HashMap<String, DataValue>,
    ) -> QuickFieldResult<()> {
        values.remove(&schema.primary_key);
        if values.is_empty() {
            return Ok(());
        }
        let (sql, params) = SqlBuilder::new()
            .update(values)
            .from(&schema.table)
            .where_conditions(&[QueryCondition::eq(&schema.primary_key, DataValue::Int(id))])
            .build()?;
        let result = self.conn.execute(&sql, &params).await?;
        if result.rows_affected == 0 {
            return Err(QuickFieldError::NotFound {
                entity_type: schema.entity_type.clone(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 仅统计未软删除的记录数
    pub async fn count(&self, entity_type: &str) -> QuickFieldResult<u64> {
        self.query(entity_type)?.count().await
    }

    /// 按条件查询是否存在记录
    pub async fn exists_by(
        &self,
        entity_type: &str,
        field: &str,
        value: DataValue,
    ) -> QuickFieldResult<bool> {
        self.query(entity_type)?
            .where_op(field, QueryOperator::Eq, value)
            .exists()
            .await
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("schemas", &self.schemas.len())
            .finish()
    }
}
