//! 实体仓储
//!
//! 绑定单一实体类型的便捷门面，所有操作委托给实体管理器与查询构建器。

use crate::entity::Entity;
use crate::error::{QuickFieldError, QuickFieldResult};
use crate::manager::EntityManager;
use crate::query::{EntityQuery, Paginated};
use crate::types::{DataValue, QueryOperator};
use std::collections::HashMap;
use std::sync::Arc;

/// 单实体类型仓储
pub struct EntityRepository {
    manager: Arc<EntityManager>,
    entity_type: String,
}

impl EntityRepository {
    pub fn new(manager: Arc<EntityManager>, entity_type: &str) -> Self {
        Self {
            manager,
            entity_type: entity_type.to_string(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// 按主键查找
    pub async fn find(&self, id: i64) -> QuickFieldResult<Option<Entity>> {
        self.manager.find(&self.entity_type, id).await
    }

    /// 按主键查找，不存在即报 NotFound
    pub async fn find_or_fail(&self, id: i64) -> QuickFieldResult<Entity> {
        self.find(id).await?.ok_or_else(|| QuickFieldError::NotFound {
            entity_type: self.entity_type.clone(),
            id: id.to_string(),
        })
    }

    /// 按单字段等值条件查找全部匹配
    pub async fn find_by(
        &self,
        field: &str,
        value: DataValue,
    ) -> QuickFieldResult<Vec<Entity>> {
        self.query()?
            .where_op(field, QueryOperator::Eq, value)
            .get()
            .await
    }

    /// 按单字段等值条件查找第一条
    pub async fn find_one_by(
        &self,
        field: &str,
        value: DataValue,
    ) -> QuickFieldResult<Option<Entity>> {
        self.query()?
            .where_op(field, QueryOperator::Eq, value)
            .first()
            .await
    }

    /// 全部记录（软删除行默认排除）
    pub async fn all(&self) -> QuickFieldResult<Vec<Entity>> {
        self.query()?.get().await
    }

    /// 从原始输入创建并立即持久化
    pub async fn create(&self, data: &HashMap<String, DataValue>) -> QuickFieldResult<Entity> {
        let mut entity = self.manager.make(&self.entity_type, data)?;
        self.manager.insert(&mut entity).await?;
        Ok(entity)
    }

    /// 保存实体
    pub async fn save(&self, entity: &mut Entity) -> QuickFieldResult<bool> {
        self.manager.save(entity).await
    }

    /// 删除实体（语义由模式的软删除能力决定）
    pub async fn delete(&self, entity: &mut Entity) -> QuickFieldResult<()> {
        self.manager.delete(entity).await
    }

    /// 统计记录数
    pub async fn count(&self) -> QuickFieldResult<u64> {
        self.query()?.count().await
    }

    /// 分页
    pub async fn paginate(&self, page: u64, per_page: u64) -> QuickFieldResult<Paginated<Entity>> {
        self.query()?.paginate(page, per_page).await
    }

    /// 构建查询
    pub fn query(&self) -> QuickFieldResult<EntityQuery> {
        self.manager.query(&self.entity_type)
    }
}

impl std::fmt::Debug for EntityRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRepository")
            .field("entity_type", &self.entity_type)
            .finish()
    }
}
