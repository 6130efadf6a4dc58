//! 存储上下文
//!
//! 把连接、实体管理器、字段仓储与字段值存储装配为一个显式句柄。
//! 没有全局注册表：每个 Store 自持全部状态，多个 Store 互不干扰，
//! 测试可以各开各的内存库并行跑。

use crate::cache::RecordCache;
use crate::config::StoreConfig;
use crate::connection::schema::{create_entity_table, create_field_tables};
use crate::connection::{RelationalConnection, SqliteConnection};
use crate::entity::{Entity, EntitySchema};
use crate::error::QuickFieldResult;
use crate::field::{FieldDefinition, FieldRepository};
use crate::manager::EntityManager;
use crate::query::EntityQuery;
use crate::repository::EntityRepository;
use crate::storage::FieldValueStorage;
use crate::types::DataValue;
use rat_logger::info;
use std::sync::Arc;

/// 存储上下文句柄
pub struct Store {
    config: StoreConfig,
    conn: Arc<dyn RelationalConnection>,
    manager: Arc<EntityManager>,
    fields: Arc<FieldRepository>,
    values: Arc<FieldValueStorage>,
}

impl Store {
    /// 按配置打开存储并准备引擎表
    pub async fn open(config: StoreConfig) -> QuickFieldResult<Self> {
        let conn: Arc<dyn RelationalConnection> =
            Arc::new(SqliteConnection::connect(&config.database.url).await?);
        create_field_tables(conn.as_ref()).await?;

        let cache = Arc::new(RecordCache::new(config.cache.ttl_secs, config.cache.enabled));
        let manager = Arc::new(EntityManager::new(conn.clone(), cache));
        let fields = Arc::new(FieldRepository::new(conn.clone()));
        let values = Arc::new(FieldValueStorage::new(conn.clone()));
        info!("存储已打开: {}", config.database.url);
        Ok(Self {
            config,
            conn,
            manager,
            fields,
            values,
        })
    }

    /// 打开内存库（测试常用）
    pub async fn open_in_memory() -> QuickFieldResult<Self> {
        Self::open(StoreConfig::in_memory()).await
    }

    /// 注册实体模式并确保实体表就绪
    pub async fn register_schema(&self, schema: Arc<EntitySchema>) -> QuickFieldResult<()> {
        create_entity_table(self.conn.as_ref(), &schema).await?;
        self.manager.register_schema(schema);
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<dyn RelationalConnection> {
        &self.conn
    }

    pub fn manager(&self) -> &Arc<EntityManager> {
        &self.manager
    }

    pub fn fields(&self) -> &Arc<FieldRepository> {
        &self.fields
    }

    pub fn values(&self) -> &Arc<FieldValueStorage> {
        &self.values
    }

    /// 绑定单一实体类型的仓储门面
    pub fn repository(&self, entity_type: &str) -> EntityRepository {
        EntityRepository::new(self.manager.clone(), entity_type)
    }

    /// 构建查询
    pub fn query(&self, entity_type: &str) -> QuickFieldResult<EntityQuery> {
        self.manager.query(entity_type)
    }

    pub fn default_language(&self) -> &str {
        &self.config.default_language
    }

    /// 查找实体并水合其全部动态字段值
    pub async fn find_with_fields(
        &self,
        entity_type: &str,
        id: i64,
    ) -> QuickFieldResult<Option<Entity>> {
        let mut entity = match self.manager.find(entity_type, id).await? {
            Some(entity) => entity,
            None => return Ok(None),
        };
        let fields = self.fields.find_by_entity_type(entity_type, None).await?;
        if !fields.is_empty() {
            let values = self
                .values
                .get_entity_values(&fields, entity_type, id, self.default_language())
                .await?;
            entity.set_fields(values);
        }
        Ok(Some(entity))
    }

    /// 保存实体及其动态字段值袋
    ///
    /// 实体本体先落库，随后按挂载的字段定义写入值袋中出现的字段；
    /// 值袋里未挂载的机器名静默忽略。
    pub async fn save_with_fields(&self, entity: &mut Entity) -> QuickFieldResult<()> {
        let entity_type = entity.schema().entity_type.clone();
        self.manager.save(entity).await?;
        let id = match entity.id() {
            Some(id) => id,
            None => return Ok(()),
        };
        let attached = self.fields.find_by_entity_type(&entity_type, None).await?;
        let language = self.default_language().to_string();
        let pairs: Vec<(&FieldDefinition, DataValue)> = attached
            .iter()
            .filter(|field| entity.fields().contains_key(&field.machine_name))
            .map(|field| (field.as_ref(), entity.get_field(&field.machine_name)))
            .collect();
        if pairs.is_empty() {
            return Ok(());
        }
        self.values
            .set_values(&pairs, &entity_type, id, &language)
            .await
    }

    /// 物理删除实体及其全部动态字段值
    pub async fn delete_with_fields(&self, entity: &mut Entity) -> QuickFieldResult<()> {
        let entity_type = entity.schema().entity_type.clone();
        let id = entity.id();
        self.manager.force_delete(entity).await?;
        if let Some(id) = id {
            self.values.delete_entity_values(&entity_type, id).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("database", &self.config.database.url)
            .finish()
    }
}
