//! 通用实体模型
//!
//! 属性存储、类型转换与脏检测。实体不直接接触存储层：
//! 管理器负责持久化，实体只维护"当前值 vs 最近同步快照"的差异。
//!
//! 声明属性与EAV动态字段值分别存放在两个袋子里，永不混在同一个
//! 开放映射中：声明属性受模式描述符约束，动态字段按机器名索引。

use crate::connection::sqlite::DATETIME_FORMAT;
use crate::connection::Row;
use crate::entity::schema::EntitySchema;
use crate::types::{cast, DataValue};
use rat_logger::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// 通用实体
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<EntitySchema>,
    /// 声明属性的当前值
    attributes: HashMap<String, DataValue>,
    /// 最近一次水合/保存时的投影快照
    snapshot: HashMap<String, DataValue>,
    /// 是否已存在于存储中
    exists: bool,
    /// EAV动态字段值袋（机器名 -> 值），与声明属性相互独立
    fields: HashMap<String, DataValue>,
}

impl Entity {
    /// 构造一个空实体
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        let mut attributes = HashMap::new();
        for attr in &schema.attributes {
            if !attr.default.is_null() {
                attributes.insert(attr.name.clone(), attr.default.clone());
            }
        }
        Self {
            schema,
            attributes,
            snapshot: HashMap::new(),
            exists: false,
            fields: HashMap::new(),
        }
    }

    /// 从原始输入构造并填充
    pub fn from_input(schema: Arc<EntitySchema>, data: &HashMap<String, DataValue>) -> Self {
        let mut entity = Self::new(schema);
        entity.fill(data);
        entity
    }

    /// 从存储行水合实体
    ///
    /// 按声明类型逐列转换；行中缺失的列保持属性默认值。
    /// 水合后实体标记为"已存在"并立即建立脏检测快照。
    pub fn from_storage(schema: Arc<EntitySchema>, row: &Row) -> Self {
        let mut entity = Self::new(schema.clone());
        if let Some(id_value) = row.get(&schema.primary_key) {
            let casted = cast(crate::types::CastKind::Int, id_value.clone());
            if !casted.is_null() {
                entity
                    .attributes
                    .insert(schema.primary_key.clone(), casted);
            }
        }
        for attr in &schema.attributes {
            if let Some(value) = row.get(&attr.name) {
                entity
                    .attributes
                    .insert(attr.name.clone(), cast(attr.cast, value.clone()));
            }
        }
        entity.sync();
        entity
    }

    /// 实体模式
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// 是否已存在于存储中
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// 读取主键
    pub fn id(&self) -> Option<i64> {
        match self.attributes.get(&self.schema.primary_key) {
            Some(DataValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// 设置主键
    pub fn set_id(&mut self, id: i64) {
        self.attributes
            .insert(self.schema.primary_key.clone(), DataValue::Int(id));
    }

    /// 批量填充
    ///
    /// 只接受可填充属性与主键；其余键静默忽略，不报错。
    /// 每个值按声明的转换类别做宽松转换。
    pub fn fill(&mut self, data: &HashMap<String, DataValue>) {
        for (key, value) in data {
            if key == &self.schema.primary_key {
                let casted = cast(crate::types::CastKind::Int, value.clone());
                if let DataValue::Int(id) = casted {
                    self.set_id(id);
                }
                continue;
            }
            match self.schema.attribute(key) {
                Some(attr) if attr.fillable => {
                    self.attributes
                        .insert(key.clone(), cast(attr.cast, value.clone()));
                }
                Some(_) | None => {
                    debug!("忽略不可填充的键: {}.{}", self.schema.entity_type, key);
                }
            }
        }
    }

    /// 设置单个声明属性（应用声明的转换；未声明的键静默忽略）
    pub fn set(&mut self, name: &str, value: DataValue) {
        if name == self.schema.primary_key {
            if let DataValue::Int(id) = cast(crate::types::CastKind::Int, value) {
                self.set_id(id);
            }
            return;
        }
        match self.schema.attribute(name) {
            Some(attr) => {
                self.attributes
                    .insert(name.to_string(), cast(attr.cast, value));
            }
            None => {
                debug!("忽略未声明的属性: {}.{}", self.schema.entity_type, name);
            }
        }
    }

    /// 读取声明属性（未设置返回 Null）
    pub fn get(&self, name: &str) -> DataValue {
        self.attributes.get(name).cloned().unwrap_or(DataValue::Null)
    }

    /// 读取整数属性
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            DataValue::Int(i) => Some(i),
            _ => None,
        }
    }

    /// 读取浮点属性
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            DataValue::Float(f) => Some(f),
            DataValue::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    /// 读取布尔属性
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            DataValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// 读取字符串属性
    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name) {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 读取日期时间属性
    pub fn get_datetime(&self, name: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        match self.get(name) {
            DataValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// 内部投影：全部声明属性（含隐藏），日期时间渲染为固定格式字符串
    ///
    /// 脏检测快照与存储投影都以此为基准；对外投影在此之上再剔除隐藏属性。
    fn projection(&self) -> HashMap<String, DataValue> {
        let mut map = HashMap::new();
        map.insert(
            self.schema.primary_key.clone(),
            self.attributes
                .get(&self.schema.primary_key)
                .cloned()
                .unwrap_or(DataValue::Null),
        );
        for attr in &self.schema.attributes {
            let value = self.attributes.get(&attr.name).cloned().unwrap_or(DataValue::Null);
            let rendered = match value {
                DataValue::DateTime(dt) => {
                    DataValue::String(dt.format(DATETIME_FORMAT).to_string())
                }
                other => other,
            };
            map.insert(attr.name.clone(), rendered);
        }
        map
    }

    /// 对外投影：剔除隐藏属性
    pub fn to_array(&self) -> HashMap<String, DataValue> {
        let mut map = self.projection();
        for attr in &self.schema.attributes {
            if attr.hidden {
                map.remove(&attr.name);
            }
        }
        map
    }

    /// 存储投影：剔除暂态属性，主键为空时省略（插入时不发送显式空主键）
    pub fn to_storage(&self) -> HashMap<String, DataValue> {
        let mut map = self.projection();
        for attr in &self.schema.attributes {
            if attr.transient {
                map.remove(&attr.name);
            }
        }
        if matches!(map.get(&self.schema.primary_key), Some(DataValue::Null) | None) {
            map.remove(&self.schema.primary_key);
        }
        map
    }

    /// 是否有未同步的变更
    pub fn is_dirty(&self) -> bool {
        !self.get_dirty().is_empty()
    }

    /// 返回变更的键与各自的当前值
    pub fn get_dirty(&self) -> HashMap<String, DataValue> {
        let current = self.projection();
        let mut dirty = HashMap::new();
        for (key, value) in current {
            match self.snapshot.get(&key) {
                Some(snap) if snap == &value => {}
                _ => {
                    dirty.insert(key, value);
                }
            }
        }
        dirty
    }

    /// 重建脏检测快照并标记为已存在
    pub fn sync(&mut self) {
        self.snapshot = self.projection();
        self.exists = true;
    }

    /// 标记为未持久化（硬删除后调用）
    pub(crate) fn mark_removed(&mut self) {
        self.exists = false;
        self.snapshot.clear();
    }

    /// 设置EAV动态字段值（按机器名）
    pub fn set_field(&mut self, machine_name: &str, value: DataValue) {
        self.fields.insert(machine_name.to_string(), value);
    }

    /// 读取EAV动态字段值
    pub fn get_field(&self, machine_name: &str) -> DataValue {
        self.fields.get(machine_name).cloned().unwrap_or(DataValue::Null)
    }

    /// 动态字段值袋
    pub fn fields(&self) -> &HashMap<String, DataValue> {
        &self.fields
    }

    /// 覆盖整个动态字段值袋（管理器水合EAV值时使用）
    pub fn set_fields(&mut self, fields: HashMap<String, DataValue>) {
        self.fields = fields;
    }
}
