//! 实体模式描述符
//!
//! 每个实体类型在注册时构建一份显式的、有序的属性描述表，
//! 之后实体的填充、水合、投影与脏检测全部查表进行，运行期
//! 不做任何反射式的属性枚举。软删除/时间戳/修订能力通过
//! 能力测试方法暴露，而不是继承或混入。

use crate::types::{CastKind, DataValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 单个属性的描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// 属性名（即存储列名）
    pub name: String,
    /// 转换类别
    pub cast: CastKind,
    /// 是否允许批量填充
    pub fillable: bool,
    /// 是否从对外投影中隐藏
    pub hidden: bool,
    /// 是否为暂态属性（不进入存储投影）
    pub transient: bool,
    /// 默认值
    pub default: DataValue,
}

/// 实体模式描述符
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    /// 实体类型机器名（如 "node"）
    pub entity_type: String,
    /// 存储表名
    pub table: String,
    /// 主键列名
    pub primary_key: String,
    /// 有序的属性描述表（不含主键）
    pub attributes: Vec<AttributeDefinition>,
    /// 是否自动维护 created_at / updated_at
    pub timestamps: bool,
    /// 是否支持软删除（deleted_at）
    pub soft_delete: bool,
    /// 是否支持修订计数（revision）
    pub revisioned: bool,
}

impl EntitySchema {
    /// 创建模式构建器
    pub fn builder(entity_type: &str, table: &str) -> EntitySchemaBuilder {
        EntitySchemaBuilder::new(entity_type, table)
    }

    /// 按名称查找属性描述
    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// 是否声明了指定属性
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// 能力测试：软删除
    pub fn supports_soft_delete(&self) -> bool {
        self.soft_delete
    }

    /// 能力测试：自动时间戳
    pub fn supports_timestamps(&self) -> bool {
        self.timestamps
    }

    /// 能力测试：修订计数
    pub fn supports_revisions(&self) -> bool {
        self.revisioned
    }
}

/// 实体模式构建器
pub struct EntitySchemaBuilder {
    schema: EntitySchema,
}

impl EntitySchemaBuilder {
    fn new(entity_type: &str, table: &str) -> Self {
        Self {
            schema: EntitySchema {
                entity_type: entity_type.to_string(),
                table: table.to_string(),
                primary_key: "id".to_string(),
                attributes: Vec::new(),
                timestamps: false,
                soft_delete: false,
                revisioned: false,
            },
        }
    }

    /// 添加可填充属性
    pub fn attribute(self, name: &str, cast: CastKind) -> Self {
        self.push(name, cast, true, false, false)
    }

    /// 添加隐藏属性（可填充但不进入对外投影，如密码散列）
    pub fn hidden_attribute(self, name: &str, cast: CastKind) -> Self {
        self.push(name, cast, true, true, false)
    }

    /// 添加暂态属性（参与对外投影但不落库）
    pub fn transient_attribute(self, name: &str, cast: CastKind) -> Self {
        self.push(name, cast, true, false, true)
    }

    /// 添加只读属性（不允许批量填充）
    pub fn guarded_attribute(self, name: &str, cast: CastKind) -> Self {
        self.push(name, cast, false, false, false)
    }

    fn push(mut self, name: &str, cast: CastKind, fillable: bool, hidden: bool, transient: bool) -> Self {
        self.schema.attributes.push(AttributeDefinition {
            name: name.to_string(),
            cast,
            fillable,
            hidden,
            transient,
            default: DataValue::Null,
        });
        self
    }

    /// 设置最近添加属性的默认值
    pub fn default_value(mut self, value: DataValue) -> Self {
        if let Some(last) = self.schema.attributes.last_mut() {
            last.default = value;
        }
        self
    }

    /// 启用自动时间戳，注入 created_at / updated_at 属性
    pub fn with_timestamps(mut self) -> Self {
        self.schema.timestamps = true;
        self = self.guarded_attribute("created_at", CastKind::DateTime);
        self.guarded_attribute("updated_at", CastKind::DateTime)
    }

    /// 启用软删除，注入 deleted_at 属性
    pub fn with_soft_delete(mut self) -> Self {
        self.schema.soft_delete = true;
        self.guarded_attribute("deleted_at", CastKind::DateTime)
    }

    /// 启用修订计数，注入 revision 属性
    pub fn with_revisions(mut self) -> Self {
        self.schema.revisioned = true;
        self.guarded_attribute("revision", CastKind::Int)
    }

    /// 完成构建
    pub fn build(self) -> Arc<EntitySchema> {
        Arc::new(self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_injects_capability_attributes() {
        let schema = EntitySchema::builder("node", "nodes")
            .attribute("title", CastKind::String)
            .with_timestamps()
            .with_soft_delete()
            .with_revisions()
            .build();
        assert!(schema.supports_timestamps());
        assert!(schema.supports_soft_delete());
        assert!(schema.supports_revisions());
        assert!(schema.has_attribute("created_at"));
        assert!(schema.has_attribute("deleted_at"));
        assert!(schema.has_attribute("revision"));
        // 能力注入的属性不允许批量填充
        assert!(!schema.attribute("deleted_at").unwrap().fillable);
    }
}
