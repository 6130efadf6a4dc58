//! 实体查询构建器
//!
//! 链式 where/orWhere 语义：连续的 where* 并入当前 AND 组，
//! or_where* 封存当前组并开启新组，最终 WHERE 为各组的 OR 组合，
//! 渲染时显式加括号。软删除模式默认过滤已删除行，过滤谓词附加在
//! OR 结构之外的顶层 AND 上，with_trashed 可解除。

use crate::connection::{validate_identifier, RelationalConnection, SqlBuilder};
use crate::entity::{Entity, EntitySchema};
use crate::error::QuickFieldResult;
use crate::quick_error;
use crate::types::{
    ConditionNode, DataValue, LogicalOperator, QueryCondition, QueryOperator, SortConfig,
    SortDirection,
};
use serde::Serialize;
use std::sync::Arc;

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    /// 末页页码；total 为 0 时为 0
    pub last_page: u64,
}

/// 实体查询构建器
pub struct EntityQuery {
    conn: Arc<dyn RelationalConnection>,
    schema: Arc<EntitySchema>,
    /// 已封存的 AND 组
    sealed_groups: Vec<Vec<ConditionNode>>,
    /// 当前正在累积的 AND 组
    current_group: Vec<ConditionNode>,
    order_by: Vec<SortConfig>,
    limit: Option<u64>,
    offset: Option<u64>,
    include_trashed: bool,
}

impl EntityQuery {
    pub fn new(conn: Arc<dyn RelationalConnection>, schema: Arc<EntitySchema>) -> Self {
        Self {
            conn,
            schema,
            sealed_groups: Vec::new(),
            current_group: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            include_trashed: false,
        }
    }

    fn push(mut self, node: ConditionNode) -> Self {
        self.current_group.push(node);
        self
    }

    /// 封存当前组并开启新组
    fn seal_group(&mut self) {
        if !self.current_group.is_empty() {
            self.sealed_groups.push(std::mem::take(&mut self.current_group));
        }
    }

    /// 等值条件（并入当前 AND 组）
    pub fn where_eq(self, field: &str, value: impl Into<DataValue>) -> Self {
        self.push(ConditionNode::Single(QueryCondition::eq(field, value.into())))
    }

    /// 任意操作符条件
    pub fn where_op(self, field: &str, operator: QueryOperator, value: DataValue) -> Self {
        self.push(ConditionNode::Single(QueryCondition::new(
            field, operator, value,
        )))
    }

    /// 模糊匹配（调用方自带通配符）
    pub fn where_like(self, field: &str, pattern: &str) -> Self {
        self.push(ConditionNode::Single(QueryCondition::new(
            field,
            QueryOperator::Like,
            DataValue::String(pattern.to_string()),
        )))
    }

    /// IN 条件（空列表永不匹配）
    pub fn where_in(self, field: &str, values: Vec<DataValue>) -> Self {
        self.push(ConditionNode::Single(QueryCondition::new(
            field,
            QueryOperator::In,
            DataValue::Array(values),
        )))
    }

    /// NOT IN 条件（空列表恒为真）
    pub fn where_not_in(self, field: &str, values: Vec<DataValue>) -> Self {
        self.push(ConditionNode::Single(QueryCondition::new(
            field,
            QueryOperator::NotIn,
            DataValue::Array(values),
        )))
    }

    /// IS NULL 条件
    pub fn where_null(self, field: &str) -> Self {
        self.push(ConditionNode::Single(QueryCondition::new(
            field,
            QueryOperator::IsNull,
            DataValue::Null,
        )))
    }

    /// IS NOT NULL 条件
    pub fn where_not_null(self, field: &str) -> Self {
        self.push(ConditionNode::Single(QueryCondition::new(
            field,
            QueryOperator::IsNotNull,
            DataValue::Null,
        )))
    }

    /// 闭区间条件
    pub fn where_between(self, field: &str, low: DataValue, high: DataValue) -> Self {
        self.push(ConditionNode::Single(QueryCondition::new(
            field,
            QueryOperator::Between,
            DataValue::Array(vec![low, high]),
        )))
    }

    /// 原生谓词逃生通道，参数始终绑定
    pub fn where_raw(self, sql: &str, params: Vec<DataValue>) -> Self {
        self.push(ConditionNode::Raw {
            sql: sql.to_string(),
            params,
        })
    }

    /// 开启新的 OR 分支并添加等值条件
    pub fn or_where_eq(mut self, field: &str, value: impl Into<DataValue>) -> Self {
        self.seal_group();
        self.where_eq(field, value)
    }

    /// 开启新的 OR 分支并添加任意操作符条件
    pub fn or_where_op(mut self, field: &str, operator: QueryOperator, value: DataValue) -> Self {
        self.seal_group();
        self.where_op(field, operator, value)
    }

    /// 排序
    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push(SortConfig {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// 按创建时间降序
    pub fn latest(self) -> Self {
        self.order_by("created_at", SortDirection::Desc)
    }

    /// 按创建时间升序
    pub fn oldest(self) -> Self {
        self.order_by("created_at", SortDirection::Asc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 按页设置 limit/offset（页码从 1 起）
    pub fn for_page(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit = Some(per_page);
        self.offset = Some((page - 1) * per_page);
        self
    }

    /// 结果包含软删除行
    pub fn with_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    /// 组装最终条件节点
    fn final_nodes(&self) -> Vec<ConditionNode> {
        let mut groups = self.sealed_groups.clone();
        if !self.current_group.is_empty() {
            groups.push(self.current_group.clone());
        }
        let mut nodes = Vec::new();
        match groups.len() {
            0 => {}
            1 => nodes.extend(groups.remove(0)),
            _ => {
                let branches: Vec<ConditionNode> = groups
                    .into_iter()
                    .map(|g| ConditionNode::Group {
                        operator: LogicalOperator::And,
                        nodes: g,
                    })
                    .collect();
                nodes.push(ConditionNode::Group {
                    operator: LogicalOperator::Or,
                    nodes: branches,
                });
            }
        }
        if self.schema.supports_soft_delete() && !self.include_trashed {
            nodes.push(ConditionNode::Single(QueryCondition::new(
                "deleted_at",
                QueryOperator::IsNull,
                DataValue::Null,
            )));
        }
        nodes
    }

    fn base_builder(&self) -> SqlBuilder {
        SqlBuilder::new()
            .from(&self.schema.table)
            .where_nodes(&self.final_nodes())
    }

    /// 执行查询并水合实体
    pub async fn get(self) -> QuickFieldResult<Vec<Entity>> {
        let mut builder = self.base_builder().select(&["*"]);
        for sort in &self.order_by {
            builder = builder.order_by(&sort.field, sort.direction);
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        let (sql, params) = builder.build()?;
        let rows = self.conn.fetch_all(&sql, &params).await?;
        Ok(rows
            .iter()
            .map(|row| Entity::from_storage(self.schema.clone(), row))
            .collect())
    }

    /// 取第一条
    pub async fn first(self) -> QuickFieldResult<Option<Entity>> {
        let mut entities = self.limit(1).get().await?;
        Ok(if entities.is_empty() {
            None
        } else {
            Some(entities.remove(0))
        })
    }

    /// 统计行数
    pub async fn count(&self) -> QuickFieldResult<u64> {
        match self.aggregate("COUNT(*)").await? {
            DataValue::Int(n) => Ok(n.max(0) as u64),
            _ => Ok(0),
        }
    }

    /// 是否存在匹配行
    pub async fn exists(&self) -> QuickFieldResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// 求和（无匹配行时为 0.0）
    pub async fn sum(&self, field: &str) -> QuickFieldResult<f64> {
        validate_identifier(field)?;
        match self.aggregate(&format!("SUM({})", field)).await? {
            DataValue::Int(n) => Ok(n as f64),
            DataValue::Float(f) => Ok(f),
            _ => Ok(0.0),
        }
    }

    /// 平均值（无匹配行时为 None）
    pub async fn avg(&self, field: &str) -> QuickFieldResult<Option<f64>> {
        validate_identifier(field)?;
        match self.aggregate(&format!("AVG({})", field)).await? {
            DataValue::Int(n) => Ok(Some(n as f64)),
            DataValue::Float(f) => Ok(Some(f)),
            _ => Ok(None),
        }
    }

    /// 最大值
    pub async fn max(&self, field: &str) -> QuickFieldResult<DataValue> {
        validate_identifier(field)?;
        self.aggregate(&format!("MAX({})", field)).await
    }

    /// 最小值
    pub async fn min(&self, field: &str) -> QuickFieldResult<DataValue> {
        validate_identifier(field)?;
        self.aggregate(&format!("MIN({})", field)).await
    }

    async fn aggregate(&self, expr: &str) -> QuickFieldResult<DataValue> {
        let (sql, params) = self
            .base_builder()
            .select(&[&format!("{} AS aggregate", expr)])
            .build()?;
        let row = self
            .conn
            .fetch_optional(&sql, &params)
            .await?
            .ok_or_else(|| quick_error!(query, "聚合查询未返回结果行"))?;
        Ok(row.get("aggregate").cloned().unwrap_or(DataValue::Null))
    }

    /// 摘取单列的值
    pub async fn pluck(self, field: &str) -> QuickFieldResult<Vec<DataValue>> {
        validate_identifier(field)?;
        let mut builder = self.base_builder().select(&[field]);
        for sort in &self.order_by {
            builder = builder.order_by(&sort.field, sort.direction);
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        let (sql, params) = builder.build()?;
        let rows = self.conn.fetch_all(&sql, &params).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(field).unwrap_or(DataValue::Null))
            .collect())
    }

    /// 分页查询
    ///
    /// 末页页码为 ceil(total / per_page)，总数为 0 时末页为 0。
    pub async fn paginate(self, page: u64, per_page: u64) -> QuickFieldResult<Paginated<Entity>> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = self.count().await?;
        let data = self.for_page(page, per_page).get().await?;
        let last_page = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Ok(Paginated {
            data,
            total,
            page,
            per_page,
            last_page,
        })
    }
}

impl std::fmt::Debug for EntityQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityQuery")
            .field("entity_type", &self.schema.entity_type)
            .field("sealed_groups", &self.sealed_groups.len())
            .field("current_group", &self.current_group.len())
            .finish()
    }
}
