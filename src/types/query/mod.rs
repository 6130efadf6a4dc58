use crate::types::data_value::DataValue;
use serde::{Deserialize, Serialize};

/// 查询条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCondition {
    /// 字段名
    pub field: String,
    /// 操作符
    pub operator: QueryOperator,
    /// 值
    pub value: DataValue,
}

impl QueryCondition {
    /// 构造等值条件
    pub fn eq(field: &str, value: DataValue) -> Self {
        Self {
            field: field.to_string(),
            operator: QueryOperator::Eq,
            value,
        }
    }

    /// 构造任意操作符条件
    pub fn new(field: &str, operator: QueryOperator, value: DataValue) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }
}

/// 查询操作符
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOperator {
    /// 等于
    Eq,
    /// 不等于
    Ne,
    /// 大于
    Gt,
    /// 大于等于
    Gte,
    /// 小于
    Lt,
    /// 小于等于
    Lte,
    /// 模糊匹配（LIKE，调用方自带通配符）
    Like,
    /// 在列表中
    In,
    /// 不在列表中
    NotIn,
    /// 区间（值为 [低, 高] 两元素数组）
    Between,
    /// 为空
    IsNull,
    /// 不为空
    IsNotNull,
}

/// 逻辑操作符
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// AND 逻辑
    And,
    /// OR 逻辑
    Or,
}

/// 查询条件节点
///
/// 组合节点显式携带逻辑操作符，渲染时始终加括号，
/// 避免 where/orWhere 混用超过两层时出现隐式优先级。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConditionNode {
    /// 单个条件
    Single(QueryCondition),
    /// 原生谓词逃生通道，参数始终绑定、永不拼接
    Raw {
        sql: String,
        params: Vec<DataValue>,
    },
    /// 条件组合
    Group {
        operator: LogicalOperator,
        nodes: Vec<ConditionNode>,
    },
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SortDirection {
    /// 升序
    Asc,
    /// 降序
    Desc,
}

/// 排序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortConfig {
    /// 字段名
    pub field: String,
    /// 排序方向
    pub direction: SortDirection,
}

