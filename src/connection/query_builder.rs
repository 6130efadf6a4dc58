//! SQL语句构建器
//!
//! 生成参数化SQL文本与绑定参数列表，值永不拼接进语句；字段名与表名
//! 经标识符白名单校验。条件节点渲染时显式加括号，组合优先级由节点
//! 结构完全决定。

use crate::connection::validate_identifier;
use crate::error::{QuickFieldError, QuickFieldResult};
use crate::types::{
    ConditionNode, DataValue, LogicalOperator, QueryCondition, QueryOperator, SortConfig,
    SortDirection,
};
use std::collections::HashMap;

/// 语句类型
#[derive(Debug, Clone)]
enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// SQL构建器
pub struct SqlBuilder {
    kind: StatementKind,
    table: String,
    /// SELECT 的输出表达式（已由调用方校验内部标识符）
    select_exprs: Vec<String>,
    nodes: Vec<ConditionNode>,
    order_by: Vec<SortConfig>,
    limit: Option<u64>,
    offset: Option<u64>,
    values: HashMap<String, DataValue>,
    /// UPDATE 是否保留 Null 值（软删除恢复需要显式 SET NULL）
    keep_nulls: bool,
}

impl SqlBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            kind: StatementKind::Select,
            table: String::new(),
            select_exprs: Vec::new(),
            nodes: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            values: HashMap::new(),
            keep_nulls: false,
        }
    }

    /// SELECT 指定列（`*` 或经校验的表达式）
    pub fn select(mut self, exprs: &[&str]) -> Self {
        self.kind = StatementKind::Select;
        self.select_exprs = exprs.iter().map(|s| s.to_string()).collect();
        self
    }

    /// INSERT 指定值
    pub fn insert(mut self, values: HashMap<String, DataValue>) -> Self {
        self.kind = StatementKind::Insert;
        self.values = values;
        self
    }

    /// UPDATE 指定值
    ///
    /// Null 值默认参与 SET（绑定为 NULL），以支持清除时间戳等场景。
    pub fn update(mut self, values: HashMap<String, DataValue>) -> Self {
        self.kind = StatementKind::Update;
        self.keep_nulls = true;
        self.values = values;
        self
    }

    /// DELETE
    pub fn delete(mut self) -> Self {
        self.kind = StatementKind::Delete;
        self
    }

    /// 设置表名
    pub fn from(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// 添加条件节点
    pub fn where_nodes(mut self, nodes: &[ConditionNode]) -> Self {
        self.nodes.extend_from_slice(nodes);
        self
    }

    /// 添加多个简单条件（AND组合）
    pub fn where_conditions(mut self, conditions: &[QueryCondition]) -> Self {
        for c in conditions {
            self.nodes.push(ConditionNode::Single(c.clone()));
        }
        self
    }

    /// 添加 ORDER BY
    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push(SortConfig {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// 设置 LIMIT
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 设置 OFFSET
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 构建SQL语句与参数
    pub fn build(&self) -> QuickFieldResult<(String, Vec<DataValue>)> {
        if self.table.is_empty() {
            return Err(QuickFieldError::QueryError {
                message: "表名不能为空".to_string(),
            });
        }
        validate_identifier(&self.table)?;
        match self.kind {
            StatementKind::Select => self.build_select(),
            StatementKind::Insert => self.build_insert(),
            StatementKind::Update => self.build_update(),
            StatementKind::Delete => self.build_delete(),
        }
    }

    fn build_select(&self) -> QuickFieldResult<(String, Vec<DataValue>)> {
        let exprs = if self.select_exprs.is_empty() {
            "*".to_string()
        } else {
            self.select_exprs.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", exprs, self.table);
        let mut params = Vec::new();

        if !self.nodes.is_empty() {
            let (clause, node_params) = render_nodes(&self.nodes)?;
            sql.push_str(&format!(" WHERE {}", clause));
            params.extend(node_params);
        }

        if !self.order_by.is_empty() {
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    validate_identifier(&o.field)?;
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    Ok(format!("{} {}", o.field, dir))
                })
                .collect::<QuickFieldResult<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", clauses.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            // SQLite 要求 OFFSET 必须跟在 LIMIT 之后
            if self.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok((sql, params))
    }

    fn build_insert(&self) -> QuickFieldResult<(String, Vec<DataValue>)> {
        if self.values.is_empty() {
            return Err(QuickFieldError::QueryError {
                message: "插入值不能为空".to_string(),
            });
        }
        // 过滤掉 Null 值，让数据库使用默认值或 NULL；
        // 列按名称排序以获得稳定的语句文本
        let mut columns: Vec<&String> = self
            .values
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k)
            .collect();
        columns.sort();
        if columns.is_empty() {
            return Err(QuickFieldError::QueryError {
                message: "所有插入值都是 NULL，无法插入".to_string(),
            });
        }
        for col in &columns {
            validate_identifier(col)?;
        }
        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        let params: Vec<DataValue> = columns.iter().map(|k| self.values[*k].clone()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        );
        Ok((sql, params))
    }

    fn build_update(&self) -> QuickFieldResult<(String, Vec<DataValue>)> {
        let mut columns: Vec<&String> = if self.keep_nulls {
            self.values.keys().collect()
        } else {
            self.values
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k)
                .collect()
        };
        columns.sort();
        if columns.is_empty() {
            return Err(QuickFieldError::QueryError {
                message: "更新值不能为空".to_string(),
            });
        }
        let mut set_clauses = Vec::new();
        let mut params = Vec::new();
        for col in &columns {
            validate_identifier(col)?;
            set_clauses.push(format!("{} = ?", col));
            params.push(self.values[*col].clone());
        }
        let mut sql = format!("UPDATE {} SET {}", self.table, set_clauses.join(", "));
        if !self.nodes.is_empty() {
            let (clause, node_params) = render_nodes(&self.nodes)?;
            sql.push_str(&format!(" WHERE {}", clause));
            params.extend(node_params);
        }
        Ok((sql, params))
    }

    fn build_delete(&self) -> QuickFieldResult<(String, Vec<DataValue>)> {
        let mut sql = format!("DELETE FROM {}", self.table);
        let mut params = Vec::new();
        if !self.nodes.is_empty() {
            let (clause, node_params) = render_nodes(&self.nodes)?;
            sql.push_str(&format!(" WHERE {}", clause));
            params.extend(node_params);
        }
        Ok((sql, params))
    }
}

impl Default for SqlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 渲染条件节点列表（顶层 AND 组合）
pub fn render_nodes(nodes: &[ConditionNode]) -> QuickFieldResult<(String, Vec<DataValue>)> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for node in nodes {
        let (clause, node_params) = render_node(node)?;
        if !clause.is_empty() {
            clauses.push(clause);
            params.extend(node_params);
        }
    }
    Ok((clauses.join(" AND "), params))
}

fn render_node(node: &ConditionNode) -> QuickFieldResult<(String, Vec<DataValue>)> {
    match node {
        ConditionNode::Single(condition) => render_condition(condition),
        ConditionNode::Raw { sql, params } => Ok((format!("({})", sql), params.clone())),
        ConditionNode::Group { operator, nodes } => {
            let mut clauses = Vec::new();
            let mut params = Vec::new();
            for child in nodes {
                let (clause, child_params) = render_node(child)?;
                if !clause.is_empty() {
                    clauses.push(clause);
                    params.extend(child_params);
                }
            }
            if clauses.is_empty() {
                return Ok((String::new(), Vec::new()));
            }
            let joiner = match operator {
                LogicalOperator::And => " AND ",
                LogicalOperator::Or => " OR ",
            };
            let combined = if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                format!("({})", clauses.join(joiner))
            };
            Ok((combined, params))
        }
    }
}

fn render_condition(condition: &QueryCondition) -> QuickFieldResult<(String, Vec<DataValue>)> {
    let field = validate_identifier(&condition.field)?;
    let result = match &condition.operator {
        QueryOperator::Eq => (format!("{} = ?", field), vec![condition.value.clone()]),
        QueryOperator::Ne => (format!("{} != ?", field), vec![condition.value.clone()]),
        QueryOperator::Gt => (format!("{} > ?", field), vec![condition.value.clone()]),
        QueryOperator::Gte => (format!("{} >= ?", field), vec![condition.value.clone()]),
        QueryOperator::Lt => (format!("{} < ?", field), vec![condition.value.clone()]),
        QueryOperator::Lte => (format!("{} <= ?", field), vec![condition.value.clone()]),
        QueryOperator::Like => (format!("{} LIKE ?", field), vec![condition.value.clone()]),
        QueryOperator::In => match &condition.value {
            DataValue::Array(values) => {
                if values.is_empty() {
                    // 空列表永远不匹配
                    ("1 = 0".to_string(), vec![])
                } else {
                    let placeholders: Vec<&str> = values.iter().map(|_| "?").collect();
                    (
                        format!("{} IN ({})", field, placeholders.join(", ")),
                        values.clone(),
                    )
                }
            }
            _ => {
                return Err(QuickFieldError::QueryError {
                    message: "IN 操作符需要数组类型的值".to_string(),
                });
            }
        },
        QueryOperator::NotIn => match &condition.value {
            DataValue::Array(values) => {
                if values.is_empty() {
                    ("1 = 1".to_string(), vec![])
                } else {
                    let placeholders: Vec<&str> = values.iter().map(|_| "?").collect();
                    (
                        format!("{} NOT IN ({})", field, placeholders.join(", ")),
                        values.clone(),
                    )
                }
            }
            _ => {
                return Err(QuickFieldError::QueryError {
                    message: "NOT IN 操作符需要数组类型的值".to_string(),
                });
            }
        },
        QueryOperator::Between => match &condition.value {
            DataValue::Array(values) if values.len() == 2 => (
                format!("{} BETWEEN ? AND ?", field),
                vec![values[0].clone(), values[1].clone()],
            ),
            _ => {
                return Err(QuickFieldError::QueryError {
                    message: "BETWEEN 操作符需要 [低, 高] 两元素数组".to_string(),
                });
            }
        },
        QueryOperator::IsNull => (format!("{} IS NULL", field), vec![]),
        QueryOperator::IsNotNull => (format!("{} IS NOT NULL", field), vec![]),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_conditions() {
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("nodes")
            .where_conditions(&[
                QueryCondition::eq("status", DataValue::Int(1)),
                QueryCondition::new("title", QueryOperator::Like, DataValue::String("%新闻%".into())),
            ])
            .order_by("created_at", SortDirection::Desc)
            .limit(10)
            .offset(20)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM nodes WHERE status = ? AND title LIKE ? ORDER BY created_at DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_insert_sorts_columns_and_skips_nulls() {
        let mut values = HashMap::new();
        values.insert("title".to_string(), DataValue::String("a".into()));
        values.insert("body".to_string(), DataValue::String("b".into()));
        values.insert("deleted_at".to_string(), DataValue::Null);
        let (sql, params) = SqlBuilder::new().insert(values).from("nodes").build().unwrap();
        assert_eq!(sql, "INSERT INTO nodes (body, title) VALUES (?, ?)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_update_binds_null() {
        let mut values = HashMap::new();
        values.insert("deleted_at".to_string(), DataValue::Null);
        let (sql, params) = SqlBuilder::new()
            .update(values)
            .from("nodes")
            .where_conditions(&[QueryCondition::eq("id", DataValue::Int(1))])
            .build()
            .unwrap();
        assert_eq!(sql, "UPDATE nodes SET deleted_at = ? WHERE id = ?");
        assert_eq!(params[0], DataValue::Null);
    }

    #[test]
    fn test_rejects_malicious_identifier() {
        let result = SqlBuilder::new()
            .select(&["*"])
            .from("nodes")
            .where_conditions(&[QueryCondition::eq("id; DROP TABLE x", DataValue::Int(1))])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_in_list() {
        let (sql, params) = SqlBuilder::new()
            .select(&["*"])
            .from("nodes")
            .where_conditions(&[QueryCondition::new("id", QueryOperator::In, DataValue::Array(vec![]))])
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM nodes WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_or_group_renders_parentheses() {
        let nodes = vec![ConditionNode::Group {
            operator: LogicalOperator::Or,
            nodes: vec![
                ConditionNode::Group {
                    operator: LogicalOperator::And,
                    nodes: vec![
                        ConditionNode::Single(QueryCondition::eq("a", DataValue::Int(1))),
                        ConditionNode::Single(QueryCondition::eq("b", DataValue::Int(2))),
                    ],
                },
                ConditionNode::Single(QueryCondition::eq("c", DataValue::Int(3))),
            ],
        }];
        let (clause, params) = render_nodes(&nodes).unwrap();
        assert_eq!(clause, "((a = ? AND b = ?) OR c = ?)");
        assert_eq!(params.len(), 3);
    }
}
