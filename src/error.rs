//! 统一错误类型定义
//!
//! 按错误来源分类：连接/查询/序列化属于存储层错误，原样向调用方传播；
//! NotFound 与 RevisionConflict 是可预期的业务结果；InvariantViolation
//! 表示调用方的编程错误，库内部不会捕获。
//! 注意：字段值校验（FieldDefinition::validate）不走错误通道，
//! 校验结果始终以消息列表形式作为数据返回。

use thiserror::Error;

/// quickfield 统一错误类型
#[derive(Error, Debug)]
pub enum QuickFieldError {
    /// 连接错误
    #[error("连接错误: {message}")]
    ConnectionError { message: String },

    /// 查询执行错误
    #[error("查询执行失败: {message}")]
    QueryError { message: String },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    SerializationError { message: String },

    /// 模式层校验错误（非法标识符、重复机器名等）
    #[error("校验失败 [{field}]: {message}")]
    ValidationError { field: String, message: String },

    /// 实体或字段不存在
    #[error("未找到记录: {entity_type}#{id}")]
    NotFound { entity_type: String, id: String },

    /// 乐观并发冲突：更新时修订号与存储中的不一致
    #[error("修订冲突: {entity_type}#{id} 期望修订号 {expected}")]
    RevisionConflict {
        entity_type: String,
        id: String,
        expected: i64,
    },

    /// 事务控制错误
    #[error("事务错误: {message}")]
    TransactionError { message: String },

    /// 不变量违反（编程错误，例如更新从未持久化的实体）
    #[error("不变量违反: {message}")]
    InvariantViolation { message: String },
}

/// quickfield 统一结果类型
pub type QuickFieldResult<T> = Result<T, QuickFieldError>;

/// 快速构造错误的辅助宏
///
/// # 示例
/// ```ignore
/// return Err(quick_error!(query, format!("执行失败: {}", e)));
/// return Err(quick_error!(validation, "machine_name", "机器名已存在"));
/// ```
#[macro_export]
macro_rules! quick_error {
    (connection, $msg:expr) => {
        $crate::error::QuickFieldError::ConnectionError {
            message: $msg.to_string(),
        }
    };
    (query, $msg:expr) => {
        $crate::error::QuickFieldError::QueryError {
            message: $msg.to_string(),
        }
    };
    (serialization, $msg:expr) => {
        $crate::error::QuickFieldError::SerializationError {
            message: $msg.to_string(),
        }
    };
    (validation, $field:expr, $msg:expr) => {
        $crate::error::QuickFieldError::ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
        }
    };
    (transaction, $msg:expr) => {
        $crate::error::QuickFieldError::TransactionError {
            message: $msg.to_string(),
        }
    };
    (invariant, $msg:expr) => {
        $crate::error::QuickFieldError::InvariantViolation {
            message: $msg.to_string(),
        }
    };
}

impl From<serde_json::Error> for QuickFieldError {
    fn from(e: serde_json::Error) -> Self {
        QuickFieldError::SerializationError {
            message: format!("JSON处理失败: {}", e),
        }
    }
}
