//! 动态字段层
//!
//! 字段类型目录、字段定义与校验、字段定义仓储。

pub mod definition;
pub mod kind;
pub mod repository;

pub use definition::{FieldAttachment, FieldDefinition, RuleKind, ValidationRule};
pub use kind::{FieldCategory, FieldKind, ValueColumn, ValueKind};
pub use repository::FieldRepository;
