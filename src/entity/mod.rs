//! 实体层
//!
//! 模式描述符、通用实体模型与生命周期事件。

pub mod events;
pub mod model;
pub mod schema;

pub use events::{EntityEvent, EventDispatcher, Listener};
pub use model::Entity;
pub use schema::{AttributeDefinition, EntitySchema, EntitySchemaBuilder};
