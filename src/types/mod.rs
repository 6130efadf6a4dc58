//! 核心值类型与查询类型定义

pub mod data_value;
pub mod query;

pub use data_value::{
    CastKind, DataValue, cast, cast_to_bool, cast_to_datetime, cast_to_float, cast_to_int,
    cast_to_json, cast_to_string, parse_datetime_str,
};
pub use query::{
    ConditionNode, LogicalOperator, QueryCondition, QueryOperator, SortConfig, SortDirection,
};
