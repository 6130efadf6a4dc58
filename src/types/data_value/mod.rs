use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 通用数据值类型 - 引擎内部统一的值表示
///
/// 所有实体属性与动态字段值在进出存储层时都以 DataValue 表示，
/// 由声明的 CastKind 或字段类型决定具体承载的变体。
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮点数
    Float(f64),
    /// 字符串
    String(String),
    /// 字节数组
    Bytes(Vec<u8>),
    /// UTC日期时间
    DateTime(DateTime<Utc>),
    /// JSON 值
    Json(serde_json::Value),
    /// 数组
    Array(Vec<DataValue>),
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::Null => write!(f, "null"),
            DataValue::Bool(b) => write!(f, "{}", b),
            DataValue::Int(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::String(s) => write!(f, "{}", s),
            DataValue::Bytes(bytes) => write!(f, "[{} bytes]", bytes.len()),
            DataValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            DataValue::Json(json) => write!(f, "{}", json),
            DataValue::Array(arr) => {
                let json_str = serde_json::to_string(arr).unwrap_or_default();
                write!(f, "{}", json_str)
            }
        }
    }
}

impl std::fmt::Debug for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Debug 与 Display 保持一致，显示实际值而不是类型构造函数
        write!(f, "{}", self)
    }
}

impl DataValue {
    /// 获取数据类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "null",
            DataValue::Bool(_) => "boolean",
            DataValue::Int(_) => "integer",
            DataValue::Float(_) => "float",
            DataValue::String(_) => "string",
            DataValue::Bytes(_) => "bytes",
            DataValue::DateTime(_) => "datetime",
            DataValue::Json(_) => "json",
            DataValue::Array(_) => "array",
        }
    }

    /// 判断是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// 判断是否为"空"：Null、空字符串或空数组
    ///
    /// 字段必填校验使用该语义（空白字符串不算空）。
    pub fn is_empty(&self) -> bool {
        match self {
            DataValue::Null => true,
            DataValue::String(s) => s.is_empty(),
            DataValue::Array(arr) => arr.is_empty(),
            _ => false,
        }
    }

    /// 转换为 JSON 值
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            DataValue::Null => serde_json::Value::Null,
            DataValue::Bool(b) => serde_json::Value::Bool(*b),
            DataValue::Int(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
            DataValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DataValue::String(s) => serde_json::Value::String(s.clone()),
            DataValue::Bytes(b) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(b),
            ),
            DataValue::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            DataValue::Json(j) => j.clone(),
            DataValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(|v| v.to_json_value()).collect())
            }
        }
    }

    /// 从 JSON 值转换为对应的 DataValue 类型
    ///
    /// 数字、字符串等按原生类型映射，而不是简单包装为 DataValue::Json。
    pub fn from_json_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DataValue::Null,
            serde_json::Value::Bool(b) => DataValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DataValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    DataValue::Float(f)
                } else {
                    DataValue::Json(serde_json::Value::Number(n))
                }
            }
            serde_json::Value::String(s) => DataValue::String(s),
            serde_json::Value::Array(arr) => {
                DataValue::Array(arr.into_iter().map(DataValue::from_json_value).collect())
            }
            obj @ serde_json::Value::Object(_) => DataValue::Json(obj),
        }
    }
}

/// 属性转换类别
///
/// 每个实体属性在模式描述符中声明一个 CastKind，填充与水合时
/// 均按该类别做宽松转换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    /// 整数
    Int,
    /// 浮点数
    Float,
    /// 布尔
    Bool,
    /// 字符串
    String,
    /// JSON（数组/对象，存储为序列化文本）
    Json,
    /// 日期（时间部分截断为零点）
    Date,
    /// 日期时间
    DateTime,
}

/// 按声明的转换类别对输入值做宽松转换
///
/// 转换永不报错：无法解析的输入一律退化为 DataValue::Null。
pub fn cast(kind: CastKind, value: DataValue) -> DataValue {
    if value.is_null() {
        return DataValue::Null;
    }
    match kind {
        CastKind::Int => cast_to_int(value),
        CastKind::Float => cast_to_float(value),
        CastKind::Bool => cast_to_bool(value),
        CastKind::String => cast_to_string(value),
        CastKind::Json => cast_to_json(value),
        CastKind::Date => match cast_to_datetime(value) {
            DataValue::DateTime(dt) => {
                let midnight = dt.date_naive().and_hms_opt(0, 0, 0);
                match midnight {
                    Some(naive) => DataValue::DateTime(Utc.from_utc_datetime(&naive)),
                    None => DataValue::Null,
                }
            }
            other => other,
        },
        CastKind::DateTime => cast_to_datetime(value),
    }
}

/// 转换为整数，失败退化为 Null
pub fn cast_to_int(value: DataValue) -> DataValue {
    match value {
        DataValue::Int(i) => DataValue::Int(i),
        DataValue::Float(f) => DataValue::Int(f as i64),
        DataValue::Bool(b) => DataValue::Int(i64::from(b)),
        DataValue::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => DataValue::Int(i),
            // "19.99" 这类数字字符串按浮点解析后截断
            Err(_) => match s.trim().parse::<f64>() {
                Ok(f) => DataValue::Int(f as i64),
                Err(_) => DataValue::Null,
            },
        },
        _ => DataValue::Null,
    }
}

/// 转换为浮点数，失败退化为 Null
pub fn cast_to_float(value: DataValue) -> DataValue {
    match value {
        DataValue::Float(f) => DataValue::Float(f),
        DataValue::Int(i) => DataValue::Float(i as f64),
        DataValue::String(s) => match s.trim().parse::<f64>() {
            Ok(f) => DataValue::Float(f),
            Err(_) => DataValue::Null,
        },
        _ => DataValue::Null,
    }
}

/// 转换为布尔值，失败退化为 Null
pub fn cast_to_bool(value: DataValue) -> DataValue {
    match value {
        DataValue::Bool(b) => DataValue::Bool(b),
        DataValue::Int(i) => DataValue::Bool(i != 0),
        DataValue::Float(f) => DataValue::Bool(f != 0.0),
        DataValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => DataValue::Bool(true),
            "0" | "false" | "no" | "off" | "" => DataValue::Bool(false),
            _ => DataValue::Null,
        },
        _ => DataValue::Null,
    }
}

/// 转换为字符串
pub fn cast_to_string(value: DataValue) -> DataValue {
    match value {
        DataValue::String(s) => DataValue::String(s),
        DataValue::Null => DataValue::Null,
        DataValue::Bytes(b) => {
            DataValue::String(base64::engine::general_purpose::STANDARD.encode(&b))
        }
        other => DataValue::String(other.to_string()),
    }
}

/// 转换为 JSON 值：已结构化的直接通过，序列化文本则解析
pub fn cast_to_json(value: DataValue) -> DataValue {
    match value {
        DataValue::Json(j) => DataValue::Json(j),
        DataValue::Array(arr) => DataValue::Array(arr),
        DataValue::String(s) => match serde_json::from_str::<serde_json::Value>(&s) {
            Ok(parsed) => DataValue::Json(parsed),
            Err(_) => DataValue::Null,
        },
        DataValue::Bool(b) => DataValue::Json(serde_json::Value::Bool(b)),
        DataValue::Int(i) => DataValue::Json(serde_json::Value::Number(i.into())),
        DataValue::Float(f) => DataValue::Json(
            serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        ),
        _ => DataValue::Null,
    }
}

/// 转换为日期时间：支持已有类型、字符串与秒级时间戳，失败退化为 Null
pub fn cast_to_datetime(value: DataValue) -> DataValue {
    match value {
        DataValue::DateTime(dt) => DataValue::DateTime(dt),
        DataValue::Int(epoch) => match DateTime::from_timestamp(epoch, 0) {
            Some(dt) => DataValue::DateTime(dt),
            None => DataValue::Null,
        },
        DataValue::String(s) => parse_datetime_str(&s)
            .map(DataValue::DateTime)
            .unwrap_or(DataValue::Null),
        _ => DataValue::Null,
    }
}

/// 解析日期时间字符串
///
/// 依次尝试：RFC3339、`%Y-%m-%d %H:%M:%S`、`%Y-%m-%d`。
pub fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::String(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DataValue {
    fn from(value: Vec<u8>) -> Self {
        DataValue::Bytes(value)
    }
}

impl From<DateTime<Utc>> for DataValue {
    fn from(value: DateTime<Utc>) -> Self {
        DataValue::DateTime(value)
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        DataValue::Json(value)
    }
}

impl<T> From<Option<T>> for DataValue
where
    T: Into<DataValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DataValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_int_from_string() {
        assert_eq!(cast(CastKind::Int, DataValue::String("42".into())), DataValue::Int(42));
        assert_eq!(cast(CastKind::Int, DataValue::String("19.99".into())), DataValue::Int(19));
        assert_eq!(cast(CastKind::Int, DataValue::String("abc".into())), DataValue::Null);
    }

    #[test]
    fn test_cast_float() {
        assert_eq!(
            cast(CastKind::Float, DataValue::String("19.99".into())),
            DataValue::Float(19.99)
        );
        assert_eq!(cast(CastKind::Float, DataValue::Int(3)), DataValue::Float(3.0));
        assert_eq!(cast(CastKind::Float, DataValue::Bool(true)), DataValue::Null);
    }

    #[test]
    fn test_cast_bool_truthy() {
        assert_eq!(cast(CastKind::Bool, DataValue::String("yes".into())), DataValue::Bool(true));
        assert_eq!(cast(CastKind::Bool, DataValue::Int(0)), DataValue::Bool(false));
        assert_eq!(cast(CastKind::Bool, DataValue::String("perhaps".into())), DataValue::Null);
    }

    #[test]
    fn test_cast_datetime_never_throws() {
        // 无法解析的输入退化为 Null 而不是报错
        assert_eq!(
            cast(CastKind::DateTime, DataValue::String("not-a-date".into())),
            DataValue::Null
        );
        let parsed = cast(CastKind::DateTime, DataValue::String("2024-05-01 12:30:00".into()));
        assert!(matches!(parsed, DataValue::DateTime(_)));
        let from_epoch = cast(CastKind::DateTime, DataValue::Int(1_700_000_000));
        assert!(matches!(from_epoch, DataValue::DateTime(_)));
    }

    #[test]
    fn test_cast_date_truncates_to_midnight() {
        let casted = cast(CastKind::Date, DataValue::String("2024-05-01 12:30:45".into()));
        match casted {
            DataValue::DateTime(dt) => {
                assert_eq!(dt.format("%H:%M:%S").to_string(), "00:00:00");
            }
            other => panic!("期望日期时间，实际: {:?}", other),
        }
    }

    #[test]
    fn test_cast_json_from_text() {
        let casted = cast(CastKind::Json, DataValue::String(r#"{"a":1}"#.into()));
        assert!(matches!(casted, DataValue::Json(_)));
        assert_eq!(cast(CastKind::Json, DataValue::String("{broken".into())), DataValue::Null);
    }

    #[test]
    fn test_is_empty_semantics() {
        assert!(DataValue::Null.is_empty());
        assert!(DataValue::String(String::new()).is_empty());
        assert!(DataValue::Array(vec![]).is_empty());
        assert!(!DataValue::Int(0).is_empty());
        assert!(!DataValue::Bool(false).is_empty());
    }
}
