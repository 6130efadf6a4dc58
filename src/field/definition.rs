//! 字段定义与校验
//!
//! 字段定义是持久化的元数据：机器名、类型、基数、默认值、设置与
//! 校验规则。校验永不抛错，结果始终是有序的消息列表；空列表即通过。
//! 消息顺序固定：必填检查、类型检查、声明规则（按声明顺序）、
//! 设置派生约束。

use crate::connection::sqlite::DATETIME_FORMAT;
use crate::connection::Row;
use crate::error::QuickFieldResult;
use crate::field::kind::{FieldKind, ValueKind};
use crate::quick_error;
use crate::types::DataValue;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("邮箱正则必然合法"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+$").expect("网址正则必然合法"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{4,18}$").expect("电话正则必然合法"));
static COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("颜色正则必然合法")
});
static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("路径正则必然合法"));

/// 校验规则类别
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleKind {
    MinLength { value: u64 },
    MaxLength { value: u64 },
    MinValue { value: f64 },
    MaxValue { value: f64 },
    Pattern { value: String },
    OneOf { values: Vec<String> },
}

/// 校验规则（可携带自定义消息）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(flatten)]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationRule {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

/// 字段定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// 持久化后的主键
    pub id: Option<i64>,
    /// 显示名
    pub name: String,
    /// 机器名（全局唯一）
    pub machine_name: String,
    /// 字段类型
    pub kind: FieldKind,
    /// 是否必填
    pub required: bool,
    /// 是否多值
    pub multiple: bool,
    /// 基数（-1 表示无限）
    pub cardinality: i64,
    /// 默认值
    pub default_value: DataValue,
    /// 类型相关设置（min_length / max_length / min / max / pattern / options 等）
    pub settings: serde_json::Value,
    /// 声明的校验规则，按声明顺序执行
    pub rules: Vec<ValidationRule>,
    /// 控件设置
    pub widget_settings: serde_json::Value,
    /// 排序权重
    pub weight: i64,
    /// 是否参与搜索
    pub searchable: bool,
    /// 是否可翻译
    pub translatable: bool,
}

impl FieldDefinition {
    pub fn new(machine_name: &str, name: &str, kind: FieldKind) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            machine_name: machine_name.to_string(),
            kind,
            required: false,
            multiple: false,
            cardinality: 1,
            default_value: DataValue::Null,
            settings: serde_json::Value::Object(serde_json::Map::new()),
            rules: Vec::new(),
            widget_settings: serde_json::Value::Object(serde_json::Map::new()),
            weight: 0,
            searchable: false,
            translatable: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 开启多值（类型必须支持多值，否则静默保持单值）
    pub fn multiple(mut self, cardinality: i64) -> Self {
        if self.kind.supports_multiple() {
            self.multiple = true;
            self.cardinality = cardinality;
        }
        self
    }

    pub fn with_default(mut self, value: DataValue) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_setting(mut self, key: &str, value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.settings {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    /// 生效的编辑控件（widget_settings 里的 widget 覆盖类型默认值）
    pub fn widget(&self) -> String {
        self.widget_settings
            .get("widget")
            .and_then(|w| w.as_str())
            .map(|w| w.to_string())
            .unwrap_or_else(|| self.kind.default_widget().to_string())
    }

    /// 校验单个值，返回有序的错误消息列表（空列表即通过）
    pub fn validate(&self, value: &DataValue) -> Vec<String> {
        if value.is_empty() {
            if self.required {
                return vec![format!("字段 {} 为必填项", self.name)];
            }
            return Vec::new();
        }
        if self.multiple {
            if let DataValue::Array(items) = value {
                let mut errors = Vec::new();
                if self.cardinality > 0 && items.len() as i64 > self.cardinality {
                    errors.push(format!(
                        "字段 {} 最多允许 {} 个值",
                        self.name, self.cardinality
                    ));
                }
                for item in items {
                    errors.extend(self.validate_single(item));
                }
                return errors;
            }
        }
        self.validate_single(value)
    }

    fn validate_single(&self, value: &DataValue) -> Vec<String> {
        let mut errors = Vec::new();
        // 类型/格式错误只追加消息，后续规则照常执行
        if let Some(message) = self.check_type(value) {
            errors.push(message);
        }
        for rule in &self.rules {
            if let Some(message) = apply_rule(&rule.kind, rule.message.as_deref(), &self.name, value)
            {
                errors.push(message);
            }
        }
        errors.extend(self.settings_errors(value));
        errors
    }

    /// 按类型的逻辑类别做类型与格式检查
    fn check_type(&self, value: &DataValue) -> Option<String> {
        match self.kind.value_kind() {
            ValueKind::Numeric => match value {
                DataValue::Int(_) | DataValue::Float(_) => None,
                DataValue::String(s) => {
                    let parsed = if self.kind == FieldKind::Integer {
                        s.trim().parse::<i64>().is_ok()
                    } else {
                        s.trim().parse::<f64>().is_ok()
                    };
                    if parsed {
                        None
                    } else {
                        Some(format!("字段 {} 不是有效的数字: {}", self.name, s))
                    }
                }
                _ => Some(self.type_mismatch(value)),
            },
            ValueKind::Temporal => match value {
                DataValue::DateTime(_) => None,
                DataValue::String(s) => {
                    let parsed = match self.kind {
                        FieldKind::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
                        _ => {
                            NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).is_ok()
                                || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                        }
                    };
                    if parsed {
                        None
                    } else {
                        Some(format!("字段 {} 不是有效的日期: {}", self.name, s))
                    }
                }
                _ => Some(self.type_mismatch(value)),
            },
            ValueKind::Reference => match value {
                DataValue::Int(_) => None,
                _ => Some(self.type_mismatch(value)),
            },
            ValueKind::Structured => match value {
                DataValue::Json(_) | DataValue::Array(_) => None,
                DataValue::String(s) => {
                    if serde_json::from_str::<serde_json::Value>(s).is_ok() {
                        None
                    } else {
                        Some(format!("字段 {} 不是有效的 JSON", self.name))
                    }
                }
                _ => Some(self.type_mismatch(value)),
            },
            ValueKind::Scalar => match self.kind {
                FieldKind::Boolean | FieldKind::Checkbox => {
                    if matches!(value, DataValue::Bool(_) | DataValue::Int(0) | DataValue::Int(1)) {
                        None
                    } else {
                        Some(self.type_mismatch(value))
                    }
                }
                _ => match value {
                    DataValue::String(s) => self.format_error(s),
                    _ => Some(self.type_mismatch(value)),
                },
            },
        }
    }

    /// 专用标量类型的格式检查，普通文本类型不设格式
    fn format_error(&self, s: &str) -> Option<String> {
        let ok = match self.kind {
            FieldKind::Email => EMAIL_RE.is_match(s),
            FieldKind::Url => URL_RE.is_match(s),
            FieldKind::Phone => PHONE_RE.is_match(s),
            FieldKind::Color => COLOR_RE.is_match(s),
            FieldKind::Slug => SLUG_RE.is_match(s),
            _ => true,
        };
        if ok {
            None
        } else {
            Some(format!(
                "字段 {} 不是有效的 {}: {}",
                self.name,
                self.kind.as_str(),
                s
            ))
        }
    }

    fn type_mismatch(&self, value: &DataValue) -> String {
        format!(
            "字段 {} 的值类型不符: 期望 {}, 实际 {}",
            self.name,
            self.kind.as_str(),
            value.type_name()
        )
    }

    /// 设置派生约束，在声明规则之后执行
    fn settings_errors(&self, value: &DataValue) -> Vec<String> {
        let mut errors = Vec::new();
        let settings = match self.settings.as_object() {
            Some(map) => map,
            None => return errors,
        };
        if let Some(n) = settings.get("min_length").and_then(|v| v.as_u64()) {
            if let Some(m) = apply_rule(&RuleKind::MinLength { value: n }, None, &self.name, value)
            {
                errors.push(m);
            }
        }
        if let Some(n) = settings.get("max_length").and_then(|v| v.as_u64()) {
            if let Some(m) = apply_rule(&RuleKind::MaxLength { value: n }, None, &self.name, value)
            {
                errors.push(m);
            }
        }
        if let Some(n) = settings.get("min").and_then(|v| v.as_f64()) {
            if let Some(m) = apply_rule(&RuleKind::MinValue { value: n }, None, &self.name, value) {
                errors.push(m);
            }
        }
        if let Some(n) = settings.get("max").and_then(|v| v.as_f64()) {
            if let Some(m) = apply_rule(&RuleKind::MaxValue { value: n }, None, &self.name, value) {
                errors.push(m);
            }
        }
        if let Some(p) = settings.get("pattern").and_then(|v| v.as_str()) {
            if let Some(m) = apply_rule(
                &RuleKind::Pattern {
                    value: p.to_string(),
                },
                None,
                &self.name,
                value,
            ) {
                errors.push(m);
            }
        }
        errors
    }

    /// 转为 field_definitions 表的行
    pub fn to_row(&self) -> QuickFieldResult<HashMap<String, DataValue>> {
        let mut row = HashMap::new();
        row.insert("name".to_string(), DataValue::String(self.name.clone()));
        row.insert(
            "machine_name".to_string(),
            DataValue::String(self.machine_name.clone()),
        );
        row.insert(
            "field_type".to_string(),
            DataValue::String(self.kind.as_str().to_string()),
        );
        row.insert("required".to_string(), DataValue::Bool(self.required));
        row.insert("multiple".to_string(), DataValue::Bool(self.multiple));
        row.insert("cardinality".to_string(), DataValue::Int(self.cardinality));
        row.insert(
            "default_value".to_string(),
            if self.default_value.is_null() {
                DataValue::Null
            } else {
                DataValue::String(self.default_value.to_json_value().to_string())
            },
        );
        row.insert(
            "settings".to_string(),
            DataValue::String(self.settings.to_string()),
        );
        row.insert(
            "validation".to_string(),
            DataValue::String(serde_json::to_string(&self.rules)?),
        );
        row.insert(
            "widget_settings".to_string(),
            DataValue::String(self.widget_settings.to_string()),
        );
        row.insert("weight".to_string(), DataValue::Int(self.weight));
        row.insert("searchable".to_string(), DataValue::Bool(self.searchable));
        row.insert(
            "translatable".to_string(),
            DataValue::Bool(self.translatable),
        );
        Ok(row)
    }

    /// 从 field_definitions 表的行还原
    pub fn from_row(row: &Row) -> QuickFieldResult<Self> {
        let kind_name = row_string(row, "field_type");
        let kind = FieldKind::from_str(&kind_name).ok_or_else(|| {
            quick_error!(validation, "field_type", format!("未知字段类型: {}", kind_name))
        })?;
        let rules: Vec<ValidationRule> = match row.get("validation") {
            Some(DataValue::String(s)) if !s.is_empty() => serde_json::from_str(s)?,
            _ => Vec::new(),
        };
        let settings = parse_json_column(row, "settings");
        let widget_settings = parse_json_column(row, "widget_settings");
        let default_value = match row.get("default_value") {
            Some(DataValue::String(s)) if !s.is_empty() => {
                DataValue::from_json_value(serde_json::from_str(s)?)
            }
            _ => DataValue::Null,
        };
        Ok(Self {
            id: row_int(row, "id"),
            name: row_string(row, "name"),
            machine_name: row_string(row, "machine_name"),
            kind,
            required: row_bool(row, "required"),
            multiple: row_bool(row, "multiple"),
            cardinality: row_int(row, "cardinality").unwrap_or(1),
            default_value,
            settings,
            rules,
            widget_settings,
            weight: row_int(row, "weight").unwrap_or(0),
            searchable: row_bool(row, "searchable"),
            translatable: row_bool(row, "translatable"),
        })
    }
}

/// 字段到实体类型的挂载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAttachment {
    pub id: Option<i64>,
    pub field_id: i64,
    pub entity_type: String,
    /// 为 None 时挂载到该实体类型的全部束
    pub bundle_id: Option<i64>,
    pub weight: i64,
    pub settings: serde_json::Value,
}

impl FieldAttachment {
    pub fn new(field_id: i64, entity_type: &str) -> Self {
        Self {
            id: None,
            field_id,
            entity_type: entity_type.to_string(),
            bundle_id: None,
            weight: 0,
            settings: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_bundle(mut self, bundle_id: i64) -> Self {
        self.bundle_id = Some(bundle_id);
        self
    }

    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    pub fn to_row(&self) -> HashMap<String, DataValue> {
        let mut row = HashMap::new();
        row.insert("field_id".to_string(), DataValue::Int(self.field_id));
        row.insert(
            "entity_type".to_string(),
            DataValue::String(self.entity_type.clone()),
        );
        row.insert(
            "bundle_id".to_string(),
            match self.bundle_id {
                Some(id) => DataValue::Int(id),
                None => DataValue::Null,
            },
        );
        row.insert("weight".to_string(), DataValue::Int(self.weight));
        row.insert(
            "settings".to_string(),
            DataValue::String(self.settings.to_string()),
        );
        row
    }

    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row_int(row, "id"),
            field_id: row_int(row, "field_id").unwrap_or(0),
            entity_type: row_string(row, "entity_type"),
            bundle_id: row_int(row, "bundle_id"),
            weight: row_int(row, "weight").unwrap_or(0),
            settings: parse_json_column(row, "settings"),
        }
    }
}

fn apply_rule(
    kind: &RuleKind,
    custom_message: Option<&str>,
    field_name: &str,
    value: &DataValue,
) -> Option<String> {
    let violated = match kind {
        RuleKind::MinLength { value: min } => match value {
            DataValue::String(s) => (s.chars().count() as u64) < *min,
            _ => false,
        },
        RuleKind::MaxLength { value: max } => match value {
            DataValue::String(s) => (s.chars().count() as u64) > *max,
            _ => false,
        },
        RuleKind::MinValue { value: min } => match value {
            DataValue::Int(n) => (*n as f64) < *min,
            DataValue::Float(f) => *f < *min,
            _ => false,
        },
        RuleKind::MaxValue { value: max } => match value {
            DataValue::Int(n) => (*n as f64) > *max,
            DataValue::Float(f) => *f > *max,
            _ => false,
        },
        RuleKind::Pattern { value: pattern } => match value {
            DataValue::String(s) => match Regex::new(pattern) {
                Ok(re) => !re.is_match(s),
                // 非法正则视为规则违反，避免静默放行
                Err(_) => true,
            },
            _ => false,
        },
        RuleKind::OneOf { values } => match value {
            DataValue::String(s) => !values.contains(s),
            _ => false,
        },
    };
    if !violated {
        return None;
    }
    if let Some(message) = custom_message {
        return Some(message.to_string());
    }
    Some(match kind {
        RuleKind::MinLength { value } => {
            format!("字段 {} 的长度不能少于 {} 个字符", field_name, value)
        }
        RuleKind::MaxLength { value } => {
            format!("字段 {} 的长度不能超过 {} 个字符", field_name, value)
        }
        RuleKind::MinValue { value } => format!("字段 {} 不能小于 {}", field_name, value),
        RuleKind::MaxValue { value } => format!("字段 {} 不能大于 {}", field_name, value),
        RuleKind::Pattern { .. } => format!("字段 {} 的格式不正确", field_name),
        RuleKind::OneOf { .. } => format!("字段 {} 的值不在允许的选项中", field_name),
    })
}

fn row_string(row: &Row, key: &str) -> String {
    match row.get(key) {
        Some(DataValue::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn row_int(row: &Row, key: &str) -> Option<i64> {
    match row.get(key) {
        Some(DataValue::Int(n)) => Some(*n),
        _ => None,
    }
}

fn row_bool(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(DataValue::Bool(b)) => *b,
        Some(DataValue::Int(n)) => *n != 0,
        _ => false,
    }
}

fn parse_json_column(row: &Row, key: &str) -> serde_json::Value {
    match row.get(key) {
        Some(DataValue::String(s)) if !s.is_empty() => {
            serde_json::from_str(s).unwrap_or(serde_json::Value::Object(serde_json::Map::new()))
        }
        _ => serde_json::Value::Object(serde_json::Map::new()),
    }
}
