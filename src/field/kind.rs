//! 字段类型目录
//!
//! 封闭枚举，全部元数据查询使用穷尽 match：新增类型时编译器
//! 强制补齐每一处分支，不存在运行时注册表。

use serde::{Deserialize, Serialize};

/// 字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[serde(rename = "string")]
    String_,
    Text,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Select,
    Radio,
    Checkbox,
    MultiSelect,
    Image,
    File,
    Gallery,
    Video,
    EntityRef,
    TaxonomyRef,
    UserRef,
    BlockRef,
    Email,
    Url,
    Phone,
    Color,
    Slug,
    Json,
    Code,
    Link,
    Address,
    Geolocation,
}

/// field_values 表中承载值的那一列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueColumn {
    String_,
    Text,
    Int,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Json,
    Blob,
}

impl ValueColumn {
    /// 对应的列名
    pub fn column_name(&self) -> &'static str {
        match self {
            ValueColumn::String_ => "value_string",
            ValueColumn::Text => "value_text",
            ValueColumn::Int => "value_int",
            ValueColumn::Decimal => "value_decimal",
            ValueColumn::Boolean => "value_boolean",
            ValueColumn::Date => "value_date",
            ValueColumn::DateTime => "value_datetime",
            ValueColumn::Json => "value_json",
            ValueColumn::Blob => "value_blob",
        }
    }
}

/// 值的逻辑类别（校验时的类型检查依据）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Scalar,
    Numeric,
    Temporal,
    Structured,
    Reference,
}

/// 字段类型的展示分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Basic,
    Choice,
    Media,
    Reference,
    Specialized,
}

impl FieldKind {
    /// 值落在 field_values 表的哪一列
    pub fn storage_column(&self) -> ValueColumn {
        match self {
            FieldKind::String_
            | FieldKind::Email
            | FieldKind::Url
            | FieldKind::Phone
            | FieldKind::Color
            | FieldKind::Slug
            | FieldKind::Select
            | FieldKind::Radio => ValueColumn::String_,
            FieldKind::Text | FieldKind::Code => ValueColumn::Text,
            FieldKind::Integer
            | FieldKind::EntityRef
            | FieldKind::TaxonomyRef
            | FieldKind::UserRef
            | FieldKind::BlockRef
            | FieldKind::Image
            | FieldKind::File
            | FieldKind::Video => ValueColumn::Int,
            FieldKind::Float | FieldKind::Decimal => ValueColumn::Decimal,
            FieldKind::Boolean | FieldKind::Checkbox => ValueColumn::Boolean,
            FieldKind::Date => ValueColumn::Date,
            FieldKind::DateTime => ValueColumn::DateTime,
            FieldKind::MultiSelect
            | FieldKind::Gallery
            | FieldKind::Json
            | FieldKind::Link
            | FieldKind::Address
            | FieldKind::Geolocation => ValueColumn::Json,
        }
    }

    /// 默认编辑控件
    pub fn default_widget(&self) -> &'static str {
        match self {
            FieldKind::String_ => "text_input",
            FieldKind::Text => "textarea",
            FieldKind::Integer => "number_input",
            FieldKind::Float => "number_input",
            FieldKind::Decimal => "number_input",
            FieldKind::Boolean => "toggle",
            FieldKind::Date => "date_picker",
            FieldKind::DateTime => "datetime_picker",
            FieldKind::Select => "select",
            FieldKind::Radio => "radio_buttons",
            FieldKind::Checkbox => "checkbox",
            FieldKind::MultiSelect => "multi_select",
            FieldKind::Image => "image_upload",
            FieldKind::File => "file_upload",
            FieldKind::Gallery => "gallery_manager",
            FieldKind::Video => "video_upload",
            FieldKind::EntityRef => "entity_autocomplete",
            FieldKind::TaxonomyRef => "term_autocomplete",
            FieldKind::UserRef => "user_autocomplete",
            FieldKind::BlockRef => "block_picker",
            FieldKind::Email => "email_input",
            FieldKind::Url => "url_input",
            FieldKind::Phone => "phone_input",
            FieldKind::Color => "color_picker",
            FieldKind::Slug => "slug_input",
            FieldKind::Json => "json_editor",
            FieldKind::Code => "code_editor",
            FieldKind::Link => "link_widget",
            FieldKind::Address => "address_widget",
            FieldKind::Geolocation => "map_picker",
        }
    }

    /// 是否允许多值（基数大于 1）
    pub fn supports_multiple(&self) -> bool {
        match self {
            FieldKind::MultiSelect
            | FieldKind::Checkbox
            | FieldKind::Image
            | FieldKind::File
            | FieldKind::Gallery
            | FieldKind::Video
            | FieldKind::EntityRef
            | FieldKind::TaxonomyRef
            | FieldKind::UserRef
            | FieldKind::BlockRef
            | FieldKind::Link => true,
            FieldKind::String_
            | FieldKind::Text
            | FieldKind::Integer
            | FieldKind::Float
            | FieldKind::Decimal
            | FieldKind::Boolean
            | FieldKind::Date
            | FieldKind::DateTime
            | FieldKind::Select
            | FieldKind::Radio
            | FieldKind::Email
            | FieldKind::Url
            | FieldKind::Phone
            | FieldKind::Color
            | FieldKind::Slug
            | FieldKind::Json
            | FieldKind::Code
            | FieldKind::Address
            | FieldKind::Geolocation => false,
        }
    }

    /// 值的逻辑类别
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldKind::String_
            | FieldKind::Text
            | FieldKind::Select
            | FieldKind::Radio
            | FieldKind::Checkbox
            | FieldKind::Boolean
            | FieldKind::Email
            | FieldKind::Url
            | FieldKind::Phone
            | FieldKind::Color
            | FieldKind::Slug
            | FieldKind::Code => ValueKind::Scalar,
            FieldKind::Integer | FieldKind::Float | FieldKind::Decimal => ValueKind::Numeric,
            FieldKind::Date | FieldKind::DateTime => ValueKind::Temporal,
            FieldKind::MultiSelect
            | FieldKind::Json
            | FieldKind::Link
            | FieldKind::Address
            | FieldKind::Geolocation
            | FieldKind::Gallery => ValueKind::Structured,
            FieldKind::Image
            | FieldKind::File
            | FieldKind::Video
            | FieldKind::EntityRef
            | FieldKind::TaxonomyRef
            | FieldKind::UserRef
            | FieldKind::BlockRef => ValueKind::Reference,
        }
    }

    /// 展示分类
    pub fn category(&self) -> FieldCategory {
        match self {
            FieldKind::String_
            | FieldKind::Text
            | FieldKind::Integer
            | FieldKind::Float
            | FieldKind::Decimal
            | FieldKind::Boolean
            | FieldKind::Date
            | FieldKind::DateTime => FieldCategory::Basic,
            FieldKind::Select | FieldKind::Radio | FieldKind::Checkbox | FieldKind::MultiSelect => {
                FieldCategory::Choice
            }
            FieldKind::Image | FieldKind::File | FieldKind::Gallery | FieldKind::Video => {
                FieldCategory::Media
            }
            FieldKind::EntityRef
            | FieldKind::TaxonomyRef
            | FieldKind::UserRef
            | FieldKind::BlockRef => FieldCategory::Reference,
            FieldKind::Email
            | FieldKind::Url
            | FieldKind::Phone
            | FieldKind::Color
            | FieldKind::Slug
            | FieldKind::Json
            | FieldKind::Code
            | FieldKind::Link
            | FieldKind::Address
            | FieldKind::Geolocation => FieldCategory::Specialized,
        }
    }

    /// 机器名
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String_ => "string",
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Decimal => "decimal",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::DateTime => "date_time",
            FieldKind::Select => "select",
            FieldKind::Radio => "radio",
            FieldKind::Checkbox => "checkbox",
            FieldKind::MultiSelect => "multi_select",
            FieldKind::Image => "image",
            FieldKind::File => "file",
            FieldKind::Gallery => "gallery",
            FieldKind::Video => "video",
            FieldKind::EntityRef => "entity_ref",
            FieldKind::TaxonomyRef => "taxonomy_ref",
            FieldKind::UserRef => "user_ref",
            FieldKind::BlockRef => "block_ref",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Phone => "phone",
            FieldKind::Color => "color",
            FieldKind::Slug => "slug",
            FieldKind::Json => "json",
            FieldKind::Code => "code",
            FieldKind::Link => "link",
            FieldKind::Address => "address",
            FieldKind::Geolocation => "geolocation",
        }
    }

    /// 从机器名解析（未知名字返回 None）
    pub fn from_str(name: &str) -> Option<Self> {
        let kind = match name {
            "string" => FieldKind::String_,
            "text" => FieldKind::Text,
            "integer" => FieldKind::Integer,
            "float" => FieldKind::Float,
            "decimal" => FieldKind::Decimal,
            "boolean" => FieldKind::Boolean,
            "date" => FieldKind::Date,
            "date_time" => FieldKind::DateTime,
            "select" => FieldKind::Select,
            "radio" => FieldKind::Radio,
            "checkbox" => FieldKind::Checkbox,
            "multi_select" => FieldKind::MultiSelect,
            "image" => FieldKind::Image,
            "file" => FieldKind::File,
            "gallery" => FieldKind::Gallery,
            "video" => FieldKind::Video,
            "entity_ref" => FieldKind::EntityRef,
            "taxonomy_ref" => FieldKind::TaxonomyRef,
            "user_ref" => FieldKind::UserRef,
            "block_ref" => FieldKind::BlockRef,
            "email" => FieldKind::Email,
            "url" => FieldKind::Url,
            "phone" => FieldKind::Phone,
            "color" => FieldKind::Color,
            "slug" => FieldKind::Slug,
            "json" => FieldKind::Json,
            "code" => FieldKind::Code,
            "link" => FieldKind::Link,
            "address" => FieldKind::Address,
            "geolocation" => FieldKind::Geolocation,
            _ => return None,
        };
        Some(kind)
    }

    /// 全部类型（管理界面枚举目录用）
    pub fn all() -> &'static [FieldKind] {
        &[
            FieldKind::String_,
            FieldKind::Text,
            FieldKind::Integer,
            FieldKind::Float,
            FieldKind::Decimal,
            FieldKind::Boolean,
            FieldKind::Date,
            FieldKind::DateTime,
            FieldKind::Select,
            FieldKind::Radio,
            FieldKind::Checkbox,
            FieldKind::MultiSelect,
            FieldKind::Image,
            FieldKind::File,
            FieldKind::Gallery,
            FieldKind::Video,
            FieldKind::EntityRef,
            FieldKind::TaxonomyRef,
            FieldKind::UserRef,
            FieldKind::BlockRef,
            FieldKind::Email,
            FieldKind::Url,
            FieldKind::Phone,
            FieldKind::Color,
            FieldKind::Slug,
            FieldKind::Json,
            FieldKind::Code,
            FieldKind::Link,
            FieldKind::Address,
            FieldKind::Geolocation,
        ]
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for kind in FieldKind::all() {
            assert_eq!(FieldKind::from_str(kind.as_str()), Some(*kind));
        }
        assert_eq!(FieldKind::from_str("不存在"), None);
    }

    #[test]
    fn test_storage_columns() {
        assert_eq!(FieldKind::String_.storage_column(), ValueColumn::String_);
        assert_eq!(FieldKind::Decimal.storage_column(), ValueColumn::Decimal);
        assert_eq!(FieldKind::EntityRef.storage_column(), ValueColumn::Int);
        assert_eq!(FieldKind::Gallery.storage_column(), ValueColumn::Json);
        assert_eq!(
            FieldKind::Decimal.storage_column().column_name(),
            "value_decimal"
        );
    }

    #[test]
    fn test_multiple_support() {
        assert!(FieldKind::Gallery.supports_multiple());
        assert!(FieldKind::TaxonomyRef.supports_multiple());
        assert!(!FieldKind::Slug.supports_multiple());
        assert!(!FieldKind::Decimal.supports_multiple());
    }
}
