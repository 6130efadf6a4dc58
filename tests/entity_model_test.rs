//! 实体模型行为测试

use quickfield::{CastKind, DataValue, Entity, EntitySchema};
use std::collections::HashMap;

fn article_schema() -> std::sync::Arc<EntitySchema> {
    EntitySchema::builder("article", "articles")
        .attribute("title", CastKind::String)
        .attribute("view_count", CastKind::Int)
        .attribute("price", CastKind::Float)
        .attribute("published", CastKind::Bool)
        .hidden_attribute("secret_token", CastKind::String)
        .transient_attribute("computed_score", CastKind::Float)
        .guarded_attribute("internal_rank", CastKind::Int)
        .build()
}

#[test]
fn test_fill_respects_allowlist() {
    let mut data = HashMap::new();
    data.insert("title".to_string(), DataValue::String("新闻".to_string()));
    data.insert("internal_rank".to_string(), DataValue::Int(99));
    data.insert("unknown_key".to_string(), DataValue::Int(1));

    let entity = Entity::from_input(article_schema(), &data);
    assert_eq!(entity.get_string("title").unwrap(), "新闻");
    assert!(entity.get("internal_rank").is_null());
    assert!(entity.get("unknown_key").is_null());
}

#[test]
fn test_fill_casts_values() {
    let mut data = HashMap::new();
    data.insert(
        "view_count".to_string(),
        DataValue::String("42".to_string()),
    );
    data.insert("price".to_string(), DataValue::String("19.99".to_string()));
    data.insert("published".to_string(), DataValue::String("yes".to_string()));

    let entity = Entity::from_input(article_schema(), &data);
    assert_eq!(entity.get_i64("view_count").unwrap(), 42);
    assert_eq!(entity.get_f64("price").unwrap(), 19.99);
    assert!(entity.get_bool("published").unwrap());
}

#[test]
fn test_uncastable_degrades_to_null() {
    let mut entity = Entity::new(article_schema());
    entity.set("view_count", DataValue::String("不是数字".to_string()));
    assert!(entity.get("view_count").is_null());
}

#[test]
fn test_to_array_excludes_hidden() {
    let mut entity = Entity::new(article_schema());
    entity.set("title", DataValue::String("标题".to_string()));
    entity.set("secret_token", DataValue::String("机密".to_string()));

    let projected = entity.to_array();
    assert!(projected.contains_key("title"));
    assert!(!projected.contains_key("secret_token"));
}

#[test]
fn test_to_storage_excludes_transient_and_null_id() {
    let mut entity = Entity::new(article_schema());
    entity.set("title", DataValue::String("标题".to_string()));
    entity.set("computed_score", DataValue::Float(0.9));
    entity.set("secret_token", DataValue::String("机密".to_string()));

    let storage = entity.to_storage();
    assert!(!storage.contains_key("computed_score"));
    assert!(!storage.contains_key("id"));
    // 隐藏只影响对外投影，存储投影必须携带
    assert!(storage.contains_key("secret_token"));
}

#[test]
fn test_dirty_tracking() {
    let mut entity = Entity::new(article_schema());
    entity.set("title", DataValue::String("初始".to_string()));
    entity.sync();
    assert!(!entity.is_dirty());

    entity.set("title", DataValue::String("修改后".to_string()));
    assert!(entity.is_dirty());
    let dirty = entity.get_dirty();
    assert_eq!(dirty.len(), 1);
    assert_eq!(
        dirty.get("title").unwrap(),
        &DataValue::String("修改后".to_string())
    );

    entity.sync();
    assert!(!entity.is_dirty());
}

#[test]
fn test_set_same_value_is_not_dirty() {
    let mut entity = Entity::new(article_schema());
    entity.set("title", DataValue::String("不变".to_string()));
    entity.sync();
    entity.set("title", DataValue::String("不变".to_string()));
    assert!(!entity.is_dirty());
}

#[test]
fn test_from_storage_applies_defaults_and_casts() {
    let schema = EntitySchema::builder("article", "articles")
        .attribute("title", CastKind::String)
        .attribute("status", CastKind::Int)
        .default_value(DataValue::Int(1))
        .build();

    let mut row: HashMap<String, DataValue> = HashMap::new();
    row.insert("id".to_string(), DataValue::Int(7));
    row.insert("title".to_string(), DataValue::String("水合".to_string()));

    let entity = Entity::from_storage(schema, &row);
    assert!(entity.exists());
    assert_eq!(entity.id(), Some(7));
    assert_eq!(entity.get_string("title").unwrap(), "水合");
    assert_eq!(entity.get_i64("status").unwrap(), 1);
    assert!(!entity.is_dirty());
}

#[test]
fn test_field_bag_is_separate_from_attributes() {
    let mut entity = Entity::new(article_schema());
    entity.set_field("field_tags", DataValue::Array(vec![DataValue::Int(3)]));

    assert!(entity.get("field_tags").is_null());
    assert_eq!(
        entity.get_field("field_tags"),
        DataValue::Array(vec![DataValue::Int(3)])
    );
    assert!(!entity.to_array().contains_key("field_tags"));
}
