//! 字段定义仓储测试

use quickfield::{
    DataValue, FieldAttachment, FieldDefinition, FieldKind, QuickFieldError, RuleKind, Store,
    ValidationRule, DEFAULT_LANGUAGE,
};

async fn open_store() -> Store {
    Store::open_in_memory().await.unwrap()
}

#[tokio::test]
async fn test_save_and_reload_definition() {
    let store = open_store().await;
    let mut field = FieldDefinition::new("field_price", "价格", FieldKind::Decimal)
        .required()
        .with_setting("min", serde_json::json!(0))
        .with_rule(ValidationRule::new(RuleKind::MaxValue { value: 9999.0 }))
        .with_weight(3);
    let id = store.fields().save(&mut field).await.unwrap();
    assert_eq!(field.id, Some(id));

    store.fields().clear_cache();
    let loaded = store.fields().find(id).await.unwrap().unwrap();
    assert_eq!(loaded.machine_name, "field_price");
    assert_eq!(loaded.kind, FieldKind::Decimal);
    assert!(loaded.required);
    assert_eq!(loaded.rules.len(), 1);
    assert_eq!(loaded.weight, 3);
    assert_eq!(
        loaded.settings.get("min").and_then(|v| v.as_i64()),
        Some(0)
    );
}

#[tokio::test]
async fn test_machine_name_must_be_unique() {
    let store = open_store().await;
    let mut first = FieldDefinition::new("field_title", "标题", FieldKind::String_);
    store.fields().save(&mut first).await.unwrap();

    let mut duplicate = FieldDefinition::new("field_title", "另一个标题", FieldKind::Text);
    let err = store.fields().save(&mut duplicate).await.unwrap_err();
    assert!(matches!(err, QuickFieldError::ValidationError { .. }));
}

#[tokio::test]
async fn test_update_keeps_machine_name_claim() {
    let store = open_store().await;
    let mut field = FieldDefinition::new("field_title", "标题", FieldKind::String_);
    store.fields().save(&mut field).await.unwrap();

    // 同一定义重存不算冲突
    field.name = "更新后的标题".to_string();
    store.fields().save(&mut field).await.unwrap();

    let loaded = store
        .fields()
        .find_by_machine_name("field_title")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.name, "更新后的标题");
}

#[tokio::test]
async fn test_find_by_machine_name_missing() {
    let store = open_store().await;
    assert!(store
        .fields()
        .find_by_machine_name("field_missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_find_all_ordered_by_weight() {
    let store = open_store().await;
    for (name, weight) in [("field_c", 2), ("field_a", 0), ("field_b", 1)] {
        let mut field =
            FieldDefinition::new(name, name, FieldKind::String_).with_weight(weight);
        store.fields().save(&mut field).await.unwrap();
    }
    let all = store.fields().find_all().await.unwrap();
    let names: Vec<&str> = all.iter().map(|f| f.machine_name.as_str()).collect();
    assert_eq!(names, vec!["field_a", "field_b", "field_c"]);
}

#[tokio::test]
async fn test_attachment_ordering() {
    let store = open_store().await;
    let mut subtitle = FieldDefinition::new("field_subtitle", "副标题", FieldKind::String_);
    let mut price = FieldDefinition::new("field_price", "价格", FieldKind::Decimal);
    store.fields().save(&mut subtitle).await.unwrap();
    store.fields().save(&mut price).await.unwrap();

    store
        .fields()
        .attach_to_entity(&FieldAttachment::new(subtitle.id.unwrap(), "product").with_weight(10))
        .await
        .unwrap();
    store
        .fields()
        .attach_to_entity(&FieldAttachment::new(price.id.unwrap(), "product").with_weight(1))
        .await
        .unwrap();

    let fields = store
        .fields()
        .find_by_entity_type("product", None)
        .await
        .unwrap();
    let names: Vec<&str> = fields.iter().map(|f| f.machine_name.as_str()).collect();
    assert_eq!(names, vec!["field_price", "field_subtitle"]);
}

#[tokio::test]
async fn test_reattach_updates_weight() {
    let store = open_store().await;
    let mut field = FieldDefinition::new("field_subtitle", "副标题", FieldKind::String_);
    store.fields().save(&mut field).await.unwrap();
    let field_id = field.id.unwrap();

    let first = store
        .fields()
        .attach_to_entity(&FieldAttachment::new(field_id, "product").with_weight(1))
        .await
        .unwrap();
    let second = store
        .fields()
        .attach_to_entity(&FieldAttachment::new(field_id, "product").with_weight(5))
        .await
        .unwrap();
    assert_eq!(first, second);

    let attachments = store.fields().attachments_for("product").await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].weight, 5);
}

#[tokio::test]
async fn test_delete_cascades_values() {
    let store = open_store().await;
    let mut field = FieldDefinition::new("field_subtitle", "副标题", FieldKind::String_);
    store.fields().save(&mut field).await.unwrap();
    let field_id = field.id.unwrap();

    store
        .fields()
        .attach_to_entity(&FieldAttachment::new(field_id, "node"))
        .await
        .unwrap();
    store
        .values()
        .set_value(
            &field,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("值".to_string()),
        )
        .await
        .unwrap();
    store.values().create_revision("node", 1, None).await.unwrap();

    store.fields().delete(field_id).await.unwrap();

    assert!(store.fields().find(field_id).await.unwrap().is_none());
    for table in ["field_values", "field_attachments", "field_revisions"] {
        let row = store
            .connection()
            .fetch_optional(
                &format!("SELECT COUNT(*) AS total FROM {} WHERE field_id = ?", table),
                &[DataValue::Int(field_id)],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("total"), Some(&DataValue::Int(0)), "{}", table);
    }
}

#[tokio::test]
async fn test_detach_clears_values() {
    let store = open_store().await;
    let mut field = FieldDefinition::new("field_subtitle", "副标题", FieldKind::String_);
    store.fields().save(&mut field).await.unwrap();
    let field_id = field.id.unwrap();

    store
        .fields()
        .attach_to_entity(&FieldAttachment::new(field_id, "node"))
        .await
        .unwrap();
    store
        .values()
        .set_value(
            &field,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("值".to_string()),
        )
        .await
        .unwrap();

    store.fields().detach_from_entity(field_id, "node").await.unwrap();

    assert!(store
        .fields()
        .find_by_entity_type("node", None)
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .values()
        .get_value(&field, "node", 1, DEFAULT_LANGUAGE)
        .await
        .unwrap()
        .is_null());
}
