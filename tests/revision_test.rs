//! 字段值修订快照测试

use quickfield::{DataValue, FieldDefinition, FieldKind, QuickFieldError, Store, DEFAULT_LANGUAGE};

async fn open_store() -> Store {
    Store::open_in_memory().await.unwrap()
}

async fn saved_field(store: &Store, machine_name: &str, kind: FieldKind) -> FieldDefinition {
    let mut field = FieldDefinition::new(machine_name, machine_name, kind);
    store.fields().save(&mut field).await.unwrap();
    field
}

#[tokio::test]
async fn test_revision_snapshot_is_immutable() {
    let store = open_store().await;
    let field = saved_field(&store, "field_subtitle", FieldKind::String_).await;
    let values = store.values();

    values
        .set_value(
            &field,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("第一版".to_string()),
        )
        .await
        .unwrap();
    let revision_id = values
        .create_revision("node", 1, Some("editor"))
        .await
        .unwrap();

    // 快照之后继续修改当前值
    values
        .set_value(
            &field,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("第二版".to_string()),
        )
        .await
        .unwrap();

    values.restore_revision("node", 1, &revision_id).await.unwrap();
    assert_eq!(
        values
            .get_value(&field, "node", 1, DEFAULT_LANGUAGE)
            .await
            .unwrap(),
        DataValue::String("第一版".to_string())
    );
}

#[tokio::test]
async fn test_overlay_restore_keeps_newer_fields() {
    let store = open_store().await;
    let subtitle = saved_field(&store, "field_subtitle", FieldKind::String_).await;
    let values = store.values();

    values
        .set_value(
            &subtitle,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("旧副标题".to_string()),
        )
        .await
        .unwrap();
    let revision_id = values.create_revision("node", 1, None).await.unwrap();

    // 修订之后新增了另一个字段的值
    let price = saved_field(&store, "field_price", FieldKind::Decimal).await;
    values
        .set_value(&price, "node", 1, DEFAULT_LANGUAGE, &DataValue::Float(9.9))
        .await
        .unwrap();
    values
        .set_value(
            &subtitle,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("新副标题".to_string()),
        )
        .await
        .unwrap();

    values.restore_revision("node", 1, &revision_id).await.unwrap();

    // 修订中出现的字段被回滚，修订之后新增的字段不动
    assert_eq!(
        values
            .get_value(&subtitle, "node", 1, DEFAULT_LANGUAGE)
            .await
            .unwrap(),
        DataValue::String("旧副标题".to_string())
    );
    assert_eq!(
        values
            .get_value(&price, "node", 1, DEFAULT_LANGUAGE)
            .await
            .unwrap(),
        DataValue::Float(9.9)
    );
}

#[tokio::test]
async fn test_replace_restore_drops_newer_fields() {
    let store = open_store().await;
    let subtitle = saved_field(&store, "field_subtitle", FieldKind::String_).await;
    let values = store.values();

    values
        .set_value(
            &subtitle,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("旧副标题".to_string()),
        )
        .await
        .unwrap();
    let revision_id = values.create_revision("node", 1, None).await.unwrap();

    let price = saved_field(&store, "field_price", FieldKind::Decimal).await;
    values
        .set_value(&price, "node", 1, DEFAULT_LANGUAGE, &DataValue::Float(9.9))
        .await
        .unwrap();

    values
        .restore_revision_replace("node", 1, &revision_id)
        .await
        .unwrap();

    assert_eq!(
        values
            .get_value(&subtitle, "node", 1, DEFAULT_LANGUAGE)
            .await
            .unwrap(),
        DataValue::String("旧副标题".to_string())
    );
    assert!(values
        .get_value(&price, "node", 1, DEFAULT_LANGUAGE)
        .await
        .unwrap()
        .is_null());
}

#[tokio::test]
async fn test_multi_value_revision_round_trip() {
    let store = open_store().await;
    let mut tags = FieldDefinition::new("field_tags", "标签", FieldKind::TaxonomyRef).multiple(-1);
    store.fields().save(&mut tags).await.unwrap();
    let values = store.values();

    values
        .set_value(
            &tags,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::Array(vec![DataValue::Int(1), DataValue::Int(2), DataValue::Int(3)]),
        )
        .await
        .unwrap();
    let revision_id = values.create_revision("node", 1, None).await.unwrap();

    values
        .set_value(
            &tags,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::Array(vec![DataValue::Int(9)]),
        )
        .await
        .unwrap();

    values.restore_revision("node", 1, &revision_id).await.unwrap();
    assert_eq!(
        values
            .get_value(&tags, "node", 1, DEFAULT_LANGUAGE)
            .await
            .unwrap(),
        DataValue::Array(vec![DataValue::Int(1), DataValue::Int(2), DataValue::Int(3)])
    );
}

#[tokio::test]
async fn test_list_revisions() {
    let store = open_store().await;
    let field = saved_field(&store, "field_subtitle", FieldKind::String_).await;
    let values = store.values();

    values
        .set_value(
            &field,
            "node",
            1,
            DEFAULT_LANGUAGE,
            &DataValue::String("值".to_string()),
        )
        .await
        .unwrap();
    let first = values.create_revision("node", 1, Some("alice")).await.unwrap();
    let second = values.create_revision("node", 1, None).await.unwrap();

    let revisions = values.list_revisions("node", 1).await.unwrap();
    assert_eq!(revisions.len(), 2);
    let ids: Vec<&str> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));
    assert!(revisions.iter().all(|r| r.value_count == 1));
}

#[tokio::test]
async fn test_restore_unknown_revision_fails() {
    let store = open_store().await;
    let err = store
        .values()
        .restore_revision("node", 1, "不存在的修订")
        .await
        .unwrap_err();
    assert!(matches!(err, QuickFieldError::NotFound { .. }));
}
