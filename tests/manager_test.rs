//! 实体管理器持久化流程测试

use quickfield::{
    CastKind, DataValue, EntityEvent, EntitySchema, QuickFieldError, Store,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

async fn open_store() -> Store {
    let store = Store::open_in_memory().await.unwrap();
    let schema = EntitySchema::builder("node", "nodes")
        .attribute("title", CastKind::String)
        .attribute("body", CastKind::String)
        .attribute("status", CastKind::Int)
        .default_value(DataValue::Int(1))
        .with_timestamps()
        .with_soft_delete()
        .with_revisions()
        .build();
    store.register_schema(schema).await.unwrap();
    store
}

fn node_input(title: &str) -> HashMap<String, DataValue> {
    let mut data = HashMap::new();
    data.insert("title".to_string(), DataValue::String(title.to_string()));
    data.insert("body".to_string(), DataValue::String("正文".to_string()));
    data
}

#[tokio::test]
async fn test_insert_assigns_id_and_bookkeeping() {
    let store = open_store().await;
    let manager = store.manager();

    let mut entity = manager.make("node", &node_input("第一篇")).unwrap();
    let id = manager.insert(&mut entity).await.unwrap();

    assert!(id > 0);
    assert!(entity.exists());
    assert!(!entity.is_dirty());
    assert_eq!(entity.get_i64("revision").unwrap(), 1);
    assert!(entity.get_datetime("created_at").is_some());
    assert!(entity.get_datetime("updated_at").is_some());
}

#[tokio::test]
async fn test_find_round_trip_and_cache() {
    let store = open_store().await;
    let manager = store.manager();

    let mut entity = manager.make("node", &node_input("缓存测试")).unwrap();
    let id = manager.insert(&mut entity).await.unwrap();

    let first = manager.find("node", id).await.unwrap().unwrap();
    assert_eq!(first.get_string("title").unwrap(), "缓存测试");

    // 第二次查找命中缓存
    let before = manager.cache().stats().hits.load(Ordering::Relaxed);
    let second = manager.find("node", id).await.unwrap().unwrap();
    assert_eq!(second.get_string("title").unwrap(), "缓存测试");
    assert!(manager.cache().stats().hits.load(Ordering::Relaxed) > before);
}

#[tokio::test]
async fn test_find_missing_returns_none() {
    let store = open_store().await;
    assert!(store.manager().find("node", 9999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_touches_only_dirty_columns() {
    let store = open_store().await;
    let manager = store.manager();

    let mut entity = manager.make("node", &node_input("原标题")).unwrap();
    let id = manager.insert(&mut entity).await.unwrap();

    // 旁路修改另一列，随后的实体更新不得覆盖它
    store
        .connection()
        .execute(
            "UPDATE nodes SET body = ? WHERE id = ?",
            &[
                DataValue::String("外部修改".to_string()),
                DataValue::Int(id),
            ],
        )
        .await
        .unwrap();

    entity.set("title", DataValue::String("新标题".to_string()));
    assert!(manager.update(&mut entity).await.unwrap());

    let reloaded = manager.find("node", id).await.unwrap().unwrap();
    assert_eq!(reloaded.get_string("title").unwrap(), "新标题");
    assert_eq!(reloaded.get_string("body").unwrap(), "外部修改");
    assert_eq!(reloaded.get_i64("revision").unwrap(), 2);
}

#[tokio::test]
async fn test_clean_update_is_noop() {
    let store = open_store().await;
    let manager = store.manager();

    let mut entity = manager.make("node", &node_input("无变更")).unwrap();
    manager.insert(&mut entity).await.unwrap();
    let stamped = entity.to_array().get("updated_at").cloned();

    assert!(!manager.save(&mut entity).await.unwrap());
    assert_eq!(entity.to_array().get("updated_at").cloned(), stamped);
    assert_eq!(entity.get_i64("revision").unwrap(), 1);
}

#[tokio::test]
async fn test_stale_revision_conflicts() {
    let store = open_store().await;
    let manager = store.manager();

    let mut entity = manager.make("node", &node_input("并发")).unwrap();
    let id = manager.insert(&mut entity).await.unwrap();

    let mut copy_a = manager.find("node", id).await.unwrap().unwrap();
    let mut copy_b = manager.find("node", id).await.unwrap().unwrap();

    copy_a.set("title", DataValue::String("先写".to_string()));
    assert!(manager.update(&mut copy_a).await.unwrap());

    copy_b.set("title", DataValue::String("后写".to_string()));
    let err = manager.update(&mut copy_b).await.unwrap_err();
    assert!(matches!(err, QuickFieldError::RevisionConflict { .. }));

    let reloaded = manager.find("node", id).await.unwrap().unwrap();
    assert_eq!(reloaded.get_string("title").unwrap(), "先写");
}

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let store = open_store().await;
    let manager = store.manager();

    let mut entity = manager.make("node", &node_input("待删除")).unwrap();
    let id = manager.insert(&mut entity).await.unwrap();

    manager.delete(&mut entity).await.unwrap();
    assert!(manager.find("node", id).await.unwrap().is_none());

    let trashed = manager.find_with_trashed("node", id).await.unwrap().unwrap();
    assert!(!trashed.get("deleted_at").is_null());

    let mut trashed = trashed;
    manager.restore(&mut trashed).await.unwrap();
    assert!(manager.find("node", id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_force_delete_removes_row() {
    let store = open_store().await;
    let manager = store.manager();

    let mut entity = manager.make("node", &node_input("物理删除")).unwrap();
    let id = manager.insert(&mut entity).await.unwrap();

    manager.force_delete(&mut entity).await.unwrap();
    assert!(!entity.exists());
    assert!(manager.find_with_trashed("node", id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_lifecycle_events_fire_in_order() {
    let store = open_store().await;
    let manager = store.manager();

    let counter = Arc::new(AtomicU32::new(0));
    let pre = counter.clone();
    manager.on(EntityEvent::PreInsert, move |entity| {
        pre.fetch_add(1, Ordering::SeqCst);
        entity.set("body", DataValue::String("事件填充".to_string()));
        Ok(())
    });
    let post = counter.clone();
    manager.on(EntityEvent::PostSave, move |_| {
        post.fetch_add(10, Ordering::SeqCst);
        Ok(())
    });

    let mut entity = manager.make("node", &node_input("事件")).unwrap();
    let id = manager.insert(&mut entity).await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 11);
    let reloaded = manager.find("node", id).await.unwrap().unwrap();
    assert_eq!(reloaded.get_string("body").unwrap(), "事件填充");
}

#[tokio::test]
async fn test_listener_error_aborts_insert() {
    let store = open_store().await;
    let manager = store.manager();

    manager.on(EntityEvent::PreInsert, |_| {
        Err(QuickFieldError::InvariantViolation {
            message: "拒绝插入".to_string(),
        })
    });

    let mut entity = manager.make("node", &node_input("被拒")).unwrap();
    assert!(manager.insert(&mut entity).await.is_err());
    assert_eq!(manager.count("node").await.unwrap(), 0);
}

#[tokio::test]
async fn test_insert_many_in_one_transaction() {
    let store = open_store().await;
    let manager = store.manager();

    let entities = manager
        .insert_many(
            "node",
            vec![node_input("一"), node_input("二"), node_input("三")],
        )
        .await
        .unwrap();
    assert_eq!(entities.len(), 3);
    assert!(entities.iter().all(|e| e.id().is_some()));
    assert_eq!(manager.count("node").await.unwrap(), 3);
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let store = open_store().await;
    let manager = store.manager();

    let result: Result<(), _> = manager
        .transaction(|| async {
            let mut entity = manager.make("node", &node_input("回滚"))?;
            manager.insert(&mut entity).await?;
            Err(QuickFieldError::QueryError {
                message: "强制回滚".to_string(),
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(manager.count("node").await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_by_and_delete_by() {
    let store = open_store().await;
    let manager = store.manager();

    manager
        .insert_many("node", vec![node_input("甲"), node_input("乙")])
        .await
        .unwrap();

    let mut values = HashMap::new();
    values.insert("status".to_string(), DataValue::Int(0));
    let affected = manager
        .update_by(
            "node",
            &[quickfield::QueryCondition::eq(
                "title",
                DataValue::String("甲".to_string()),
            )],
            values,
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let removed = manager
        .delete_by(
            "node",
            &[quickfield::QueryCondition::eq("status", DataValue::Int(0))],
        )
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(manager.count("node").await.unwrap(), 1);
}

#[tokio::test]
async fn test_insert_many_unknown_type_leaves_no_open_transaction() {
    let store = open_store().await;
    let manager = store.manager();

    let err = manager
        .insert_many("ghost", vec![node_input("甲")])
        .await
        .unwrap_err();
    assert!(matches!(err, QuickFieldError::InvariantViolation { .. }));

    // 失败不应留下未结束的事务
    assert!(manager.connection().rollback().await.is_err());

    let inserted = manager
        .insert_many("node", vec![node_input("乙"), node_input("丙")])
        .await
        .unwrap();
    assert_eq!(inserted.len(), 2);
    assert_eq!(manager.count("node").await.unwrap(), 2);
}
