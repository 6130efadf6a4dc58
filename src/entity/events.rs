//! 实体生命周期事件
//!
//! 管理器在持久化流程的固定位置派发事件；监听器按注册顺序
//! 同步执行，首个错误中止整个操作并原样向上传播。

use crate::entity::model::Entity;
use crate::error::QuickFieldResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// 生命周期事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    /// 任何保存（插入或更新）之前
    PreSave,
    /// 插入之前
    PreInsert,
    /// 更新之前
    PreUpdate,
    /// 删除之前
    PreDelete,
    /// 插入之后
    PostInsert,
    /// 更新之后
    PostUpdate,
    /// 任何保存之后
    PostSave,
    /// 删除之后
    PostDelete,
}

/// 监听器签名：可变访问实体，错误会中止当前操作
pub type Listener = dyn Fn(&mut Entity) -> QuickFieldResult<()> + Send + Sync;

/// 事件派发器
///
/// 按事件类别维护监听器列表；派发时持读锁克隆 Arc 列表，
/// 监听器本体在锁外执行，允许监听器内再注册监听器。
pub struct EventDispatcher {
    listeners: RwLock<HashMap<EntityEvent, Vec<Arc<Listener>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// 注册监听器
    pub fn on<F>(&self, event: EntityEvent, listener: F)
    where
        F: Fn(&mut Entity) -> QuickFieldResult<()> + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(event)
            .or_default()
            .push(Arc::new(listener));
    }

    /// 派发事件，按注册顺序执行，首个错误即返回
    pub fn dispatch(&self, event: EntityEvent, entity: &mut Entity) -> QuickFieldResult<()> {
        let snapshot: Vec<Arc<Listener>> = {
            let guard = self.listeners.read();
            match guard.get(&event) {
                Some(list) => list.clone(),
                None => return Ok(()),
            }
        };
        for listener in snapshot {
            listener(entity)?;
        }
        Ok(())
    }

    /// 指定事件的监听器数量
    pub fn listener_count(&self, event: EntityEvent) -> usize {
        self.listeners
            .read()
            .get(&event)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.listeners.read();
        f.debug_struct("EventDispatcher")
            .field("events", &guard.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::schema::EntitySchema;
    use crate::types::{CastKind, DataValue};

    fn sample_entity() -> Entity {
        let schema = EntitySchema::builder("article", "articles")
            .attribute("title", CastKind::String)
            .build();
        Entity::new(schema)
    }

    #[test]
    fn test_dispatch_order_and_mutation() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on(EntityEvent::PreSave, |e| {
            e.set("title", DataValue::String("第一".to_string()));
            Ok(())
        });
        dispatcher.on(EntityEvent::PreSave, |e| {
            let current = e.get_string("title").unwrap_or_default();
            e.set("title", DataValue::String(format!("{}/第二", current)));
            Ok(())
        });

        let mut entity = sample_entity();
        dispatcher.dispatch(EntityEvent::PreSave, &mut entity).unwrap();
        assert_eq!(entity.get_string("title").unwrap(), "第一/第二");
    }

    #[test]
    fn test_listener_error_aborts() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on(EntityEvent::PreInsert, |_| {
            Err(crate::quick_error!(invariant, "不允许插入"))
        });
        dispatcher.on(EntityEvent::PreInsert, |e| {
            e.set("title", DataValue::String("不应执行".to_string()));
            Ok(())
        });

        let mut entity = sample_entity();
        let result = dispatcher.dispatch(EntityEvent::PreInsert, &mut entity);
        assert!(result.is_err());
        assert!(entity.get("title").is_null());
    }

    #[test]
    fn test_no_listeners_is_noop() {
        let dispatcher = EventDispatcher::new();
        let mut entity = sample_entity();
        assert!(dispatcher.dispatch(EntityEvent::PostDelete, &mut entity).is_ok());
        assert_eq!(dispatcher.listener_count(EntityEvent::PostDelete), 0);
    }
}
