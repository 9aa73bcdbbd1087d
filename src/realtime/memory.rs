//! In-process state tree with Firebase write semantics

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{segments, StateStore};
use crate::types::{IrrigationError, Result};

pub struct MemoryStateStore {
    root: RwLock<Value>,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

    /// Seed a tree, e.g. a Firebase export
    pub fn with_value(value: Value) -> Self {
        Self {
            root: RwLock::new(value),
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(root, |node, key| node.get(key))
}

/// Walk to `path`, turning anything in the way into objects
fn entry<'a>(root: &'a mut Value, path: &str) -> &'a mut Value {
    segments(path).fold(root, |node, key| {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        match node {
            Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
            _ => unreachable!("node was just made an object"),
        }
    })
}

/// Drop null leaves and empty objects, which Firebase never stores
fn prune(value: &mut Value) {
    if let Value::Object(map) = value {
        for child in map.values_mut() {
            prune(child);
        }
        map.retain(|_, child| match child {
            Value::Null => false,
            Value::Object(m) => !m.is_empty(),
            _ => true,
        });
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let root = self.root.read().await;
        Ok(lookup(&root, path).filter(|v| !v.is_null()).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let mut root = self.root.write().await;
        *entry(&mut root, path) = value;
        prune(&mut root);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        let mut root = self.root.write().await;
        let node = entry(&mut root, path);
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            map.extend(fields);
        }
        prune(&mut root);
        Ok(())
    }

    async fn increment(&self, path: &str, field: &str, by: i64) -> Result<()> {
        let mut root = self.root.write().await;
        let node = entry(&mut root, &format!("{}/{}", path, field));
        let current = match node {
            Value::Null => 0,
            Value::Number(n) => n.as_i64().ok_or_else(|| {
                IrrigationError::Internal(format!("{path}/{field} is not an integer"))
            })?,
            _ => {
                return Err(IrrigationError::Internal(format!(
                    "{path}/{field} is not a number"
                )))
            }
        };
        *node = Value::from(current + by);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_nested() {
        let store = MemoryStateStore::new();
        store.set("relay-sensors/1", json!({"state": "on"})).await.unwrap();

        assert_eq!(store.get("relay-sensors/1/state").await.unwrap(), Some(json!("on")));
        assert_eq!(
            store.get("/relay-sensors/").await.unwrap(),
            Some(json!({"1": {"state": "on"}}))
        );
        assert_eq!(store.get("relay-sensors/2").await.unwrap(), None);
        assert_eq!(store.get("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_null_deletes() {
        let store = MemoryStateStore::new();
        store.set("a/b", json!(1)).await.unwrap();
        store.set("a/b", Value::Null).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_merges() {
        let store = MemoryStateStore::with_value(json!({"s": {"1": {"state": "on", "label": "north"}}}));

        let mut fields = Map::new();
        fields.insert("state".into(), json!("off"));
        store.update("s/1", fields).await.unwrap();

        assert_eq!(
            store.get("s/1").await.unwrap(),
            Some(json!({"state": "off", "label": "north"}))
        );
    }

    #[tokio::test]
    async fn test_increment() {
        let store = MemoryStateStore::new();
        store.increment("stats", "total_count", 1).await.unwrap();
        store.increment("stats", "total_count", 2).await.unwrap();
        assert_eq!(store.get("stats/total_count").await.unwrap(), Some(json!(3)));

        store.set("stats/label", json!("x")).await.unwrap();
        assert!(store.increment("stats", "label", 1).await.is_err());
    }
}
