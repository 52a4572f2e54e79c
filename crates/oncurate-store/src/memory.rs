//! In-process [`DocumentStore`].
//!
//! Holds one JSON tree and follows realtime-store conventions: `null` and
//! empty containers are never stored, so writing them deletes and parents
//! left empty are pruned. Removing an array element shifts the elements after
//! it down by one.
//!
//! Subscribers are notified when a write touches their path, an ancestor or a
//! descendant, and only when their snapshot actually changed. Callbacks run
//! outside the state lock so they may read, subscribe or drop subscriptions;
//! writes are serialized through an async gate. Every delivery carries a
//! sequence number taken under the state lock, and a subscriber drops any
//! snapshot older than the one it last received, so the initial snapshot of
//! a `subscribe` racing a write can never arrive after the newer one.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use oncurate_common::time::now_millis;
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::path;
use crate::store::{DocumentStore, SnapshotCallback, Subscription};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
    write_gate: Arc<tokio::sync::Mutex<()>>,
}

struct Inner {
    root: Value,
    subscribers: BTreeMap<u64, Subscriber>,
    next_subscriber: u64,
    next_delivery: u64,
    last_push: (i64, u32),
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
            subscribers: BTreeMap::new(),
            next_subscriber: 0,
            next_delivery: 0,
            last_push: (0, 0),
        }
    }
}

struct Subscriber {
    path: String,
    callback: SnapshotCallback,
    last: Option<Value>,
    /// Sequence number of the newest snapshot handed to `callback`.
    delivered: Arc<Mutex<u64>>,
}

struct Delivery {
    callback: SnapshotCallback,
    snapshot: Option<Value>,
    seq: u64,
    delivered: Arc<Mutex<u64>>,
}

impl Delivery {
    fn deliver(self) {
        let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        if self.seq <= *delivered {
            trace!(seq = self.seq, newest = *delivered, "Dropping stale snapshot");
            return;
        }
        *delivered = self.seq;
        (self.callback)(self.snapshot.as_ref());
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with an exported tree, e.g. a JSON dump of the database.
    pub fn with_root(root: Value) -> Result<Self> {
        let store = Self::new();
        {
            let mut inner = store.lock();
            inner.root = normalize(root)?.unwrap_or_else(|| Value::Object(Map::new()));
        }
        Ok(store)
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.lock().root.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `edits` atomically and notify affected subscribers.
    async fn commit(&self, edits: Vec<(Vec<String>, Option<Value>)>) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let deliveries = {
            let mut inner = self.lock();
            let mut next = inner.root.clone();
            for (segments, value) in &edits {
                let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                match value {
                    Some(value) => set(&mut next, &segments, value.clone())?,
                    None => remove(&mut next, &segments),
                }
            }
            inner.root = next;
            let changed: Vec<String> = edits.iter().map(|(segments, _)| segments.join("/")).collect();
            inner.collect_deliveries(&changed)
        };
        trace!(n = deliveries.len(), "Delivering snapshots");
        for delivery in deliveries {
            delivery.deliver();
        }
        Ok(())
    }

    fn next_push_key(&self) -> String {
        let mut inner = self.lock();
        let now = now_millis();
        let (millis, seq) = if now <= inner.last_push.0 {
            (inner.last_push.0, inner.last_push.1 + 1)
        } else {
            (now, 0)
        };
        inner.last_push = (millis, seq);
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{millis:013}{seq:04}-{}", &suffix[..8])
    }
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.next_delivery += 1;
        self.next_delivery
    }

    fn collect_deliveries(&mut self, changed: &[String]) -> Vec<Delivery> {
        let root = &self.root;
        let mut deliveries = Vec::new();
        for subscriber in self.subscribers.values_mut() {
            if !changed.iter().any(|c| path::overlaps(&subscriber.path, c)) {
                continue;
            }
            let current = lookup_path(root, &subscriber.path).cloned();
            if current != subscriber.last {
                subscriber.last = current.clone();
                deliveries.push((subscriber.callback.clone(), current, subscriber.delivered.clone()));
            }
        }
        deliveries
            .into_iter()
            .map(|(callback, snapshot, delivered)| Delivery { callback, snapshot, seq: self.next_seq(), delivered })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let segments = path::segments(path)?;
        Ok(lookup(&self.lock().root, &segments).cloned())
    }

    fn subscribe(&self, path: &str, callback: SnapshotCallback) -> Result<Subscription> {
        let segments = path::segments(path)?;
        let (id, initial) = {
            let mut inner = self.lock();
            let snapshot = lookup(&inner.root, &segments).cloned();
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            let delivered = Arc::new(Mutex::new(0));
            inner.subscribers.insert(
                id,
                Subscriber {
                    path: segments.join("/"),
                    callback: callback.clone(),
                    last: snapshot.clone(),
                    delivered: delivered.clone(),
                },
            );
            let seq = inner.next_seq();
            (id, Delivery { callback, snapshot, seq, delivered })
        };
        debug!(path, id, "Subscribed");
        initial.deliver();

        let inner: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.lock().unwrap_or_else(|e| e.into_inner()).subscribers.remove(&id);
            }
        }))
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn write(&self, path: &str, value: Value) -> Result<()> {
        let segments = owned_segments(path)?;
        self.commit(vec![(segments, normalize(value)?)]).await
    }

    #[instrument(skip(self, values), fields(n = values.len()), level = "debug")]
    async fn update(&self, path: &str, values: Map<String, Value>) -> Result<()> {
        let mut edits = Vec::with_capacity(values.len());
        for (key, value) in values {
            let segments = owned_segments(&path::join(path, &key))?;
            edits.push((segments, normalize(value)?));
        }
        self.commit(edits).await
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn push(&self, path: &str, value: Value) -> Result<String> {
        let key = self.next_push_key();
        let segments = owned_segments(&path::join(path, &key))?;
        self.commit(vec![(segments, normalize(value)?)]).await?;
        Ok(key)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, path: &str) -> Result<()> {
        let segments = owned_segments(path)?;
        self.commit(vec![(segments, None)]).await
    }
}

fn owned_segments(path: &str) -> Result<Vec<String>> {
    Ok(path::segments(path)?.into_iter().map(str::to_string).collect())
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = path::segments(path).ok()?;
    lookup(root, &segments)
}

fn lookup<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| match node {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
        .filter(|value| !value.is_null())
}

/// Strip nulls and empty containers and validate object keys. `None` means
/// the value stores as nothing.
fn normalize(value: Value) -> Result<Option<Value>> {
    Ok(match value {
        Value::Null => None,
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                path::validate_key(&key)?;
                if let Some(child) = normalize(child)? {
                    out.insert(key, child);
                }
            }
            (!out.is_empty()).then_some(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(item) = normalize(item)? {
                    out.push(item);
                }
            }
            (!out.is_empty()).then_some(Value::Array(out))
        }
        other => Some(other),
    })
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn array_index(items: &[Value], segment: &str, full: &[&str]) -> Result<usize> {
    let index = segment
        .parse::<usize>()
        .map_err(|_| StoreError::NotAContainer(full.join("/")))?;
    if index > items.len() {
        return Err(StoreError::InvalidPath(format!(
            "{}: index {index} is past the end of a list of {}",
            full.join("/"),
            items.len()
        )));
    }
    Ok(index)
}

fn set(root: &mut Value, segments: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };
    let mut node = root;
    for segment in parents {
        if !matches!(node, Value::Object(_) | Value::Array(_)) {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index = array_index(items, segment, segments)?;
                if index == items.len() {
                    items.push(Value::Object(Map::new()));
                }
                &mut items[index]
            }
            _ => return Err(StoreError::NotAContainer(segments.join("/"))),
        };
    }
    if !matches!(node, Value::Object(_) | Value::Array(_)) {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
        }
        Value::Array(items) => {
            let index = array_index(items, last, segments)?;
            if index == items.len() {
                items.push(value);
            } else {
                items[index] = value;
            }
        }
        _ => {}
    }
    Ok(())
}

fn remove(node: &mut Value, segments: &[&str]) {
    let Some((first, rest)) = segments.split_first() else {
        *node = Value::Object(Map::new());
        return;
    };
    if rest.is_empty() {
        match node {
            Value::Object(map) => {
                map.remove(*first);
            }
            Value::Array(items) => {
                if let Some(index) = first.parse::<usize>().ok().filter(|i| *i < items.len()) {
                    items.remove(index);
                }
            }
            _ => {}
        }
        return;
    }
    let child = match node {
        Value::Object(map) => map.get_mut(*first),
        Value::Array(items) => first.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    };
    let Some(child) = child else { return };
    remove(child, rest);
    if is_empty_container(child) {
        remove(node, &[*first]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (SnapshotCallback, Arc<Mutex<Vec<Option<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: SnapshotCallback = Arc::new(move |snapshot: Option<&Value>| {
            sink.lock().unwrap().push(snapshot.cloned());
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn test_write_and_get() {
        let store = InMemoryStore::new();
        store.write("Genes/BRAF/summary", json!("text")).await.unwrap();
        assert_eq!(store.get("Genes/BRAF").await.unwrap(), Some(json!({ "summary": "text" })));
        assert_eq!(store.get("Genes/KRAS").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_null_write_deletes_and_prunes_parents() {
        let store = InMemoryStore::new();
        store.write("Meta/BRAF/review/u1", json!(true)).await.unwrap();
        store.write("Meta/BRAF/review/u1", Value::Null).await.unwrap();
        assert_eq!(store.get("Meta").await.unwrap(), None);
        assert_eq!(store.snapshot(), json!({}));
    }

    #[tokio::test]
    async fn test_update_with_nested_keys() {
        let store = InMemoryStore::new();
        store.write("Meta/BRAF/review/old", json!(true)).await.unwrap();
        let mut values = Map::new();
        values.insert("lastModifiedBy".into(), json!("Ada"));
        values.insert("review/new".into(), json!(true));
        values.insert("review/old".into(), Value::Null);
        store.update("Meta/BRAF", values).await.unwrap();
        assert_eq!(
            store.get("Meta/BRAF").await.unwrap(),
            Some(json!({ "lastModifiedBy": "Ada", "review": { "new": true } }))
        );
    }

    #[tokio::test]
    async fn test_array_delete_shifts_indexes() {
        let store = InMemoryStore::new();
        store.write("Genes/BRAF/mutations", json!([{ "name": "A" }, { "name": "B" }, { "name": "C" }])).await.unwrap();
        store.delete("Genes/BRAF/mutations/1").await.unwrap();
        assert_eq!(store.get("Genes/BRAF/mutations/1/name").await.unwrap(), Some(json!("C")));
        store.write("Genes/BRAF/mutations/2", json!({ "name": "D" })).await.unwrap();
        assert_eq!(store.get("Genes/BRAF/mutations/2/name").await.unwrap(), Some(json!("D")));
        assert!(store.write("Genes/BRAF/mutations/9", json!({ "name": "E" })).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_tree_untouched() {
        let store = InMemoryStore::new();
        store.write("Genes/BRAF/mutations", json!([{ "name": "A" }])).await.unwrap();
        let mut values = Map::new();
        values.insert("summary".into(), json!("x"));
        values.insert("mutations/5/name".into(), json!("B"));
        assert!(store.update("Genes/BRAF", values).await.is_err());
        assert_eq!(store.get("Genes/BRAF/summary").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_changes() {
        let store = InMemoryStore::new();
        let (callback, seen) = recorder();
        let subscription = store.subscribe("Meta/BRAF/review", callback).unwrap();

        store.write("Meta/BRAF/review/currentReviewer", json!("Ada")).await.unwrap();
        store.write("Meta/KRAS/review/currentReviewer", json!("Bob")).await.unwrap();
        store.write("Meta/BRAF", json!({ "review": { "currentReviewer": "" } })).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                None,
                Some(json!({ "currentReviewer": "Ada" })),
                Some(json!({ "currentReviewer": "" })),
            ]
        );

        subscription.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);
        store.write("Meta/BRAF/review/currentReviewer", json!("Cy")).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unchanged_snapshot_is_not_redelivered() {
        let store = InMemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscription = store
            .subscribe("Meta/BRAF/lastModifiedBy", Arc::new(move |_: Option<&Value>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        store.write("Meta/BRAF", json!({ "review": { "u1": true } })).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        store.write("Meta/BRAF/lastModifiedBy", json!("Ada")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let store = InMemoryStore::new();
        {
            let (callback, _seen) = recorder();
            let _subscription = store.subscribe("Genes", callback).unwrap();
            assert_eq!(store.subscriber_count(), 1);
        }
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_push_keys_are_ordered() {
        let store = InMemoryStore::new();
        let first = store.push("History/BRAF/api", json!({ "admin": "Ada" })).await.unwrap();
        let second = store.push("History/BRAF/api", json!({ "admin": "Bob" })).await.unwrap();
        assert!(first < second);
        let history = store.get("History/BRAF/api").await.unwrap().unwrap();
        assert_eq!(history.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_forbidden_keys() {
        let store = InMemoryStore::new();
        assert!(store.write("Genes/BR.AF", json!(1)).await.is_err());
        assert!(store.write("Genes/BRAF", json!({ "a#b": 1 })).await.is_err());
    }

    #[test]
    fn test_seeded_store() {
        let store = InMemoryStore::with_root(json!({ "Genes": { "BRAF": { "name": "BRAF", "x": null } } })).unwrap();
        let value = tokio_test::block_on(store.get("Genes/BRAF")).unwrap();
        assert_eq!(value, Some(json!({ "name": "BRAF" })));
    }

    #[test]
    fn test_stale_delivery_is_dropped() {
        let (callback, seen) = recorder();
        let delivered = Arc::new(Mutex::new(0));
        let newer = Delivery { callback: callback.clone(), snapshot: Some(json!("Bob")), seq: 2, delivered: delivered.clone() };
        let older = Delivery { callback, snapshot: Some(json!("Ada")), seq: 1, delivered };

        newer.deliver();
        older.deliver();

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!("Bob"))]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_racing_writes_ends_on_latest_snapshot() {
        let store = InMemoryStore::new();
        for round in 0..50 {
            let path = format!("Meta/G{round}/review/currentReviewer");
            let (callback, seen) = recorder();

            let writer = {
                let store = store.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    for i in 0..20 {
                        store.write(&path, json!(format!("user{i}"))).await.unwrap();
                    }
                })
            };
            let subscriber = {
                let store = store.clone();
                let path = path.clone();
                tokio::task::spawn_blocking(move || store.subscribe(&path, callback).unwrap())
            };
            writer.await.unwrap();
            let _subscription = subscriber.await.unwrap();

            let last = seen.lock().unwrap().last().cloned().flatten();
            assert_eq!(last, Some(json!("user19")), "round {round}");
        }
    }
}
