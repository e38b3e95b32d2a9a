//! In-memory implementation of OrderStore
//!
//! Each container sits behind its own `tokio::sync::Mutex`. A transaction
//! holds the container's guard from `begin` until it is committed or dropped
//! and works on a staged copy, so concurrent operations on one container run
//! one after another while different containers never contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

use playlist_order_core::{
    ContainerId, ItemId, ItemRef, OrderError, OrderKey, OrderStore, OrderTransaction, Result,
};

/// HashMap-backed store, used by tests and as a reference implementation.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use playlist_order::{ItemId, MemoryStore, OrderMaintainer};
///
/// async fn example() -> anyhow::Result<()> {
///     let store = Arc::new(MemoryStore::new());
///     let playlist = store.create_container()?;
///     let maintainer = OrderMaintainer::new(store.clone());
///
///     let first = maintainer.append(&playlist, ItemId::new()).await?;
///     assert_eq!(first.as_str(), "a");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    containers: Arc<RwLock<HashMap<ContainerId, Arc<Mutex<ContainerState>>>>>,
}

#[derive(Debug, Clone, Default)]
struct ContainerState {
    items: BTreeMap<ItemId, ItemRef>,
    /// Inserted items in commit order.
    journal: Vec<ItemId>,
    /// Makes every `write_key` fail; lets tests exercise rollback paths.
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_container(&self) -> Result<ContainerId> {
        let id = ContainerId::new();
        self.create_container_with_id(id)?;
        Ok(id)
    }

    pub fn create_container_with_id(&self, id: ContainerId) -> Result<()> {
        let mut containers = self
            .containers
            .write()
            .map_err(|_| OrderError::persistence("memory store lock poisoned"))?;
        containers.entry(id).or_default();
        Ok(())
    }

    fn container(&self, id: &ContainerId) -> Result<Arc<Mutex<ContainerState>>> {
        let containers = self
            .containers
            .read()
            .map_err(|_| OrderError::persistence("memory store lock poisoned"))?;
        containers
            .get(id)
            .cloned()
            .ok_or(OrderError::ContainerNotFound(*id))
    }

    /// Insert a row as-is, bypassing the maintainer (e.g. legacy rows without a key).
    pub async fn insert_raw(
        &self,
        container: &ContainerId,
        item: ItemId,
        key: Option<OrderKey>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let state = self.container(container)?;
        let mut state = state.lock().await;
        if state.items.contains_key(&item) {
            return Err(OrderError::DuplicateItem {
                container: *container,
                item,
            });
        }
        state
            .items
            .insert(item, ItemRef::new(*container, item, key, created_at));
        state.journal.push(item);
        Ok(())
    }

    /// Committed items in display order.
    pub async fn snapshot(&self, container: &ContainerId) -> Result<Vec<ItemRef>> {
        let state = self.container(container)?;
        let state = state.lock().await;
        Ok(in_display_order(&state.items))
    }

    /// Items inserted into `container`, in the order their transactions committed.
    pub async fn journal(&self, container: &ContainerId) -> Result<Vec<ItemId>> {
        let state = self.container(container)?;
        let state = state.lock().await;
        Ok(state.journal.clone())
    }

    pub async fn set_fail_writes(&self, container: &ContainerId, fail: bool) -> Result<()> {
        let state = self.container(container)?;
        state.lock().await.fail_writes = fail;
        Ok(())
    }
}

fn in_display_order(items: &BTreeMap<ItemId, ItemRef>) -> Vec<ItemRef> {
    let mut items: Vec<ItemRef> = items.values().cloned().collect();
    items.sort_by(ItemRef::display_cmp);
    items
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin(&self, container: &ContainerId) -> Result<Box<dyn OrderTransaction>> {
        let guard = self.container(container)?.lock_owned().await;
        let staged = guard.clone();

        Ok(Box::new(MemoryTransaction {
            container: *container,
            guard,
            staged,
        }))
    }

    async fn containers_missing_keys(&self) -> Result<Vec<ContainerId>> {
        let containers: Vec<(ContainerId, Arc<Mutex<ContainerState>>)> = {
            let containers = self
                .containers
                .read()
                .map_err(|_| OrderError::persistence("memory store lock poisoned"))?;
            containers
                .iter()
                .map(|(id, state)| (*id, state.clone()))
                .collect()
        };

        let mut missing = Vec::new();
        for (id, state) in containers {
            if state.lock().await.items.values().any(ItemRef::is_unassigned) {
                missing.push(id);
            }
        }
        missing.sort();
        Ok(missing)
    }
}

struct MemoryTransaction {
    container: ContainerId,
    guard: OwnedMutexGuard<ContainerState>,
    staged: ContainerState,
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    fn container(&self) -> &ContainerId {
        &self.container
    }

    async fn max_key(&mut self) -> Result<Option<OrderKey>> {
        Ok(self
            .staged
            .items
            .values()
            .filter_map(|item| item.key.as_ref())
            .max()
            .cloned())
    }

    async fn item(&mut self, item: &ItemId) -> Result<Option<ItemRef>> {
        Ok(self.staged.items.get(item).cloned())
    }

    async fn items_by_creation_time(&mut self) -> Result<Vec<ItemRef>> {
        let mut items: Vec<ItemRef> = self.staged.items.values().cloned().collect();
        items.sort_by(ItemRef::creation_cmp);
        Ok(items)
    }

    async fn items_in_order(&mut self) -> Result<Vec<ItemRef>> {
        Ok(in_display_order(&self.staged.items))
    }

    async fn insert_item(&mut self, item: &ItemRef) -> Result<()> {
        if self.staged.items.contains_key(&item.item) {
            return Err(OrderError::DuplicateItem {
                container: self.container,
                item: item.item,
            });
        }
        let mut item = item.clone();
        item.container = self.container;
        self.staged.journal.push(item.item);
        self.staged.items.insert(item.item, item);
        Ok(())
    }

    async fn write_key(&mut self, item: &ItemId, key: &OrderKey) -> Result<()> {
        if self.staged.fail_writes {
            return Err(OrderError::persistence(format!(
                "write rejected for item {item} in container {}",
                self.container
            )));
        }
        let entry = self
            .staged
            .items
            .get_mut(item)
            .ok_or(OrderError::ItemNotFound {
                container: self.container,
                item: *item,
            })?;
        entry.key = Some(key.clone());
        Ok(())
    }

    async fn remove_item(&mut self, item: &ItemId) -> Result<bool> {
        Ok(self.staged.items.remove(item).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> OrderKey {
        OrderKey::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_begin_unknown_container() {
        let store = MemoryStore::new();
        let missing = ContainerId::new();

        let result = store.begin(&missing).await;
        assert!(matches!(result, Err(OrderError::ContainerNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let container = store.create_container().unwrap();
        let item = ItemId::new();

        {
            let mut tx = store.begin(&container).await.unwrap();
            tx.insert_item(&ItemRef::new(container, item, Some(key("a")), Utc::now()))
                .await
                .unwrap();
        }

        assert!(store.snapshot(&container).await.unwrap().is_empty());
        assert!(store.journal(&container).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let container = store.create_container().unwrap();
        let item = ItemId::new();

        let mut tx = store.begin(&container).await.unwrap();
        tx.insert_item(&ItemRef::new(container, item, Some(key("a")), Utc::now()))
            .await
            .unwrap();
        tx.write_key(&item, &key("b")).await.unwrap();
        assert_eq!(tx.max_key().await.unwrap(), Some(key("b")));
        tx.commit().await.unwrap();

        let items = store.snapshot(&container).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, Some(key("b")));
        assert_eq!(store.journal(&container).await.unwrap(), vec![item]);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_items() {
        let store = MemoryStore::new();
        let container = store.create_container().unwrap();
        let item = ItemId::new();
        store.insert_raw(&container, item, None, Utc::now()).await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        let dup = tx
            .insert_item(&ItemRef::new(container, item, None, Utc::now()))
            .await;
        assert!(matches!(dup, Err(OrderError::DuplicateItem { .. })));

        let missing = tx.write_key(&ItemId::new(), &key("a")).await;
        assert!(matches!(missing, Err(OrderError::ItemNotFound { .. })));

        assert!(tx.remove_item(&item).await.unwrap());
        assert!(!tx.remove_item(&item).await.unwrap());
    }

    #[tokio::test]
    async fn test_containers_missing_keys() {
        let store = MemoryStore::new();
        let keyed = store.create_container().unwrap();
        let legacy = store.create_container().unwrap();
        let _empty = store.create_container().unwrap();

        store
            .insert_raw(&keyed, ItemId::new(), Some(key("a")), Utc::now())
            .await
            .unwrap();
        store
            .insert_raw(&legacy, ItemId::new(), None, Utc::now())
            .await
            .unwrap();

        assert_eq!(store.containers_missing_keys().await.unwrap(), vec![legacy]);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        let container = store.create_container().unwrap();
        let item = ItemId::new();
        store.insert_raw(&container, item, None, Utc::now()).await.unwrap();
        store.set_fail_writes(&container, true).await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        let result = tx.write_key(&item, &key("a")).await;
        assert!(matches!(result, Err(OrderError::Persistence(_))));
    }
}
