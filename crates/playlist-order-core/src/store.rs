//! Persistence capabilities the order maintainer relies on
//!
//! A store hands out transactions scoped to one container. Everything the
//! maintainer reads and writes for a single operation goes through one
//! transaction, which is what keeps concurrent appends from computing the same
//! key: the store must serialize transactions on the same container (a
//! per-container lock, a database write lock, ...). Transactions on different
//! containers never need to coordinate.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ContainerId, ItemId, ItemRef, OrderKey};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Open a transaction on `container`.
    ///
    /// Fails with [`crate::OrderError::ContainerNotFound`] for unknown containers.
    async fn begin(&self, container: &ContainerId) -> Result<Box<dyn OrderTransaction>>;

    /// Containers holding at least one item without a key.
    async fn containers_missing_keys(&self) -> Result<Vec<ContainerId>>;
}

/// Reads and writes against one container, applied atomically on [`commit`].
///
/// Dropping a transaction without committing discards its writes.
///
/// [`commit`]: OrderTransaction::commit
#[async_trait]
pub trait OrderTransaction: Send {
    fn container(&self) -> &ContainerId;

    /// Largest assigned key in the container.
    async fn max_key(&mut self) -> Result<Option<OrderKey>>;

    async fn item(&mut self, item: &ItemId) -> Result<Option<ItemRef>>;

    /// All items, oldest first.
    async fn items_by_creation_time(&mut self) -> Result<Vec<ItemRef>>;

    /// All items in display order (see [`ItemRef::display_cmp`]).
    async fn items_in_order(&mut self) -> Result<Vec<ItemRef>>;

    /// Fails with [`crate::OrderError::DuplicateItem`] if the item is already present.
    async fn insert_item(&mut self, item: &ItemRef) -> Result<()>;

    /// Fails with [`crate::OrderError::ItemNotFound`] if the item is absent.
    async fn write_key(&mut self, item: &ItemId, key: &OrderKey) -> Result<()>;

    /// Returns whether the item existed.
    async fn remove_item(&mut self, item: &ItemId) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
