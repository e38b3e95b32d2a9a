//! Key assignment against a container's current key set
//!
//! Every public operation opens exactly one store transaction on the target
//! container, reads the neighbour keys it needs, writes, and commits. An error
//! at any step drops the transaction, which discards its writes, and is
//! returned unchanged. Nothing is retried here: a retry has to re-read the
//! neighbours, which only the caller can decide to do.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use playlist_order_core::key_space::{self, first_key, next_key};
use playlist_order_core::{
    ContainerId, ItemId, ItemRef, KeyError, OrderError, OrderKey, OrderStore, OrderTransaction,
    Result,
};

use crate::config::{NeighborPolicy, OrderConfig};
use crate::rebalance::rebalance_in;

pub struct OrderMaintainer {
    store: Arc<dyn OrderStore>,
    config: OrderConfig,
}

impl OrderMaintainer {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self::with_config(store, OrderConfig::default())
    }

    pub fn with_config(store: Arc<dyn OrderStore>, config: OrderConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Add `item` at the end of `container`.
    pub async fn append(&self, container: &ContainerId, item: ItemId) -> Result<OrderKey> {
        let mut tx = self.store.begin(container).await?;

        let key = match tx.max_key().await? {
            Some(max) => next_key(&max),
            None => first_key(),
        };
        tx.insert_item(&ItemRef::new(*container, item, Some(key.clone()), Utc::now()))
            .await?;
        tx.commit().await?;

        tracing::debug!(%container, %item, %key, "Appended item");
        Ok(key)
    }

    /// Add `item` between two neighbour keys.
    ///
    /// `left` and `right` should be adjacent in the container. Non-adjacent
    /// neighbours still yield a unique key inside `(left, right)`, just not
    /// necessarily next to either of them.
    ///
    /// When no key fits between them the container is rebalanced, which needs
    /// both neighbour keys to be held by items; a stale key then fails with
    /// [`OrderError::UnknownNeighborKey`].
    pub async fn insert_between(
        &self,
        container: &ContainerId,
        item: ItemId,
        left: Option<&OrderKey>,
        right: Option<&OrderKey>,
    ) -> Result<OrderKey> {
        let mut tx = self.store.begin(container).await?;

        let key = self.key_for_neighbors(tx.as_mut(), None, left, right).await?;
        tx.insert_item(&ItemRef::new(*container, item, Some(key.clone()), Utc::now()))
            .await?;
        tx.commit().await?;

        tracing::debug!(%container, %item, %key, "Inserted item between neighbours");
        Ok(key)
    }

    /// Reassign the key of an existing item so it sorts between two neighbour keys.
    ///
    /// Neighbour handling is the same as for [`Self::insert_between`].
    pub async fn move_between(
        &self,
        container: &ContainerId,
        item: &ItemId,
        left: Option<&OrderKey>,
        right: Option<&OrderKey>,
    ) -> Result<OrderKey> {
        let mut tx = self.store.begin(container).await?;
        Self::require_item(tx.as_mut(), item).await?;

        let key = self
            .key_for_neighbors(tx.as_mut(), Some(item), left, right)
            .await?;
        tx.write_key(item, &key).await?;
        tx.commit().await?;

        tracing::debug!(%container, %item, %key, "Moved item between neighbours");
        Ok(key)
    }

    /// Move an existing item directly after `after`, or to the front when `None`.
    ///
    /// Neighbour keys are read inside the transaction, so callers do not need
    /// to know them. If the new key grows past `max_key_length` and
    /// `auto_rebalance` is set, the container is rebalanced first.
    pub async fn move_after(
        &self,
        container: &ContainerId,
        item: &ItemId,
        after: Option<&ItemId>,
    ) -> Result<OrderKey> {
        let mut tx = self.store.begin(container).await?;
        let current = Self::require_item(tx.as_mut(), item).await?;

        // Moving after itself keeps the current slot.
        let after = match (after, current.key) {
            (Some(anchor), Some(key)) if anchor == item => return Ok(key),
            (Some(anchor), None) if anchor == item => None,
            (after, _) => after,
        };

        let (left, right) = Self::anchor_neighbors(tx.as_mut(), item, after).await?;
        let mut key = self
            .key_for_neighbors(tx.as_mut(), Some(item), left.as_ref(), right.as_ref())
            .await?;

        if key.len() > self.config.max_key_length && self.config.auto_rebalance {
            tracing::info!(
                %container,
                key_length = key.len(),
                max_key_length = self.config.max_key_length,
                "Order key too long, rebalancing container"
            );
            rebalance_in(tx.as_mut()).await?;
            let (left, right) = Self::anchor_neighbors(tx.as_mut(), item, after).await?;
            key = self
                .key_for_neighbors(tx.as_mut(), Some(item), left.as_ref(), right.as_ref())
                .await?;
        }

        tx.write_key(item, &key).await?;
        tx.commit().await?;

        tracing::debug!(%container, %item, %key, "Moved item after anchor");
        Ok(key)
    }

    /// Remove `item` from `container`. Neighbouring keys are left as they are.
    pub async fn remove(&self, container: &ContainerId, item: &ItemId) -> Result<bool> {
        let mut tx = self.store.begin(container).await?;
        let removed = tx.remove_item(item).await?;
        tx.commit().await?;

        tracing::debug!(%container, %item, removed, "Removed item");
        Ok(removed)
    }

    /// Items of `container` in display order.
    pub async fn ordered_items(&self, container: &ContainerId) -> Result<Vec<ItemRef>> {
        let mut tx = self.store.begin(container).await?;
        let items = tx.items_in_order().await?;
        tx.rollback().await?;
        Ok(items)
    }

    async fn require_item(tx: &mut dyn OrderTransaction, item: &ItemId) -> Result<ItemRef> {
        tx.item(item).await?.ok_or_else(|| OrderError::ItemNotFound {
            container: *tx.container(),
            item: *item,
        })
    }

    /// Keys around the slot directly after `after`, ignoring `item` itself.
    async fn anchor_neighbors(
        tx: &mut dyn OrderTransaction,
        item: &ItemId,
        after: Option<&ItemId>,
    ) -> Result<(Option<OrderKey>, Option<OrderKey>)> {
        let others: Vec<ItemRef> = tx
            .items_in_order()
            .await?
            .into_iter()
            .filter(|other| &other.item != item)
            .collect();

        match after {
            None => Ok((None, others.first().and_then(|first| first.key.clone()))),
            Some(anchor) => {
                let pos = others
                    .iter()
                    .position(|other| &other.item == anchor)
                    .ok_or_else(|| OrderError::ItemNotFound {
                        container: *tx.container(),
                        item: *anchor,
                    })?;
                let left = others[pos].key.clone();
                let right = others.get(pos + 1).and_then(|next| next.key.clone());
                Ok((left, right))
            }
        }
    }

    /// Compute a key in `(left, right)` that no other item of the container holds.
    ///
    /// `moving` is excluded from the collision check since its key is about to
    /// be replaced.
    async fn key_for_neighbors(
        &self,
        tx: &mut dyn OrderTransaction,
        moving: Option<&ItemId>,
        left: Option<&OrderKey>,
        right: Option<&OrderKey>,
    ) -> Result<OrderKey> {
        let (key, upper) = match key_space::try_key_between(left, right) {
            Ok(key) => (key, right.cloned()),
            Err(KeyError::InvalidNeighborOrder { left: l, right: r }) => {
                if self.config.neighbor_policy == NeighborPolicy::Strict {
                    return Err(KeyError::InvalidNeighborOrder { left: l, right: r }.into());
                }
                tracing::warn!(
                    container = %tx.container(),
                    left = %l,
                    right = %r,
                    "Neighbour keys out of order, placing item after left neighbour"
                );
                (key_space::key_between(left, right), None)
            }
            Err(KeyError::NoRoom { .. }) => {
                let (left, right) = Self::rebalanced_neighbors(tx, left, right).await?;
                let key = key_space::try_key_between(left.as_ref(), right.as_ref())?;
                (key, right)
            }
            Err(e) => return Err(e.into()),
        };

        let taken: BTreeSet<OrderKey> = tx
            .items_in_order()
            .await?
            .into_iter()
            .filter(|other| Some(&other.item) != moving)
            .filter_map(|other| other.key)
            .collect();

        dodge_collisions(&taken, key, upper.as_ref()).map_err(OrderError::from)
    }

    /// Rebalance the container and translate neighbour keys to their items' new keys.
    async fn rebalanced_neighbors(
        tx: &mut dyn OrderTransaction,
        left: Option<&OrderKey>,
        right: Option<&OrderKey>,
    ) -> Result<(Option<OrderKey>, Option<OrderKey>)> {
        let container = *tx.container();
        let items = tx.items_in_order().await?;
        let owner = |key: Option<&OrderKey>| -> Result<Option<ItemId>> {
            match key {
                None => Ok(None),
                Some(key) => items
                    .iter()
                    .find(|item| item.key.as_ref() == Some(key))
                    .map(|item| Some(item.item))
                    .ok_or_else(|| OrderError::UnknownNeighborKey {
                        container,
                        key: key.to_string(),
                    }),
            }
        };
        let left_item = owner(left)?;
        let right_item = owner(right)?;

        tracing::info!(container = %tx.container(), "No room between neighbours, rebalancing container");
        let assigned = rebalance_in(tx).await?;

        Ok((
            left_item.and_then(|id| assigned.get(&id).cloned()),
            right_item.and_then(|id| assigned.get(&id).cloned()),
        ))
    }
}

/// Step `key` forward inside `(key, upper)` until it is not in `taken`.
///
/// Every step yields a strictly larger key, so this ends after at most
/// `taken.len()` steps.
fn dodge_collisions(
    taken: &BTreeSet<OrderKey>,
    mut key: OrderKey,
    upper: Option<&OrderKey>,
) -> std::result::Result<OrderKey, KeyError> {
    while taken.contains(&key) {
        key = key_space::try_key_between(Some(&key), upper)?;
    }
    Ok(key)
}

#[cfg(test)]
#[path = "maintainer_tests.rs"]
mod tests;
