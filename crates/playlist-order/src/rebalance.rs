//! Compacting a container's keys
//!
//! Repeated inserts between the same neighbours make keys longer with every
//! step. Rebalancing hands out fresh, evenly spaced keys of minimal length in
//! the current display order, so readers observe exactly the same order
//! afterwards.

use std::collections::BTreeMap;

use playlist_order_core::key_space::evenly_spaced;
use playlist_order_core::{ContainerId, ItemId, OrderKey, OrderTransaction, Result};

use crate::maintainer::OrderMaintainer;

impl OrderMaintainer {
    /// Recompute every key of `container` in one transaction.
    ///
    /// Returns the key of every item afterwards, changed or not.
    pub async fn rebalance(&self, container: &ContainerId) -> Result<BTreeMap<ItemId, OrderKey>> {
        let mut tx = self.store().begin(container).await?;
        let assigned = rebalance_in(tx.as_mut()).await?;
        tx.commit().await?;

        tracing::info!(%container, items = assigned.len(), "Rebalanced container");
        Ok(assigned)
    }
}

/// Rebalance within an already open transaction. Only changed keys are written.
pub(crate) async fn rebalance_in(
    tx: &mut dyn OrderTransaction,
) -> Result<BTreeMap<ItemId, OrderKey>> {
    let items = tx.items_in_order().await?;
    let keys = evenly_spaced(items.len());

    let mut assigned = BTreeMap::new();
    let mut written = 0usize;
    for (item, key) in items.iter().zip(keys) {
        if item.key.as_ref() != Some(&key) {
            tx.write_key(&item.item, &key).await?;
            written += 1;
        }
        assigned.insert(item.item, key);
    }

    tracing::debug!(
        container = %tx.container(),
        items = items.len(),
        written,
        "Computed rebalanced keys"
    );
    Ok(assigned)
}
