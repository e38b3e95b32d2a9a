//! Assigning keys to legacy items
//!
//! Items added before keyed ordering existed carry an empty key. Backfill
//! gives them sequential keys in creation order, appended after whatever the
//! container already has keyed. Items that already hold a key are never
//! touched, so running it again is a no-op.

use std::collections::BTreeMap;

use playlist_order_core::key_space::{first_key, next_key};
use playlist_order_core::{ContainerId, OrderError, OrderTransaction, Result};

use crate::maintainer::OrderMaintainer;

/// Outcome of [`OrderMaintainer::backfill_all`]
#[derive(Debug, Default)]
pub struct BackfillReport {
    /// Keys assigned per container that committed.
    pub assigned: BTreeMap<ContainerId, usize>,
    /// Containers whose transaction failed and was rolled back.
    pub failures: BTreeMap<ContainerId, OrderError>,
}

impl BackfillReport {
    pub fn total_assigned(&self) -> usize {
        self.assigned.values().sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl OrderMaintainer {
    /// Backfill one container in a single transaction; returns the number of keys assigned.
    pub async fn backfill(&self, container: &ContainerId) -> Result<usize> {
        let mut tx = self.store().begin(container).await?;
        let assigned = backfill_in(tx.as_mut()).await?;
        tx.commit().await?;

        if assigned > 0 {
            tracing::info!(%container, assigned, "Backfilled order keys");
        }
        Ok(assigned)
    }

    /// Backfill every container that has items without a key.
    ///
    /// A container that fails keeps its previous state and is listed in
    /// [`BackfillReport::failures`]; the remaining containers still run.
    /// Only failing to list the containers aborts the whole run.
    pub async fn backfill_all(&self) -> Result<BackfillReport> {
        let containers = self.store().containers_missing_keys().await?;
        let mut report = BackfillReport::default();

        if containers.is_empty() {
            return Ok(report);
        }

        tracing::info!(containers = containers.len(), "Backfilling order keys");

        for container in containers {
            match self.backfill(&container).await {
                Ok(assigned) => {
                    report.assigned.insert(container, assigned);
                }
                Err(e) => {
                    tracing::warn!(%container, error = %e, "Failed to backfill container");
                    report.failures.insert(container, e);
                }
            }
        }

        Ok(report)
    }
}

async fn backfill_in(tx: &mut dyn OrderTransaction) -> Result<usize> {
    let legacy: Vec<_> = tx
        .items_by_creation_time()
        .await?
        .into_iter()
        .filter(|item| item.is_unassigned())
        .collect();

    let mut current = tx.max_key().await?;
    for item in &legacy {
        let key = match &current {
            Some(prev) => next_key(prev),
            None => first_key(),
        };
        tx.write_key(&item.item, &key).await?;
        current = Some(key);
    }

    Ok(legacy.len())
}
