pub mod backfill;
pub mod config;
pub mod maintainer;
pub mod rebalance;
pub mod storage;
pub mod telemetry;

pub use backfill::BackfillReport;
pub use config::{DatabaseConfig, NeighborPolicy, OrderConfig, MAX_KEY_LENGTH};
pub use maintainer::OrderMaintainer;
pub use storage::{MemoryStore, SqliteStore};

pub use playlist_order_core::{
    ContainerId, ItemId, ItemRef, KeyError, OrderError, OrderKey, OrderStore, OrderTransaction,
};
