//! Order keys for playlists
//!
//! This crate holds the storage-independent half of playlist ordering:
//! - `key_space`: pure fractional-index key computation
//! - `types`: container/item ids, `OrderKey` and `ItemRef`
//! - `store`: the transactional persistence traits the maintainer runs against

pub mod error;
pub mod key_space;
pub mod store;
pub mod types;

pub use error::{KeyError, OrderError, Result};
pub use key_space::{evenly_spaced, first_key, key_between, next_key, try_key_between};
pub use store::{OrderStore, OrderTransaction};
pub use types::{ContainerId, ItemId, ItemRef, OrderKey};
