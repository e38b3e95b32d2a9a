use thiserror::Error;

use crate::types::{ContainerId, ItemId};

/// Errors produced while validating or computing order keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Order key must not be empty")]
    Empty,

    #[error("Order key {key:?} contains symbol {symbol:?} outside the key alphabet")]
    InvalidSymbol { key: String, symbol: char },

    /// The left neighbour does not sort strictly before the right one.
    #[error("Neighbour keys out of order: {left:?} must sort before {right:?}")]
    InvalidNeighborOrder { left: String, right: String },

    /// No key exists strictly between the two neighbours (e.g. `a` and `a0`).
    #[error("No key fits between {left:?} and {right:?}")]
    NoRoom { left: Option<String>, right: String },
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Container not found: {0}")]
    ContainerNotFound(ContainerId),

    #[error("Item {item} not found in container {container}")]
    ItemNotFound { container: ContainerId, item: ItemId },

    /// A neighbour key passed by the caller is held by no item of the container.
    #[error("No item in container {container} holds neighbour key {key:?}")]
    UnknownNeighborKey { container: ContainerId, key: String },

    #[error("Item {item} already belongs to container {container}")]
    DuplicateItem { container: ContainerId, item: ItemId },

    /// Failure reported by the persistence collaborator, passed through verbatim.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl OrderError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        OrderError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
