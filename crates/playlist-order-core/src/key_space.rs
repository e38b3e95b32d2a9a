//! Fractional index keys for playlist ordering
//!
//! Keys are strings over a fixed 62-symbol alphabet whose byte order matches
//! the alphabet order, so a plain string comparison sorts items. New keys are
//! computed from their neighbours only; nothing here touches storage.
//!
//! Two symbols have a fixed role:
//! - `0` (the minimum) is never the last symbol of a generated key. A key
//!   ending in `0` leaves no room below it (nothing sorts between `a` and
//!   `a0`), so growth appends `1` instead.
//! - `V` (index 31) is the filler appended when two neighbours are adjacent.
//!
//! Changing the alphabet breaks the ordering of every key already persisted.

use crate::error::KeyError;
use crate::types::OrderKey;

/// Key symbols in ascending byte order.
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Key handed to the first item of an empty container.
pub const FIRST_KEY: &str = "a";

/// Symbol appended when two neighbours leave no gap at their first difference.
pub const FILLER: u8 = b'V';

const MIN: usize = 0;
const MAX: usize = ALPHABET.len() - 1;
const GROWTH: u8 = b'1';

/// Position of `symbol` in [`ALPHABET`].
pub fn symbol_index(symbol: u8) -> Option<usize> {
    match symbol {
        b'0'..=b'9' => Some((symbol - b'0') as usize),
        b'A'..=b'Z' => Some((symbol - b'A') as usize + 10),
        b'a'..=b'z' => Some((symbol - b'a') as usize + 36),
        _ => None,
    }
}

// OrderKey validates its symbols on construction.
fn index_of(symbol: u8) -> usize {
    symbol_index(symbol).unwrap_or(MIN)
}

fn symbol(index: usize) -> u8 {
    ALPHABET[index]
}

pub fn first_key() -> OrderKey {
    OrderKey::from_symbols(FIRST_KEY.as_bytes().to_vec())
}

/// Key sorting directly after `prev` in an append sequence.
///
/// Increments the last symbol; once it is already `z` the key grows by one
/// symbol. Keys of long append-only containers therefore get longer over time,
/// which [`evenly_spaced`] undoes on rebalance.
pub fn next_key(prev: &OrderKey) -> OrderKey {
    let mut symbols = prev.as_bytes().to_vec();
    let last = symbols.len() - 1;
    let idx = index_of(symbols[last]);

    if idx == MAX {
        symbols.push(GROWTH);
    } else {
        symbols[last] = symbol(idx + 1);
    }

    OrderKey::from_symbols(symbols)
}

/// Key strictly between `prev` and `next`; `None` bounds are open.
///
/// Never fails. Out-of-order neighbours (`prev >= next`) are treated as
/// "insert after `prev`" and yield `next_key(prev)`, which does not sort before
/// `next`. Use [`try_key_between`] to detect that case.
pub fn key_between(prev: Option<&OrderKey>, next: Option<&OrderKey>) -> OrderKey {
    match try_key_between(prev, next) {
        Ok(key) => key,
        Err(_) => match prev {
            Some(prev) => next_key(prev),
            None => first_key(),
        },
    }
}

/// Strict variant of [`key_between`].
///
/// # Errors
/// - [`KeyError::InvalidNeighborOrder`] if `prev >= next`
/// - [`KeyError::NoRoom`] if `next` is `prev` followed only by `0` symbols
pub fn try_key_between(
    prev: Option<&OrderKey>,
    next: Option<&OrderKey>,
) -> Result<OrderKey, KeyError> {
    match (prev, next) {
        (None, None) => Ok(first_key()),
        (Some(prev), None) => Ok(next_key(prev)),
        (None, Some(next)) => below(&[], next.as_bytes()).ok_or_else(|| KeyError::NoRoom {
            left: None,
            right: next.to_string(),
        }),
        (Some(prev), Some(next)) if prev >= next => Err(KeyError::InvalidNeighborOrder {
            left: prev.to_string(),
            right: next.to_string(),
        }),
        (Some(prev), Some(next)) => {
            midpoint(prev.as_bytes(), next.as_bytes()).ok_or_else(|| KeyError::NoRoom {
                left: Some(prev.to_string()),
                right: next.to_string(),
            })
        }
    }
}

// Requires prev < next.
fn midpoint(prev: &[u8], next: &[u8]) -> Option<OrderKey> {
    let shared = prev
        .iter()
        .zip(next)
        .take_while(|(a, b)| a == b)
        .count();

    if shared == prev.len() {
        return below(prev, &next[shared..]);
    }

    let low = index_of(prev[shared]);
    let high = index_of(next[shared]);

    let symbols = if high - low > 1 {
        let mut symbols = prev[..shared].to_vec();
        symbols.push(symbol((low + high) / 2));
        symbols
    } else {
        let mut symbols = prev.to_vec();
        symbols.push(FILLER);
        symbols
    };

    Some(OrderKey::from_symbols(symbols))
}

/// Shortest extension of `prefix` that sorts before `prefix + rest`.
fn below(prefix: &[u8], rest: &[u8]) -> Option<OrderKey> {
    let mut symbols = prefix.to_vec();

    for &sym in rest {
        match index_of(sym) {
            idx if idx > 1 => {
                symbols.push(symbol(idx / 2));
                return Some(OrderKey::from_symbols(symbols));
            }
            1 => {
                symbols.push(symbol(MIN));
                symbols.push(FILLER);
                return Some(OrderKey::from_symbols(symbols));
            }
            _ => symbols.push(sym),
        }
    }

    None
}

/// `count` increasing keys spread evenly over the shortest key length able to
/// hold them.
///
/// Used for rebalancing a container to undo key growth.
pub fn evenly_spaced(count: usize) -> Vec<OrderKey> {
    if count == 0 {
        return Vec::new();
    }

    let base = ALPHABET.len() as u128;
    let slots = count as u128 + 1;
    let mut width = 1;
    let mut span = base;
    while span < slots {
        width += 1;
        span *= base;
    }

    (1..=count as u128)
        .map(|i| encode(i * span / slots, width))
        .collect()
}

// Fixed-width base-62 digits with trailing `0`s stripped; stripping keeps the
// order between distinct values.
fn encode(mut value: u128, width: usize) -> OrderKey {
    let base = ALPHABET.len() as u128;
    let mut symbols = vec![symbol(MIN); width];
    for slot in symbols.iter_mut().rev() {
        *slot = symbol((value % base) as usize);
        value /= base;
    }
    while symbols.last() == Some(&symbol(MIN)) {
        symbols.pop();
    }
    OrderKey::from_symbols(symbols)
}
