//! Connection id generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a client connection.
pub type ConnectionId = String;

/// Width of the counter suffix.
const SUFFIX_LEN: usize = 6;
/// Number of distinct suffixes (36^6); the counter wraps past it.
const SUFFIX_SPACE: u64 = 36u64.pow(SUFFIX_LEN as u32);

/// Hands out `<node_id><suffix>` ids, e.g. `E01000a3f`.
///
/// The suffix is the counter in lowercase base36, zero padded. Ids repeat
/// only after 36^6 connections on one node.
pub struct ConnectionIdGenerator {
    node_id: String,
    counter: AtomicU64,
}

impl ConnectionIdGenerator {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn next(&self) -> ConnectionId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) % SUFFIX_SPACE;
        let mut id = String::with_capacity(self.node_id.len() + SUFFIX_LEN);
        id.push_str(&self.node_id);
        id.push_str(&base36_suffix(n));
        id
    }
}

fn base36_suffix(mut n: u64) -> String {
    let mut digits = ['0'; SUFFIX_LEN];
    for slot in digits.iter_mut().rev() {
        // n % 36 < 36, always a valid digit
        *slot = char::from_digit((n % 36) as u32, 36).unwrap_or('0');
        n /= 36;
    }
    digits.iter().collect()
}
