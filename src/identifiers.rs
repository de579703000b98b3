//! Type-safe identifier wrappers.
//!
//! Newtypes keep correlation ids, transport handler tokens and state
//! subscription tokens from being mixed up.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of every generated correlation id.
const REQUEST_ID_PREFIX: &str = "req";

/// Number of random base-36 characters in a correlation id.
const REQUEST_ID_RANDOM_LEN: usize = 9;

/// Base-36 alphabet.
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// RequestId
// ============================================================================

/// Correlation id attached to an outbound request and echoed in its response.
///
/// Format: `req_<unix millis>_<9 random base-36 chars>`. Ids only need to be
/// unique among concurrently pending requests, so they are not
/// cryptographically strong.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh correlation id.
    #[must_use]
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        let mut random = Uuid::new_v4().as_u128();
        let mut suffix = String::with_capacity(REQUEST_ID_RANDOM_LEN);
        for _ in 0..REQUEST_ID_RANDOM_LEN {
            suffix.push(char::from(BASE36[(random % 36) as usize]));
            random /= 36;
        }

        Self(format!("{REQUEST_ID_PREFIX}_{millis}_{suffix}"))
    }

    /// Wraps an id received from the wire.
    #[inline]
    #[must_use]
    pub fn from_wire(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// HandlerId
// ============================================================================

/// Token returned by [`Transport::on`](crate::transport::Transport::on).
///
/// Passed back to `off` to remove exactly that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocates the next process-unique handler id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifies one `subscribe` registration on a state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a subscription id from a raw counter value.
    #[inline]
    #[must_use]
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;

    #[test]
    fn test_request_id_format() {
        let id = RequestId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), REQUEST_ID_RANDOM_LEN);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_request_id_burst_is_mostly_unique() {
        let ids: FxHashSet<RequestId> = (0..100).map(|_| RequestId::generate()).collect();
        assert!(ids.len() >= 90, "only {} distinct ids", ids.len());
    }

    #[test]
    fn test_request_id_serde_transparent() {
        let id = RequestId::from_wire("req_1_abc");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"req_1_abc\"");

        let back: RequestId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_handler_ids_increase() {
        let a = HandlerId::next();
        let b = HandlerId::next();
        assert_ne!(a, b);
    }
}
