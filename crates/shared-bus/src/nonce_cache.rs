//! # Time-Bounded Nonce Cache
//!
//! Replay protection for messages received over the network. Every
//! [`AddressedMessage`] id is a fresh UUID, so it doubles as a nonce.
//!
//! ## Rules
//!
//! - The message timestamp must lie within `now - 60s ..= now + 10s`
//! - An id seen inside the validity window is a replay
//! - Ids are garbage-collected once the validity window has passed, which
//!   bounds memory while still catching every replay the timestamp check
//!   would let through

use shared_types::AddressedMessage;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Errors from nonce cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NonceError {
    /// The nonce has already been used.
    #[error("Nonce {nonce} has already been used (replay)")]
    NonceReused { nonce: Uuid },

    /// The message timestamp is too old.
    #[error("Message timestamp {timestamp} is too old (threshold: {threshold})")]
    MessageTooOld { timestamp: u64, threshold: u64 },

    /// The message timestamp is in the future.
    #[error("Message timestamp {timestamp} is in the future (threshold: {threshold})")]
    MessageFromFuture { timestamp: u64, threshold: u64 },
}

/// Time-bounded cache for replay prevention.
///
/// One instance per connection: ids only need to be unique per sender.
pub struct TimeBoundedNonceCache {
    /// Map of nonce -> message timestamp.
    cache: HashMap<Uuid, u64>,

    /// Nonce validity window in seconds.
    validity_window_secs: u64,

    /// Last garbage collection timestamp.
    last_gc: u64,

    /// Garbage collection interval in seconds.
    gc_interval_secs: u64,
}

impl TimeBoundedNonceCache {
    /// Default validity window: 2x the 60s message window.
    pub const DEFAULT_VALIDITY_WINDOW: u64 = 120;

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: u64 = 10;

    /// Maximum past age for valid timestamps.
    pub const MAX_AGE: u64 = 60;

    /// Maximum future skew for valid timestamps.
    pub const MAX_FUTURE_SKEW: u64 = 10;

    /// Create a new nonce cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_VALIDITY_WINDOW, Self::DEFAULT_GC_INTERVAL)
    }

    /// Create a nonce cache with custom settings.
    #[must_use]
    pub fn with_config(validity_window_secs: u64, gc_interval_secs: u64) -> Self {
        Self {
            cache: HashMap::new(),
            validity_window_secs,
            last_gc: Self::current_timestamp(),
            gc_interval_secs,
        }
    }

    /// Check a received message: its id is the nonce, its body timestamp the time.
    pub fn check_message(&mut self, message: &AddressedMessage) -> Result<(), NonceError> {
        self.validate_and_add(message.id, message.message.timestamp)
    }

    /// Validate timestamp and check/add nonce atomically.
    ///
    /// The timestamp check runs first so that everything after it is bounded
    /// by the window.
    pub fn validate_and_add(&mut self, nonce: Uuid, timestamp: u64) -> Result<(), NonceError> {
        let now = Self::current_timestamp();

        let min_valid_timestamp = now.saturating_sub(Self::MAX_AGE);
        let max_valid_timestamp = now.saturating_add(Self::MAX_FUTURE_SKEW);

        if timestamp < min_valid_timestamp {
            return Err(NonceError::MessageTooOld {
                timestamp,
                threshold: min_valid_timestamp,
            });
        }

        if timestamp > max_valid_timestamp {
            return Err(NonceError::MessageFromFuture {
                timestamp,
                threshold: max_valid_timestamp,
            });
        }

        if now.saturating_sub(self.last_gc) > self.gc_interval_secs {
            self.garbage_collect(now);
            self.last_gc = now;
        }

        if self.cache.contains_key(&nonce) {
            return Err(NonceError::NonceReused { nonce });
        }

        self.cache.insert(nonce, timestamp);
        Ok(())
    }

    /// Check if a nonce exists without adding it.
    #[must_use]
    pub fn contains(&self, nonce: &Uuid) -> bool {
        self.cache.contains_key(nonce)
    }

    /// Get the number of cached nonces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn garbage_collect(&mut self, now: u64) {
        let expiry_threshold = now.saturating_sub(self.validity_window_secs);
        self.cache.retain(|_, &mut ts| ts > expiry_threshold);
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl Default for TimeBoundedNonceCache {
    fn default() -> Self {
        Self::new()
    }
}
