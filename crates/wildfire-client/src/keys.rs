//! API key rotation state
//!
//! Ordered key list with a round-robin cursor. Keys are only removed, never
//! added, at runtime: a 419 moves the cursor on (the key is still valid, just
//! out of quota), a 401 removes the key permanently. An empty pool means the
//! connector has no way to reach the service at all.

use common::Secret;
use detonation::{AnalysisError, Result};
use tracing::{info, warn};

pub struct CredentialPool {
    keys: Vec<Secret<String>>,
    cursor: usize,
}

impl CredentialPool {
    pub fn new(keys: Vec<Secret<String>>) -> Self {
        Self { keys, cursor: 0 }
    }

    /// Convenience for plain-string keys (tests, env-sourced lists).
    pub fn from_plain(keys: Vec<String>) -> Self {
        Self::new(keys.into_iter().map(Secret::new).collect())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key the next request should carry.
    pub fn current(&self) -> Result<&str> {
        self.keys
            .get(self.cursor)
            .map(|k| k.expose().as_str())
            .ok_or(AnalysisError::CredentialsExhausted)
    }

    /// Move to the next key after a per-key quota rejection. Returns true
    /// when the cursor wrapped back to the first key, i.e. every key has now
    /// been tried once in this rotation round.
    pub fn advance(&mut self) -> bool {
        if self.keys.is_empty() {
            return false;
        }
        info!(key_index = self.cursor, "API key out of quota, rotating");
        self.cursor = (self.cursor + 1) % self.keys.len();
        self.cursor == 0
    }

    /// Drop the current key permanently after an authorization failure.
    /// Errors when this leaves the pool empty: no valid configuration
    /// remains to retry with.
    pub fn invalidate_current(&mut self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(AnalysisError::CredentialsExhausted);
        }
        warn!(
            key_index = self.cursor,
            remaining = self.keys.len() - 1,
            "discarding rejected API key"
        );
        self.keys.remove(self.cursor);
        if self.keys.is_empty() {
            return Err(AnalysisError::CredentialsExhausted);
        }
        if self.cursor >= self.keys.len() {
            self.cursor = 0;
        }
        Ok(())
    }
}
