//! Server-held master unlock key.
//!
//! The key never leaves the server; clients submit a candidate and learn
//! only whether it matched.

use std::fmt;

use crate::auth::constant_time_eq;
use crate::config::UnlockConfig;

#[derive(Clone, Default)]
pub struct UnlockKey {
    key: Option<String>,
}

impl fmt::Debug for UnlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockKey")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl UnlockKey {
    /// Blank keys count as unset.
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn from_config(config: &UnlockConfig) -> Self {
        Self::new(config.master_key.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Nothing matches an unconfigured key.
    pub fn validate(&self, candidate: &str) -> bool {
        match &self.key {
            Some(key) => constant_time_eq(key.as_bytes(), candidate.as_bytes()),
            None => false,
        }
    }
}
