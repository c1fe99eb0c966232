//! Shared value objects

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call identifier
///
/// Rendered as `<unix nanos>-<random>`: the time component keeps identifiers
/// ordered across a process lifetime, the random suffix separates calls that
/// arrive within the same clock tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let suffix: u32 = rand::thread_rng().gen_range(0..100_000);
        Self(format!("{}-{}", nanos, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
