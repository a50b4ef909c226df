//! Rendering defaults.

use serde::Deserialize;

/// Limit used when pagination is missing or not a non-negative number.
pub const DEFAULT_LIMIT: i64 = 20;

/// Offset used when pagination is missing or not a non-negative number.
pub const DEFAULT_OFFSET: i64 = 0;

/// Configuration for pagination rendering.
///
/// Can be deserialized from application config, e.g.
/// `{"default_limit": 50, "max_limit": 500}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: i64,
    pub default_offset: i64,
    /// Upper bound applied to caller-supplied limits.
    pub max_limit: Option<i64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            default_offset: DEFAULT_OFFSET,
            max_limit: None,
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn default_offset(mut self, offset: i64) -> Self {
        self.default_offset = offset;
        self
    }

    pub fn max_limit(mut self, max: i64) -> Self {
        self.max_limit = Some(max);
        self
    }

    /// Clamp a limit to `max_limit`, if set.
    pub(crate) fn clamp_limit(&self, limit: i64) -> i64 {
        match self.max_limit {
            Some(max) => limit.min(max),
            None => limit,
        }
    }
}
