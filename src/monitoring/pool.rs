//! Upstream address to backend pool resolution
//!
//! The proxy writes every upstream it tried for a request into one field,
//! e.g. `"172.18.0.3:3000, 172.18.0.2:3000"`. Earlier entries are failed
//! attempts; the last entry is the backend that actually served the request.

use std::fmt;

/// Placeholder the proxy writes when a field has no value
pub const PLACEHOLDER: &str = "-";

/// Backend pool identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    Blue,
    Green,
    Unknown,
}

impl Pool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Blue => "blue",
            Pool::Green => "green",
            Pool::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Pool::Unknown)
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered pattern table mapping upstream tokens to pools
///
/// A token matches an entry when it contains the entry's pattern, so both
/// symbolic names (`app_blue`) and address prefixes (`172.18.0.3:`) work.
#[derive(Debug, Clone, Default)]
pub struct PoolTable {
    entries: Vec<(String, Pool)>,
}

impl PoolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from blue and green pattern lists; blue entries are checked first
    pub fn from_matchers(blue: &[String], green: &[String]) -> Self {
        let mut table = Self::new();
        for pattern in blue {
            table = table.with_entry(pattern.clone(), Pool::Blue);
        }
        for pattern in green {
            table = table.with_entry(pattern.clone(), Pool::Green);
        }
        table
    }

    /// Add a pattern. Patterns mapping to `Unknown` are ignored.
    pub fn with_entry(mut self, pattern: impl Into<String>, pool: Pool) -> Self {
        let pattern = pattern.into();
        if pool.is_known() && !pattern.is_empty() {
            self.entries.push((pattern, pool));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the pool that served a request from its raw upstream field
    pub fn resolve(&self, upstream: &str) -> Pool {
        match authoritative_upstream(upstream) {
            Some(token) => self.classify(token),
            None => Pool::Unknown,
        }
    }

    fn classify(&self, token: &str) -> Pool {
        self.entries
            .iter()
            .find(|(pattern, _)| token.contains(pattern.as_str()))
            .map(|(_, pool)| *pool)
            .unwrap_or(Pool::Unknown)
    }
}

/// Last comma-separated token of the upstream field, or `None` for an empty/placeholder field
pub fn authoritative_upstream(upstream: &str) -> Option<&str> {
    let trimmed = upstream.trim();
    if trimmed.is_empty() || trimmed == PLACEHOLDER {
        return None;
    }
    trimmed.rsplit(',').next().map(str::trim)
}

/// A comma in the raw field means the proxy retried against another upstream
pub fn is_failover_attempt(upstream: &str) -> bool {
    upstream.contains(',')
}
