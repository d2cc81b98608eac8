//! Composite cache keys.
//!
//! Keys render as `<source>:<entity>:<id>:<subkey>:<kind>`. Each component
//! escapes `%` and `:`, so two different component tuples can never render
//! to the same string.

use std::fmt;

/// A five-part cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: String,
    pub entity: String,
    pub id: String,
    pub subkey: String,
    pub kind: String,
}

impl CacheKey {
    pub fn new(
        source: impl Into<String>,
        entity: impl Into<String>,
        id: impl Into<String>,
        subkey: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            entity: entity.into(),
            id: id.into(),
            subkey: subkey.into(),
            kind: kind.into(),
        }
    }
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace(':', "%3A")
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            escape(&self.source),
            escape(&self.entity),
            escape(&self.id),
            escape(&self.subkey),
            escape(&self.kind)
        )
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}
