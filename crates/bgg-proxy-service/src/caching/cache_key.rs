use std::fmt;
use std::sync::Arc;

/// The kinds of entities the proxy caches.
///
/// Each kind has its own key namespace, so identical identifiers of different kinds never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Thing,
    User,
}

impl AsRef<str> for EntityKind {
    fn as_ref(&self) -> &str {
        match self {
            Self::Thing => "thing",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The full, namespaced key of a cached entity: `<prefix>:<kind>:<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn new(prefix: &str, kind: EntityKind, identifier: impl fmt::Display) -> Self {
        let key = if prefix.is_empty() {
            format!("{kind}:{identifier}")
        } else {
            format!("{prefix}:{kind}:{identifier}")
        };
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn for_testing(key: &str) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
