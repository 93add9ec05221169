use serde::Serialize;
use std::hash::{Hash, Hasher};

/// Logical source of telemetry: a library or module name plus an optional
/// version. Used purely as a grouping key on export; never mutated after
/// creation. Equality and hashing consider the name only, ASCII
/// case-insensitively, matching how scopes are merged on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentationScope {
    name: String,
    version: Option<String>,
}

impl InstrumentationScope {
    /// Creates a scope with no version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Creates a scope with a version.
    pub fn with_version(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl PartialEq for InstrumentationScope {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for InstrumentationScope {}

impl Hash for InstrumentationScope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.name.len());
        for byte in self.name.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(scope: &InstrumentationScope) -> u64 {
        let mut hasher = DefaultHasher::new();
        scope.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_ignores_case_and_version() {
        let a = InstrumentationScope::new("My.Library");
        let b = InstrumentationScope::with_version("my.library", "1.2.3");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_names_differ() {
        let a = InstrumentationScope::new("alpha");
        let b = InstrumentationScope::new("beta");
        assert_ne!(a, b);
    }
}
