//! Generations: the version tag that names the current stores.

use std::fmt;

/// The logical job of a store within one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreRole {
    /// Precached manifest, placeholder image, and stale-while-revalidate documents.
    Primary,
    /// Network-first API responses.
    Api,
    /// Cache-first assets fetched on demand.
    Asset,
}

impl StoreRole {
    /// Every role, in the order stores are consulted on fallback lookups.
    pub const ALL: [StoreRole; 3] = [StoreRole::Primary, StoreRole::Api, StoreRole::Asset];

    fn prefix(self) -> &'static str {
        match self {
            Self::Primary => "photographer-portfolio",
            Self::Api => "api-cache",
            Self::Asset => "assets-cache",
        }
    }
}

/// The deploy version tag that decides which stores are current.
///
/// Each role gets exactly one current store name, `<role-prefix>-<tag>`.
/// Any other store name is stale once this generation activates.
///
/// # Examples
///
/// ```
/// use folio_cache::cache::{Generation, StoreRole};
///
/// let current = Generation::new("v1.1.0");
/// assert_eq!(current.store_name(StoreRole::Primary), "photographer-portfolio-v1.1.0");
/// assert_eq!(current.store_name(StoreRole::Api), "api-cache-v1.1.0");
/// assert!(current.is_current("assets-cache-v1.1.0"));
/// assert!(!current.is_current("assets-cache-v1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation {
    tag: String,
}

impl Generation {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the current store name for `role`.
    pub fn store_name(&self, role: StoreRole) -> String {
        format!("{}-{}", role.prefix(), self.tag)
    }

    /// Returns the names of all stores this generation protects from pruning.
    pub fn store_names(&self) -> [String; 3] {
        StoreRole::ALL.map(|role| self.store_name(role))
    }

    /// Returns `true` if `name` is one of this generation's store names.
    pub fn is_current(&self, name: &str) -> bool {
        self.store_names().iter().any(|current| current == name)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_distinct_per_role() {
        let names = Generation::new("v2").store_names();
        assert_eq!(
            names,
            ["photographer-portfolio-v2", "api-cache-v2", "assets-cache-v2"]
        );
    }

    #[test]
    fn other_tags_are_not_current() {
        let current = Generation::new("v2");
        assert!(!current.is_current("photographer-portfolio-v1.1.0"));
        assert!(!current.is_current("v2"));
        assert!(current.is_current("api-cache-v2"));
    }
}
