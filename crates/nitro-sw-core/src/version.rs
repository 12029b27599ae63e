//! Cache generations.
//!
//! The worker owns exactly two named caches, one for the application's own
//! static files and one for third-party CDN scripts. Each name carries a
//! generation suffix (`nitro-pwa-static-v7`). Bumping a generation is the
//! only way to force clients to re-download a category: the next
//! activation deletes every cache whose name is not in the registry, and the
//! next installation repopulates under the new name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_STATIC_VERSION: &str = "nitro-pwa-static-v7";
const DEFAULT_CDN_VERSION: &str = "nitro-pwa-cdn-v7";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRegistry {
    #[serde(rename = "static")]
    pub static_version: String,
    #[serde(rename = "cdn")]
    pub cdn_version: String,
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self {
            static_version: DEFAULT_STATIC_VERSION.to_string(),
            cdn_version: DEFAULT_CDN_VERSION.to_string(),
        }
    }
}

impl VersionRegistry {
    pub fn new(static_version: impl Into<String>, cdn_version: impl Into<String>) -> Self {
        Self {
            static_version: static_version.into(),
            cdn_version: cdn_version.into(),
        }
    }

    /// Whether `cache_name` is one of the current generations.
    /// Exact string equality; `nitro-pwa-static-v7-old` is not current.
    pub fn is_current(&self, cache_name: &str) -> bool {
        cache_name == self.static_version || cache_name == self.cdn_version
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.static_version.trim().is_empty() {
            return Err(ConfigError::EmptyVersion("static"));
        }
        if self.cdn_version.trim().is_empty() {
            return Err(ConfigError::EmptyVersion("cdn"));
        }
        if self.static_version == self.cdn_version {
            return Err(ConfigError::DuplicateVersion(self.static_version.clone()));
        }
        Ok(())
    }

    /// Registry with the static generation advanced by one.
    pub fn bump_static(&self) -> Result<Self, ConfigError> {
        Ok(Self {
            static_version: CacheVersion::parse(&self.static_version)?.bump()?.to_string(),
            cdn_version: self.cdn_version.clone(),
        })
    }

    /// Registry with the CDN generation advanced by one.
    pub fn bump_cdn(&self) -> Result<Self, ConfigError> {
        Ok(Self {
            static_version: self.static_version.clone(),
            cdn_version: CacheVersion::parse(&self.cdn_version)?.bump()?.to_string(),
        })
    }
}

/// A cache name split into its logical name and generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVersion {
    name: String,
    generation: u64,
}

impl CacheVersion {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let (name, suffix) = value
            .rsplit_once("-v")
            .ok_or_else(|| ConfigError::UnversionedName(value.to_string()))?;
        if name.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::UnversionedName(value.to_string()));
        }
        let generation = suffix
            .parse()
            .map_err(|_| ConfigError::UnversionedName(value.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            generation,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The next generation. Fails rather than wrapping at `u64::MAX`.
    pub fn bump(&self) -> Result<Self, ConfigError> {
        let generation = self
            .generation
            .checked_add(1)
            .ok_or_else(|| ConfigError::GenerationOverflow(self.to_string()))?;
        Ok(Self {
            name: self.name.clone(),
            generation,
        })
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}", self.name, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_current_exact_match_only() {
        let registry = VersionRegistry::default();
        assert!(registry.is_current("nitro-pwa-static-v7"));
        assert!(registry.is_current("nitro-pwa-cdn-v7"));
        assert!(!registry.is_current("nitro-pwa-static-v6"));
        assert!(!registry.is_current("nitro-pwa-static-v7-old"));
        assert!(!registry.is_current("nitro-pwa-static"));
    }

    #[test]
    fn test_validate_rejects_shared_version() {
        let registry = VersionRegistry::new("app-v1", "app-v1");
        assert!(matches!(
            registry.validate(),
            Err(ConfigError::DuplicateVersion(_))
        ));
        assert!(matches!(
            VersionRegistry::new(" ", "cdn-v1").validate(),
            Err(ConfigError::EmptyVersion("static"))
        ));
    }

    #[test]
    fn test_parse_and_bump() {
        let version = CacheVersion::parse("nitro-pwa-static-v7").unwrap();
        assert_eq!(version.name(), "nitro-pwa-static");
        assert_eq!(version.generation(), 7);
        assert_eq!(version.bump().unwrap().to_string(), "nitro-pwa-static-v8");
    }

    #[test]
    fn test_parse_rejects_unversioned() {
        assert!(CacheVersion::parse("nitro-pwa-static").is_err());
        assert!(CacheVersion::parse("nitro-pwa-static-v").is_err());
        assert!(CacheVersion::parse("-v3").is_err());
        assert!(CacheVersion::parse("static-vX").is_err());
    }

    #[test]
    fn test_bump_one_category() {
        let registry = VersionRegistry::default();
        let bumped = registry.bump_cdn().unwrap();
        assert_eq!(bumped.static_version, "nitro-pwa-static-v7");
        assert_eq!(bumped.cdn_version, "nitro-pwa-cdn-v8");

        let bumped = bumped.bump_static().unwrap();
        assert_eq!(bumped.static_version, "nitro-pwa-static-v8");
    }

    #[test]
    fn test_bump_at_max_generation_fails() {
        let registry = VersionRegistry::new(
            format!("nitro-pwa-static-v{}", u64::MAX),
            format!("nitro-pwa-cdn-v{}", u64::MAX),
        );
        assert!(matches!(
            registry.bump_static(),
            Err(ConfigError::GenerationOverflow(_))
        ));
        assert!(matches!(
            registry.bump_cdn(),
            Err(ConfigError::GenerationOverflow(_))
        ));

        let last = CacheVersion::parse(&registry.static_version).unwrap();
        assert_eq!(last.generation(), u64::MAX);
        assert!(last.bump().is_err());
    }
}
