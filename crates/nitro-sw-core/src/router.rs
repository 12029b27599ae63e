//! Request classification.
//!
//! Every intercepted request gets exactly one policy, decided by its host:
//!
//! 1. dynamic API hosts → [`Route::Bypass`]
//! 2. CDN hosts → [`Route::CacheFirst`]
//! 3. everything else → [`Route::NetworkFirst`]
//!
//! The first matching rule wins.

use std::fmt;

use url::Url;

use crate::config::WorkerConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Live network only; synthesized error when unreachable.
    Bypass,
    /// CDN cache, then network with write-through.
    CacheFirst,
    /// Network with write-through, then any cache, then the root document.
    NetworkFirst,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Route::Bypass => "bypass",
            Route::CacheFirst => "cache-first",
            Route::NetworkFirst => "network-first",
        };
        f.write_str(name)
    }
}

/// A host allow-list entry. Matches the host itself and its subdomains,
/// never a host that merely contains the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPattern(String);

impl HostPattern {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let host = value.trim().trim_end_matches('.').to_ascii_lowercase();
        let valid = !host.is_empty()
            && !host.starts_with('.')
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid {
            return Err(ConfigError::InvalidHost(value.to_string()));
        }
        Ok(Self(host))
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        match host.strip_suffix(self.0.as_str()) {
            Some("") => true,
            Some(prefix) => prefix.ends_with('.'),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    api_hosts: Vec<HostPattern>,
    cdn_hosts: Vec<HostPattern>,
}

impl Router {
    pub fn new(config: &WorkerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            api_hosts: parse_all(&config.api_hosts)?,
            cdn_hosts: parse_all(&config.cdn_hosts)?,
        })
    }

    pub fn classify(&self, url: &Url) -> Route {
        let Some(host) = url.host_str() else {
            return Route::NetworkFirst;
        };
        if self.api_hosts.iter().any(|p| p.matches(host)) {
            Route::Bypass
        } else if self.cdn_hosts.iter().any(|p| p.matches(host)) {
            Route::CacheFirst
        } else {
            Route::NetworkFirst
        }
    }
}

fn parse_all(values: &[String]) -> Result<Vec<HostPattern>, ConfigError> {
    values.iter().map(|v| HostPattern::parse(v)).collect()
}
