use url::Url;

use crate::config::WorkerConfig;
use crate::error::ConfigError;

/// The resolved set of URLs the installation phase pre-populates.
///
/// Static entries are resolved against the configured scope, so the same
/// manifest serves a root deployment (`/index.html`) and a sub-folder one
/// (`/nitro/index.html`).
#[derive(Debug, Clone)]
pub struct AssetManifest {
    scope: Url,
    static_assets: Vec<Url>,
    cdn_assets: Vec<Url>,
    root_document: Url,
}

impl AssetManifest {
    pub fn from_config(config: &WorkerConfig) -> Result<Self, ConfigError> {
        let scope = parse_scope(&config.scope)?;

        let static_assets = config
            .static_assets
            .iter()
            .map(|entry| resolve(&scope, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let cdn_assets = config
            .cdn_assets
            .iter()
            .map(|entry| {
                Url::parse(entry).map_err(|source| ConfigError::InvalidAsset {
                    value: entry.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let root_document = resolve(&scope, &config.root_document)?;

        Ok(Self {
            scope,
            static_assets,
            cdn_assets,
            root_document,
        })
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn static_assets(&self) -> &[Url] {
        &self.static_assets
    }

    pub fn cdn_assets(&self) -> &[Url] {
        &self.cdn_assets
    }

    pub fn root_document(&self) -> &Url {
        &self.root_document
    }

    /// Whether `url` names one of the static assets. Query string and
    /// fragment are ignored, origin and path must match.
    pub fn is_static_asset(&self, url: &Url) -> bool {
        self.static_assets
            .iter()
            .any(|asset| asset.origin() == url.origin() && asset.path() == url.path())
    }
}

/// Parse the scope, forcing a trailing slash so that joining keeps the
/// last path segment (`/nitro` and `/nitro/` mean the same folder).
fn parse_scope(value: &str) -> Result<Url, ConfigError> {
    let mut scope = Url::parse(value).map_err(|source| ConfigError::InvalidScope {
        value: value.to_string(),
        source,
    })?;
    if scope.cannot_be_a_base() {
        return Err(ConfigError::InvalidScope {
            value: value.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }
    if !scope.path().ends_with('/') {
        let path = format!("{}/", scope.path());
        scope.set_path(&path);
    }
    scope.set_query(None);
    scope.set_fragment(None);
    Ok(scope)
}

fn resolve(scope: &Url, entry: &str) -> Result<Url, ConfigError> {
    let relative = entry.trim_start_matches("./").trim_start_matches('/');
    scope
        .join(relative)
        .map_err(|source| ConfigError::InvalidAsset {
            value: entry.to_string(),
            source,
        })
}
