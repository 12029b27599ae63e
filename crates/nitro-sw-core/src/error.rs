use thiserror::Error;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// A request that could not produce a response at all.
///
/// An HTTP error status is still a response; only transport failures and
/// requests that could not be built end up here.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Whether this failure looks like the device being offline or the
    /// host being unreachable, as opposed to a malformed request.
    pub fn is_connectivity(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Http(e) => e.is_connect() || e.is_timeout(),
            FetchError::InvalidRequest(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid cache name: {0}")]
    InvalidName(String),

    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt cache file for {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the all-or-nothing static population step.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Bad status {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Failed to store {url}: {source}")]
    Store {
        url: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to open cache {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl InstallError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &[u8]) -> Self {
        InstallError::Status {
            url: url.to_string(),
            status,
            body: Self::truncate_body(body),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cache version must not be empty ({0})")]
    EmptyVersion(&'static str),

    #[error("Static and CDN caches share the version {0}")]
    DuplicateVersion(String),

    #[error("Version {0} does not end in -v<N>")]
    UnversionedName(String),

    #[error("Version {0} is at the last generation")]
    GenerationOverflow(String),

    #[error("Invalid scope URL {value}: {source}")]
    InvalidScope {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid asset URL {value}: {source}")]
    InvalidAsset {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid host pattern: {0:?}")]
    InvalidHost(String),
}
