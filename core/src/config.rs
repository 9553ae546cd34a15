//! Client configuration.

use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/api/";

/// Where the Elpis service lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElpisConfig {
    /// Service URL, e.g. `http://0.0.0.0:5000/` or `http://0.0.0.0:5000/api/`.
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header when present.
    pub authorization: Option<String>,
    /// Emit request/response summaries at `info` instead of `debug`.
    pub verbose: bool,
}

impl Default for ElpisConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            authorization: None,
            verbose: false,
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl ElpisConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Read `ELPIS_URL`, `ELPIS_AUTHORIZATION` and `ELPIS_VERBOSE`, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup("ELPIS_URL").unwrap_or(defaults.base_url),
            authorization: lookup("ELPIS_AUTHORIZATION").filter(|a| !a.is_empty()),
            verbose: lookup("ELPIS_VERBOSE").is_some_and(|v| truthy(&v)),
        }
    }
}

/// Normalise a service URL so it ends in `/api/`.
pub fn api_base(url: &str) -> String {
    let mut url = url.trim().to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    if !url.ends_with("api/") {
        url.push_str("api/");
    }
    url
}
