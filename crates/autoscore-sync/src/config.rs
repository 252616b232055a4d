//! Label Studio connection settings and the health report derived from them.

use serde::Serialize;

/// Where and how to reach the Label Studio API.
#[derive(Clone, Default)]
pub struct LabelStudioConfig {
    /// Instance base URL, e.g. `https://ls.example.org`. Trailing slashes are trimmed.
    pub url: String,
    /// Personal access token from the Label Studio account settings.
    pub api_key: String,
}

impl std::fmt::Debug for LabelStudioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelStudioConfig")
            .field("url", &self.url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Configuration status as reported by `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub ls_url: bool,
    pub ls_api_key: bool,
}

impl HealthReport {
    pub fn status(&self) -> u16 {
        if self.ok { 200 } else { 500 }
    }
}

impl LabelStudioConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.api_key.is_empty()
    }

    pub fn health(&self) -> HealthReport {
        let ls_url = !self.url.is_empty();
        let ls_api_key = !self.api_key.is_empty();
        HealthReport {
            ok: ls_url && ls_api_key,
            ls_url,
            ls_api_key,
        }
    }
}
