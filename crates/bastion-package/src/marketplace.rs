use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use bastion_core::{BastionError, Result};

/// Marketplace metadata for one extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionListing {
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub publisher_public_key_pem: Option<String>,
}

impl ExtensionListing {
    pub fn new(latest_version: &str, publisher_public_key_pem: &str) -> Self {
        Self {
            latest_version: Some(latest_version.to_string()),
            publisher_public_key_pem: Some(publisher_public_key_pem.to_string()),
        }
    }
}

/// Raw package bytes plus whatever integrity metadata the marketplace
/// declared alongside them.
#[derive(Debug, Clone, Default)]
pub struct PackageDownload {
    pub bytes: Vec<u8>,
    pub sha256: Option<String>,
    pub signature_base64: Option<String>,
    pub format_version: Option<u32>,
}

/// Transport to the extension marketplace. Timeouts belong here, not in the
/// manager.
#[async_trait]
pub trait Marketplace: Send + Sync {
    async fn get_extension(&self, id: &str) -> Result<ExtensionListing>;

    async fn download_package(&self, id: &str, version: &str) -> Result<PackageDownload>;
}

// ── HTTP transport ─────────────────────────────────────────────

const SHA256_HEADER: &str = "x-package-sha256";
const SIGNATURE_HEADER: &str = "x-package-signature";
const FORMAT_HEADER: &str = "x-package-format-version";

/// Marketplace client speaking the `/api/v1/extensions` HTTP API.
pub struct HttpMarketplace {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMarketplace {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>, user_agent: &str) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BastionError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, id: &str, version: Option<&str>, url: &str) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| marketplace_error(id, e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BastionError::NotFound {
                id: id.to_string(),
                version: version.map(str::to_string),
            });
        }
        if !resp.status().is_success() {
            return Err(BastionError::Marketplace {
                id: id.to_string(),
                reason: format!("marketplace returned HTTP {}", resp.status()),
            });
        }
        Ok(resp)
    }
}

fn marketplace_error(id: &str, e: reqwest::Error) -> BastionError {
    BastionError::Marketplace {
        id: id.to_string(),
        reason: e.to_string(),
    }
}

fn header(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl Marketplace for HttpMarketplace {
    async fn get_extension(&self, id: &str) -> Result<ExtensionListing> {
        let url = format!("{}/api/v1/extensions/{}", self.base_url, id);
        debug!(extension = %id, %url, "fetching listing");
        let resp = self.fetch(id, None, &url).await?;
        resp.json::<ExtensionListing>()
            .await
            .map_err(|e| marketplace_error(id, e))
    }

    async fn download_package(&self, id: &str, version: &str) -> Result<PackageDownload> {
        let url = format!(
            "{}/api/v1/extensions/{}/{}/package",
            self.base_url, id, version
        );
        info!(extension = %id, %version, "downloading package");
        let resp = self.fetch(id, Some(version), &url).await?;

        let sha256 = header(&resp, SHA256_HEADER);
        let signature_base64 = header(&resp, SIGNATURE_HEADER);
        let format_version = match header(&resp, FORMAT_HEADER) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| BastionError::Marketplace {
                id: id.to_string(),
                reason: format!("invalid {FORMAT_HEADER} header: {raw}"),
            })?),
            None => None,
        };

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| marketplace_error(id, e))?
            .to_vec();

        Ok(PackageDownload {
            bytes,
            sha256,
            signature_base64,
            format_version,
        })
    }
}
