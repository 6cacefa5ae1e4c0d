//! Download catalogs
//!
//! A catalog maps a logical entry name and host OS to a download URL.
//! [`ConsoleCatalog`] reads OpenShift `ConsoleCLIDownload` resources from a
//! cluster API; [`StaticCatalog`] serves a fixed table from configuration.

use crate::common::config::{CatalogConfig, Timeouts};
use crate::common::{Error, Result};
use crate::setup::installer::{arch_str, http_client};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Resolves download links for tools
#[async_trait]
pub trait DownloadCatalog: Send + Sync {
    /// Get the download URL for `name` on `os` (Go naming: linux, darwin, windows)
    async fn download_link(&self, name: &str, os: &str) -> Result<String>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Build the catalog described by configuration
pub fn from_config(config: &CatalogConfig, timeouts: &Timeouts) -> Result<Arc<dyn DownloadCatalog>> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(ConsoleCatalog::new(
            url,
            config.token.clone(),
            timeouts,
        )?)),
        None => Ok(Arc::new(StaticCatalog::new(config.links.clone()))),
    }
}

/// Fixed name -> OS -> URL table
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    links: BTreeMap<String, BTreeMap<String, String>>,
}

impl StaticCatalog {
    pub fn new(links: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { links }
    }

    /// Add a single link
    pub fn with_link(mut self, name: &str, os: &str, url: &str) -> Self {
        self.links
            .entry(name.to_string())
            .or_default()
            .insert(os.to_string(), url.to_string());
        self
    }
}

#[async_trait]
impl DownloadCatalog for StaticCatalog {
    async fn download_link(&self, name: &str, os: &str) -> Result<String> {
        let per_os = self
            .links
            .get(name)
            .ok_or_else(|| Error::catalog_lookup(name, os, "not in catalog"))?;
        per_os
            .get(os)
            .cloned()
            .ok_or_else(|| {
                Error::catalog_lookup(
                    name,
                    os,
                    format!(
                        "no link for this OS (available: {})",
                        per_os.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                )
            })
    }

    fn describe(&self) -> String {
        format!("static catalog ({} entries)", self.links.len())
    }
}

/// `ConsoleCLIDownload` resource (subset)
#[derive(Debug, Deserialize)]
struct ConsoleCliDownload {
    spec: ConsoleCliDownloadSpec,
}

#[derive(Debug, Deserialize)]
struct ConsoleCliDownloadSpec {
    #[serde(default)]
    links: Vec<CliDownloadLink>,
}

/// One link of a `ConsoleCLIDownload`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CliDownloadLink {
    pub href: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl CliDownloadLink {
    fn haystack(&self) -> String {
        format!(
            "{} {}",
            self.text.as_deref().unwrap_or_default(),
            self.href
        )
        .to_lowercase()
    }
}

fn os_aliases(os: &str) -> &'static [&'static str] {
    match os {
        "darwin" => &["mac", "darwin"],
        "windows" => &["windows"],
        "linux" => &["linux"],
        _ => &[],
    }
}

fn arch_aliases(arch: &str) -> &'static [&'static str] {
    match arch {
        "amd64" => &["amd64", "x86_64", "x86-64"],
        "arm64" => &["arm64", "aarch64"],
        "ppc64le" | "powerpc64" => &["ppc64le"],
        "s390x" => &["s390x"],
        _ => &[],
    }
}

/// Pick the link for `os`, preferring one that also names `arch`
pub fn select_link<'a>(links: &'a [CliDownloadLink], os: &str, arch: &str) -> Option<&'a CliDownloadLink> {
    let os_names = os_aliases(os);
    let arch_names = arch_aliases(arch);

    let candidates: Vec<(&CliDownloadLink, String)> = links
        .iter()
        .map(|l| (l, l.haystack()))
        .filter(|(_, hay)| os_names.iter().any(|o| hay.contains(o)))
        .collect();

    candidates
        .iter()
        .find(|(_, hay)| arch_names.iter().any(|a| hay.contains(a)))
        .or_else(|| candidates.first())
        .map(|(link, _)| *link)
}

/// Catalog backed by OpenShift `ConsoleCLIDownload` resources
pub struct ConsoleCatalog {
    api_url: String,
    token: Option<String>,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl ConsoleCatalog {
    pub fn new(api_url: &str, token: Option<String>, timeouts: &Timeouts) -> Result<Self> {
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            client: http_client(Duration::from_secs(timeouts.connect_secs))?,
            request_timeout: Duration::from_secs(timeouts.catalog_request_secs),
        })
    }

    fn resource_url(&self, name: &str) -> String {
        format!(
            "{}/apis/console.openshift.io/v1/consoleclidownloads/{}",
            self.api_url, name
        )
    }
}

#[async_trait]
impl DownloadCatalog for ConsoleCatalog {
    async fn download_link(&self, name: &str, os: &str) -> Result<String> {
        let url = self.resource_url(name);
        let mut request = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::catalog_lookup(name, os, format!("request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::catalog_lookup(
                name,
                os,
                format!("cluster API returned status {}", response.status()),
            ));
        }

        let resource: ConsoleCliDownload = response
            .json()
            .await
            .map_err(|e| Error::catalog_lookup(name, os, format!("invalid resource: {}", e)))?;

        let link = select_link(&resource.spec.links, os, arch_str()).ok_or_else(|| {
            Error::catalog_lookup(
                name,
                os,
                format!("none of {} links matches this OS", resource.spec.links.len()),
            )
        })?;
        tracing::debug!(name, os, href = %link.href, "Resolved download link");
        Ok(link.href.clone())
    }

    fn describe(&self) -> String {
        format!("console downloads at {}", self.api_url)
    }
}
