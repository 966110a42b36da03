use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::{
    download::{download_and_extract, list_artifacts, ArchiveFormat, Artifacts, DownloadPlan},
    sources::{FetchRequest, SourceStrategy},
};
use crate::store::Value;

pub const DEFAULT_METADATA_ENDPOINT: &str = "https://cowtransfer.com/core/api/transfer/share";

#[derive(Debug, Clone, Deserialize)]
pub struct ShareMetadata {
    pub code: i64,
    #[serde(default)]
    pub data: Option<SharedFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SharedFile {
    pub file_name: String,
    pub file_format: String,
    #[serde(default)]
    pub file_size: Value,
    pub download_link: String,
}

impl SharedFile {
    pub fn archive_name(&self) -> String {
        format!("{}.{}", self.file_name, self.file_format)
    }
}

/// Share links of the cloud-transfer service: the share is resolved to a
/// direct download through the metadata endpoint, then unpacked into the
/// model directory.
#[derive(Debug, Clone)]
pub struct CloudTransfer {
    metadata_endpoint: String,
}

impl CloudTransfer {
    pub fn new(metadata_endpoint: impl Into<String>) -> Self {
        Self {
            metadata_endpoint: metadata_endpoint.into(),
        }
    }

    fn metadata(&self, link: &str) -> Result<ShareMetadata> {
        let client = Client::builder().build().context("create http client")?;
        client
            .get(&self.metadata_endpoint)
            .query(&[("url", link)])
            .send()
            .with_context(|| format!("request share metadata for {link}"))?
            .error_for_status()
            .with_context(|| format!("share metadata for {link}"))?
            .json()
            .context("parse share metadata")
    }
}

impl Default for CloudTransfer {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_ENDPOINT)
    }
}

impl SourceStrategy for CloudTransfer {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Artifacts> {
        let metadata = self.metadata(request.link)?;
        download_shared(request, metadata)
    }
}

/// Downloads and unpacks an already resolved share.
pub fn download_shared(request: &FetchRequest<'_>, metadata: ShareMetadata) -> Result<Artifacts> {
    let file = match metadata.data {
        Some(file) if metadata.code == 200 => file,
        _ => {
            warn!(
                "cannot fetch metadata of {} (code {}), skipping",
                request.name, metadata.code
            );
            return Ok(Artifacts::new());
        }
    };

    let archive_name = file.archive_name();
    let Some(format) = ArchiveFormat::from_filename(&archive_name) else {
        warn!("cannot extract {archive_name}, unsupported archive format, skipping");
        return Ok(Artifacts::new());
    };

    info!("downloading {} ({})", request.name, file.file_size);
    let plan = DownloadPlan::file(&file.download_link, request.destination.clone(), archive_name)
        .with_format(format)
        .with_headers(request.headers())
        .with_checksum(request.checksum.map(str::to_string));
    let outcome = download_and_extract(&plan)?;
    info!("extracted {} into {}", request.name, outcome.final_path.display());

    let artifacts = list_artifacts(&request.destination)?;
    if artifacts.is_empty() {
        return Err(anyhow!("archive for {} was empty", request.name));
    }
    Ok(artifacts)
}
