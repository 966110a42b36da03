use anyhow::{anyhow, Result};
use tracing::info;

use super::{
    download::{download_and_extract, filename_from_uri, Artifacts, DownloadPlan},
    sources::{FetchRequest, SourceStrategy},
};

/// Plain HTTP(S) file download into `<resource dir>/<name>/<file name>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLink;

impl SourceStrategy for DirectLink {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Artifacts> {
        let filename = filename_from_uri(request.link)
            .ok_or_else(|| anyhow!("cannot derive a file name from {}", request.link))?;
        let plan = DownloadPlan::file(request.link, request.destination.clone(), filename.clone())
            .with_headers(request.headers())
            .with_checksum(request.checksum.map(str::to_string));

        let target = plan.target_path();
        if target.exists() && !request.refresh {
            info!("{filename} already exists, skipping");
            return Ok(Artifacts::from([(filename, target)]));
        }

        info!("downloading {filename} for {}", request.name);
        let outcome = download_and_extract(&plan)?;
        info!(
            "{filename} downloaded ({} bytes, sha256 {})",
            outcome.bytes_downloaded, outcome.checksum
        );
        Ok(Artifacts::from([(filename, outcome.final_path)]))
    }
}
