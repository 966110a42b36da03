use std::{fs, path::Path};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::store::{Node, StoreError};

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/ayano-kagurazaka/vocal_generating_pack/main/files/sources_export.json";

/// Where a missing or broken catalog is downloaded from.
pub trait CatalogSource {
    fn fetch_catalog(&self) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct RemoteCatalog {
    url: String,
}

impl RemoteCatalog {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for RemoteCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_URL)
    }
}

impl CatalogSource for RemoteCatalog {
    fn fetch_catalog(&self) -> Result<Vec<u8>> {
        let client = Client::builder().build().context("create http client")?;
        let response = client
            .get(&self.url)
            .send()
            .with_context(|| format!("request {}", self.url))?
            .error_for_status()
            .with_context(|| format!("download {}", self.url))?;
        let bytes = response.bytes().context("read catalog body")?;
        Ok(bytes.to_vec())
    }
}

/// Loads the catalog at `path`, downloading it first when it is missing and
/// once more when it cannot be parsed. A failed download is an error.
pub fn load_catalog(path: &Path, source: &dyn CatalogSource) -> Result<Node> {
    if !path.exists() {
        info!("{} not found, downloading", path.display());
        download_catalog(path, source)?;
    }

    match Node::from_path(path) {
        Ok(catalog) => Ok(catalog),
        Err(StoreError::Deserialization { .. } | StoreError::InvalidInput(_)) => {
            warn!("{} is broken, downloading again", path.display());
            download_catalog(path, source)?;
            Node::from_path(path).with_context(|| format!("load catalog {}", path.display()))
        }
        Err(error) => Err(error).with_context(|| format!("load catalog {}", path.display())),
    }
}

fn download_catalog(path: &Path, source: &dyn CatalogSource) -> Result<()> {
    let bytes = source.fetch_catalog().context("fetch resource catalog")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {parent:?}"))?;
    }
    fs::write(path, bytes).with_context(|| format!("write catalog to {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;

    struct StaticCatalog {
        body: &'static str,
        calls: Cell<usize>,
    }

    impl StaticCatalog {
        fn new(body: &'static str) -> Self {
            Self {
                body,
                calls: Cell::new(0),
            }
        }
    }

    impl CatalogSource for StaticCatalog {
        fn fetch_catalog(&self) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.body.as_bytes().to_vec())
        }
    }

    struct Offline;

    impl CatalogSource for Offline {
        fn fetch_catalog(&self) -> Result<Vec<u8>> {
            Err(anyhow!("network unreachable"))
        }
    }

    #[test]
    fn existing_catalog_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        fs::write(&path, r#"{"demucs": {"models": {}}}"#).unwrap();
        let source = StaticCatalog::new("{}");
        let catalog = load_catalog(&path, &source).unwrap();
        assert!(catalog.contains("demucs.models"));
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn missing_catalog_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files/sources.json");
        let source = StaticCatalog::new(r#"{"so-vits": {"models": {}}}"#);
        let catalog = load_catalog(&path, &source).unwrap();
        assert!(catalog.contains("so-vits.models"));
        assert!(path.exists());
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn broken_catalog_is_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        fs::write(&path, "{ truncated").unwrap();
        let source = StaticCatalog::new(r#"{"demucs": {}}"#);
        let catalog = load_catalog(&path, &source).unwrap();
        assert!(catalog.contains("demucs"));
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn failed_download_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        assert!(load_catalog(&path, &Offline).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn still_broken_after_download_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        fs::write(&path, "nope").unwrap();
        let source = StaticCatalog::new("also nope");
        assert!(load_catalog(&path, &source).is_err());
    }
}
