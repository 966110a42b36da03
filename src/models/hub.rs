use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::ApiBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::{
    download::Artifacts,
    sources::{FetchRequest, SourceStrategy},
};

static REPO_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://huggingface\.co/([-\w.]+)/([\w.-]+)/?").expect("valid hub url pattern")
});

pub const DEFAULT_ALLOW_PATTERNS: [&str; 3] = ["*.pt", "*.pth", "*.json"];

/// `https://huggingface.co/<org>/<repo>` to `<org>/<repo>`.
pub fn repo_id_from_url(url: &str) -> Option<String> {
    let captures = REPO_URL.captures(url)?;
    Some(format!("{}/{}", &captures[1], &captures[2]))
}

/// Snapshot of a hub model repository, limited to the allowed file patterns,
/// copied into `<resource dir>/<name>/`.
#[derive(Debug, Clone)]
pub struct HubSnapshot {
    cache_dir: Option<PathBuf>,
    allow_patterns: Vec<String>,
}

impl HubSnapshot {
    pub fn new() -> Self {
        Self {
            cache_dir: None,
            allow_patterns: DEFAULT_ALLOW_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = Some(cache_dir);
        self
    }

    #[must_use]
    pub fn with_allow_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows(&self, filename: &str) -> bool {
        self.allow_patterns
            .iter()
            .any(|pattern| match pattern.strip_prefix('*') {
                Some(suffix) => filename.ends_with(suffix),
                None => filename == pattern,
            })
    }
}

impl Default for HubSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceStrategy for HubSnapshot {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Artifacts> {
        let repo_id = repo_id_from_url(request.link)
            .ok_or_else(|| anyhow!("not a hub repository url: {}", request.link))?;

        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(request.token());
        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder.build().context("create hub client")?;
        let repo = api.model(repo_id.clone());
        let info = repo
            .info()
            .with_context(|| format!("list files of {repo_id}"))?;

        fs::create_dir_all(&request.destination).context("create destination directory")?;
        let mut artifacts = Artifacts::new();
        for sibling in info.siblings.iter().filter(|s| self.allows(&s.rfilename)) {
            let filename = &sibling.rfilename;
            let cached = if request.refresh {
                repo.download(filename)
            } else {
                repo.get(filename)
            }
            .with_context(|| format!("download {filename} from {repo_id}"))?;

            let target = request.destination.join(filename);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).context("create snapshot subdirectory")?;
            }
            fs::copy(&cached, &target)
                .with_context(|| format!("copy {} into {}", cached.display(), target.display()))?;
            debug!("{filename} -> {}", target.display());
            artifacts.insert(filename.clone(), target);
        }
        info!("snapshot of {repo_id} has {} files", artifacts.len());
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_from_hub_urls() {
        assert_eq!(
            repo_id_from_url("https://huggingface.co/org/repo"),
            Some("org/repo".to_string())
        );
        assert_eq!(
            repo_id_from_url("https://huggingface.co/my-org/so-vits.v4/tree/main"),
            Some("my-org/so-vits.v4".to_string())
        );
        assert_eq!(repo_id_from_url("https://huggingface.co/org"), None);
        assert_eq!(repo_id_from_url("https://cowtransfer.com/s/abc"), None);
    }

    #[test]
    fn default_patterns_keep_weights_and_configs() {
        let snapshot = HubSnapshot::new();
        assert!(snapshot.allows("G_10000.pth"));
        assert!(snapshot.allows("configs/config.json"));
        assert!(snapshot.allows("model.pt"));
        assert!(!snapshot.allows("README.md"));
    }

    #[test]
    fn exact_patterns() {
        let snapshot = HubSnapshot::new().with_allow_patterns(["config.json"]);
        assert!(snapshot.allows("config.json"));
        assert!(!snapshot.allows("other.json"));
    }
}
