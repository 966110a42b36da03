use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::Result;
use thiserror::Error;

use super::download::Artifacts;
use crate::store::{Node, StoreError, Value};

pub const CLOUD_TRANSFER_PREFIX: &str = "https://cowtransfer.com/";
pub const HUB_PREFIX: &str = "https://huggingface.co/";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("engine `{0}` is not supported")]
    UnsupportedEngine(String),

    #[error("unknown source `{0}`, only cloud transfer and hub links are supported")]
    UnsupportedSource(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to fetch {link}")]
    Transfer {
        link: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Demucs,
    SoVits,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Demucs => "demucs",
            Engine::SoVits => "so-vits",
        }
    }

    /// Which strategy serves `link` for this engine.
    pub fn source_for(&self, link: &str) -> Result<SourceKind, FetchError> {
        match self {
            Engine::Demucs => Ok(SourceKind::DirectLink),
            Engine::SoVits => SourceKind::classify(link)
                .ok_or_else(|| FetchError::UnsupportedSource(link.to_string())),
        }
    }
}

impl FromStr for Engine {
    type Err = FetchError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "demucs" => Ok(Engine::Demucs),
            "so-vits" => Ok(Engine::SoVits),
            other => Err(FetchError::UnsupportedEngine(other.to_string())),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    DirectLink,
    CloudTransfer,
    HubSnapshot,
}

impl SourceKind {
    pub fn classify(link: &str) -> Option<Self> {
        if link.starts_with(CLOUD_TRANSFER_PREFIX) {
            Some(SourceKind::CloudTransfer)
        } else if link.starts_with(HUB_PREFIX) {
            Some(SourceKind::HubSnapshot)
        } else {
            None
        }
    }
}

/// One link of one catalog entry, ready to be fetched.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub engine: Engine,
    pub name: &'a str,
    pub link: &'a str,
    pub auth: &'a Node,
    pub checksum: Option<&'a str>,
    pub destination: PathBuf,
    pub refresh: bool,
}

impl FetchRequest<'_> {
    /// `auth.headers` as request headers; non-string values are skipped.
    pub fn headers(&self) -> Vec<(String, String)> {
        self.auth
            .node("headers")
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|value| (name.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn token(&self) -> Option<String> {
        self.auth
            .entry_value("token")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// A way of turning a link into local files.
pub trait SourceStrategy {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Artifacts>;
}
