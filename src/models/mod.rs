mod cloud;
mod direct;
mod download;
mod hub;
mod manager;
mod metadata;
mod sources;

pub use cloud::{download_shared, CloudTransfer, ShareMetadata, SharedFile};
pub use direct::DirectLink;
pub use download::{
    download_and_extract, download_and_extract_with_progress, extract_archive, filename_from_uri,
    list_artifacts, ArchiveFormat, Artifacts, DownloadOutcome, DownloadPlan, ProgressThrottle,
};
pub use hub::{repo_id_from_url, HubSnapshot};
pub use manager::{FetchReport, ResourceManager, Strategies};
pub use metadata::{compute_sha256, verify_sha256};
pub use sources::{Engine, FetchError, FetchRequest, SourceKind, SourceStrategy};
