use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use tar::Archive;
use tracing::debug;
use zip::read::ZipArchive;

use super::metadata::{compute_sha256, verify_sha256};

/// Produced artifact name to local path.
pub type Artifacts = BTreeMap<String, PathBuf>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    File,
}

impl ArchiveFormat {
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::File => "bin",
        }
    }

    /// Archive format from a file name; `None` for formats we cannot unpack.
    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
            Some(ArchiveFormat::TarBz2)
        } else if lower.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub uri: String,
    pub archive_format: ArchiveFormat,
    pub destination: PathBuf,
    pub filename: String,
    pub headers: Vec<(String, String)>,
    pub expected_checksum: Option<String>,
}

impl DownloadPlan {
    pub fn file(uri: impl Into<String>, destination: PathBuf, filename: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            archive_format: ArchiveFormat::File,
            destination,
            filename: filename.into(),
            headers: Vec::new(),
            expected_checksum: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, archive_format: ArchiveFormat) -> Self {
        self.archive_format = archive_format;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_checksum(mut self, expected_checksum: Option<String>) -> Self {
        self.expected_checksum = expected_checksum;
        self
    }

    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.destination.join(format!(
            ".{}.download.{}",
            self.filename,
            self.archive_format.extension()
        ))
    }

    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        self.destination.join(&self.filename)
    }
}

#[derive(Debug)]
pub struct DownloadOutcome {
    pub final_path: PathBuf,
    pub bytes_downloaded: u64,
    pub checksum: String,
}

const PROGRESS_STEP: u64 = 16 * 1024 * 1024;

/// Fires once per `step` bytes of a growing download.
#[derive(Debug, Clone, Copy)]
pub struct ProgressThrottle {
    step: u64,
    next: u64,
}

impl ProgressThrottle {
    pub fn new(step: u64) -> Self {
        let step = step.max(1);
        Self { step, next: step }
    }

    pub fn advance(&mut self, downloaded: u64) -> bool {
        if downloaded < self.next {
            return false;
        }
        self.next = (downloaded / self.step + 1) * self.step;
        true
    }
}

/// Like [`download_and_extract_with_progress`], logging progress at debug
/// level every 16 MiB.
pub fn download_and_extract(plan: &DownloadPlan) -> Result<DownloadOutcome> {
    let mut throttle = ProgressThrottle::new(PROGRESS_STEP);
    let label = plan.filename.clone();
    download_and_extract_with_progress(plan, move |downloaded| {
        if throttle.advance(downloaded) {
            debug!("{label}: {} MiB received", downloaded / (1024 * 1024));
        }
    })
}

/// Downloads into a staging file inside the destination, then unpacks it
/// there. Existing files in the destination are kept.
pub fn download_and_extract_with_progress<F>(
    plan: &DownloadPlan,
    mut progress: F,
) -> Result<DownloadOutcome>
where
    F: FnMut(u64),
{
    let client = Client::builder().build().context("create http client")?;
    fs::create_dir_all(&plan.destination).context("create destination directory")?;
    let staging = plan.staging_path();

    let bytes_downloaded = download_to_file(&client, plan, &staging, &mut progress)?;
    let checksum = match &plan.expected_checksum {
        Some(expected) => verify_sha256(&staging, expected).map_err(|error| {
            let _ = fs::remove_file(&staging);
            error
        })?,
        None => compute_sha256(&staging)?,
    };

    let final_path = match plan.archive_format {
        ArchiveFormat::File => {
            let target = plan.target_path();
            fs::rename(&staging, &target)
                .with_context(|| format!("move download into {}", target.display()))?;
            target
        }
        format => {
            let extracted = extract_archive(format, &staging, &plan.destination);
            let _ = fs::remove_file(&staging);
            extracted?;
            plan.destination.clone()
        }
    };

    Ok(DownloadOutcome {
        final_path,
        bytes_downloaded,
        checksum,
    })
}

fn download_to_file<F>(
    client: &Client,
    plan: &DownloadPlan,
    path: &Path,
    progress: &mut F,
) -> Result<u64>
where
    F: FnMut(u64),
{
    let mut request = client.get(&plan.uri);
    for (name, value) in &plan.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let mut response = request
        .send()
        .with_context(|| format!("request {}", plan.uri))?
        .error_for_status()
        .with_context(|| format!("download {}", plan.uri))?;

    let mut file = File::create(path).context("create staging file")?;
    let mut downloaded = 0u64;
    const CHUNK_SIZE: usize = 32 * 1024;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = response.read(&mut buffer).context("read download chunk")?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .context("write download chunk")?;
        downloaded += read as u64;
        progress(downloaded);
    }
    Ok(downloaded)
}

pub fn extract_archive(format: ArchiveFormat, archive_path: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive_path).context("open archive")?;
    match format {
        ArchiveFormat::Tar => extract_tar(file, destination),
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(file), destination),
        ArchiveFormat::TarBz2 => extract_tar(BzDecoder::new(file), destination),
        ArchiveFormat::Zip => extract_zip(file, destination),
        ArchiveFormat::File => Err(anyhow!("{} is not an archive", archive_path.display())),
    }
}

fn extract_tar<R: Read>(reader: R, destination: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    for entry in archive.entries().context("iterate tar entries")? {
        let mut entry = entry.context("read tar entry")?;
        entry
            .unpack_in(destination)
            .context("unpack tar entry")?;
    }
    Ok(())
}

fn extract_zip(file: File, destination: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(file).context("open zip archive")?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("read zip entry")?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            continue;
        };
        let dest = destination.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&dest).context("create zip dir")?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).context("create zip file parent")?;
            }
            let mut outfile = File::create(&dest).context("create zip file")?;
            io::copy(&mut entry, &mut outfile).context("write zip file")?;
        }
    }
    Ok(())
}

/// Top-level entries of `dir`, skipping staging files.
pub fn list_artifacts(dir: &Path) -> Result<Artifacts> {
    let mut artifacts = Artifacts::new();
    let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        artifacts.insert(name, entry.path());
    }
    Ok(artifacts)
}

pub fn filename_from_uri(uri: &str) -> Option<String> {
    let last_segment = uri.split('/').last()?;
    let clean = last_segment.split('?').next()?.split('#').next()?.trim();
    if clean.is_empty() {
        None
    } else {
        Some(clean.to_string())
    }
}
