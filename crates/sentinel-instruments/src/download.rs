//! Scrip master download.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{InstrumentError, InstrumentResult};
use crate::master::ScripMaster;

/// Public scrip master published by the broker.
pub const DEFAULT_MASTER_URL: &str = "https://images.dhan.co/api-data/api-scrip-master.csv";

/// Fetch the master CSV from `url` into `path`, replacing any previous copy.
/// Returns the number of bytes written.
pub async fn download_master(url: &str, path: &Path, timeout: Duration) -> InstrumentResult<usize> {
    info!(url, path = %path.display(), "Downloading scrip master");

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(InstrumentError::Status(status.as_u16()));
    }
    let body = response.bytes().await?;

    let io_err = |source| InstrumentError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &body).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;

    info!(bytes = body.len(), "Scrip master downloaded");
    Ok(body.len())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl ScripMaster {
    /// Load `path`, downloading it from `url` first when it does not exist.
    pub async fn load_or_download(
        path: &Path,
        url: &str,
        timeout: Duration,
    ) -> InstrumentResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Scrip master not found locally");
            download_master(url, path, timeout).await?;
        }
        Self::load(path)
    }
}
