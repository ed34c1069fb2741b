//! Download the raw extract over HTTP. ETL itself never downloads.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

/// Fetch `url` and store the body at `dest`, creating parent directories.
/// Returns the number of bytes written.
pub fn download_csv_file(url: &str, dest: &Path) -> anyhow::Result<usize> {
    println!("Downloading CSV file...");

    let response = reqwest::blocking::get(url)
        .with_context(|| format!("failed to reach {url}"))?
        .error_for_status()
        .with_context(|| format!("download of {url} was rejected"))?;
    let bytes = response.bytes()?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, &bytes).with_context(|| format!("failed to write {}", dest.display()))?;

    info!(url, dest = %dest.display(), bytes = bytes.len(), "raw extract downloaded");
    Ok(bytes.len())
}
