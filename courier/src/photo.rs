//! The daily photo: finding it on disk and getting it into the device gallery.

use crate::driver::AutomationDriver;
use crate::AutomationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Extensions picked up from the photo folder.
const FOLDER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
/// Extensions the device gallery accepts.
const TRANSFER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const LARGE_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEVICE_DIR: &str = "/sdcard/Pictures";

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// The one image in `dir`, if any.
///
/// Hidden files are ignored. With several images the first in name order
/// wins and a warning is logged. A missing folder is not an error.
pub fn find_daily_photo(dir: &Path) -> Result<Option<PathBuf>, AutomationError> {
    if !dir.is_dir() {
        debug!("Photo folder {} does not exist", dir.display());
        return Ok(None);
    }
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden || !path.is_file() {
            continue;
        }
        if extension(&path).is_some_and(|e| FOLDER_EXTENSIONS.contains(&e.as_str())) {
            images.push(path);
        }
    }
    images.sort();
    if images.len() > 1 {
        warn!(
            "Multiple photos found in {}: {:?}. Using the first one; keep only one photo in the folder",
            dir.display(),
            images
        );
    }
    Ok(images.into_iter().next())
}

/// Where a transfer lands on the device, stamped with the local time.
pub fn device_path_for(ext: &str) -> String {
    format!(
        "{DEVICE_DIR}/courier_daily_{}.{ext}",
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Push `local` into the device gallery and return its device path.
///
/// A failed verification read or a size mismatch only warns; the push
/// itself failing is an error.
#[instrument(skip(driver), fields(photo = %local.display()))]
pub async fn transfer_photo(
    driver: &dyn AutomationDriver,
    local: &Path,
) -> Result<String, AutomationError> {
    let ext = extension(local).unwrap_or_default();
    if !TRANSFER_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AutomationError::InvalidArgument(format!(
            "unsupported photo type '.{ext}', expected one of {TRANSFER_EXTENSIONS:?}"
        )));
    }

    let data = tokio::fs::read(local).await?;
    let size = data.len() as u64;
    let size_mb = size as f64 / (1024.0 * 1024.0);
    if size > LARGE_FILE_BYTES {
        warn!("Large photo ({:.2}MB), the transfer may take a while", size_mb);
    }

    let device_path = device_path_for(&ext);
    debug!("Pushing {} bytes to {}", size, device_path);
    let started = Instant::now();
    driver.push_file(&device_path, &STANDARD.encode(&data)).await?;
    debug!("Push finished in {:.2}s", started.elapsed().as_secs_f64());

    match driver.pull_file(&device_path).await {
        Ok(encoded) => match STANDARD.decode(encoded.trim()) {
            Ok(pulled) if pulled.len() as u64 == size => {
                info!("Photo verified on device: {} ({:.2}MB)", device_path, size_mb);
            }
            Ok(pulled) => warn!(
                "Photo size mismatch on device, expected {} bytes, got {}",
                size,
                pulled.len()
            ),
            Err(e) => warn!("Could not decode the verification copy: {}", e),
        },
        Err(e) if e.is_session_fault() => return Err(e),
        Err(e) => warn!("Verification skipped, could not read the photo back: {}", e),
    }
    Ok(device_path)
}
