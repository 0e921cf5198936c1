//! Local copies of submitted screenshots

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;

use clancore::core::validation::sanitize_filename;

/// `<dir>/screenshot_<telegram_id>_<YYYYmmdd_HHMMSS>.jpg`
pub fn archive_path(dir: &Path, external_id: i64, at: DateTime<Utc>) -> PathBuf {
    let name = format!("screenshot_{}_{}.jpg", external_id, at.format("%Y%m%d_%H%M%S"));
    dir.join(sanitize_filename(&name))
}

/// Downloads a Telegram file into `dest`.
///
/// A partially written file is removed on failure.
pub async fn download_screenshot(bot: &Bot, file_id: &str, dest: &Path) -> anyhow::Result<u64> {
    let file = bot.get_file(FileId(file_id.to_string())).await?;
    log::debug!("Screenshot {} resolved to {} ({} bytes)", file_id, file.path, file.size);

    let mut dst = fs_err::tokio::File::create(dest).await?;
    if let Err(e) = bot.download_file(&file.path, &mut dst).await {
        drop(dst);
        if let Err(remove_err) = fs_err::tokio::remove_file(dest).await {
            log::debug!("Could not remove partial screenshot: {}", remove_err);
        }
        return Err(e.into());
    }

    Ok(u64::from(file.size))
}

/// Archives a screenshot in the background. Failures are only logged; the
/// application itself is already stored.
pub fn spawn_archive(bot: Bot, dir: PathBuf, external_id: i64, file_id: String) {
    tokio::spawn(async move {
        let dest = archive_path(&dir, external_id, Utc::now());
        match download_screenshot(&bot, &file_id, &dest).await {
            Ok(size) => log::info!("Screenshot of user {} archived to {} ({} bytes)", external_id, dest.display(), size),
            Err(e) => log::warn!("Failed to archive screenshot of user {}: {}", external_id, e),
        }
    });
}
