//! Backup commands.

use super::library::{current_selection, lock_repository, CommandError};
use crate::services::backup::{self, RestoreSummary};
use crate::state::AppState;
use chrono::Utc;
use std::fs;
use std::path::Path;
use tracing::info;

/// Write a backup of the whole store to `file_path`.
pub async fn export_backup(file_path: String, state: &AppState) -> Result<usize, CommandError> {
    let text = {
        let repo = lock_repository(state)?;
        backup::export_json(&repo, Utc::now())?
    };
    let path = Path::new(&file_path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, &text)?;
    info!(path = %path.display(), bytes = text.len(), "backup written");
    Ok(text.len())
}

/// Replace the store with the backup at `file_path`.
pub async fn restore_backup(file_path: String, state: &AppState) -> Result<RestoreSummary, CommandError> {
    let text = fs::read_to_string(&file_path)?;
    let summary = {
        let mut repo = lock_repository(state)?;
        backup::restore_json(&mut repo, &text, Utc::now())?
    };
    current_selection(state).await.ok();
    Ok(summary)
}
