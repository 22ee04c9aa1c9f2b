use commentwatch_core::PersistenceError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
#[cfg(unix)]
use tracing::warn;

/// Replaces `path` with `contents` so readers see either the old file or the
/// new one, never a truncated mix.
///
/// The bytes go to a sibling temporary file which is synced and then renamed
/// over the target. On unix the parent directory is synced afterwards so the
/// rename itself survives a power loss.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let tmp_path = temp_path_for(path);
    let display = path.display().to_string();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PersistenceError::CreateDirFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
    }

    let write_result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(PersistenceError::WriteFailed {
            path: display,
            reason: e.to_string(),
        });
    }

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(PersistenceError::RenameFailed {
            path: display,
            reason: e.to_string(),
        });
    }

    #[cfg(unix)]
    if let Err(e) = sync_parent_dir(path).await {
        warn!(path = %path.display(), "Could not sync parent directory: {}", e);
    }

    Ok(())
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::File::open(parent).await?.sync_all().await
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
