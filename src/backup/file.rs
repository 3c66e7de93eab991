//! On-disk persistence for `BackupEnvelope`s.
//!
//! A backup file is the envelope as pretty JSON.  Writes are atomic:
//! the JSON goes to a temp file in the same directory which is then
//! renamed over the target, so readers never see a half-written file.

use std::fs;
use std::path::Path;

use super::BackupEnvelope;
use crate::errors::{FieldSealError, Result};

/// Write `backup` to `path` atomically.
pub fn write_backup(path: &Path, backup: &BackupEnvelope) -> Result<()> {
    let json = serde_json::to_vec_pretty(backup)
        .map_err(|e| FieldSealError::Serialization(format!("backup: {e}")))?;

    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() && !parent.exists() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read a backup written by `write_backup`.
pub fn read_backup(path: &Path) -> Result<BackupEnvelope> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data)
        .map_err(|e| FieldSealError::Serialization(format!("backup file {}: {e}", path.display())))
}
