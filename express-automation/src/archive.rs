use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::AutomationError;

/// Moves `file` into `<parent>/<archive_dir>/`, creating the folder. On a
/// name collision the file is renamed `{stem}-{YYYYmmdd-HHMMSS}{.ext}`.
pub fn move_to_archive(file: &Path, archive_dir: &str) -> Result<PathBuf, AutomationError> {
    let parent = file.parent().unwrap_or_else(|| Path::new("."));
    let archive = parent.join(archive_dir);
    std::fs::create_dir_all(&archive)?;

    let file_name = file.file_name().ok_or_else(|| {
        AutomationError::InvalidArgument(format!("{} has no file name", file.display()))
    })?;
    let mut dest = archive.join(file_name);
    if dest.exists() {
        dest = archive.join(timestamped_name(file, &Local::now().format("%Y%m%d-%H%M%S").to_string()));
    }

    move_file(file, &dest)?;
    info!("Moved {} to {}", file.display(), dest.display());
    Ok(dest)
}

fn timestamped_name(file: &Path, stamp: &str) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file.extension() {
        Some(ext) => format!("{stem}-{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{stamp}"),
    }
}

/// Rename, falling back to copy + delete across volumes.
fn move_file(from: &Path, to: &Path) -> Result<(), AutomationError> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_into_processed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("EDS-2025-RR.xlsx");
        std::fs::write(&file, b"x").unwrap();

        let dest = move_to_archive(&file, "processed").unwrap();
        assert_eq!(dest, dir.path().join("processed").join("EDS-2025-RR.xlsx"));
        assert!(!file.exists());
        assert!(dest.exists());
    }

    #[test]
    fn collision_gets_timestamp_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed");
        std::fs::create_dir_all(&processed).unwrap();
        std::fs::write(processed.join("a.xlsx"), b"old").unwrap();

        let file = dir.path().join("a.xlsx");
        std::fs::write(&file, b"new").unwrap();
        let dest = move_to_archive(&file, "processed").unwrap();

        let name = dest.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("a-") && name.ends_with(".xlsx"), "{name}");
        assert_eq!(std::fs::read(processed.join("a.xlsx")).unwrap(), b"old");
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn timestamped_name_keeps_extension() {
        assert_eq!(
            timestamped_name(Path::new("x/report.xls"), "20250101-120000"),
            "report-20250101-120000.xls"
        );
    }
}
