//! Durable file replacement

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use uuid::Uuid;

/// Atomically replace `path` with `data`.
///
/// Writes a temp file in the same directory (same filesystem), restricts it
/// to the owner, fsyncs it, renames it over `path` and fsyncs the directory.
/// Readers see either the old or the new content, never a mix.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = path.with_file_name(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("rotator"),
        Uuid::new_v4()
    ));

    let result = write_synced(&temp_path, data).and_then(|()| fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
        return result;
    }

    sync_parent(path)
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => File::open(".")?.sync_all(),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}
