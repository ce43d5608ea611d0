//! 原子写入
//!
//! Write to `<path>.tmp.<monotonic>.<counter>` in the destination directory,
//! then rename into place. A failed publish removes the temp file and leaves
//! the destination untouched.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{BundleError, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn monotonic_ns() -> u128 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos()
}

/// Sibling temp path for `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp.{}.{}", monotonic_ns(), counter));
    path.with_file_name(name)
}

fn remove_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(temp = %temp.display(), error = %e, "failed to remove temp file");
        }
    }
}

fn rename_into_place(temp: &Path, path: &Path) -> io::Result<()> {
    match fs::rename(temp, path) {
        Ok(()) => Ok(()),
        Err(first) => {
            debug!(path = %path.display(), error = %first, "rename failed, retrying after remove");
            match fs::remove_file(path) {
                Ok(()) => fs::rename(temp, path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => fs::rename(temp, path),
                Err(_) => Err(first),
            }
        }
    }
}

/// Stream content through `fill` into a temp file, then publish it at `path`
pub fn write_atomic_with<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            BundleError::write(path, format!("cannot create parent directory: {e}"))
        })?;
    }

    let temp = temp_path_for(path);
    let written = (|| -> Result<()> {
        let file = File::create(&temp)?;
        let mut writer = BufWriter::new(file);
        fill(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    if let Err(e) = written {
        remove_temp(&temp);
        return Err(match e {
            BundleError::Io(io) => BundleError::write(path, format!("cannot write temp file: {io}")),
            other => other,
        });
    }

    if let Err(e) = rename_into_place(&temp, path) {
        remove_temp(&temp);
        return Err(BundleError::write(path, format!("cannot publish temp file: {e}")));
    }

    debug!(path = %path.display(), "artifact published");
    Ok(())
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_with(path, |w| Ok(w.write_all(bytes)?))
}

pub fn write_text_atomic(path: &Path, text: &str) -> Result<()> {
    write_atomic(path, text.as_bytes())
}

/// Pretty JSON with a trailing newline
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    write_text_atomic(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".tmp."))
            .collect()
    }

    #[test]
    fn test_creates_parent_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/run.json");
        write_text_atomic(&path, "first").unwrap();
        write_text_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(leftovers(&dir.path().join("nested")).is_empty());
    }

    #[test]
    fn test_temp_names_are_unique() {
        let path = Path::new("/tmp/x/metrics.json");
        let a = temp_path_for(path);
        let b = temp_path_for(path);
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("metrics.json.tmp."));
        assert_eq!(a.parent(), path.parent());
    }

    #[test]
    fn test_failed_publish_leaves_destination_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep.txt"), "x").unwrap();

        let err = write_text_atomic(&path, "data").unwrap_err();
        assert!(err.to_string().contains("occupied"));
        assert!(path.is_dir());
        assert_eq!(fs::read_to_string(path.join("keep.txt")).unwrap(), "x");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_fill_error_removes_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let err = write_atomic_with(&path, |w| {
            w.write_all(b"partial")?;
            Err(BundleError::zip_limit("too many entries"))
        })
        .unwrap_err();
        assert!(matches!(err, BundleError::ZipLimit { .. }));
        assert!(!path.exists());
        assert!(leftovers(dir.path()).is_empty());
    }
}
