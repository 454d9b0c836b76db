use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting the config file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write a file only if it does not already exist. Returns true if written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

/// A short-lived inventory file listing one host per line.
///
/// The file is removed when the value is dropped.
pub struct TempInventory {
    file: NamedTempFile,
}

impl TempInventory {
    pub fn write<S: AsRef<str>>(hosts: &[S]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("opsctl-inventory-")
            .tempfile()?;
        for host in hosts {
            writeln!(file, "{}", host.as_ref())?;
        }
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
