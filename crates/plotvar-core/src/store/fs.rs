//! Filesystem helpers shared by the partition writer and loader.
//!
//! All writes go through [`write_atomic`]: bytes land in a sibling
//! `.tmp` file which is fsynced and renamed over the destination, so a
//! crash mid-write never leaves a half-written partition or index
//! behind.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::store::{NotFoundSnafu, OtherIoSnafu, StoreResult};

/// Removes a temporary file on drop unless disarmed.
///
/// Guards the window between writing a temp file and renaming it into
/// place; an error in that window must not leave stray `.tmp` files
/// next to real partitions.
pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    /// Start guarding `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Stop guarding; the file is now owned by its final name.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != io::ErrorKind::NotFound {
                    log::warn!(
                        "failed to remove temp file {}: {err}",
                        self.path.display()
                    );
                }
            }
        }
    }
}

/// Create the parent directory of `path`, including ancestors.
pub fn create_parent_dir(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context(OtherIoSnafu {
            path: parent.display().to_string(),
        })?;
    }
    Ok(())
}

/// Write `bytes` to `path` atomically via a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    create_parent_dir(path)?;

    let tmp = path.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp.clone());

    {
        let mut file = File::create(&tmp).context(OtherIoSnafu {
            path: tmp.display().to_string(),
        })?;
        file.write_all(bytes).context(OtherIoSnafu {
            path: tmp.display().to_string(),
        })?;
        file.sync_all().context(OtherIoSnafu {
            path: tmp.display().to_string(),
        })?;
    }

    fs::rename(&tmp, path).context(OtherIoSnafu {
        path: path.display().to_string(),
    })?;

    // Renamed into place; nothing left to clean up.
    guard.disarm();
    Ok(())
}

/// Read a whole file, mapping a missing file to `StoreError::NotFound`.
pub fn read_all_bytes(path: &Path) -> StoreResult<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(err).context(NotFoundSnafu {
            path: path.display().to_string(),
        }),
        Err(err) => Err(err).context(OtherIoSnafu {
            path: path.display().to_string(),
        }),
    }
}

/// Read a whole file as UTF-8, mapping a missing file to
/// `StoreError::NotFound`.
pub fn read_to_string(path: &Path) -> StoreResult<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(err).context(NotFoundSnafu {
            path: path.display().to_string(),
        }),
        Err(err) => Err(err).context(OtherIoSnafu {
            path: path.display().to_string(),
        }),
    }
}

/// List the regular files directly inside `dir`, sorted by file name.
pub fn list_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(err).context(NotFoundSnafu {
                path: dir.display().to_string(),
            });
        }
        Err(err) => {
            return Err(err).context(OtherIoSnafu {
                path: dir.display().to_string(),
            });
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.context(OtherIoSnafu {
            path: dir.display().to_string(),
        })?;
        let file_type = entry.file_type().context(OtherIoSnafu {
            path: entry.path().display().to_string(),
        })?;
        if file_type.is_file() {
            names.push(entry.file_name());
        }
    }
    names.sort();

    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}
