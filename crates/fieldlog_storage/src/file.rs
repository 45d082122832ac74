//! File-based image store for persistent storage.
//!
//! ## File Format
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ magic   "FLDIMG01"          8 bytes  │
//! │ length  u64 little-endian   8 bytes  │
//! │ sha256  of image           32 bytes  │
//! │ image                     N bytes    │
//! └──────────────────────────────────────┘
//! ```
//!
//! Saves go through a sibling temp file which is fsynced and then renamed
//! over the target, so a crash mid-save leaves the previous image readable.

use crate::backend::ImageStore;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"FLDIMG01";
const HEADER_SIZE: usize = 8 + 8 + 32;

/// A file-based image store.
///
/// Holds an advisory exclusive lock on `<path>.lock` for its whole lifetime
/// so two processes never write the same image.
///
/// # Example
///
/// ```no_run
/// use fieldlog_storage::{FileImageStore, ImageStore};
/// use std::path::Path;
///
/// let store = FileImageStore::open(Path::new("fieldlog.img")).unwrap();
/// store.save(b"persistent image").unwrap();
/// ```
#[derive(Debug)]
pub struct FileImageStore {
    path: PathBuf,
    temp_path: PathBuf,
    _lock_file: File,
    write_guard: Mutex<()>,
}

impl FileImageStore {
    /// Opens an image store at the given path, creating parent directories.
    ///
    /// The image file itself is only created on the first save.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Locked`] if another process holds the lock
    /// - [`StorageError::Io`] if the directory or lock file cannot be created
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = sibling(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        tracing::debug!(path = %path.display(), "opened image file");

        Ok(Self {
            path: path.to_path_buf(),
            temp_path: sibling(path, "tmp"),
            _lock_file: lock_file,
            write_guard: Mutex::new(()),
        })
    }

    /// Returns the path of the image file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if an image has been saved at this path.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl ImageStore for FileImageStore {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode(&bytes).map(Some)
    }

    fn save(&self, image: &[u8]) -> StorageResult<()> {
        let _guard = self.write_guard.lock();

        let mut file = File::create(&self.temp_path)?;
        file.write_all(&encode(image))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_directory()?;

        tracing::trace!(path = %self.path.display(), bytes = image.len(), "image saved");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn encode(image: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + image.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(image.len() as u64).to_le_bytes());
    out.extend_from_slice(&Sha256::digest(image));
    out.extend_from_slice(image);
    out
}

fn decode(bytes: &[u8]) -> StorageResult<Vec<u8>> {
    if bytes.len() < HEADER_SIZE {
        return Err(StorageError::corrupted(format!(
            "file too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[..8] != MAGIC {
        return Err(StorageError::corrupted("bad magic"));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[8..16]);
    let len = u64::from_le_bytes(len_bytes);
    let image = &bytes[HEADER_SIZE..];
    if image.len() as u64 != len {
        return Err(StorageError::corrupted(format!(
            "length mismatch: header says {len}, found {}",
            image.len()
        )));
    }

    if Sha256::digest(image).as_slice() != &bytes[16..HEADER_SIZE] {
        return Err(StorageError::corrupted("checksum mismatch"));
    }

    Ok(image.to_vec())
}
