//! Export and import of raw store images.
//!
//! Exports carry the bare SQLite image, without the file header the image
//! store adds, so they can be opened by any SQLite tool.

use super::OpenStore;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Writes the store image at `path` to `out`. Returns the number of bytes.
pub fn export_image(path: &Path, out: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let opened = OpenStore::existing(path)?;
    let bytes = opened.store.export()?;

    let mut file = File::create(out)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(bytes.len())
}

/// Replaces the store at `path` with the image in `from`.
///
/// The store is created if it does not exist. It is left untouched if the
/// image is not a valid store image.
pub fn import_image(path: &Path, from: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let bytes = fs::read(from)?;
    let opened = OpenStore::create(path)?;
    opened.store.import_image(&bytes)?;
    opened.save()?;
    Ok(bytes.len())
}

/// Runs the export command.
pub fn export(path: &Path, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = export_image(path, out)?;
    println!("Exported {} bytes to {}", bytes, out.display());
    Ok(())
}

/// Runs the import command.
pub fn import(path: &Path, from: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = import_image(path, from)?;
    println!("Imported {} bytes into {}", bytes, path.display());
    Ok(())
}
