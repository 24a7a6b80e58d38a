use bincode::{Decode, Encode};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::store::StoreError;
use crate::models::ClipItem;

const FORMAT_VERSION: u32 = 1;

/// On-disk layout of the clip list
#[derive(Debug, Encode, Decode)]
struct ClipFile {
    version: u32,
    /// Newest first
    items: Vec<ClipItem>,
}

/// Bincode file holding every stored clip
/// Uses atomic write pattern with .tmp file for safety
pub struct BincodeClipFile {
    path: PathBuf,
}

impl BincodeClipFile {
    pub fn new(path: PathBuf) -> Self {
        BincodeClipFile { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the file, if it exists
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Load all items. A missing file is an empty list; a corrupted one is
    /// moved aside and also reads as empty
    pub fn load(&self) -> Result<Vec<ClipItem>, StoreError> {
        if !self.path.exists() {
            log::info!("Clip file not found at {:?}, starting with an empty list", self.path);
            return Ok(Vec::new());
        }

        let bytes = fs::read(&self.path).map_err(io_err(&self.path))?;

        match bincode::decode_from_slice::<ClipFile, _>(&bytes, bincode::config::standard()) {
            Ok((file, _bytes_read)) if file.version == FORMAT_VERSION => {
                log::info!("Loaded {} clips from {:?}", file.items.len(), self.path);
                Ok(file.items)
            }
            Ok((file, _)) => Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                version: file.version,
            }),
            Err(e) => {
                // Corrupted file - backup and return empty list
                let backup_path = self.path.with_extension("bin.corrupted");
                log::warn!(
                    "Clip file corrupted, backing up to {:?}: {}",
                    backup_path,
                    e
                );

                if let Err(backup_err) = fs::rename(&self.path, &backup_path) {
                    log::error!("Failed to backup corrupted file: {}", backup_err);
                }

                Ok(Vec::new())
            }
        }
    }

    /// Write all items, replacing the previous file atomically
    pub fn save(&self, items: &[ClipItem]) -> Result<(), StoreError> {
        let file = ClipFile {
            version: FORMAT_VERSION,
            items: items.to_vec(),
        };
        let bytes = bincode::encode_to_vec(&file, bincode::config::standard())
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        let tmp_path = self.path.with_extension("bin.tmp");

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        fs::write(&tmp_path, &bytes).map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;

        log::debug!("Saved {} clips to {:?}", items.len(), self.path);
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = BincodeClipFile::new(dir.path().join("clips.bin"));
        assert!(file.load().unwrap().is_empty());
        assert!(file.modified().is_none());
    }

    #[test]
    fn test_save_then_load_keeps_order() {
        let dir = TempDir::new().unwrap();
        let file = BincodeClipFile::new(dir.path().join("nested").join("clips.bin"));
        let items = vec![ClipItem::new("newer", "me"), ClipItem::new("older", "me")];

        file.save(&items).unwrap();

        assert_eq!(file.load().unwrap(), items);
        assert!(!dir.path().join("nested").join("clips.bin.tmp").exists());
    }

    #[test]
    fn test_corrupted_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clips.bin");
        fs::write(&path, b"\xff\xff\xff not bincode").unwrap();

        let file = BincodeClipFile::new(path.clone());
        assert!(file.load().unwrap().is_empty());
        assert!(!path.exists());
        assert!(dir.path().join("clips.bin.corrupted").exists());
    }
}
