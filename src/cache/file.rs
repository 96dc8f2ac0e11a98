use crate::cache::{HintCache, QueryHint};
use log::warn;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk hint cache: one MessagePack file per query hash, written
/// atomically (temp file, then rename) so concurrent readers never observe
/// a torn hint.
pub struct FilesystemHintCache {
    dir: PathBuf,
}

impl FilesystemHintCache {
    /// Uses (and creates) `dir` for hint files.
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        // hashes are caller-provided; keep the filename safe
        let safe: String = hash
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.hint", safe))
    }
}

impl HintCache for FilesystemHintCache {
    fn get(&self, hash: &str) -> Option<QueryHint> {
        let path = self.path_for(hash);
        let data = fs::read(&path).ok()?;
        match rmp_serde::from_slice(&data) {
            Ok(hint) => Some(hint),
            Err(err) => {
                warn!("discarding unreadable hint file {:?}: {}", path, err);
                None
            }
        }
    }

    fn set(&self, hash: &str, hint: QueryHint) {
        let path = self.path_for(hash);
        let bytes = match rmp_serde::to_vec(&hint) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("failed to serialize hint '{}': {}", hash, err);
                return;
            }
        };
        let write = || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(&bytes)?;
            tmp.flush()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        if let Err(err) = write() {
            warn!("failed to write hint file {:?}: {}", path, err);
        }
    }
}
