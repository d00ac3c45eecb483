//! Snapshot cache (§5 Concurrency & Resource Model): keyed by the input
//! paths and their mtimes, so a stale pair forces a re-parse instead of
//! serving out-of-date output. Snapshots are encoded with `declio`, the same
//! codec the container/record layers already use.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use declio::{Decode, Encode};
use tracing::debug;

use crate::result::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pdb_path: PathBuf,
    pub exe_path: PathBuf,
    pub pdb_mtime: SystemTime,
    pub exe_mtime: SystemTime,
}

impl CacheKey {
    pub fn compute(pdb_path: &Path, exe_path: &Path) -> Result<Self> {
        Ok(Self {
            pdb_path: pdb_path.to_path_buf(),
            exe_path: exe_path.to_path_buf(),
            pdb_mtime: fs::metadata(pdb_path)?.modified()?,
            exe_mtime: fs::metadata(exe_path)?.modified()?,
        })
    }

    fn file_name(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("{:016x}.snapshot", hasher.finish())
    }
}

/// A declio-backed cache of analysis snapshots, rooted at a configurable
/// directory (the platform cache dir by default).
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("retrograde-decompiler")
    }

    /// Loads a cached snapshot for `key`. Any miss — file absent, truncated,
    /// or failing to decode — is logged at `debug!` and treated as a cache
    /// miss, never an error (§5).
    pub fn load<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Decode<()>,
    {
        let path = self.dir.join(key.file_name());
        let bytes = fs::read(&path).ok()?;
        match T::decode((), &mut &bytes[..]) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "cache snapshot failed to decode, treating as miss");
                None
            }
        }
    }

    pub fn store<T>(&self, key: &CacheKey, value: &T) -> Result<()>
    where
        T: Encode<()>,
    {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(key.file_name());
        let mut bytes = Vec::new();
        value.encode((), &mut bytes).map_err(Error::EncodingFailed)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_hash_to_the_same_file_name() {
        let now = SystemTime::UNIX_EPOCH;
        let a = CacheKey {
            pdb_path: "a.pdb".into(),
            exe_path: "a.exe".into(),
            pdb_mtime: now,
            exe_mtime: now,
        };
        let b = a.clone();
        assert_eq!(a.file_name(), b.file_name());
    }

    #[test]
    fn changed_mtime_changes_the_file_name() {
        let a = CacheKey {
            pdb_path: "a.pdb".into(),
            exe_path: "a.exe".into(),
            pdb_mtime: SystemTime::UNIX_EPOCH,
            exe_mtime: SystemTime::UNIX_EPOCH,
        };
        let mut b = a.clone();
        b.pdb_mtime = SystemTime::now();
        assert_ne!(a.file_name(), b.file_name());
    }
}
