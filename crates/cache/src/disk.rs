//! Durable on-disk store for one document's cache directory.
//!
//! Every entry is a plain file addressed by a path relative to the document's
//! cache directory: tiles and text files sit at the root, renderings under a
//! per-category subdirectory. File contents are the raw bytes handed to the
//! cache, with no header, so a tile file is exactly what the backend produced.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::{CacheError, CacheResult};
use crate::tile::Tile;

/// Counters for monitoring disk activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStats {
    /// Files successfully read
    pub reads: u64,
    /// Files successfully written
    pub writes: u64,
    /// Files removed
    pub removals: u64,
    /// Reads, writes or removals that failed with an I/O error
    ///
    /// Names rejected before touching the filesystem are not counted.
    pub failures: u64,
}

/// File-backed store rooted at a document's cache directory
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    stats: DiskStats,
}

impl DiskStore {
    /// Open the store, creating the directory if it doesn't exist
    pub fn open<P: AsRef<Path>>(root: P) -> CacheResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            stats: DiskStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `relative` under the root
    ///
    /// Only plain `/`-separated names are accepted: no empty, `.` or `..`
    /// segments, no backslashes and nothing absolute.
    fn path_of(&self, relative: &str) -> CacheResult<PathBuf> {
        let plain = !relative.is_empty()
            && !relative.contains(['\\', '\0'])
            && relative
                .split('/')
                .all(|segment| !matches!(segment, "" | "." | ".."))
            && Path::new(relative)
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !plain {
            return Err(CacheError::UnsafePath(relative.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Write `data` to `relative`, replacing any previous content
    pub fn write(&mut self, relative: &str, data: &[u8]) -> CacheResult<()> {
        let path = self.path_of(relative)?;
        match Self::write_file(&path, data) {
            Ok(()) => {
                self.stats.writes += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.failures += 1;
                Err(e.into())
            }
        }
    }

    fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(path)?;
        file.write_all(data)?;
        file.sync_all()
    }

    /// Read the file at `relative`
    ///
    /// Returns `Ok(None)` when there is no such file.
    pub fn read(&mut self, relative: &str) -> CacheResult<Option<Tile>> {
        let mut file = match File::open(self.path_of(relative)?) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                self.stats.failures += 1;
                return Err(e.into());
            }
        };

        let mut data = Vec::new();
        if let Err(e) = file.read_to_end(&mut data) {
            self.stats.failures += 1;
            return Err(e.into());
        }

        self.stats.reads += 1;
        Ok(Some(data.into()))
    }

    /// Remove the file at `relative`; a missing file is not an error
    pub fn remove(&mut self, relative: &str) -> CacheResult<()> {
        match fs::remove_file(self.path_of(relative)?) {
            Ok(()) => {
                self.stats.removals += 1;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                self.stats.failures += 1;
                Err(e.into())
            }
        }
    }

    /// Names of the regular files directly under the root
    pub fn list_root_files(&self) -> CacheResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Remove everything under the root, leaving the (empty) root in place
    pub fn clear(&mut self) -> CacheResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => self.stats.removals += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.stats.failures += 1;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> DiskStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> (DiskStore, tempfile::TempDir) {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = DiskStore::open(temp.path().join("doc")).expect("store should open");
        (store, temp)
    }

    #[test]
    fn test_basic_write_read() {
        let (mut store, _temp) = create_test_store();

        store.write("0_256x256.0,0.256x256.png", b"tile bytes").unwrap();

        let data = store.read("0_256x256.0,0.256x256.png").unwrap().unwrap();
        assert_eq!(&data[..], b"tile bytes");
        assert_eq!(store.stats().writes, 1);
        assert_eq!(store.stats().reads, 1);
    }

    #[test]
    fn test_read_missing_is_none() {
        let (mut store, _temp) = create_test_store();

        assert!(store.read("nothing.png").unwrap().is_none());
        assert_eq!(store.stats().failures, 0);
    }

    #[test]
    fn test_rejects_names_outside_root() {
        let (mut store, temp) = create_test_store();

        for name in ["", "../escaped", "font/../../escaped", "/tmp/escaped", "a//b", "./a", "a\\..\\b"] {
            assert!(
                matches!(store.write(name, b"x"), Err(CacheError::UnsafePath(_))),
                "{name:?} should be rejected"
            );
            assert!(matches!(store.read(name), Err(CacheError::UnsafePath(_))));
            assert!(matches!(store.remove(name), Err(CacheError::UnsafePath(_))));
        }

        assert!(!temp.path().join("escaped").exists());
        assert_eq!(store.stats(), DiskStats::default());
    }

    #[test]
    fn test_write_creates_category_dir() {
        let (mut store, _temp) = create_test_store();

        store.write("font/Liberation Sans", b"glyphs").unwrap();

        assert!(store.root().join("font").is_dir());
        let data = store.read("font/Liberation Sans").unwrap().unwrap();
        assert_eq!(&data[..], b"glyphs");
    }

    #[test]
    fn test_remove_is_tolerant() {
        let (mut store, _temp) = create_test_store();

        store.write("a.png", b"a").unwrap();
        store.remove("a.png").unwrap();
        store.remove("a.png").unwrap();

        assert!(store.read("a.png").unwrap().is_none());
        assert_eq!(store.stats().removals, 1);
    }

    #[test]
    fn test_list_root_files_skips_directories() {
        let (mut store, _temp) = create_test_store();

        store.write("a.png", b"a").unwrap();
        store.write("notes.txt", b"n").unwrap();
        store.write("style/heading", b"s").unwrap();

        let mut names = store.list_root_files().unwrap();
        names.sort();
        assert_eq!(names, vec!["a.png".to_string(), "notes.txt".to_string()]);
    }

    #[test]
    fn test_clear() {
        let (mut store, _temp) = create_test_store();

        store.write("a.png", b"a").unwrap();
        store.write("font/x", b"x").unwrap();

        store.clear().unwrap();

        assert!(store.root().is_dir());
        assert!(store.list_root_files().unwrap().is_empty());
        assert!(!store.root().join("font").exists());
    }

    #[test]
    fn test_reopen_sees_previous_files() {
        let (mut store, temp) = create_test_store();
        store.write("a.png", b"persisted").unwrap();
        drop(store);

        let mut reopened = DiskStore::open(temp.path().join("doc")).unwrap();
        let data = reopened.read("a.png").unwrap().unwrap();
        assert_eq!(&data[..], b"persisted");
    }
}
