//! IO abstractions for loading and writing build assets.

#![allow(clippy::all)]

use std::{
    collections::HashMap,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Storage backend that stylesheets are read from and pruned stylesheets are
/// written back to.
///
/// Implementations must be shareable across tasks: write-backs are spawned
/// and may outlive the call that produced them.
pub trait AssetStore: Send + Sync + 'static {
    /// Read the full text of the asset at `path`. A missing asset fails with
    /// [`io::ErrorKind::NotFound`].
    fn read(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send;

    /// Replace the asset at `path` with `contents`.
    fn write(&self, path: &Path, contents: String) -> impl Future<Output = io::Result<()>> + Send;

    /// Expand an absolute glob pattern into the matching asset paths, sorted.
    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>>;
}

// -------------------------- FILESYSTEM STORE --------------------------

/// Asset store backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

impl AssetStore for FsStore {
    fn read(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::read_to_string(&path).await }
    }

    fn write(&self, path: &Path, contents: String) -> impl Future<Output = io::Result<()>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::write(&path, contents).await }
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let paths = glob::glob(pattern)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
        let mut out = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => out.push(path),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(?error, "skipping unreadable glob entry");
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

// -------------------------- MEMORY STORE --------------------------

/// Asset store holding files in memory, keyed by path.
///
/// Every path passed to [`AssetStore::read`] is recorded, which lets callers
/// verify which files a run attempted to load.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, String>>,
    reads: Mutex<Vec<PathBuf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(path, contents)` pairs.
    pub fn with_files<I, P, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let store = Self::new();
        for (path, contents) in files {
            store.insert(path, contents);
        }
        store
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.into(), contents.into());
        }
    }

    /// Current contents of `path`, if present.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(path.as_ref()).cloned())
    }

    /// Every path passed to `read`, in call order.
    pub fn reads(&self) -> Vec<PathBuf> {
        self.reads
            .lock()
            .map(|reads| reads.clone())
            .unwrap_or_default()
    }

    fn lookup(&self, path: &Path) -> io::Result<String> {
        if let Ok(mut reads) = self.reads.lock() {
            reads.push(path.to_path_buf());
        }
        let files = self
            .files
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?;
        files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no asset at {}", path.display()),
            )
        })
    }
}

impl AssetStore for MemoryStore {
    fn read(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send {
        let result = self.lookup(path);
        async move { result }
    }

    fn write(&self, path: &Path, contents: String) -> impl Future<Output = io::Result<()>> + Send {
        self.insert(path, contents);
        async { Ok(()) }
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
        let files = self
            .files
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?;
        let mut out: Vec<PathBuf> = files
            .keys()
            .filter(|path| pattern.matches_path(path))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_records_reads_and_reports_missing() {
        let store = MemoryStore::with_files([("/www/a.css", "a{}")]);
        assert_eq!(store.read(Path::new("/www/a.css")).await.unwrap(), "a{}");
        let err = store.read(Path::new("/www/b.css")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(
            store.reads(),
            vec![PathBuf::from("/www/a.css"), PathBuf::from("/www/b.css")]
        );
    }

    #[tokio::test]
    async fn memory_store_write_replaces_contents() {
        let store = MemoryStore::with_files([("/www/a.css", "a{}")]);
        store
            .write(Path::new("/www/a.css"), "b{}".to_string())
            .await
            .unwrap();
        assert_eq!(store.get("/www/a.css").as_deref(), Some("b{}"));
    }

    #[test]
    fn memory_store_glob_matches_sorted() {
        let store = MemoryStore::with_files([
            ("/www/css/b.css", ""),
            ("/www/css/a.css", ""),
            ("/www/js/a.js", ""),
        ]);
        let found = store.glob("/www/css/*.css").unwrap();
        assert_eq!(
            found,
            vec![PathBuf::from("/www/css/a.css"), PathBuf::from("/www/css/b.css")]
        );
    }

    #[tokio::test]
    async fn fs_store_round_trips_through_disk() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("site.css");
        let store = FsStore::new();
        store.write(&file, "h1{color:red}".into()).await.unwrap();
        assert_eq!(store.read(&file).await.unwrap(), "h1{color:red}");

        let pattern = format!("{}/*.css", temp.path().display());
        assert_eq!(store.glob(&pattern).unwrap(), vec![file]);
    }
}
