use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::ResolverError;

/// FileResolver turns the file names listed on a board into paths readable on this machine.
pub trait FileResolver {
    fn resolved_filename(&self, filename: &str) -> Result<PathBuf, ResolverError>;
}

/// Relative names are joined onto an optional data root; absolute names are used as is.
#[derive(Debug, Clone, Default)]
pub struct TrivialFileResolver {
    root: Option<PathBuf>,
}

impl TrivialFileResolver {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl FileResolver for TrivialFileResolver {
    fn resolved_filename(&self, filename: &str) -> Result<PathBuf, ResolverError> {
        let path = Path::new(filename);
        match self.root.as_ref() {
            Some(root) if path.is_relative() => Ok(root.join(path)),
            _ => Ok(path.to_path_buf()),
        }
    }
}

/// CacheFileResolver copies files from a (typically network mounted) source into a local cache
/// the first time they are asked for, and hands out the cached copy from then on.
#[derive(Debug)]
pub struct CacheFileResolver {
    source: TrivialFileResolver,
    cache_dir: PathBuf,
    copied_bytes: AtomicU64,
}

impl CacheFileResolver {
    pub fn new(source_root: Option<PathBuf>, cache_dir: &Path) -> Self {
        Self {
            source: TrivialFileResolver::new(source_root),
            cache_dir: cache_dir.to_path_buf(),
            copied_bytes: AtomicU64::new(0),
        }
    }

    /// Location of a file inside the cache, mirroring its path below any root
    pub fn cache_path(&self, filename: &str) -> PathBuf {
        let relative: PathBuf = Path::new(filename)
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .collect();
        self.cache_dir.join(relative)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Total bytes copied into the cache so far
    pub fn copied_bytes(&self) -> u64 {
        self.copied_bytes.load(Ordering::Relaxed)
    }

    /// Remove the whole cache directory
    pub fn clear(&self) -> Result<(), ResolverError> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)?;
            spdlog::info!("Removed file cache {}", self.cache_dir.to_string_lossy());
        }
        Ok(())
    }
}

impl FileResolver for CacheFileResolver {
    fn resolved_filename(&self, filename: &str) -> Result<PathBuf, ResolverError> {
        let cached = self.cache_path(filename);
        if cached.exists() {
            spdlog::debug!("Cache hit for {}", filename);
            return Ok(cached);
        }
        let src = self.source.resolved_filename(filename)?;
        if !src.exists() {
            return Err(ResolverError::MissingFile(src));
        }
        if let Some(parent) = cached.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = std::fs::copy(&src, &cached)?;
        self.copied_bytes.fetch_add(bytes, Ordering::Relaxed);
        spdlog::info!(
            "Copied {} into the cache ({})",
            src.to_string_lossy(),
            human_bytes::human_bytes(bytes as f64)
        );
        Ok(cached)
    }
}
