use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Durable artifact storage addressed by `/`-separated logical paths.
/// Staged archives, expanded trees, and pipeline records all live here so
/// a crashed run can pick up where it left off.
pub trait DurableStore: Send + Sync {
    fn put_stream(&self, path: &str, reader: &mut dyn Read) -> Result<u64>;
    fn open_stream(&self, path: &str) -> Result<Box<dyn Read + Send>>;
    fn exists(&self, path: &str) -> Result<bool>;
    /// Logical paths of every file under `prefix`, sorted. Missing prefixes
    /// list as empty.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
    fn delete(&self, path: &str) -> Result<()>;

    fn put_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.put_stream(path, &mut &bytes[..]).map(|_| ())
    }

    fn read_string(&self, path: &str) -> Result<Option<String>> {
        if !self.exists(path)? {
            return Ok(None);
        }
        let mut reader = self.open_stream(path)?;
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .with_context(|| format!("failed reading stored record: {path}"))?;
        Ok(Some(content))
    }
}

/// Filesystem-backed store rooted at one directory. Writes land in a
/// `.part` sibling first and are renamed into place, so a half-written
/// file never shadows a good one.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, logical: &str) -> Result<PathBuf> {
        let relative = Path::new(logical);
        if logical.is_empty() || relative.is_absolute() {
            bail!("invalid store path: '{logical}'");
        }
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            bail!("store path must be plain relative: '{logical}'");
        }
        Ok(self.root.join(relative))
    }
}

impl DurableStore for LocalStore {
    fn put_stream(&self, path: &str, reader: &mut dyn Read) -> Result<u64> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating store directory: {}", parent.display()))?;
        }

        let staging = self.root.join(format!("{path}.part"));
        let written = (|| -> Result<u64> {
            let mut file = File::create(&staging)
                .with_context(|| format!("failed creating store file: {}", staging.display()))?;
            let written = io::copy(reader, &mut file)
                .with_context(|| format!("failed writing store file: {}", staging.display()))?;
            Ok(written)
        })();

        match written {
            Ok(written) => {
                fs::rename(&staging, &target)
                    .with_context(|| format!("failed publishing store file: {}", target.display()))?;
                Ok(written)
            }
            Err(err) => {
                let _ = fs::remove_file(&staging);
                Err(err)
            }
        }
    }

    fn open_stream(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let target = self.resolve(path)?;
        let file = File::open(&target)
            .with_context(|| format!("failed opening store file: {}", target.display()))?;
        Ok(Box::new(file))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.exists())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.resolve(prefix)?;
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        collect_files(&root, prefix.trim_end_matches('/'), &mut paths)?;
        paths.sort();
        Ok(paths)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if target.exists() {
            fs::remove_file(&target)
                .with_context(|| format!("failed deleting store file: {}", target.display()))?;
        }
        Ok(())
    }
}

fn collect_files(dir: &Path, logical: &str, paths: &mut Vec<String>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed listing store directory: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed reading entry in: {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let child = format!("{logical}/{name}");
        if entry.path().is_dir() {
            collect_files(&entry.path(), &child, paths)?;
        } else {
            paths.push(child);
        }
    }
    Ok(())
}
