use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use zip::ZipArchive;

use crate::store::DurableStore;

/// Release archives pack the board files under this top-level directory.
pub const UPLOAD_ROOT: &str = "upload";

/// Entries are copied in chunks of this size, one archive handle per chunk.
const EXTRACT_CHUNK: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    index: usize,
    /// Path relative to the packaging root, `/`-separated.
    pub rel_path: String,
}

/// Read side of a staged release archive. Extraction opens one archive
/// handle per worker so entries can be decompressed in parallel.
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    path: PathBuf,
}

impl ArchiveReader {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        Self::open_handle(&path)?;
        Ok(Self { path })
    }

    fn open_handle(path: &Path) -> Result<ZipArchive<File>> {
        let file = File::open(path)
            .with_context(|| format!("failed opening staged archive: {}", path.display()))?;
        ZipArchive::new(file)
            .with_context(|| format!("failed reading staged archive: {}", path.display()))
    }

    /// File entries beneath `root/`, with the root stripped. Directory
    /// entries and files outside the root are skipped; entries that would
    /// escape the destination are rejected.
    pub fn entries_under(&self, root: &str) -> Result<Vec<ArchiveEntry>> {
        let mut archive = Self::open_handle(&self.path)?;
        let prefix = format!("{}/", root.trim_end_matches('/'));

        let mut entries = Vec::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .with_context(|| format!("failed reading archive entry {index}"))?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            let Some(rel_path) = name.strip_prefix(&prefix) else {
                continue;
            };
            if rel_path.is_empty() {
                continue;
            }
            validate_entry_path(rel_path)?;

            entries.push(ArchiveEntry {
                index,
                rel_path: rel_path.to_string(),
            });
        }
        Ok(entries)
    }

    /// Expand every entry under `root/` into the store below `dest_prefix`.
    /// Existing files are overwritten, so a rerun converges on the same
    /// tree. Returns the number of files written.
    pub fn extract_to_store(
        &self,
        root: &str,
        store: &dyn DurableStore,
        dest_prefix: &str,
    ) -> Result<usize> {
        let entries = self.entries_under(root)?;
        let dest_prefix = dest_prefix.trim_end_matches('/');

        entries.par_chunks(EXTRACT_CHUNK).try_for_each(|chunk| {
            let mut archive = Self::open_handle(&self.path)?;
            for entry in chunk {
                let mut file = archive.by_index(entry.index).with_context(|| {
                    format!("failed reading archive entry: {}", entry.rel_path)
                })?;
                let dest = format!("{dest_prefix}/{}", entry.rel_path);
                store
                    .put_stream(&dest, &mut file)
                    .with_context(|| format!("failed expanding entry: {}", entry.rel_path))?;
            }
            Ok::<(), anyhow::Error>(())
        })?;

        Ok(entries.len())
    }

    /// Expand every entry under `root/` directly into a local directory,
    /// overwriting whatever is there. Used for the final install step.
    pub fn extract_to_dir(&self, root: &str, dest: &Path) -> Result<usize> {
        let entries = self.entries_under(root)?;

        entries.par_chunks(EXTRACT_CHUNK).try_for_each(|chunk| {
            let mut archive = Self::open_handle(&self.path)?;
            for entry in chunk {
                let mut file = archive.by_index(entry.index).with_context(|| {
                    format!("failed reading archive entry: {}", entry.rel_path)
                })?;

                let target = dest.join(Path::new(&entry.rel_path));
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("failed creating install directory: {}", parent.display())
                    })?;
                }
                let mut out = File::create(&target).with_context(|| {
                    format!("failed creating installed file: {}", target.display())
                })?;
                io::copy(&mut file, &mut out).with_context(|| {
                    format!("failed installing file: {}", target.display())
                })?;
            }
            Ok::<(), anyhow::Error>(())
        })?;

        Ok(entries.len())
    }
}

fn validate_entry_path(rel_path: &str) -> Result<()> {
    let path = Path::new(rel_path);
    if path.is_absolute()
        || path
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
    {
        bail!("archive entry escapes the destination: '{rel_path}'");
    }
    Ok(())
}
