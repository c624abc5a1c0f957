use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Mutual exclusion for pipeline runs against one installation. Two runs
/// expanding into the same install directory would interleave writes.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    pub fn acquire(work_root: &Path) -> Result<Self> {
        fs::create_dir_all(work_root)
            .with_context(|| format!("failed creating work directory: {}", work_root.display()))?;

        let path = work_root.join("upgrade.lock");
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                bail!(
                    "another upgrade run holds the lock at {}; wait for it or remove a stale lock",
                    path.display()
                );
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed creating lock file: {}", path.display()));
            }
        };
        let _ = writeln!(file, "{}", std::process::id());

        Ok(Self { path })
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
